//! Catalog data: ingredients, recipe lines and cocktails
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub alcoholic: bool,
}

impl Ingredient {
    /// Stand-in for an id missing from the catalog, named after the id
    pub fn unlisted(id: &str) -> Ingredient {
        Ingredient {
            id: id.to_string(),
            name: display_name(id),
            alcoholic: false,
        }
    }
}

/// Who pours a recipe line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispenseClass {
    /// Poured by a pump
    Automatic,
    /// Added by hand, shown to the operator
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PourStyle {
    Immediate,
    /// Poured last, after the settle delay
    Float,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeLine {
    pub ingredient_id: String,
    /// Volume in ml
    #[serde(rename = "amount")]
    pub volume: f64,
    #[serde(rename = "type")]
    pub class: DispenseClass,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "instruction")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pour_style: Option<PourStyle>,
}

impl RecipeLine {
    pub fn automatic(ingredient_id: &str, volume: f64) -> RecipeLine {
        RecipeLine {
            ingredient_id: ingredient_id.to_string(),
            volume,
            class: DispenseClass::Automatic,
            instructions: None,
            pour_style: None,
        }
    }

    pub fn manual(ingredient_id: &str, volume: f64, instructions: Option<&str>) -> RecipeLine {
        RecipeLine {
            ingredient_id: ingredient_id.to_string(),
            volume,
            class: DispenseClass::Manual,
            instructions: instructions.map(str::to_string),
            pour_style: None,
        }
    }

    pub fn floated(mut self) -> RecipeLine {
        self.pour_style = Some(PourStyle::Float);
        self
    }

    pub fn is_automatic(&self) -> bool {
        self.class == DispenseClass::Automatic
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cocktail {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub alcoholic: bool,
    pub recipe: Vec<RecipeLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Cocktail {
    pub fn new(id: &str, name: &str, recipe: Vec<RecipeLine>) -> Cocktail {
        Cocktail {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            alcoholic: false,
            recipe,
            image: None,
        }
    }

    /// A single pumped ingredient, so shots go through the same scaling and scheduling as drinks
    pub fn shot(ingredient: &Ingredient, volume: f64) -> Cocktail {
        let mut shot = Cocktail::new(
            &ingredient.id,
            &format!("Shot of {}", ingredient.name),
            vec![RecipeLine::automatic(&ingredient.id, volume)],
        );
        shot.alcoholic = ingredient.alcoholic;
        shot
    }

    pub fn automatic_lines(&self) -> impl Iterator<Item = &RecipeLine> {
        self.recipe.iter().filter(|line| line.is_automatic())
    }
}

/// Turns an ingredient id like `dark-rum` into `Dark Rum`
pub fn display_name(ingredient_id: &str) -> String {
    ingredient_id
        .split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_read_a_recipe_line_with_the_catalog_field_names() {
        let json = r#"{ "ingredientId": "lime-juice", "amount": 20, "type": "manual", "instruction": "squeeze half a lime" }"#;
        let line: RecipeLine = serde_json::from_str(json).unwrap();
        assert_eq!("lime-juice", line.ingredient_id);
        assert_eq!(20.0, line.volume);
        assert_eq!(DispenseClass::Manual, line.class);
        assert_eq!(Some("squeeze half a lime".to_string()), line.instructions);
        assert_eq!(None, line.pour_style);
    }

    #[test]
    fn should_build_a_shot_as_a_single_automatic_line() {
        let rum = Ingredient {
            id: "white-rum".to_string(),
            name: "Bacardi Blanca".to_string(),
            alcoholic: true,
        };
        let shot = Cocktail::shot(&rum, 20.0);
        assert_eq!("Shot of Bacardi Blanca", shot.name);
        assert_eq!(true, shot.alcoholic);
        assert_eq!(vec![RecipeLine::automatic("white-rum", 20.0)], shot.recipe);
    }

    #[test]
    fn should_name_an_unlisted_ingredient_after_its_id() {
        let shot = Cocktail::shot(&Ingredient::unlisted("white-rum"), 20.0);
        assert_eq!("Shot of White Rum", shot.name);
        assert_eq!(false, shot.alcoholic);
    }

    #[test]
    fn should_capitalize_display_names() {
        assert_eq!("Passion Fruit Juice", display_name("passion-fruit-juice"));
        assert_eq!("Gin", display_name("gin"));
    }
}
