use std::fmt;

/// What the guest asked for
#[derive(Debug, Clone, PartialEq)]
pub enum OrderKind {
    Cocktail { cocktail_id: String },
    Shot { ingredient_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: usize,
    pub kind: OrderKind,
    /// Serving size in ml
    pub size_ml: f64,
}

impl Order {
    pub fn cocktail(id: usize, cocktail_id: &str, size_ml: f64) -> Order {
        Order {
            id,
            kind: OrderKind::Cocktail {
                cocktail_id: cocktail_id.to_string(),
            },
            size_ml,
        }
    }

    pub fn shot(id: usize, ingredient_id: &str, size_ml: f64) -> Order {
        Order {
            id,
            kind: OrderKind::Shot {
                ingredient_id: ingredient_id.to_string(),
            },
            size_ml,
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OrderKind::Cocktail { cocktail_id } => {
                write!(f, "#{} {} ({}ml)", self.id, cocktail_id, self.size_ml)
            }
            OrderKind::Shot { ingredient_id } => {
                write!(f, "#{} shot of {} ({}ml)", self.id, ingredient_id, self.size_ml)
            }
        }
    }
}
