//! Linear scaling of a recipe to a serving size
use crate::{errors::DispenseError, recipe::RecipeLine};

/// Scales every line so the recipe adds up to `target_volume_ml`.
/// Each line is rounded to whole ml on its own, so the total may drift from the
/// target by up to half a ml per line.
pub fn scale(recipe: &[RecipeLine], target_volume_ml: f64) -> Result<Vec<RecipeLine>, DispenseError> {
    if recipe.is_empty() {
        return Err(DispenseError::InvalidRecipe("recipe has no lines".to_string()));
    }
    let original_total: f64 = recipe.iter().map(|line| line.volume).sum();
    if !(original_total > 0.0) {
        return Err(DispenseError::InvalidRecipe(format!(
            "recipe adds up to {} ml",
            original_total
        )));
    }
    if !(target_volume_ml > 0.0) || !target_volume_ml.is_finite() {
        return Err(DispenseError::InvalidRecipe(format!(
            "target volume must be positive, got {} ml",
            target_volume_ml
        )));
    }

    let scale_factor = target_volume_ml / original_total;
    Ok(recipe
        .iter()
        .map(|line| RecipeLine {
            volume: (line.volume * scale_factor).round(),
            ..line.clone()
        })
        .collect())
}
