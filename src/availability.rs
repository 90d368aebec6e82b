//! Whether the tanks hold enough for an order
use log::debug;

use crate::{
    errors::DispenseError,
    levels::{find_level, TankLevel},
    pump::{resolve, PumpMapping},
    recipe::Cocktail,
    scaler::scale,
};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Availability {
    pub can_make: bool,
    /// Enough for this order, not for a repeat
    pub low_ingredients: Vec<String>,
    /// Not enough for this order, or no pump or level to pour it from
    pub missing_ingredients: Vec<String>,
}

/// Classifies every automatic line of `cocktail`, scaled to `target_volume_ml`, against the
/// current tank levels. Manual lines never block an order.
///
/// `low_stock_multiplier` is the number of servings below which a tank counts as low:
/// with 2, a tank holding `required <= current < 2 * required` is low.
pub fn check_availability(
    cocktail: &Cocktail,
    target_volume_ml: f64,
    mapping: &[PumpMapping],
    levels: &[TankLevel],
    low_stock_multiplier: f64,
) -> Result<Availability, DispenseError> {
    let scaled = scale(&cocktail.recipe, target_volume_ml)?;
    let mut availability = Availability::default();

    for line in scaled.iter().filter(|line| line.is_automatic()) {
        let ingredient = line.ingredient_id.clone();
        let Some(pump) = resolve(&line.ingredient_id, mapping) else {
            debug!("[AVAILABILITY] No pump for {}", ingredient);
            availability.missing_ingredients.push(ingredient);
            continue;
        };
        let Some(level) = find_level(pump.id, levels) else {
            debug!("[AVAILABILITY] No level for pump {}", pump.id);
            availability.missing_ingredients.push(ingredient);
            continue;
        };

        let required = line.volume;
        if level.current_ml < required {
            debug!(
                "[AVAILABILITY] Not enough {} ({} < {})",
                ingredient, level.current_ml, required
            );
            availability.missing_ingredients.push(ingredient);
        } else if level.current_ml < required * low_stock_multiplier {
            debug!(
                "[AVAILABILITY] Low {} ({} < {})",
                ingredient,
                level.current_ml,
                required * low_stock_multiplier
            );
            availability.low_ingredients.push(ingredient);
        }
    }

    availability.can_make = availability.missing_ingredients.is_empty();
    Ok(availability)
}

/// Quick shot menu: a shot can be poured when a pump is bound and its tank holds the whole shot
pub fn check_shot_availability(
    ingredient_id: &str,
    shot_ml: f64,
    mapping: &[PumpMapping],
    levels: &[TankLevel],
) -> bool {
    resolve(ingredient_id, mapping)
        .and_then(|pump| find_level(pump.id, levels))
        .map(|level| level.current_ml >= shot_ml)
        .unwrap_or(false)
}
