//! Configuration defaults of the cocktail machine

/// Pause between the last concurrent pour and the first float pour, so the base settles
pub const SETTLE_DELAY_MS: u64 = 2000;

/// Ingredient poured last by default to get the layered look
pub const DEFAULT_DEFERRED_INGREDIENT: &str = "grenadine";

/// A tank is "low" while it holds less than this many servings of the required volume
pub const LOW_STOCK_MULTIPLIER: f64 = 2.0;

/// Extra time granted to an actuator call over its computed duration before it is considered hung
pub const WATCHDOG_MARGIN_MS: u64 = 1000;

/// How long a pump runs during calibration. The measured volume divided by this window is the flow rate.
pub const CALIBRATION_RUN_MS: u64 = 2000;

/// Fixed size of a quick shot
pub const SHOT_SIZE_ML: f64 = 20.0;

/// Below this level a tank shows a refill warning
pub const LOW_LEVEL_ML: f64 = 100.0;

/// Below this level a tank shows a critical refill warning
pub const CRITICAL_LEVEL_ML: f64 = 50.0;

/// Default container size when a level record is created for a new pump
pub const DEFAULT_CONTAINER_ML: f64 = 750.0;

pub const PUMP_CONFIG_FILE: &str = "pump-config.json";
pub const LEVELS_FILE: &str = "ingredient-levels.json";
pub const COCKTAILS_FILE: &str = "cocktails.json";
pub const INGREDIENTS_FILE: &str = "ingredients.json";
