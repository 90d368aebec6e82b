//! Machine configuration, read from a JSON file. Every field falls back to the defaults in
//! `constants`, so a partial (or missing) file is fine.
use std::{collections::HashSet, fs::File, io::BufReader, path::Path, path::PathBuf, time::Duration};

use log::{info, warn};
use serde::Deserialize;

use crate::{
    constants::{
        DEFAULT_DEFERRED_INGREDIENT, LOW_STOCK_MULTIPLIER, SETTLE_DELAY_MS, SHOT_SIZE_ML,
        WATCHDOG_MARGIN_MS,
    },
    errors::StoreError,
    recipe::{PourStyle, RecipeLine},
};

/// Rules the scheduler, the availability check and the executor follow
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DispensePolicy {
    pub settle_delay_ms: u64,
    /// Ingredients always floated on top, whatever the recipe line says
    pub deferred_ingredients: HashSet<String>,
    pub low_stock_multiplier: f64,
    pub watchdog_margin_ms: u64,
}

impl Default for DispensePolicy {
    fn default() -> Self {
        DispensePolicy {
            settle_delay_ms: SETTLE_DELAY_MS,
            deferred_ingredients: HashSet::from([DEFAULT_DEFERRED_INGREDIENT.to_string()]),
            low_stock_multiplier: LOW_STOCK_MULTIPLIER,
            watchdog_margin_ms: WATCHDOG_MARGIN_MS,
        }
    }
}

impl DispensePolicy {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn watchdog_margin(&self) -> Duration {
        Duration::from_millis(self.watchdog_margin_ms)
    }

    /// A line is floated when tagged so, or when its ingredient is in the deferred set.
    /// An explicit `immediate` tag wins over the set.
    pub fn is_deferred(&self, line: &RecipeLine) -> bool {
        match line.pour_style {
            Some(PourStyle::Float) => true,
            Some(PourStyle::Immediate) => false,
            None => self.deferred_ingredients.contains(&line.ingredient_id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MachineConfig {
    pub data_dir: PathBuf,
    pub python: String,
    /// Helper that drives the GPIO pins, called as `<python> <script> activate <pin> <ms>`
    pub pump_script: PathBuf,
    /// Sleep instead of driving pumps
    pub simulate: bool,
    pub shot_size_ml: f64,
    pub log_level: String,
    pub policy: DispensePolicy,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            data_dir: PathBuf::from("data"),
            python: "python3".to_string(),
            pump_script: PathBuf::from("pump_control.py"),
            simulate: false,
            shot_size_ml: SHOT_SIZE_ML,
            log_level: "info".to_string(),
            policy: DispensePolicy::default(),
        }
    }
}

impl MachineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<MachineConfig, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("[CONFIG] {} not found, using defaults", path.display());
            return Ok(MachineConfig::default());
        }
        let file = File::open(path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: MachineConfig =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Json {
                path: path.display().to_string(),
                source,
            })?;
        info!("[CONFIG] Loaded {}", path.display());
        Ok(config)
    }
}
