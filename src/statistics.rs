use std::sync::RwLock;

use log::{info, warn};

use crate::{
    errors::DispenseError,
    levels::{LevelWarning, TankLevel},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub served: u64,
    /// Turned down before any pump ran (stock, configuration, unknown drink)
    pub refused: u64,
    /// Failed while pouring, the glass may hold part of the drink
    pub failed: u64,
}

/// Order outcomes of a session, shared between the dispenser and whoever prints them
#[derive(Default)]
pub struct Statistics {
    counters: RwLock<Counters>,
}

impl Statistics {
    pub fn new() -> Statistics {
        Statistics::default()
    }

    pub fn record_served(&self) -> Result<(), DispenseError> {
        self.counters.write()?.served += 1;
        Ok(())
    }

    pub fn record_error(&self, error: &DispenseError) -> Result<(), DispenseError> {
        let mut counters = self.counters.write()?;
        if error.is_partial_dispense() {
            counters.failed += 1;
        } else {
            counters.refused += 1;
        }
        Ok(())
    }

    pub fn counters(&self) -> Result<Counters, DispenseError> {
        Ok(*self.counters.read()?)
    }

    pub fn print_statistics(&self, levels: &[TankLevel]) -> Result<(), DispenseError> {
        let counters = self.counters()?;
        let mut statistics = format!(
            "[STATISTICS] Served={} Refused={} Failed={} | Tank=(current/capacity) |",
            counters.served, counters.refused, counters.failed
        );
        for level in levels {
            statistics.push_str(&format!(
                " {}=({}/{}, {}%)",
                level.ingredient_id,
                level.current_ml,
                level.capacity_ml,
                level.fill_percentage()
            ));
        }
        info!("{}", statistics);

        for level in levels {
            match level.warning() {
                Some(LevelWarning::Critical) => {
                    warn!("[STATISTICS] {} is critically low, refill it", level.ingredient_id)
                }
                Some(LevelWarning::Low) => {
                    warn!("[STATISTICS] {} is running low", level.ingredient_id)
                }
                None => {}
            }
        }
        Ok(())
    }
}
