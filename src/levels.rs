//! Tank levels, one per pump
use serde::{Deserialize, Serialize};

use crate::constants::{CRITICAL_LEVEL_ML, LOW_LEVEL_ML};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TankLevel {
    pub pump_id: u32,
    #[serde(default)]
    pub ingredient_id: String,
    #[serde(rename = "currentLevel")]
    pub current_ml: f64,
    #[serde(rename = "containerSize")]
    pub capacity_ml: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelWarning {
    Low,
    Critical,
}

impl TankLevel {
    pub fn new(pump_id: u32, ingredient_id: &str, current_ml: f64, capacity_ml: f64) -> TankLevel {
        TankLevel {
            pump_id,
            ingredient_id: ingredient_id.to_string(),
            current_ml: current_ml.min(capacity_ml).max(0.0),
            capacity_ml,
        }
    }

    /// Draws down after a pour. Never goes below empty.
    pub fn consume(&mut self, volume_ml: f64) {
        self.current_ml = (self.current_ml - volume_ml).max(0.0);
    }

    /// Sets the new total after the operator refilled (or emptied) the tank
    pub fn refill(&mut self, new_total_ml: f64) {
        self.current_ml = new_total_ml.min(self.capacity_ml).max(0.0);
    }

    pub fn fill_to_capacity(&mut self) {
        self.current_ml = self.capacity_ml;
    }

    pub fn fill_percentage(&self) -> u32 {
        if self.capacity_ml <= 0.0 {
            return 0;
        }
        (self.current_ml / self.capacity_ml * 100.0).round() as u32
    }

    pub fn warning(&self) -> Option<LevelWarning> {
        if self.current_ml < CRITICAL_LEVEL_ML {
            Some(LevelWarning::Critical)
        } else if self.current_ml < LOW_LEVEL_ML {
            Some(LevelWarning::Low)
        } else {
            None
        }
    }
}

pub fn find_level(pump_id: u32, levels: &[TankLevel]) -> Option<&TankLevel> {
    levels.iter().find(|level| level.pump_id == pump_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_not_consume_below_empty() {
        let mut level = TankLevel::new(1, "rum", 30.0, 700.0);
        level.consume(45.0);
        assert_eq!(0.0, level.current_ml);
    }

    #[test]
    fn should_clamp_refill_to_capacity() {
        let mut level = TankLevel::new(1, "rum", 30.0, 700.0);
        level.refill(900.0);
        assert_eq!(700.0, level.current_ml);
        level.refill(0.0);
        assert_eq!(0.0, level.current_ml);
    }

    #[test]
    fn should_warn_when_low_and_when_critical() {
        assert_eq!(None, TankLevel::new(1, "rum", 100.0, 700.0).warning());
        assert_eq!(Some(LevelWarning::Low), TankLevel::new(1, "rum", 99.0, 700.0).warning());
        assert_eq!(Some(LevelWarning::Critical), TankLevel::new(1, "rum", 49.0, 700.0).warning());
    }

    #[test]
    fn should_report_fill_percentage() {
        let mut level = TankLevel::new(1, "rum", 175.0, 700.0);
        assert_eq!(25, level.fill_percentage());
        level.fill_to_capacity();
        assert_eq!(100, level.fill_percentage());
    }
}
