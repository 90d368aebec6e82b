//! Pump configuration and ingredient to pump resolution
use serde::{Deserialize, Serialize};

use crate::errors::DispenseError;

/// A pump bound to one ingredient reservoir
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PumpMapping {
    pub id: u32,
    /// Actuator address, a GPIO pin on the Raspberry Pi
    pub pin: u32,
    #[serde(rename = "ingredient")]
    pub ingredient_id: String,
    #[serde(rename = "flowRate")]
    pub flow_rate_ml_per_sec: f64,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl PumpMapping {
    pub fn new(id: u32, pin: u32, ingredient_id: &str, flow_rate_ml_per_sec: f64) -> PumpMapping {
        PumpMapping {
            id,
            pin,
            ingredient_id: ingredient_id.to_string(),
            flow_rate_ml_per_sec,
            enabled: true,
        }
    }

    /// Milliseconds this pump has to run to pour `volume_ml`
    pub fn run_duration_ms(&self, volume_ml: f64) -> Result<u64, DispenseError> {
        if !(self.flow_rate_ml_per_sec > 0.0) || !self.flow_rate_ml_per_sec.is_finite() {
            return Err(DispenseError::CalibrationFault {
                pump_id: self.id,
                flow_rate: self.flow_rate_ml_per_sec,
            });
        }
        Ok((volume_ml / self.flow_rate_ml_per_sec * 1000.0).round() as u64)
    }
}

/// First enabled pump bound to `ingredient_id`, in configuration order.
/// Disabled pumps are invisible here.
pub fn resolve<'a>(ingredient_id: &str, mapping: &'a [PumpMapping]) -> Option<&'a PumpMapping> {
    mapping
        .iter()
        .find(|pump| pump.enabled && pump.ingredient_id == ingredient_id)
}

/// Flow rate measured by running a pump for `run_ms` and weighing what came out
pub fn calibrated_flow_rate(measured_ml: f64, run_ms: u64) -> Result<f64, DispenseError> {
    if !(measured_ml > 0.0) || run_ms == 0 {
        return Err(DispenseError::InvalidCalibration(format!(
            "calibration needs a positive measurement, got {} ml over {} ms",
            measured_ml, run_ms
        )));
    }
    Ok(measured_ml / (run_ms as f64 / 1000.0))
}
