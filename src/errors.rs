//! Errors of the cocktail machine.
//!
//! `DispenseError` is what the caller sees. The kinds raised before any pump is touched
//! (`InvalidRecipe`, `UnresolvedIngredient`, `CalibrationFault`, `InsufficientStock`) are kept
//! apart from the ones raised once the executor started driving hardware, see
//! [`DispenseError::is_partial_dispense`].
use thiserror::Error;

/// Failure of a single pump activation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActuatorError {
    #[error("could not start helper: {0}")]
    Spawn(String),
    #[error("helper exited with status {status}: {diagnostics}")]
    HelperFailed { status: String, diagnostics: String },
    #[error("actuator rejected pin {pin}: {reason}")]
    Rejected { pin: u32, reason: String },
    #[error("lock on pin {0} poisoned")]
    LockError(u32),
    #[error("actuator worker panicked")]
    WorkerPanicked,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed json in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("store lock poisoned")]
    LockError,
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StoreError::LockError
    }
}

#[derive(Error, Debug)]
pub enum DispenseError {
    #[error("invalid recipe: {0}")]
    InvalidRecipe(String),
    #[error("no enabled pump is bound to ingredient '{ingredient_id}'")]
    UnresolvedIngredient { ingredient_id: String },
    #[error("pump {pump_id} has an invalid flow rate of {flow_rate} ml/s, recalibrate it")]
    CalibrationFault { pump_id: u32, flow_rate: f64 },
    #[error("not enough stock of {}", .missing.join(", "))]
    InsufficientStock { missing: Vec<String> },
    #[error("pump {pump_id} failed in batch {batch}: {source}")]
    ActuatorFault {
        pump_id: u32,
        batch: usize,
        #[source]
        source: ActuatorError,
    },
    #[error("pump {pump_id} did not finish within {limit_ms} ms in batch {batch}")]
    ActuatorTimeout {
        pump_id: u32,
        batch: usize,
        limit_ms: u64,
    },
    #[error("dispense cancelled before batch {batch}")]
    Cancelled { batch: usize },
    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),
    #[error("unknown cocktail '{0}'")]
    UnknownCocktail(String),
    #[error("unknown pump {0}")]
    UnknownPump(u32),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("lock poisoned")]
    LockError,
}

impl DispenseError {
    /// True when some pumps may already have run. The drink is likely incomplete and the
    /// remedy is checking the hardware, not picking another size.
    pub fn is_partial_dispense(&self) -> bool {
        matches!(
            self,
            DispenseError::ActuatorFault { .. }
                | DispenseError::ActuatorTimeout { .. }
                | DispenseError::Cancelled { .. }
        )
    }
}

impl<T> From<std::sync::PoisonError<T>> for DispenseError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        DispenseError::LockError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_flag_only_execution_errors_as_partial_dispense() {
        let fault = DispenseError::ActuatorFault {
            pump_id: 1,
            batch: 0,
            source: ActuatorError::Spawn("missing".to_string()),
        };
        assert_eq!(true, fault.is_partial_dispense());
        assert_eq!(
            false,
            DispenseError::UnresolvedIngredient { ingredient_id: "rum".to_string() }
                .is_partial_dispense()
        );
        assert_eq!(
            false,
            DispenseError::InsufficientStock { missing: vec!["rum".to_string()] }
                .is_partial_dispense()
        );
    }

    #[test]
    fn should_list_missing_ingredients_in_message() {
        let error = DispenseError::InsufficientStock {
            missing: vec!["rum".to_string(), "lime-juice".to_string()],
        };
        assert_eq!("not enough stock of rum, lime-juice", error.to_string());
    }
}
