//! Pump hardware. The executor only sees [`ActuatorGateway`]; how a pin gets driven is up to
//! the implementation.
use std::{
    collections::HashMap,
    path::PathBuf,
    process::Command,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use log::{debug, error};

use crate::errors::ActuatorError;

/// Runs the pump on `pin` for `duration_ms`, then stops it. Returns once the pump is off.
pub trait ActuatorGateway: Send + Sync {
    fn activate(&self, pin: u32, duration_ms: u64) -> Result<(), ActuatorError>;
}

/// Drives the pins through the Python helper on the Raspberry Pi
pub struct ProcessGateway {
    python: String,
    script: PathBuf,
}

impl ProcessGateway {
    pub fn new(python: &str, script: PathBuf) -> ProcessGateway {
        ProcessGateway {
            python: python.to_string(),
            script,
        }
    }
}

impl ActuatorGateway for ProcessGateway {
    fn activate(&self, pin: u32, duration_ms: u64) -> Result<(), ActuatorError> {
        if !self.script.exists() {
            return Err(ActuatorError::Spawn(format!(
                "pump script not found: {}",
                self.script.display()
            )));
        }
        debug!("[GPIO] Activating pin {} for {}ms", pin, duration_ms);
        let output = Command::new(&self.python)
            .arg(&self.script)
            .arg("activate")
            .arg(pin.to_string())
            .arg(duration_ms.to_string())
            .output()
            .map_err(|e| ActuatorError::Spawn(e.to_string()))?;

        if !output.status.success() {
            let diagnostics = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("[GPIO] Pin {} failed: {}", pin, diagnostics);
            return Err(ActuatorError::HelperFailed {
                status: output.status.to_string(),
                diagnostics,
            });
        }
        debug!(
            "[GPIO] Pin {} done: {}",
            pin,
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }
}

/// Pretends to pour by sleeping for the run time
#[derive(Default)]
pub struct SimulatedGateway;

impl ActuatorGateway for SimulatedGateway {
    fn activate(&self, pin: u32, duration_ms: u64) -> Result<(), ActuatorError> {
        debug!("[SIMULATION] Pin {} on for {}ms", pin, duration_ms);
        thread::sleep(Duration::from_millis(duration_ms));
        Ok(())
    }
}

impl<G: ActuatorGateway + ?Sized> ActuatorGateway for Arc<G> {
    fn activate(&self, pin: u32, duration_ms: u64) -> Result<(), ActuatorError> {
        (**self).activate(pin, duration_ms)
    }
}

/// Wraps a gateway so that a pin is never driven by two activations at the same time.
/// A second request for a busy pin waits for the first to finish.
pub struct SerializedGateway<G: ActuatorGateway> {
    inner: G,
    pins: Mutex<HashMap<u32, Arc<Mutex<()>>>>,
}

impl<G: ActuatorGateway> SerializedGateway<G> {
    pub fn new(inner: G) -> SerializedGateway<G> {
        SerializedGateway {
            inner,
            pins: Mutex::new(HashMap::new()),
        }
    }

    fn pin_lock(&self, pin: u32) -> Result<Arc<Mutex<()>>, ActuatorError> {
        let mut pins = self.pins.lock().map_err(|_| ActuatorError::LockError(pin))?;
        Ok(pins.entry(pin).or_default().clone())
    }
}

impl<G: ActuatorGateway> ActuatorGateway for SerializedGateway<G> {
    fn activate(&self, pin: u32, duration_ms: u64) -> Result<(), ActuatorError> {
        let lock = self.pin_lock(pin)?;
        let _busy = lock.lock().map_err(|_| ActuatorError::LockError(pin))?;
        self.inner.activate(pin, duration_ms)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingGateway;
    use super::*;

    #[test]
    fn should_not_overlap_activations_of_the_same_pin() {
        let gateway = Arc::new(SerializedGateway::new(RecordingGateway::default()));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let gateway = gateway.clone();
                thread::spawn(move || gateway.activate(17, 30))
            })
            .collect();
        for handle in handles {
            assert_eq!(Ok(()), handle.join().unwrap());
        }

        let mut calls = gateway.inner.calls.lock().unwrap().clone();
        calls.sort_by_key(|(_, _, start, _)| *start);
        for pair in calls.windows(2) {
            assert!(pair[1].2 >= pair[0].3);
        }
    }

    #[test]
    fn should_let_different_pins_run_together() {
        let gateway = Arc::new(SerializedGateway::new(RecordingGateway::default()));
        let handles: Vec<_> = [17, 27]
            .into_iter()
            .map(|pin| {
                let gateway = gateway.clone();
                thread::spawn(move || gateway.activate(pin, 100))
            })
            .collect();
        for handle in handles {
            assert_eq!(Ok(()), handle.join().unwrap());
        }
        let calls = gateway.inner.calls.lock().unwrap();
        let (first, second) = (&calls[0], &calls[1]);
        assert!(second.2 < first.3);
    }

    #[test]
    fn should_fail_when_the_pump_script_is_missing() {
        let gateway = ProcessGateway::new("python3", PathBuf::from("/nonexistent/pump_control.py"));
        assert!(matches!(gateway.activate(17, 10), Err(ActuatorError::Spawn(_))));
    }
}
