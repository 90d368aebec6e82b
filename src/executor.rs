//! Walks a schedule against the pumps.
//!
//! Runs of one batch are started on their own threads and joined before the next batch
//! starts. Once a pump ran it stays poured: on a fault the remaining batches are dropped and
//! the error goes up as a partial dispense, nothing is undone.
use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc, Mutex, RwLock,
    },
    thread,
    time::{Duration, Instant},
};

use log::{debug, error, info};

use crate::{
    actuator::ActuatorGateway,
    errors::{ActuatorError, DispenseError},
    scheduler::{DispenseBatch, DispenseSchedule},
};

#[derive(Debug, Clone, PartialEq)]
pub enum DispenseState {
    Idle,
    Running(usize),
    Settling(usize),
    Completed,
    Failed(String),
}

impl fmt::Display for DispenseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispenseState::Idle => write!(f, "idle"),
            DispenseState::Running(batch) => write!(f, "running batch {}", batch),
            DispenseState::Settling(batch) => write!(f, "settling after batch {}", batch),
            DispenseState::Completed => write!(f, "completed"),
            DispenseState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Stops a dispense before its next batch. Pumps already running finish their run.
#[derive(Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<RwLock<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        if let Ok(mut cancelled) = self.cancelled.write() {
            *cancelled = true;
            return;
        }
        error!("[EXECUTOR] Error setting dispense to cancelled");
    }

    fn is_cancelled(&self) -> bool {
        // A poisoned flag means someone panicked while cancelling
        self.cancelled.read().map(|c| *c).unwrap_or(true)
    }
}

pub struct DispenseExecutor {
    gateway: Arc<dyn ActuatorGateway>,
    watchdog_margin: Duration,
    state: Mutex<DispenseState>,
    cancel: CancelHandle,
}

impl DispenseExecutor {
    pub fn new(gateway: Arc<dyn ActuatorGateway>, watchdog_margin: Duration) -> DispenseExecutor {
        DispenseExecutor {
            gateway,
            watchdog_margin,
            state: Mutex::new(DispenseState::Idle),
            cancel: CancelHandle::default(),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn state(&self) -> DispenseState {
        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_else(|_| DispenseState::Failed("state lock poisoned".to_string()))
    }

    fn set_state(&self, new_state: DispenseState) -> Result<(), DispenseError> {
        debug!("[EXECUTOR] {}", new_state);
        *self.state.lock()? = new_state;
        Ok(())
    }

    /// Runs every batch in order. `Ok` only once the last batch finished.
    pub fn execute(&self, schedule: &DispenseSchedule) -> Result<(), DispenseError> {
        let result = self.run_batches(&schedule.batches);
        match &result {
            Ok(()) => {
                self.set_state(DispenseState::Completed)?;
                info!("[EXECUTOR] Dispense completed");
            }
            Err(e) => {
                self.set_state(DispenseState::Failed(e.to_string()))?;
                error!("[EXECUTOR] Dispense failed: {}", e);
            }
        }
        result
    }

    fn run_batches(&self, batches: &[DispenseBatch]) -> Result<(), DispenseError> {
        for (index, batch) in batches.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(DispenseError::Cancelled { batch: index });
            }
            self.set_state(DispenseState::Running(index))?;
            self.run_batch(index, batch)?;

            let is_last = index + 1 == batches.len();
            if !is_last && !batch.settle_delay.is_zero() {
                self.set_state(DispenseState::Settling(index))?;
                info!(
                    "[EXECUTOR] Waiting {}ms before batch {}",
                    batch.settle_delay.as_millis(),
                    index + 1
                );
                thread::sleep(batch.settle_delay);
            }
        }
        Ok(())
    }

    /// Fans the runs out and waits for every one of them. The first failure is reported once
    /// the others are done; a run still going past the watchdog fails the batch right away.
    fn run_batch(&self, index: usize, batch: &DispenseBatch) -> Result<(), DispenseError> {
        let (sender, receiver) = mpsc::channel::<(usize, Result<(), ActuatorError>)>();
        // Keyed by position in the batch: two runs may share a pump
        let mut pending: BTreeMap<usize, u32> = BTreeMap::new();

        for (position, run) in batch.runs.iter().enumerate() {
            let gateway = self.gateway.clone();
            let sender = sender.clone();
            let (pump_id, pin, duration_ms) = (run.pump_id, run.pin, run.duration_ms);
            debug!(
                "[EXECUTOR] Batch {}: pump {} (pin {}) for {}ms",
                index, pump_id, pin, duration_ms
            );
            pending.insert(position, pump_id);
            thread::spawn(move || {
                let result = gateway.activate(pin, duration_ms);
                // The receiver is gone only if the watchdog already gave up on this batch
                let _ = sender.send((position, result));
            });
        }
        drop(sender);

        let limit = batch.busiest_pin() + self.watchdog_margin;
        let deadline = Instant::now() + limit;
        let mut first_fault = None;

        while !pending.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match receiver.recv_timeout(remaining) {
                Ok((position, result)) => {
                    let pump_id = match pending.remove(&position) {
                        Some(pump_id) => pump_id,
                        None => continue,
                    };
                    match result {
                        Ok(()) => debug!("[EXECUTOR] Pump {} finished", pump_id),
                        Err(source) => {
                            error!("[EXECUTOR] Pump {} failed: {}", pump_id, source);
                            first_fault.get_or_insert(DispenseError::ActuatorFault {
                                pump_id,
                                batch: index,
                                source,
                            });
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let pump_id = lowest_pump(&pending);
                    error!(
                        "[EXECUTOR] Pumps {:?} overran the watchdog",
                        pending.values().collect::<Vec<&u32>>()
                    );
                    return Err(DispenseError::ActuatorTimeout {
                        pump_id,
                        batch: index,
                        limit_ms: limit.as_millis() as u64,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // Every sender is gone with runs unaccounted for: their threads died
                    let pump_id = lowest_pump(&pending);
                    error!(
                        "[EXECUTOR] Workers for pumps {:?} stopped without reporting",
                        pending.values().collect::<Vec<&u32>>()
                    );
                    return Err(first_fault.unwrap_or(DispenseError::ActuatorFault {
                        pump_id,
                        batch: index,
                        source: ActuatorError::WorkerPanicked,
                    }));
                }
            }
        }

        match first_fault {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}

fn lowest_pump(pending: &BTreeMap<usize, u32>) -> u32 {
    pending.values().copied().min().unwrap_or_default()
}
