//! Dispenser of the cocktail machine. Takes orders from the queue and pours them.
use std::sync::{Arc, Condvar, Mutex};

use log::{debug, error, info, warn};

use crate::{
    cocktail_machine::CocktailMachine, errors::DispenseError, order::Order,
    orders_queue::OrdersQueue, statistics::Statistics,
};

/// Worker draining the orders queue.
/// Holds the queue (with its condition variable), the machine that pours and the session statistics.
pub struct Dispenser {
    id: usize,
    orders_queue: Arc<Mutex<OrdersQueue>>,
    orders_cond: Arc<Condvar>,
    machine: Arc<CocktailMachine>,
    statistics: Arc<Statistics>,
}

impl Dispenser {
    pub fn new(
        id: usize,
        orders_queue: Arc<Mutex<OrdersQueue>>,
        orders_cond: Arc<Condvar>,
        machine: Arc<CocktailMachine>,
        statistics: Arc<Statistics>,
    ) -> Dispenser {
        Dispenser {
            id,
            orders_queue,
            orders_cond,
            machine,
            statistics,
        }
    }

    /// Pours orders until the queue is empty and finished
    pub fn handle_orders(&self) -> Result<(), DispenseError> {
        loop {
            let order = {
                let mut orders = self
                    .orders_cond
                    .wait_while(self.orders_queue.lock()?, |queue| {
                        queue.is_empty() && !queue.finished
                    })?;

                match orders.pop() {
                    Some(order) => order,
                    None => return Ok(()),
                }
            };

            debug!("[DISPENSER {}] Takes order {}", self.id, order);
            self.process_order(&order)?;
        }
    }

    fn process_order(&self, order: &Order) -> Result<(), DispenseError> {
        match self.machine.dispense(order) {
            Ok(report) => {
                info!(
                    "[DISPENSER {}] Served {} ({}ml)",
                    self.id, report.name, report.volume_ml
                );
                for line in &report.manual_lines {
                    info!(
                        "[DISPENSER {}] Add by hand: {}ml of {}{}",
                        self.id,
                        line.volume,
                        line.ingredient_id,
                        line.instructions
                            .as_ref()
                            .map(|text| format!(" ({})", text))
                            .unwrap_or_default()
                    );
                }
                if !report.levels_saved {
                    warn!(
                        "[DISPENSER {}] Tank levels are out of date, check them before the next order",
                        self.id
                    );
                }
                if !report.low_ingredients.is_empty() {
                    warn!(
                        "[DISPENSER {}] Running low on {}",
                        self.id,
                        report.low_ingredients.join(", ")
                    );
                }
                self.statistics.record_served()
            }
            Err(e) if e.is_partial_dispense() => {
                error!(
                    "[DISPENSER {}] Order {} failed while pouring, check the pumps: {}",
                    self.id, order, e
                );
                self.statistics.record_error(&e)
            }
            Err(e) => {
                info!("[DISPENSER {}] Skipped order {}: {}", self.id, order, e);
                self.statistics.record_error(&e)
            }
        }
    }
}
