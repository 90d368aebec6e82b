//! The machine as the touchscreen sees it: pour a drink or a shot, check what can be poured,
//! calibrate, vent and refill pumps.
use std::{
    path::PathBuf,
    sync::{Arc, Condvar, Mutex},
    thread,
    time::Duration,
};

use log::{error, info, warn};

use crate::{
    actuator::ActuatorGateway,
    availability::{check_availability, check_shot_availability, Availability},
    config::DispensePolicy,
    constants::{CALIBRATION_RUN_MS, DEFAULT_CONTAINER_ML},
    dispenser::Dispenser,
    errors::DispenseError,
    executor::{CancelHandle, DispenseExecutor},
    levels::TankLevel,
    order::{Order, OrderKind},
    orders_queue::OrdersQueue,
    orders_reader::read_and_add_orders,
    pump::{calibrated_flow_rate, PumpMapping},
    recipe::{Cocktail, Ingredient, RecipeLine},
    scheduler::{build_schedule, DispenseBatch, DispenseSchedule, PumpRun},
    statistics::{Counters, Statistics},
    stores::{CocktailStore, LevelsStore, PumpConfigStore},
};

/// What the operator needs to know once a drink is poured
#[derive(Debug, Clone, PartialEq)]
pub struct DispenseReport {
    pub name: String,
    pub volume_ml: f64,
    /// Enough for this drink, refill before the next one
    pub low_ingredients: Vec<String>,
    /// Lines to add by hand, already scaled to the serving size
    pub manual_lines: Vec<RecipeLine>,
    /// False when the drink was poured but the new tank levels could not be stored
    pub levels_saved: bool,
}

pub struct CocktailMachine {
    pumps: Arc<dyn PumpConfigStore>,
    levels: Arc<dyn LevelsStore>,
    cocktails: Arc<dyn CocktailStore>,
    gateway: Arc<dyn ActuatorGateway>,
    policy: DispensePolicy,
    current: Mutex<Option<CancelHandle>>,
}

impl CocktailMachine {
    pub fn new(
        pumps: Arc<dyn PumpConfigStore>,
        levels: Arc<dyn LevelsStore>,
        cocktails: Arc<dyn CocktailStore>,
        gateway: Arc<dyn ActuatorGateway>,
        policy: DispensePolicy,
    ) -> CocktailMachine {
        CocktailMachine {
            pumps,
            levels,
            cocktails,
            gateway,
            policy,
            current: Mutex::new(None),
        }
    }

    /// Pours `order`. Stock is checked first and nothing runs if any pumped ingredient is short.
    /// After a complete pour the tanks are drawn down by what was poured. The drink is in the
    /// glass at that point, so a failure to store the new levels is logged and flagged in the
    /// report instead of failing the order.
    pub fn dispense(&self, order: &Order) -> Result<DispenseReport, DispenseError> {
        let cocktail = self.cocktail_for(order)?;
        let pumps = self.pumps.load_pumps()?;
        let levels = self.levels.load_levels()?;

        let availability = check_availability(
            &cocktail,
            order.size_ml,
            &pumps,
            &levels,
            self.policy.low_stock_multiplier,
        )?;
        if !availability.can_make {
            return Err(DispenseError::InsufficientStock {
                missing: availability.missing_ingredients,
            });
        }

        let schedule = build_schedule(&cocktail, order.size_ml, &pumps, &self.policy)?;
        info!(
            "[MACHINE] Pouring {} in {} batches",
            order,
            schedule.batches.len()
        );

        let executor = DispenseExecutor::new(self.gateway.clone(), self.policy.watchdog_margin());
        *self.current.lock()? = Some(executor.cancel_handle());
        let result = executor.execute(&schedule);
        *self.current.lock()? = None;
        if let Err(e) = result {
            if e.is_partial_dispense() {
                warn!("[MACHINE] {} stopped halfway, tank levels left untouched", order);
            }
            return Err(e);
        }

        let levels_saved = match self.draw_down(&schedule) {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "[MACHINE] {} was poured but the tank levels were not saved: {}",
                    order, e
                );
                false
            }
        };
        Ok(DispenseReport {
            name: cocktail.name,
            volume_ml: order.size_ml,
            low_ingredients: availability.low_ingredients,
            manual_lines: schedule.manual_lines,
            levels_saved,
        })
    }

    /// Stops the drink being poured before its next batch
    pub fn cancel_current(&self) -> Result<bool, DispenseError> {
        match self.current.lock()?.as_ref() {
            Some(handle) => {
                handle.cancel();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn availability(&self, cocktail_id: &str, size_ml: f64) -> Result<Availability, DispenseError> {
        let cocktail = self
            .cocktails
            .find_cocktail(cocktail_id)?
            .ok_or_else(|| DispenseError::UnknownCocktail(cocktail_id.to_string()))?;
        check_availability(
            &cocktail,
            size_ml,
            &self.pumps.load_pumps()?,
            &self.levels.load_levels()?,
            self.policy.low_stock_multiplier,
        )
    }

    pub fn shot_availability(&self, ingredient_id: &str, size_ml: f64) -> Result<bool, DispenseError> {
        Ok(check_shot_availability(
            ingredient_id,
            size_ml,
            &self.pumps.load_pumps()?,
            &self.levels.load_levels()?,
        ))
    }

    /// Runs a pump for the calibration window. The operator then measures the glass and
    /// calls [`CocktailMachine::apply_calibration`].
    pub fn prime_calibration(&self, pump_id: u32) -> Result<(), DispenseError> {
        let pump = self.find_pump(pump_id)?;
        info!("[MACHINE] Calibrating pump {} for {}ms", pump_id, CALIBRATION_RUN_MS);
        self.activate(&pump, CALIBRATION_RUN_MS)
    }

    pub fn apply_calibration(&self, pump_id: u32, measured_ml: f64) -> Result<f64, DispenseError> {
        let flow_rate = calibrated_flow_rate(measured_ml, CALIBRATION_RUN_MS)?;
        let mut pumps = self.pumps.load_pumps()?;
        let pump = pumps
            .iter_mut()
            .find(|pump| pump.id == pump_id)
            .ok_or(DispenseError::UnknownPump(pump_id))?;
        pump.flow_rate_ml_per_sec = flow_rate;
        info!(
            "[MACHINE] Calibration for pump {} ({}) updated: {} ml/s",
            pump_id, pump.ingredient_id, flow_rate
        );
        self.pumps.save_pumps(&pumps)?;
        Ok(flow_rate)
    }

    /// Flushes a pump line, for cleaning or to get air out of a new tank
    pub fn vent_pump(&self, pump_id: u32, duration_ms: u64) -> Result<(), DispenseError> {
        let pump = self.find_pump(pump_id)?;
        info!("[MACHINE] Venting pump {} for {}ms", pump_id, duration_ms);
        self.activate(&pump, duration_ms)
    }

    /// Sets the level of a tank after the operator refilled it. Creates the level record if the
    /// pump never had one.
    pub fn refill(&self, pump_id: u32, new_total_ml: f64) -> Result<TankLevel, DispenseError> {
        let mut levels = self.levels.load_levels()?;
        let refilled = match levels.iter().position(|level| level.pump_id == pump_id) {
            Some(index) => {
                levels[index].refill(new_total_ml);
                levels[index].clone()
            }
            None => {
                let pump = self.find_pump(pump_id)?;
                let level = TankLevel::new(
                    pump_id,
                    &pump.ingredient_id,
                    new_total_ml,
                    DEFAULT_CONTAINER_ML,
                );
                levels.push(level.clone());
                level
            }
        };
        self.levels.save_levels(&levels)?;
        info!(
            "[MACHINE] Tank of pump {} now holds {}ml",
            pump_id, refilled.current_ml
        );
        Ok(refilled)
    }

    pub fn refill_all(&self) -> Result<Vec<TankLevel>, DispenseError> {
        let mut levels = self.levels.load_levels()?;
        levels.iter_mut().for_each(TankLevel::fill_to_capacity);
        self.levels.save_levels(&levels)?;
        info!("[MACHINE] Refilled {} tanks", levels.len());
        Ok(levels)
    }

    pub fn tank_levels(&self) -> Result<Vec<TankLevel>, DispenseError> {
        Ok(self.levels.load_levels()?)
    }

    /// Reads orders from `orders_path` on one thread and pours them one at a time on another.
    /// Returns the session counters once the file is drained.
    pub fn manage_orders(
        self: Arc<Self>,
        orders_path: PathBuf,
        shot_size_ml: f64,
        statistics: Arc<Statistics>,
    ) -> Result<Counters, DispenseError> {
        let orders_queue = Arc::new(Mutex::new(OrdersQueue::new()));
        let orders_cond = Arc::new(Condvar::new());

        let reader_queue = orders_queue.clone();
        let reader_cond = orders_cond.clone();
        let reader = thread::spawn(move || {
            if let Err(e) = read_and_add_orders(reader_queue, reader_cond, &orders_path, shot_size_ml) {
                error!("[READER] Could not read orders: {}", e);
            }
        });

        let dispenser = Dispenser::new(0, orders_queue, orders_cond, self.clone(), statistics.clone());
        let dispenser_thread = thread::spawn(move || dispenser.handle_orders());

        if reader.join().is_err() {
            error!("[MACHINE] Reader thread panicked");
        }
        match dispenser_thread.join() {
            Ok(result) => result?,
            Err(_) => {
                error!("[MACHINE] Dispenser thread panicked");
                return Err(DispenseError::LockError);
            }
        }

        statistics.print_statistics(&self.tank_levels()?)?;
        statistics.counters()
    }

    fn cocktail_for(&self, order: &Order) -> Result<Cocktail, DispenseError> {
        match &order.kind {
            OrderKind::Cocktail { cocktail_id } => self
                .cocktails
                .find_cocktail(cocktail_id)?
                .ok_or_else(|| DispenseError::UnknownCocktail(cocktail_id.clone())),
            OrderKind::Shot { ingredient_id } => {
                let ingredient = self
                    .cocktails
                    .find_ingredient(ingredient_id)?
                    .unwrap_or_else(|| Ingredient::unlisted(ingredient_id));
                Ok(Cocktail::shot(&ingredient, order.size_ml))
            }
        }
    }

    fn find_pump(&self, pump_id: u32) -> Result<PumpMapping, DispenseError> {
        self.pumps
            .load_pumps()?
            .into_iter()
            .find(|pump| pump.id == pump_id)
            .ok_or(DispenseError::UnknownPump(pump_id))
    }

    fn activate(&self, pump: &PumpMapping, duration_ms: u64) -> Result<(), DispenseError> {
        let executor = DispenseExecutor::new(self.gateway.clone(), self.policy.watchdog_margin());
        let schedule = DispenseSchedule {
            batches: vec![DispenseBatch {
                runs: vec![PumpRun {
                    pump_id: pump.id,
                    pin: pump.pin,
                    ingredient_id: pump.ingredient_id.clone(),
                    volume_ml: 0.0,
                    duration_ms,
                }],
                settle_delay: Duration::ZERO,
            }],
            manual_lines: Vec::new(),
        };
        executor.execute(&schedule)
    }

    /// Re-reads the levels so refills made while pouring are kept
    fn draw_down(&self, schedule: &DispenseSchedule) -> Result<(), DispenseError> {
        let mut levels = self.levels.load_levels()?;
        for run in schedule.runs() {
            if let Some(level) = levels.iter_mut().find(|level| level.pump_id == run.pump_id) {
                level.consume(run.volume_ml);
            }
        }
        self.levels.save_levels(&levels)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{actuator::testing::RecordingGateway, errors::StoreError, stores::memory::MemoryStore};

    fn machine_with(gateway: Arc<RecordingGateway>, store: Arc<MemoryStore>) -> CocktailMachine {
        let policy = DispensePolicy {
            settle_delay_ms: 10,
            ..DispensePolicy::default()
        };
        CocktailMachine::new(store.clone(), store.clone(), store, gateway, policy)
    }

    fn stocked_store() -> Arc<MemoryStore> {
        let store = MemoryStore::default();
        *store.pumps.write().unwrap() = vec![
            PumpMapping::new(1, 17, "rum", 200.0),
            PumpMapping::new(2, 27, "juice", 150.0),
            PumpMapping::new(3, 22, "grenadine", 100.0),
        ];
        *store.levels.write().unwrap() = vec![
            TankLevel::new(1, "rum", 700.0, 700.0),
            TankLevel::new(2, "juice", 700.0, 1000.0),
            TankLevel::new(3, "grenadine", 50.0, 500.0),
        ];
        *store.cocktails.write().unwrap() = vec![Cocktail::new(
            "mai-tai",
            "Mai Tai",
            vec![
                RecipeLine::automatic("rum", 40.0),
                RecipeLine::automatic("juice", 30.0),
                RecipeLine::automatic("grenadine", 10.0),
                RecipeLine::manual("mint", 0.0, Some("add a sprig of mint")),
            ],
        )];
        Arc::new(store)
    }

    #[test]
    fn should_pour_a_cocktail_and_draw_down_the_tanks() {
        let gateway = Arc::new(RecordingGateway::default());
        let store = stocked_store();
        let machine = machine_with(gateway.clone(), store.clone());

        let report = machine.dispense(&Order::cocktail(0, "mai-tai", 300.0)).unwrap();

        assert_eq!("Mai Tai", report.name);
        assert_eq!(true, report.levels_saved);
        assert_eq!(vec!["grenadine".to_string()], report.low_ingredients);
        assert_eq!(1, report.manual_lines.len());
        assert_eq!(Some("add a sprig of mint".to_string()), report.manual_lines[0].instructions);
        assert_eq!(22, *gateway.pins().last().unwrap());

        let levels = store.levels.read().unwrap();
        assert_eq!(550.0, levels[0].current_ml);
        assert_eq!(587.0, levels[1].current_ml);
        assert_eq!(12.0, levels[2].current_ml);
    }

    /// Reads from the wrapped store but never manages to write
    struct ReadOnlyLevels(Arc<MemoryStore>);

    impl LevelsStore for ReadOnlyLevels {
        fn load_levels(&self) -> Result<Vec<TankLevel>, StoreError> {
            self.0.load_levels()
        }

        fn save_levels(&self, _levels: &[TankLevel]) -> Result<(), StoreError> {
            Err(StoreError::LockError)
        }
    }

    #[test]
    fn should_still_report_the_drink_when_levels_cannot_be_saved() {
        let gateway = Arc::new(RecordingGateway::default());
        let store = stocked_store();
        let machine = CocktailMachine::new(
            store.clone(),
            Arc::new(ReadOnlyLevels(store.clone())),
            store.clone(),
            gateway.clone(),
            DispensePolicy {
                settle_delay_ms: 10,
                ..DispensePolicy::default()
            },
        );

        let report = machine.dispense(&Order::cocktail(0, "mai-tai", 300.0)).unwrap();

        assert_eq!("Mai Tai", report.name);
        assert_eq!(false, report.levels_saved);
        assert_eq!(3, gateway.pins().len());
        assert_eq!(700.0, store.levels.read().unwrap()[0].current_ml);
    }

    #[test]
    fn should_refuse_without_touching_pumps_when_stock_is_short() {
        let gateway = Arc::new(RecordingGateway::default());
        let store = stocked_store();
        store.levels.write().unwrap()[0].refill(100.0);
        let machine = machine_with(gateway.clone(), store.clone());

        let result = machine.dispense(&Order::cocktail(0, "mai-tai", 300.0));

        match result {
            Err(DispenseError::InsufficientStock { missing }) => assert_eq!(vec!["rum".to_string()], missing),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(true, gateway.pins().is_empty());
        assert_eq!(100.0, store.levels.read().unwrap()[0].current_ml);
    }

    #[test]
    fn should_leave_levels_alone_after_a_pump_fault() {
        let gateway = Arc::new(RecordingGateway::failing_on(27));
        let store = stocked_store();
        let machine = machine_with(gateway.clone(), store.clone());

        let result = machine.dispense(&Order::cocktail(0, "mai-tai", 300.0));

        assert_eq!(true, result.unwrap_err().is_partial_dispense());
        assert_eq!(false, gateway.pins().contains(&22));
        assert_eq!(700.0, store.levels.read().unwrap()[0].current_ml);
    }

    #[test]
    fn should_pour_a_shot() {
        let gateway = Arc::new(RecordingGateway::default());
        let store = stocked_store();
        let machine = machine_with(gateway.clone(), store.clone());

        let report = machine.dispense(&Order::shot(0, "rum", 20.0)).unwrap();

        assert_eq!("Shot of Rum", report.name);
        assert_eq!(vec![17], gateway.pins());
        assert_eq!(680.0, store.levels.read().unwrap()[0].current_ml);
    }

    #[test]
    fn should_name_a_shot_from_the_ingredient_catalog() {
        let gateway = Arc::new(RecordingGateway::default());
        let store = stocked_store();
        *store.ingredients.write().unwrap() = vec![Ingredient {
            id: "rum".to_string(),
            name: "Gold Rum".to_string(),
            alcoholic: true,
        }];
        let machine = machine_with(gateway, store);

        let report = machine.dispense(&Order::shot(0, "rum", 20.0)).unwrap();

        assert_eq!("Shot of Gold Rum", report.name);
    }

    #[test]
    fn should_report_an_unknown_cocktail() {
        let machine = machine_with(Arc::new(RecordingGateway::default()), stocked_store());
        assert!(matches!(
            machine.dispense(&Order::cocktail(0, "zombie", 300.0)),
            Err(DispenseError::UnknownCocktail(_))
        ));
    }

    #[test]
    fn should_store_a_new_calibration() {
        let gateway = Arc::new(RecordingGateway::default());
        let store = stocked_store();
        let machine = machine_with(gateway, store.clone());

        assert_eq!(15.0, machine.apply_calibration(2, 30.0).unwrap());
        assert_eq!(15.0, store.pumps.read().unwrap()[1].flow_rate_ml_per_sec);
        assert!(matches!(machine.apply_calibration(9, 30.0), Err(DispenseError::UnknownPump(9))));
    }

    #[test]
    fn should_vent_a_pump_for_the_requested_time() {
        let gateway = Arc::new(RecordingGateway::default());
        let machine = machine_with(gateway.clone(), stocked_store());
        machine.vent_pump(3, 15).unwrap();
        let calls = gateway.calls.lock().unwrap();
        assert_eq!((22, 15), (calls[0].0, calls[0].1));
    }

    #[test]
    fn should_refill_one_tank_and_all_tanks() {
        let store = stocked_store();
        let machine = machine_with(Arc::new(RecordingGateway::default()), store.clone());

        assert_eq!(300.0, machine.refill(3, 300.0).unwrap().current_ml);
        let levels = machine.refill_all().unwrap();
        assert_eq!(vec![700.0, 1000.0, 500.0], levels.iter().map(|l| l.current_ml).collect::<Vec<f64>>());
    }

    #[test]
    fn should_create_a_level_when_refilling_a_new_pump() {
        let store = stocked_store();
        store.pumps.write().unwrap().push(PumpMapping::new(4, 5, "gin", 20.0));
        let machine = machine_with(Arc::new(RecordingGateway::default()), store.clone());

        let level = machine.refill(4, 400.0).unwrap();
        assert_eq!("gin", level.ingredient_id);
        assert_eq!(4, store.levels.read().unwrap().len());
        assert_eq!(true, machine.shot_availability("gin", 20.0).unwrap());
    }

    #[test]
    fn should_not_cancel_when_idle() {
        let machine = machine_with(Arc::new(RecordingGateway::default()), stocked_store());
        assert_eq!(false, machine.cancel_current().unwrap());
    }

    #[test]
    fn should_serve_every_order_in_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.json");
        std::fs::write(
            &path,
            r#"{ "orders": [
                { "kind": "shot", "ingredient": "rum" },
                { "kind": "cocktail", "cocktail": "zombie", "size": 200 },
                { "kind": "shot", "ingredient": "juice", "size": 30 }
            ] }"#,
        )
        .unwrap();
        let gateway = Arc::new(RecordingGateway::default());
        let machine = Arc::new(machine_with(gateway.clone(), stocked_store()));

        let counters = machine.manage_orders(path, 20.0, Arc::new(Statistics::new())).unwrap();

        assert_eq!(Counters { served: 2, refused: 1, failed: 0 }, counters);
        assert_eq!(vec![17, 27], gateway.pins());
    }
}
