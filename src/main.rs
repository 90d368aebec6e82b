pub mod actuator;
pub mod availability;
pub mod cocktail_machine;
pub mod config;
pub mod constants;
pub mod dispenser;
pub mod errors;
pub mod executor;
pub mod levels;
pub mod order;
pub mod orders_queue;
pub mod orders_reader;
pub mod pump;
pub mod recipe;
pub mod scaler;
pub mod scheduler;
pub mod statistics;
pub mod stores;

use std::{env, path::PathBuf, process::ExitCode, str::FromStr, sync::Arc};

use clap::{Parser, Subcommand};
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;

use actuator::{ActuatorGateway, ProcessGateway, SerializedGateway, SimulatedGateway};
use cocktail_machine::CocktailMachine;
use config::MachineConfig;
use errors::DispenseError;
use statistics::Statistics;
use stores::DataDirectory;

#[derive(Parser, Debug)]
#[command(name = "cocktail-machine")]
#[command(about = "Cocktail dispenser for the Raspberry Pi pump rig")]
#[command(version)]
struct Args {
    /// Machine configuration file
    #[arg(short, long, default_value = "machine.json", env = "COCKTAIL_MACHINE_CONFIG")]
    config: PathBuf,

    /// Sleep instead of driving the pumps
    #[arg(long)]
    simulate: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pour every order in an orders file, one at a time
    Serve {
        #[arg(default_value = "orders.json")]
        orders: PathBuf,
    },
    /// Check whether a cocktail can be poured at a size
    Availability { cocktail: String, size: f64 },
    /// Check whether a shot can be poured
    ShotAvailability { ingredient: String, size: Option<f64> },
    /// Run a pump for the calibration window
    Calibrate { pump: u32 },
    /// Store the volume measured after `calibrate`
    ApplyCalibration { pump: u32, measured_ml: f64 },
    /// Flush a pump line
    Vent { pump: u32, duration_ms: u64 },
    /// Set the level of one tank
    Refill { pump: u32, amount_ml: f64 },
    /// Mark every tank as full
    RefillAll,
    /// Show tank levels
    Levels,
}

fn run(command: Command, machine: Arc<CocktailMachine>, config: &MachineConfig) -> Result<bool, DispenseError> {
    match command {
        Command::Serve { orders } => {
            let counters = machine.manage_orders(orders, config.shot_size_ml, Arc::new(Statistics::new()))?;
            return Ok(counters.failed == 0);
        }
        Command::Availability { cocktail, size } => {
            let availability = machine.availability(&cocktail, size)?;
            info!(
                "{} at {}ml: can make={} low=[{}] missing=[{}]",
                cocktail,
                size,
                availability.can_make,
                availability.low_ingredients.join(", "),
                availability.missing_ingredients.join(", ")
            );
            return Ok(availability.can_make);
        }
        Command::ShotAvailability { ingredient, size } => {
            let size = size.unwrap_or(config.shot_size_ml);
            let available = machine.shot_availability(&ingredient, size)?;
            info!("Shot of {} ({}ml) available={}", ingredient, size, available);
            return Ok(available);
        }
        Command::Calibrate { pump } => machine.prime_calibration(pump)?,
        Command::ApplyCalibration { pump, measured_ml } => {
            machine.apply_calibration(pump, measured_ml)?;
        }
        Command::Vent { pump, duration_ms } => machine.vent_pump(pump, duration_ms)?,
        Command::Refill { pump, amount_ml } => {
            machine.refill(pump, amount_ml)?;
        }
        Command::RefillAll => {
            machine.refill_all()?;
        }
        Command::Levels => Statistics::new().print_statistics(&machine.tank_levels()?)?,
    }
    Ok(true)
}

/// Level from the config file, unless `RUST_LOG` already chose one
fn log_level(configured: &str, rust_log: Option<&str>) -> Option<LevelFilter> {
    match rust_log {
        Some(_) => None,
        None => Some(LevelFilter::from_str(configured).unwrap_or(LevelFilter::Info)),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    // Started wide open before the config is read so its warnings are not lost, then narrowed
    if let Err(e) = SimpleLogger::new().with_level(LevelFilter::Trace).env().init() {
        eprintln!("Could not start logger: {}", e);
    }

    let config = match MachineConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Could not load {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(level) = log_level(&config.log_level, env::var("RUST_LOG").ok().as_deref()) {
        log::set_max_level(level);
    }

    let gateway: Arc<dyn ActuatorGateway> = if args.simulate || config.simulate {
        info!("Simulating pumps");
        Arc::new(SerializedGateway::new(SimulatedGateway))
    } else {
        Arc::new(SerializedGateway::new(ProcessGateway::new(
            &config.python,
            config.pump_script.clone(),
        )))
    };
    let store = Arc::new(DataDirectory::new(&config.data_dir));
    let machine = Arc::new(CocktailMachine::new(
        store.clone(),
        store.clone(),
        store,
        gateway,
        config.policy.clone(),
    ));

    match run(args.command, machine, &config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
