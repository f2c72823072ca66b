use clap::Args;
use serde_json::{Map, Value};

use portfolio_core::simulation::gbm::{self, GbmInput};

use super::set_field;
use crate::input;

/// Arguments for geometric Brownian motion simulation
#[derive(Args)]
pub struct SimulateArgs {
    /// Path to JSON/YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Annualized drift (expected return)
    #[arg(long, allow_hyphen_values = true)]
    pub drift: Option<f64>,

    /// Annualized volatility
    #[arg(long)]
    pub volatility: Option<f64>,

    /// Starting portfolio value
    #[arg(long)]
    pub initial_value: Option<f64>,

    /// Simulation horizon in years
    #[arg(long)]
    pub horizon: Option<f64>,

    /// Time step in years (e.g. 0.003968 for daily)
    #[arg(long)]
    pub step_size: Option<f64>,

    /// Number of paths to simulate
    #[arg(long)]
    pub num_paths: Option<u32>,

    /// RNG seed for reproducible paths
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run_simulate(args: SimulateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    // Unlike the matrix-shaped commands, a simulation is fully describable
    // by scalar flags, so a bare `pfa simulate --drift .. --volatility ..`
    // needs no input file.
    let mut raw = if let Some(ref path) = args.input {
        input::read_file_value(path)?
    } else if args.drift.is_some() && args.volatility.is_some() {
        Value::Object(Map::new())
    } else if let Some(data) = input::read_stdin()? {
        data
    } else {
        return Err(
            "Provide --drift and --volatility, or --input <file>, or pipe JSON via stdin".into(),
        );
    };

    set_field(&mut raw, "drift", &args.drift)?;
    set_field(&mut raw, "volatility", &args.volatility)?;
    set_field(&mut raw, "initial_value", &args.initial_value)?;
    set_field(&mut raw, "horizon", &args.horizon)?;
    set_field(&mut raw, "step_size", &args.step_size)?;
    set_field(&mut raw, "num_paths", &args.num_paths)?;
    set_field(&mut raw, "seed", &args.seed)?;

    let gbm_input: GbmInput = serde_json::from_value(raw)?;
    let result = gbm::simulate_paths(&gbm_input)?;
    Ok(serde_json::to_value(result)?)
}
