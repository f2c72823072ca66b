use clap::Args;
use serde_json::Value;

use portfolio_core::optimization::frontier::{self, FrontierInput};
use portfolio_core::optimization::mean_variance::{self, OptimizationInput};

use super::{read_input_value, set_field};

/// Arguments for constrained mean-variance optimization
#[derive(Args)]
pub struct OptimizeArgs {
    /// Path to JSON/YAML file with expected returns, covariance and target
    #[arg(long)]
    pub input: Option<String>,

    /// Target portfolio return (overrides the input file)
    #[arg(long, allow_hyphen_values = true)]
    pub target_return: Option<f64>,

    /// Annualized risk-free rate for the Sharpe ratio
    #[arg(long)]
    pub risk_free_rate: Option<f64>,
}

/// Arguments for efficient frontier generation
#[derive(Args)]
pub struct FrontierArgs {
    /// Path to JSON/YAML file with expected returns and covariance
    #[arg(long)]
    pub input: Option<String>,

    /// Lowest target return on the grid
    #[arg(long, allow_hyphen_values = true)]
    pub min_return: Option<f64>,

    /// Highest target return on the grid
    #[arg(long, allow_hyphen_values = true)]
    pub max_return: Option<f64>,

    /// Number of evenly spaced targets, endpoints included
    #[arg(long)]
    pub num_points: Option<u32>,

    /// Annualized risk-free rate for per-point Sharpe ratios
    #[arg(long)]
    pub risk_free_rate: Option<f64>,
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut raw = read_input_value(&args.input, "optimization")?;
    set_field(&mut raw, "target_return", &args.target_return)?;
    set_field(&mut raw, "risk_free_rate", &args.risk_free_rate)?;

    let opt_input: OptimizationInput = serde_json::from_value(raw)?;
    let result = mean_variance::optimize(&opt_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_frontier(args: FrontierArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut raw = read_input_value(&args.input, "frontier generation")?;
    set_field(&mut raw, "min_return", &args.min_return)?;
    set_field(&mut raw, "max_return", &args.max_return)?;
    set_field(&mut raw, "num_points", &args.num_points)?;
    set_field(&mut raw, "risk_free_rate", &args.risk_free_rate)?;

    let frontier_input: FrontierInput = serde_json::from_value(raw)?;
    let result = frontier::generate_frontier(&frontier_input)?;
    Ok(serde_json::to_value(result)?)
}
