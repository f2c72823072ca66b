use clap::Args;
use serde_json::Value;

use portfolio_core::sampling::random_portfolios::{self, ReturnMatchInput, SampleInput};

use super::{read_input_value, set_field};

/// Arguments for random portfolio sampling
#[derive(Args)]
pub struct SampleArgs {
    /// Path to JSON/YAML file with expected returns and covariance
    #[arg(long)]
    pub input: Option<String>,

    /// Number of portfolios to draw
    #[arg(long)]
    pub num_portfolios: Option<u32>,

    /// Annualized risk-free rate for Sharpe ratios
    #[arg(long)]
    pub risk_free_rate: Option<f64>,

    /// RNG seed for reproducible draws
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Arguments for return-matching search
#[derive(Args)]
pub struct MatchReturnArgs {
    /// Path to JSON/YAML file with expected returns and covariance
    #[arg(long)]
    pub input: Option<String>,

    /// Portfolio return to match (overrides the input file)
    #[arg(long, allow_hyphen_values = true)]
    pub target_return: Option<f64>,

    /// Accepted absolute deviation from the target
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Give up after this many random draws
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Annualized risk-free rate for the Sharpe ratio
    #[arg(long)]
    pub risk_free_rate: Option<f64>,

    /// RNG seed for reproducible draws
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run_sample(args: SampleArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut raw = read_input_value(&args.input, "portfolio sampling")?;
    set_field(&mut raw, "num_portfolios", &args.num_portfolios)?;
    set_field(&mut raw, "risk_free_rate", &args.risk_free_rate)?;
    set_field(&mut raw, "seed", &args.seed)?;

    let sample_input: SampleInput = serde_json::from_value(raw)?;
    let result = random_portfolios::sample_portfolios(&sample_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_match_return(args: MatchReturnArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut raw = read_input_value(&args.input, "return matching")?;
    set_field(&mut raw, "target_return", &args.target_return)?;
    set_field(&mut raw, "tolerance", &args.tolerance)?;
    set_field(&mut raw, "max_attempts", &args.max_attempts)?;
    set_field(&mut raw, "risk_free_rate", &args.risk_free_rate)?;
    set_field(&mut raw, "seed", &args.seed)?;

    let match_input: ReturnMatchInput = serde_json::from_value(raw)?;
    let result = random_portfolios::find_portfolio_for_return(&match_input)?;
    Ok(serde_json::to_value(result)?)
}
