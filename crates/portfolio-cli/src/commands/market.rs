use clap::Args;
use serde_json::Value;

use portfolio_core::market::returns::{self, MarketInput};

use super::read_input_value;

/// Arguments for market estimation from price history
#[derive(Args)]
pub struct EstimateArgs {
    /// Path to JSON/YAML file with per-symbol closing price series
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_estimate(args: EstimateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let raw = read_input_value(&args.input, "market estimation")?;
    let market_input: MarketInput = serde_json::from_value(raw)?;
    let result = returns::estimate_market(&market_input)?;
    Ok(serde_json::to_value(result)?)
}
