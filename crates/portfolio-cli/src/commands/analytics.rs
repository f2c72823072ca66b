use clap::Args;
use serde_json::Value;

use portfolio_core::analytics::metrics::{self, MetricsInput};

use super::{read_input_value, set_field};

/// Arguments for portfolio metrics
#[derive(Args)]
pub struct MetricsArgs {
    /// Path to JSON/YAML file with expected returns and covariance
    #[arg(long)]
    pub input: Option<String>,

    /// Comma-separated portfolio weights (e.g. "0.5,0.3,0.2")
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub weights: Option<Vec<f64>>,

    /// Annualized risk-free rate for the Sharpe ratio
    #[arg(long)]
    pub risk_free_rate: Option<f64>,
}

pub fn run_metrics(args: MetricsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut raw = read_input_value(&args.input, "portfolio metrics")?;
    set_field(&mut raw, "weights", &args.weights)?;
    set_field(&mut raw, "risk_free_rate", &args.risk_free_rate)?;

    let metrics_input: MetricsInput = serde_json::from_value(raw)?;
    let result = metrics::analyze_portfolio(&metrics_input)?;
    Ok(serde_json::to_value(result)?)
}
