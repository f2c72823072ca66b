use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use portfolio_core::market::returns::{self, MarketEstimates, MarketInput, TRADING_DAYS_PER_YEAR};
use portfolio_core::optimization::frontier::{self, FrontierInput, FrontierOutput};
use portfolio_core::optimization::mean_variance::{
    self, MeanVarianceOutput, OptimizationInput, SolverStatus,
};
use portfolio_core::sampling::random_portfolios::{self, SampleInput, SampleOutput};
use portfolio_core::simulation::gbm::{self, GbmInput, GbmOutput};

use super::read_input_value;

/// Arguments for the end-to-end analysis pipeline
#[derive(Args)]
pub struct AnalyzeArgs {
    /// Path to JSON/YAML file with price series, or expected returns
    /// and covariance directly
    #[arg(long)]
    pub input: Option<String>,

    /// Target portfolio return for the optimization stage
    #[arg(long, default_value_t = 0.15, allow_hyphen_values = true)]
    pub target_return: f64,

    /// Annualized risk-free rate
    #[arg(long, default_value_t = 0.03)]
    pub risk_free_rate: f64,

    /// Lowest frontier target return
    #[arg(long, default_value_t = 0.05, allow_hyphen_values = true)]
    pub min_return: f64,

    /// Highest frontier target return
    #[arg(long, default_value_t = 0.80)]
    pub max_return: f64,

    /// Number of frontier points
    #[arg(long, default_value_t = 76)]
    pub num_points: u32,

    /// Number of random portfolios to sample
    #[arg(long, default_value_t = 1000)]
    pub num_portfolios: u32,

    /// Starting value for the simulation stage
    #[arg(long, default_value_t = 10_000.0)]
    pub initial_value: f64,

    /// Simulation horizon in years
    #[arg(long, default_value_t = 1.0)]
    pub horizon: f64,

    /// Number of simulated paths
    #[arg(long, default_value_t = 1000)]
    pub num_paths: u32,

    /// RNG seed shared by the sampling and simulation stages
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Market part of the analysis input when estimates are given directly
/// instead of price history.
#[derive(Deserialize)]
struct EstimatesInput {
    expected_returns: Vec<f64>,
    covariance: Vec<Vec<f64>>,
}

#[derive(Serialize)]
struct AnalysisOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    market: Option<MarketEstimates>,
    target_return: f64,
    risk_free_rate: f64,
    optimization: MeanVarianceOutput,
    frontier: FrontierOutput,
    sampling: SampleOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    simulation: Option<GbmOutput>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

pub fn run_analyze(args: AnalyzeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let raw = read_input_value(&args.input, "portfolio analysis")?;
    let mut warnings: Vec<String> = Vec::new();

    // Accept either raw price history (a "series" key, as fed to
    // `estimate`) or precomputed market estimates.
    let (market, expected_returns, covariance) = if raw.get("series").is_some() {
        let market_input: MarketInput = serde_json::from_value(raw)?;
        let estimated = returns::estimate_market(&market_input)?;
        warnings.extend(estimated.warnings);
        let estimates = estimated.result;
        let e = estimates.expected_returns.clone();
        let c = estimates.covariance.clone();
        (Some(estimates), e, c)
    } else {
        let estimates: EstimatesInput = serde_json::from_value(raw)?;
        (None, estimates.expected_returns, estimates.covariance)
    };

    let optimized = mean_variance::optimize(&OptimizationInput {
        expected_returns: expected_returns.clone(),
        covariance: covariance.clone(),
        target_return: args.target_return,
        risk_free_rate: args.risk_free_rate,
    })?;
    warnings.extend(optimized.warnings);
    let optimization = optimized.result;

    let frontier_out = frontier::generate_frontier(&FrontierInput {
        expected_returns: expected_returns.clone(),
        covariance: covariance.clone(),
        min_return: args.min_return,
        max_return: args.max_return,
        num_points: args.num_points,
        risk_free_rate: args.risk_free_rate,
    })?;
    warnings.extend(frontier_out.warnings);

    let sampled = random_portfolios::sample_portfolios(&SampleInput {
        expected_returns,
        covariance,
        num_portfolios: args.num_portfolios,
        risk_free_rate: args.risk_free_rate,
        seed: args.seed,
    })?;
    warnings.extend(sampled.warnings);

    // Simulate the optimized portfolio forward; without an optimal
    // portfolio there is nothing to simulate.
    let simulation = match &optimization.status {
        SolverStatus::Optimal {
            expected_return,
            risk,
            ..
        } => {
            let simulated = gbm::simulate_paths(&GbmInput {
                initial_value: args.initial_value,
                drift: *expected_return,
                volatility: *risk,
                horizon: args.horizon,
                step_size: 1.0 / f64::from(TRADING_DAYS_PER_YEAR),
                num_paths: args.num_paths,
                seed: args.seed,
            })?;
            warnings.extend(simulated.warnings);
            Some(simulated.result)
        }
        _ => {
            warnings.push(format!(
                "simulation skipped: no optimal portfolio at target {}",
                args.target_return
            ));
            None
        }
    };

    let output = AnalysisOutput {
        market,
        target_return: args.target_return,
        risk_free_rate: args.risk_free_rate,
        optimization,
        frontier: frontier_out.result,
        sampling: sampled.result,
        simulation,
        warnings,
    };

    Ok(serde_json::to_value(output)?)
}
