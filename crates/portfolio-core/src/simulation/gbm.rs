use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use std::time::Instant;

use crate::error::PortfolioError;
use crate::types::{with_metadata, ComputationOutput, Rate};
use crate::PortfolioResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input for geometric Brownian motion path simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbmInput {
    /// Starting value of every path.
    #[serde(default = "default_initial_value")]
    pub initial_value: f64,
    /// Annualized drift (expected return).
    pub drift: Rate,
    /// Annualized volatility (standard deviation of returns).
    pub volatility: f64,
    /// Simulation horizon in years.
    #[serde(default = "default_horizon")]
    pub horizon: f64,
    /// Time step in years. One trading day is 1/252.
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    /// Number of independent paths.
    #[serde(default = "default_num_paths")]
    pub num_paths: u32,
    /// Optional seed for reproducibility.
    pub seed: Option<u64>,
}

fn default_initial_value() -> f64 {
    10_000.0
}

fn default_horizon() -> f64 {
    1.0
}

fn default_step_size() -> f64 {
    1.0 / 252.0
}

fn default_num_paths() -> u32 {
    1_000
}

/// Percentiles of the terminal value distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalPercentiles {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

/// Summary statistics over the terminal column of the path matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalStats {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: TerminalPercentiles,
    /// Share of paths that finish below the starting value.
    pub probability_below_initial: f64,
}

/// Output of one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbmOutput {
    pub num_paths: u32,
    /// Shocks per path; the matrix has `steps + 1` columns.
    pub steps: u32,
    pub step_size: f64,
    pub horizon: f64,
    /// `num_paths` rows of `steps + 1` values, column 0 equal to
    /// `initial_value` on every row.
    pub paths: Vec<Vec<f64>>,
    pub terminal: TerminalStats,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Simulate geometric Brownian motion price paths.
///
/// Each step applies the exact log-return discretization
/// `(drift - volatility^2 / 2) * dt + volatility * sqrt(dt) * Z` with
/// `Z ~ N(0, 1)`, so every simulated value stays strictly positive. The
/// step count is `floor(horizon / step_size)` and the paths all start at
/// `initial_value` exactly, with no shock at time zero.
pub fn simulate_paths(input: &GbmInput) -> PortfolioResult<ComputationOutput<GbmOutput>> {
    let start = Instant::now();
    let warnings: Vec<String> = Vec::new();

    validate(input)?;

    let steps = (input.horizon / input.step_size).floor() as usize;
    if steps < 1 {
        return Err(PortfolioError::InvalidInput {
            field: "horizon".into(),
            reason: "Must cover at least one step at the given step_size".into(),
        });
    }

    let mut rng = match input.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let std_normal = Normal::new(0.0, 1.0).map_err(|e| PortfolioError::InvalidInput {
        field: "distribution".into(),
        reason: format!("Invalid Normal parameters: {e}"),
    })?;

    let dt = input.step_size;
    let drift_term = (input.drift - 0.5 * input.volatility * input.volatility) * dt;
    let diffusion = input.volatility * dt.sqrt();

    let num_paths = input.num_paths as usize;
    let mut paths = Vec::with_capacity(num_paths);
    let mut terminal_values = Vec::with_capacity(num_paths);

    for _ in 0..num_paths {
        let mut path = Vec::with_capacity(steps + 1);
        path.push(input.initial_value);
        let mut log_accum = 0.0_f64;
        for _ in 0..steps {
            let z: f64 = rng.sample(std_normal);
            log_accum += drift_term + diffusion * z;
            path.push(input.initial_value * log_accum.exp());
        }
        terminal_values.push(path[steps]);
        paths.push(path);
    }

    let terminal = terminal_stats(&mut terminal_values, input.initial_value);

    let output = GbmOutput {
        num_paths: input.num_paths,
        steps: steps as u32,
        step_size: input.step_size,
        horizon: input.horizon,
        paths,
        terminal,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Geometric Brownian Motion Simulation",
        &serde_json::json!({
            "initial_value": input.initial_value,
            "drift": input.drift,
            "volatility": input.volatility,
            "horizon": input.horizon,
            "step_size": input.step_size,
            "steps": steps,
            "num_paths": input.num_paths,
            "seed": input.seed,
        }),
        warnings,
        elapsed,
        output,
    ))
}

fn validate(input: &GbmInput) -> PortfolioResult<()> {
    if !(input.initial_value.is_finite() && input.initial_value > 0.0) {
        return Err(PortfolioError::InvalidInput {
            field: "initial_value".into(),
            reason: "Must be a positive number".into(),
        });
    }
    if !input.drift.is_finite() {
        return Err(PortfolioError::InvalidInput {
            field: "drift".into(),
            reason: "Must be finite".into(),
        });
    }
    if !(input.volatility.is_finite() && input.volatility >= 0.0) {
        return Err(PortfolioError::InvalidInput {
            field: "volatility".into(),
            reason: "Must be non-negative".into(),
        });
    }
    if !(input.horizon.is_finite() && input.horizon > 0.0) {
        return Err(PortfolioError::InvalidInput {
            field: "horizon".into(),
            reason: "Must be a positive number of years".into(),
        });
    }
    if !(input.step_size.is_finite() && input.step_size > 0.0) {
        return Err(PortfolioError::InvalidInput {
            field: "step_size".into(),
            reason: "Must be a positive number of years".into(),
        });
    }
    if input.num_paths < 1 {
        return Err(PortfolioError::InvalidInput {
            field: "num_paths".into(),
            reason: "Must be at least 1".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

/// Percentile from a **sorted** slice using linear interpolation.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

/// Summarize the terminal values. Sorts the slice in place.
fn terminal_stats(values: &mut [f64], initial_value: f64) -> TerminalStats {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len() as f64;

    let mean = values.iter().sum::<f64>() / n;
    let median = if values.len() % 2 == 0 {
        let mid = values.len() / 2;
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[values.len() / 2]
    };
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let below = values.iter().filter(|&&v| v < initial_value).count();

    TerminalStats {
        mean,
        median,
        std_dev: variance.sqrt(),
        min: values[0],
        max: values[values.len() - 1],
        percentiles: TerminalPercentiles {
            p5: percentile_sorted(values, 5.0),
            p25: percentile_sorted(values, 25.0),
            p50: percentile_sorted(values, 50.0),
            p75: percentile_sorted(values, 75.0),
            p95: percentile_sorted(values, 95.0),
        },
        probability_below_initial: below as f64 / n,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
