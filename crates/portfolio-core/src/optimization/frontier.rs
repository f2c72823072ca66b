use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::analytics::metrics::{portfolio_return, portfolio_risk, sharpe_ratio, validate_market};
use crate::error::PortfolioError;
use crate::optimization::mean_variance::{solve_kernel, KernelOutcome};
use crate::types::{with_metadata, ComputationOutput, Rate, Weight};
use crate::PortfolioResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input for efficient frontier generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierInput {
    /// Annualized expected return per asset.
    pub expected_returns: Vec<Rate>,
    /// Annualized covariance matrix of asset returns (row-major, symmetric).
    pub covariance: Vec<Vec<f64>>,
    /// Lowest target return on the grid.
    #[serde(default = "default_min_return")]
    pub min_return: Rate,
    /// Highest target return on the grid.
    #[serde(default = "default_max_return")]
    pub max_return: Rate,
    /// Number of evenly spaced targets, endpoints included.
    #[serde(default = "default_num_points")]
    pub num_points: u32,
    /// Annualized risk-free rate for per-point Sharpe ratios.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: Rate,
}

fn default_min_return() -> f64 {
    0.05
}

fn default_max_return() -> f64 {
    0.80
}

fn default_num_points() -> u32 {
    76
}

fn default_risk_free_rate() -> f64 {
    0.03
}

/// Solve status of one frontier point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointStatus {
    Optimal,
    Infeasible,
    Failed,
}

/// One point on the frontier grid. Non-optimal points keep their grid slot
/// with null metrics so the output stays index-aligned with the targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub target_return: f64,
    pub status: PointStatus,
    pub expected_return: Option<f64>,
    pub risk: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub weights: Option<Vec<Weight>>,
}

/// Output of one frontier trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierOutput {
    /// Exactly `num_points` entries; entry k corresponds to target k.
    pub points: Vec<FrontierPoint>,
    pub num_points: u32,
    pub num_optimal: u32,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Trace the efficient frontier over an evenly spaced grid of target
/// returns from `min_return` to `max_return` inclusive.
///
/// Each target gets its own constrained solve. Targets with no solution
/// (infeasible or a solver failure) are recorded in place and never abort
/// the trace; a single warning summarizes how many grid points went
/// unsolved.
pub fn generate_frontier(input: &FrontierInput) -> PortfolioResult<ComputationOutput<FrontierOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_market(&input.expected_returns, &input.covariance)?;
    if input.num_points < 1 {
        return Err(PortfolioError::InvalidInput {
            field: "num_points".into(),
            reason: "Must be at least 1".into(),
        });
    }
    if !input.min_return.is_finite() || !input.max_return.is_finite() {
        return Err(PortfolioError::InvalidInput {
            field: "min_return".into(),
            reason: "Grid bounds must be finite".into(),
        });
    }
    if input.min_return > input.max_return {
        return Err(PortfolioError::InvalidInput {
            field: "min_return".into(),
            reason: "Must not exceed max_return".into(),
        });
    }
    if !input.risk_free_rate.is_finite() {
        return Err(PortfolioError::InvalidInput {
            field: "risk_free_rate".into(),
            reason: "Must be finite".into(),
        });
    }

    let n_points = input.num_points as usize;
    let span = input.max_return - input.min_return;
    let mut points = Vec::with_capacity(n_points);
    let mut non_optimal = 0u32;

    for k in 0..n_points {
        let target = if n_points == 1 {
            input.min_return
        } else {
            input.min_return + span * k as f64 / (n_points - 1) as f64
        };

        let (outcome, _) = solve_kernel(&input.expected_returns, &input.covariance, target);
        let point = match outcome {
            KernelOutcome::Weights { weights, .. } => {
                let expected_return = portfolio_return(&input.expected_returns, &weights);
                let risk = portfolio_risk(&input.covariance, &weights);
                let sharpe = sharpe_ratio(expected_return, risk, input.risk_free_rate).ok();
                FrontierPoint {
                    target_return: target,
                    status: PointStatus::Optimal,
                    expected_return: Some(expected_return),
                    risk: Some(risk),
                    sharpe_ratio: sharpe,
                    weights: Some(weights),
                }
            }
            KernelOutcome::Infeasible { .. } => {
                non_optimal += 1;
                sentinel_point(target, PointStatus::Infeasible)
            }
            KernelOutcome::Failed { .. } => {
                non_optimal += 1;
                sentinel_point(target, PointStatus::Failed)
            }
        };
        points.push(point);
    }

    if non_optimal > 0 {
        warnings.push(format!(
            "{} of {} frontier targets had no optimal solution",
            non_optimal, n_points
        ));
    }

    let output = FrontierOutput {
        points,
        num_points: input.num_points,
        num_optimal: input.num_points - non_optimal,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Efficient Frontier (long-only mean-variance)",
        &serde_json::json!({
            "num_assets": input.expected_returns.len(),
            "min_return": input.min_return,
            "max_return": input.max_return,
            "num_points": input.num_points,
            "risk_free_rate": input.risk_free_rate,
        }),
        warnings,
        elapsed,
        output,
    ))
}

fn sentinel_point(target: f64, status: PointStatus) -> FrontierPoint {
    FrontierPoint {
        target_return: target,
        status,
        expected_return: None,
        risk: None,
        sharpe_ratio: None,
        weights: None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
