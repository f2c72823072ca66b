use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::analytics::metrics::{portfolio_return, portfolio_risk, sharpe_ratio, validate_market};
use crate::error::PortfolioError;
use crate::types::{with_metadata, ComputationOutput, Rate, Weight};
use crate::PortfolioResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input for random portfolio sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleInput {
    /// Annualized expected return per asset.
    pub expected_returns: Vec<Rate>,
    /// Annualized covariance matrix of asset returns (row-major, symmetric).
    pub covariance: Vec<Vec<f64>>,
    /// Number of portfolios to draw.
    #[serde(default = "default_num_portfolios")]
    pub num_portfolios: u32,
    /// Annualized risk-free rate for per-portfolio Sharpe ratios.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: Rate,
    /// Optional seed for reproducibility.
    pub seed: Option<u64>,
}

fn default_num_portfolios() -> u32 {
    1_000
}

fn default_risk_free_rate() -> f64 {
    0.03
}

/// One sampled portfolio with its metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampledPortfolio {
    pub weights: Vec<Weight>,
    pub expected_return: f64,
    pub risk: f64,
    /// None when the drawn portfolio carries zero risk.
    pub sharpe_ratio: Option<f64>,
}

/// Output of one sampling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleOutput {
    pub num_portfolios: u32,
    pub portfolios: Vec<SampledPortfolio>,
    /// Index of the highest-Sharpe draw, when any draw has a Sharpe ratio.
    pub max_sharpe_index: Option<u32>,
    /// Index of the lowest-risk draw.
    pub min_risk_index: Option<u32>,
}

/// Input for return-matched rejection sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnMatchInput {
    /// Annualized expected return per asset.
    pub expected_returns: Vec<Rate>,
    /// Annualized covariance matrix of asset returns (row-major, symmetric).
    pub covariance: Vec<Vec<f64>>,
    /// Portfolio return to match.
    pub target_return: Rate,
    /// Acceptance half-width around the target.
    #[serde(default = "default_match_tolerance")]
    pub tolerance: f64,
    /// Hard cap on rejection-sampling attempts.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Annualized risk-free rate for the reported Sharpe ratio.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: Rate,
    /// Optional seed for reproducibility.
    pub seed: Option<u64>,
}

fn default_match_tolerance() -> f64 {
    1e-3
}

fn default_max_attempts() -> u32 {
    100_000
}

/// Outcome of a return-matching search. Exhausting the attempt budget is an
/// expected outcome, tagged rather than raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum MatchStatus {
    Found {
        weights: Vec<Weight>,
        attempts: u32,
        expected_return: f64,
        risk: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        sharpe_ratio: Option<f64>,
    },
    NotFound {
        attempts: u32,
    },
}

/// Output of one return-matching run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnMatchOutput {
    pub status: MatchStatus,
    pub target_return: f64,
    pub tolerance: f64,
}

// ---------------------------------------------------------------------------
// Weight drawing
// ---------------------------------------------------------------------------

/// Draw one long-only, fully-invested weight vector: n uniforms in [0, 1)
/// normalized by their sum. The all-zero draw has measure zero; redraw if
/// it ever shows up so the normalization stays well-defined.
pub(crate) fn draw_weights(rng: &mut StdRng, num_assets: usize) -> Vec<f64> {
    loop {
        let raw: Vec<f64> = (0..num_assets).map(|_| rng.gen::<f64>()).collect();
        let sum: f64 = raw.iter().sum();
        if sum > 1e-12 {
            return raw.into_iter().map(|w| w / sum).collect();
        }
    }
}

// ---------------------------------------------------------------------------
// Public API: random portfolio sampling
// ---------------------------------------------------------------------------

/// Draw random long-only portfolios and compute their metrics.
///
/// Weights are uniform draws normalized to sum to one, matching the usual
/// random-scatter construction for frontier charts. Zero-risk draws keep
/// their slot with a null Sharpe ratio and are summarized in one warning.
pub fn sample_portfolios(input: &SampleInput) -> PortfolioResult<ComputationOutput<SampleOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_market(&input.expected_returns, &input.covariance)?;
    if input.num_portfolios < 1 {
        return Err(PortfolioError::InvalidInput {
            field: "num_portfolios".into(),
            reason: "Must be at least 1".into(),
        });
    }
    if !input.risk_free_rate.is_finite() {
        return Err(PortfolioError::InvalidInput {
            field: "risk_free_rate".into(),
            reason: "Must be finite".into(),
        });
    }

    let mut rng = match input.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let n = input.expected_returns.len();
    let count = input.num_portfolios as usize;
    let mut portfolios: Vec<SampledPortfolio> = Vec::with_capacity(count);
    let mut zero_risk = 0u32;
    let mut max_sharpe_index: Option<u32> = None;
    let mut min_risk_index: Option<u32> = None;

    for k in 0..count {
        let weights = draw_weights(&mut rng, n);
        let expected_return = portfolio_return(&input.expected_returns, &weights);
        let risk = portfolio_risk(&input.covariance, &weights);
        let sharpe = match sharpe_ratio(expected_return, risk, input.risk_free_rate) {
            Ok(s) => Some(s),
            Err(PortfolioError::DivisionByZero { .. }) => {
                zero_risk += 1;
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(s) = sharpe {
            let better = match max_sharpe_index {
                Some(i) => portfolios[i as usize]
                    .sharpe_ratio
                    .map_or(true, |best: f64| s > best),
                None => true,
            };
            if better {
                max_sharpe_index = Some(k as u32);
            }
        }
        let lower_risk = match min_risk_index {
            Some(i) => risk < portfolios[i as usize].risk,
            None => true,
        };
        if lower_risk {
            min_risk_index = Some(k as u32);
        }

        portfolios.push(SampledPortfolio {
            weights,
            expected_return,
            risk,
            sharpe_ratio: sharpe,
        });
    }

    if zero_risk > 0 {
        warnings.push(format!(
            "{} of {} draws had zero risk; their Sharpe ratios are undefined",
            zero_risk, count
        ));
    }

    let output = SampleOutput {
        num_portfolios: input.num_portfolios,
        portfolios,
        max_sharpe_index,
        min_risk_index,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Random Portfolio Sampling",
        &serde_json::json!({
            "num_assets": n,
            "num_portfolios": input.num_portfolios,
            "risk_free_rate": input.risk_free_rate,
            "seed": input.seed,
            "weight_scheme": "normalized uniform draws",
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Public API: return-matched rejection sampling
// ---------------------------------------------------------------------------

/// Search for a random portfolio whose expected return lands within
/// `tolerance` of the target, giving up after `max_attempts` draws.
///
/// Targets outside the attainable range [min(mu), max(mu)] cannot be hit by
/// any long-only portfolio and are rejected as invalid input before
/// sampling starts. Inside the range, running out of attempts yields the
/// tagged `NotFound` outcome with the attempt count.
pub fn find_portfolio_for_return(
    input: &ReturnMatchInput,
) -> PortfolioResult<ComputationOutput<ReturnMatchOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_market(&input.expected_returns, &input.covariance)?;
    if !input.target_return.is_finite() {
        return Err(PortfolioError::InvalidInput {
            field: "target_return".into(),
            reason: "Must be finite".into(),
        });
    }
    if !(input.tolerance.is_finite() && input.tolerance > 0.0) {
        return Err(PortfolioError::InvalidInput {
            field: "tolerance".into(),
            reason: "Must be a positive number".into(),
        });
    }
    if input.max_attempts < 1 {
        return Err(PortfolioError::InvalidInput {
            field: "max_attempts".into(),
            reason: "Must be at least 1".into(),
        });
    }
    if !input.risk_free_rate.is_finite() {
        return Err(PortfolioError::InvalidInput {
            field: "risk_free_rate".into(),
            reason: "Must be finite".into(),
        });
    }

    let lo = input
        .expected_returns
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);
    let hi = input
        .expected_returns
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    if input.target_return < lo - input.tolerance || input.target_return > hi + input.tolerance {
        return Err(PortfolioError::InvalidInput {
            field: "target_return".into(),
            reason: format!(
                "No long-only portfolio can earn {}; attainable returns lie in [{}, {}]",
                input.target_return, lo, hi
            ),
        });
    }

    let mut rng = match input.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let n = input.expected_returns.len();
    let mut status = MatchStatus::NotFound {
        attempts: input.max_attempts,
    };
    for attempt in 1..=input.max_attempts {
        let weights = draw_weights(&mut rng, n);
        let expected_return = portfolio_return(&input.expected_returns, &weights);
        if (expected_return - input.target_return).abs() <= input.tolerance {
            let risk = portfolio_risk(&input.covariance, &weights);
            let sharpe = sharpe_ratio(expected_return, risk, input.risk_free_rate).ok();
            status = MatchStatus::Found {
                weights,
                attempts: attempt,
                expected_return,
                risk,
                sharpe_ratio: sharpe,
            };
            break;
        }
    }

    if let MatchStatus::NotFound { attempts } = &status {
        warnings.push(format!(
            "No portfolio within {} of target {} after {} attempts; widen the tolerance or raise max_attempts",
            input.tolerance, input.target_return, attempts
        ));
    }

    let output = ReturnMatchOutput {
        status,
        target_return: input.target_return,
        tolerance: input.tolerance,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Return-Matched Rejection Sampling",
        &serde_json::json!({
            "num_assets": n,
            "target_return": input.target_return,
            "tolerance": input.tolerance,
            "max_attempts": input.max_attempts,
            "seed": input.seed,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
