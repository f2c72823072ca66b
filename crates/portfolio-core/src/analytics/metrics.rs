use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::PortfolioError;
use crate::types::{with_metadata, ComputationOutput, Rate, Weight};
use crate::PortfolioResult;

/// Absolute tolerance for the covariance symmetry check.
const SYMMETRY_TOL: f64 = 1e-9;

/// Below this, portfolio risk is treated as exactly zero and the Sharpe
/// ratio is undefined.
const ZERO_RISK_TOL: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input for portfolio metric computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsInput {
    /// Annualized expected return per asset.
    pub expected_returns: Vec<Rate>,
    /// Annualized covariance matrix of asset returns (row-major, symmetric).
    pub covariance: Vec<Vec<f64>>,
    /// Portfolio weights, index-aligned with `expected_returns`.
    pub weights: Vec<Weight>,
    /// Annualized risk-free rate used for the Sharpe ratio.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: Rate,
}

fn default_risk_free_rate() -> f64 {
    0.03
}

/// Computed metrics for one portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsOutput {
    pub expected_return: f64,
    /// Portfolio standard deviation, sqrt(w'Cw).
    pub risk: f64,
    pub variance: f64,
    /// None when the portfolio carries zero risk (Sharpe undefined).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharpe_ratio: Option<f64>,
    pub risk_free_rate: f64,
    pub num_assets: usize,
}

// ---------------------------------------------------------------------------
// Core metric functions
// ---------------------------------------------------------------------------

/// Expected portfolio return: w'mu.
pub fn portfolio_return(expected_returns: &[f64], weights: &[f64]) -> f64 {
    expected_returns
        .iter()
        .zip(weights.iter())
        .map(|(r, w)| r * w)
        .sum()
}

/// Portfolio variance: w'Cw. Rounding can push the quadratic form a hair
/// below zero for near-degenerate matrices; clamp before it reaches sqrt.
pub fn portfolio_variance(covariance: &[Vec<f64>], weights: &[f64]) -> f64 {
    let mut quad = 0.0;
    for (i, wi) in weights.iter().enumerate() {
        for (j, wj) in weights.iter().enumerate() {
            quad += wi * covariance[i][j] * wj;
        }
    }
    quad.max(0.0)
}

/// Portfolio risk (standard deviation): sqrt(w'Cw).
pub fn portfolio_risk(covariance: &[Vec<f64>], weights: &[f64]) -> f64 {
    portfolio_variance(covariance, weights).sqrt()
}

/// Sharpe ratio: (r_p - r_f) / sigma_p.
///
/// A zero-risk portfolio has no defined Sharpe ratio; callers get a
/// matchable `DivisionByZero` instead of an infinity or a panic.
pub fn sharpe_ratio(
    portfolio_return: f64,
    portfolio_risk: f64,
    risk_free_rate: f64,
) -> PortfolioResult<f64> {
    if portfolio_risk.abs() < ZERO_RISK_TOL {
        return Err(PortfolioError::DivisionByZero {
            context: "sharpe_ratio".into(),
        });
    }
    Ok((portfolio_return - risk_free_rate) / portfolio_risk)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate the (expected_returns, covariance) pair shared by every module
/// that consumes market estimates.
pub(crate) fn validate_market(
    expected_returns: &[f64],
    covariance: &[Vec<f64>],
) -> PortfolioResult<()> {
    let n = expected_returns.len();
    if n == 0 {
        return Err(PortfolioError::InvalidInput {
            field: "expected_returns".into(),
            reason: "At least one asset is required".into(),
        });
    }
    if expected_returns.iter().any(|r| !r.is_finite()) {
        return Err(PortfolioError::InvalidInput {
            field: "expected_returns".into(),
            reason: "All expected returns must be finite".into(),
        });
    }
    if covariance.len() != n {
        return Err(PortfolioError::InvalidInput {
            field: "covariance".into(),
            reason: format!("Expected {} rows to match the asset count, got {}", n, covariance.len()),
        });
    }
    for (i, row) in covariance.iter().enumerate() {
        if row.len() != n {
            return Err(PortfolioError::InvalidInput {
                field: "covariance".into(),
                reason: format!("Row {} has {} columns; the matrix must be square", i, row.len()),
            });
        }
        if row.iter().any(|c| !c.is_finite()) {
            return Err(PortfolioError::InvalidInput {
                field: "covariance".into(),
                reason: format!("Row {} contains a non-finite entry", i),
            });
        }
        if covariance[i][i] < 0.0 {
            return Err(PortfolioError::InvalidInput {
                field: "covariance".into(),
                reason: format!("Variance on the diagonal must be non-negative (index {})", i),
            });
        }
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let delta = (covariance[i][j] - covariance[j][i]).abs();
            if delta > SYMMETRY_TOL {
                return Err(PortfolioError::InvalidInput {
                    field: "covariance".into(),
                    reason: format!(
                        "Matrix is asymmetric at ({}, {}): {} vs {}",
                        i, j, covariance[i][j], covariance[j][i]
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Validate a weight vector against the asset count.
pub(crate) fn validate_weights(weights: &[f64], num_assets: usize) -> PortfolioResult<()> {
    if weights.len() != num_assets {
        return Err(PortfolioError::InvalidInput {
            field: "weights".into(),
            reason: format!("Expected {} weights, got {}", num_assets, weights.len()),
        });
    }
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(PortfolioError::InvalidInput {
            field: "weights".into(),
            reason: "All weights must be finite".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compute expected return, risk and Sharpe ratio for a fixed portfolio.
///
/// A zero-risk portfolio yields `sharpe_ratio: None` plus a warning rather
/// than an error; callers that need the hard failure use [`sharpe_ratio`]
/// directly.
pub fn analyze_portfolio(
    input: &MetricsInput,
) -> PortfolioResult<ComputationOutput<MetricsOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_market(&input.expected_returns, &input.covariance)?;
    validate_weights(&input.weights, input.expected_returns.len())?;
    if !input.risk_free_rate.is_finite() {
        return Err(PortfolioError::InvalidInput {
            field: "risk_free_rate".into(),
            reason: "Must be finite".into(),
        });
    }

    let expected_return = portfolio_return(&input.expected_returns, &input.weights);
    let variance = portfolio_variance(&input.covariance, &input.weights);
    let risk = variance.sqrt();

    let sharpe = match sharpe_ratio(expected_return, risk, input.risk_free_rate) {
        Ok(s) => Some(s),
        Err(PortfolioError::DivisionByZero { .. }) => {
            warnings.push("Portfolio risk is zero; Sharpe ratio is undefined".into());
            None
        }
        Err(e) => return Err(e),
    };

    let output = MetricsOutput {
        expected_return,
        risk,
        variance,
        sharpe_ratio: sharpe,
        risk_free_rate: input.risk_free_rate,
        num_assets: input.expected_returns.len(),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Mean-Variance Portfolio Metrics",
        &serde_json::json!({
            "num_assets": input.expected_returns.len(),
            "risk_free_rate": input.risk_free_rate,
            "weights_sum": input.weights.iter().sum::<f64>(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn two_asset_input() -> MetricsInput {
        MetricsInput {
            expected_returns: vec![0.1, 0.2],
            covariance: vec![vec![0.2, 0.05], vec![0.05, 0.1]],
            weights: vec![0.25, 0.75],
            risk_free_rate: 0.03,
        }
    }

    #[test]
    fn test_portfolio_return_known_value() {
        let r = portfolio_return(&[0.1, 0.2], &[0.25, 0.75]);
        assert!((r - 0.175).abs() < 1e-12, "return={}", r);
    }

    #[test]
    fn test_portfolio_risk_known_value() {
        let cov = vec![vec![0.2, 0.05], vec![0.05, 0.1]];
        let risk = portfolio_risk(&cov, &[0.25, 0.75]);
        // w'Cw = 0.0625*0.2 + 2*0.1875*0.05 + 0.5625*0.1 = 0.0875
        assert!(
            (risk - 0.0875_f64.sqrt()).abs() < 1e-12,
            "risk={}, expected={}",
            risk,
            0.0875_f64.sqrt()
        );
    }

    #[test]
    fn test_sharpe_ratio_known_value() {
        let s = sharpe_ratio(0.13, 0.20, 0.03).unwrap();
        assert!((s - 0.5).abs() < 1e-12, "sharpe={}", s);
    }

    #[test]
    fn test_sharpe_ratio_zero_risk_is_division_by_zero() {
        let err = sharpe_ratio(0.13, 0.0, 0.03).unwrap_err();
        match err {
            PortfolioError::DivisionByZero { context } => {
                assert_eq!(context, "sharpe_ratio");
            }
            other => panic!("expected DivisionByZero, got {other:?}"),
        }
    }

    #[test]
    fn test_variance_clamps_negative_rounding() {
        // A zero matrix cannot produce negative variance, even with
        // adversarial weights.
        let cov = vec![vec![0.0, 0.0], vec![0.0, 0.0]];
        assert_eq!(portfolio_variance(&cov, &[1e8, -1e8]), 0.0);
    }

    #[test]
    fn test_analyze_portfolio_known_values() {
        let out = analyze_portfolio(&two_asset_input()).unwrap();
        let m = &out.result;
        assert!((m.expected_return - 0.175).abs() < 1e-12);
        assert!((m.risk - 0.0875_f64.sqrt()).abs() < 1e-12);
        assert!((m.variance - 0.0875).abs() < 1e-12);
        let sharpe = m.sharpe_ratio.unwrap();
        let expected = (0.175 - 0.03) / 0.0875_f64.sqrt();
        assert!((sharpe - expected).abs() < 1e-12, "sharpe={}", sharpe);
    }

    #[test]
    fn test_analyze_portfolio_zero_risk_warns() {
        let input = MetricsInput {
            expected_returns: vec![0.1, 0.2],
            covariance: vec![vec![0.0, 0.0], vec![0.0, 0.0]],
            weights: vec![0.5, 0.5],
            risk_free_rate: 0.03,
        };
        let out = analyze_portfolio(&input).unwrap();
        assert_eq!(out.result.sharpe_ratio, None);
        assert!(
            out.warnings.iter().any(|w| w.contains("Sharpe")),
            "expected a zero-risk warning, got {:?}",
            out.warnings
        );
    }

    #[test]
    fn test_metadata_precision_field() {
        let out = analyze_portfolio(&two_asset_input()).unwrap();
        assert_eq!(out.metadata.precision, "ieee754_f64");
    }

    #[test]
    fn test_validation_empty_assets() {
        let mut input = two_asset_input();
        input.expected_returns = vec![];
        input.covariance = vec![];
        input.weights = vec![];
        assert!(analyze_portfolio(&input).is_err());
    }

    #[test]
    fn test_validation_non_square_covariance() {
        let mut input = two_asset_input();
        input.covariance = vec![vec![0.2, 0.05, 0.1], vec![0.05, 0.1, 0.2]];
        let err = analyze_portfolio(&input).unwrap_err();
        assert!(matches!(err, PortfolioError::InvalidInput { .. }));
    }

    #[test]
    fn test_validation_asymmetric_covariance() {
        let mut input = two_asset_input();
        input.covariance = vec![vec![0.2, 0.05], vec![0.06, 0.1]];
        let err = analyze_portfolio(&input).unwrap_err();
        match err {
            PortfolioError::InvalidInput { field, reason } => {
                assert_eq!(field, "covariance");
                assert!(reason.contains("asymmetric"), "reason={}", reason);
            }
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_symmetry_tolerance_accepts_rounding() {
        let mut input = two_asset_input();
        input.covariance = vec![vec![0.2, 0.05 + 1e-12], vec![0.05, 0.1]];
        assert!(analyze_portfolio(&input).is_ok());
    }

    #[test]
    fn test_validation_mismatched_weights() {
        let mut input = two_asset_input();
        input.weights = vec![1.0];
        assert!(analyze_portfolio(&input).is_err());
    }

    #[test]
    fn test_validation_nan_return() {
        let mut input = two_asset_input();
        input.expected_returns[0] = f64::NAN;
        assert!(analyze_portfolio(&input).is_err());
    }

    #[test]
    fn test_validation_negative_diagonal() {
        let mut input = two_asset_input();
        input.covariance = vec![vec![-0.2, 0.05], vec![0.05, 0.1]];
        assert!(analyze_portfolio(&input).is_err());
    }
}
