use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::analytics::metrics::{
    portfolio_return, portfolio_risk, sharpe_ratio, validate_market,
};
use crate::error::PortfolioError;
use crate::types::{with_metadata, ComputationOutput, Rate, Weight};
use crate::PortfolioResult;

/// Slack allowed on the feasibility screen and the return constraint.
const FEASIBILITY_TOL: f64 = 1e-9;

/// Free weights below this negative threshold get clamped to the zero bound.
const WEIGHT_CLIP_TOL: f64 = 1e-9;

/// Sign tolerance on the bound multipliers when deciding releases.
const MULTIPLIER_TOL: f64 = 1e-9;

/// Pivot magnitude below which the KKT system counts as singular.
const PIVOT_TOL: f64 = 1e-12;

/// Spread below which the expected returns on the free set are treated as
/// one common value, making the return constraint collinear with the
/// budget constraint.
const DEGENERATE_TOL: f64 = 1e-12;

fn max_iterations(num_assets: usize) -> u32 {
    (16 * num_assets + 16) as u32
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input for long-only mean-variance optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationInput {
    /// Annualized expected return per asset.
    pub expected_returns: Vec<Rate>,
    /// Annualized covariance matrix of asset returns (row-major, symmetric).
    pub covariance: Vec<Vec<f64>>,
    /// Minimum acceptable portfolio return.
    pub target_return: Rate,
    /// Annualized risk-free rate used for the reported Sharpe ratio.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: Rate,
}

fn default_risk_free_rate() -> f64 {
    0.03
}

/// Outcome of a solve. Infeasible targets and numerical failures are
/// expected outcomes and travel here, not in the error channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum SolverStatus {
    Optimal {
        weights: Vec<Weight>,
        expected_return: f64,
        risk: f64,
        variance: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        sharpe_ratio: Option<f64>,
        /// True when the optimum sits on the target-return boundary.
        return_constraint_binding: bool,
    },
    Infeasible {
        target_return: f64,
        max_attainable: f64,
    },
    Failed {
        reason: String,
    },
}

/// Output of one mean-variance solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeanVarianceOutput {
    pub status: SolverStatus,
    /// Active-set iterations consumed across both solve phases.
    pub iterations: u32,
}

impl MeanVarianceOutput {
    /// Escalate a non-optimal status into the error taxonomy, for callers
    /// that need weights or nothing.
    pub fn require_optimal(&self) -> PortfolioResult<Vec<Weight>> {
        match &self.status {
            SolverStatus::Optimal { weights, .. } => Ok(weights.clone()),
            SolverStatus::Infeasible {
                target_return,
                max_attainable,
            } => Err(PortfolioError::Infeasible {
                target_return: *target_return,
                max_attainable: *max_attainable,
            }),
            SolverStatus::Failed { reason } => Err(PortfolioError::SolverFailure {
                function: "mean_variance_optimize".into(),
                iterations: self.iterations,
                reason: reason.clone(),
            }),
        }
    }
}

/// Internal solve outcome before metrics enrichment.
pub(crate) enum KernelOutcome {
    Weights { weights: Vec<f64>, binding: bool },
    Infeasible { max_attainable: f64 },
    Failed { reason: String },
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Minimize portfolio variance w'Cw subject to sum(w) = 1, w >= 0 and
/// mu'w >= target_return.
///
/// The solve runs in two phases. Phase one finds the long-only minimum
/// variance portfolio ignoring the return constraint; when that portfolio
/// already earns the target, the constraint is slack and the solve is done.
/// Otherwise the return constraint binds as an equality and the KKT system
/// is re-solved with it. Both phases iterate an active set: clamp the most
/// negative weight to the zero bound, re-solve, and release any clamped
/// asset whose bound multiplier turns negative.
pub fn optimize(input: &OptimizationInput) -> PortfolioResult<ComputationOutput<MeanVarianceOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_market(&input.expected_returns, &input.covariance)?;
    if !input.target_return.is_finite() {
        return Err(PortfolioError::InvalidInput {
            field: "target_return".into(),
            reason: "Must be finite".into(),
        });
    }
    if !input.risk_free_rate.is_finite() {
        return Err(PortfolioError::InvalidInput {
            field: "risk_free_rate".into(),
            reason: "Must be finite".into(),
        });
    }

    let (outcome, iterations) = solve_kernel(
        &input.expected_returns,
        &input.covariance,
        input.target_return,
    );

    let status = match outcome {
        KernelOutcome::Weights { weights, binding } => {
            let expected_return = portfolio_return(&input.expected_returns, &weights);
            let risk = portfolio_risk(&input.covariance, &weights);
            let sharpe = match sharpe_ratio(expected_return, risk, input.risk_free_rate) {
                Ok(s) => Some(s),
                Err(PortfolioError::DivisionByZero { .. }) => {
                    warnings.push("Optimal portfolio has zero risk; Sharpe ratio is undefined".into());
                    None
                }
                Err(e) => return Err(e),
            };
            SolverStatus::Optimal {
                weights,
                expected_return,
                risk,
                variance: risk * risk,
                sharpe_ratio: sharpe,
                return_constraint_binding: binding,
            }
        }
        KernelOutcome::Infeasible { max_attainable } => {
            warnings.push(format!(
                "Target return {} is above the maximum attainable {} (best single asset)",
                input.target_return, max_attainable
            ));
            SolverStatus::Infeasible {
                target_return: input.target_return,
                max_attainable,
            }
        }
        KernelOutcome::Failed { reason } => SolverStatus::Failed { reason },
    };

    let output = MeanVarianceOutput { status, iterations };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Mean-Variance Optimization (long-only active set)",
        &serde_json::json!({
            "num_assets": input.expected_returns.len(),
            "target_return": input.target_return,
            "risk_free_rate": input.risk_free_rate,
            "constraints": "sum(w) = 1, w >= 0, mu'w >= target",
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Solver kernel
// ---------------------------------------------------------------------------

/// Two-phase long-only solve. Inputs are assumed validated.
pub(crate) fn solve_kernel(mu: &[f64], cov: &[Vec<f64>], target: f64) -> (KernelOutcome, u32) {
    let max_mu = mu.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if target > max_mu + FEASIBILITY_TOL {
        return (
            KernelOutcome::Infeasible {
                max_attainable: max_mu,
            },
            0,
        );
    }

    let mut iterations = 0u32;

    // Phase one: minimum variance without the return constraint.
    let min_var = match active_set(mu, cov, None, &mut iterations) {
        Ok(w) => w,
        Err(reason) => return (KernelOutcome::Failed { reason }, iterations),
    };
    let min_var_return = portfolio_return(mu, &min_var);
    if min_var_return + FEASIBILITY_TOL >= target {
        let binding = (min_var_return - target).abs() <= FEASIBILITY_TOL;
        return (
            KernelOutcome::Weights {
                weights: min_var,
                binding,
            },
            iterations,
        );
    }

    // Phase two: the return constraint binds as an equality.
    match active_set(mu, cov, Some(target), &mut iterations) {
        Ok(w) => (
            KernelOutcome::Weights {
                weights: w,
                binding: true,
            },
            iterations,
        ),
        Err(reason) => (KernelOutcome::Failed { reason }, iterations),
    }
}

/// Active-set loop for the equality-constrained subproblems.
///
/// `target` of None solves min w'Cw s.t. 1'w = 1 on the free set;
/// Some(t) adds mu'w = t. Returns the full-length weight vector or a
/// failure reason.
fn active_set(
    mu: &[f64],
    cov: &[Vec<f64>],
    target: Option<f64>,
    iterations: &mut u32,
) -> Result<Vec<f64>, String> {
    let n = mu.len();
    let limit = max_iterations(n);
    let mut local = 0u32;
    let mut clamped = vec![false; n];

    loop {
        local += 1;
        *iterations += 1;
        if local > limit {
            return Err(format!("active-set iteration limit ({limit}) reached"));
        }

        let free: Vec<usize> = (0..n).filter(|&i| !clamped[i]).collect();
        if free.is_empty() {
            return Err("every asset clamped to zero; constraints cannot be met".into());
        }

        // A free set whose expected returns coincide makes the return row a
        // multiple of the budget row. When the common return matches the
        // target the constraint is implied; otherwise this active set
        // cannot satisfy it.
        let effective_target = match target {
            Some(t) => {
                let lo = free.iter().map(|&i| mu[i]).fold(f64::INFINITY, f64::min);
                let hi = free.iter().map(|&i| mu[i]).fold(f64::NEG_INFINITY, f64::max);
                if hi - lo < DEGENERATE_TOL {
                    if (hi - t).abs() <= FEASIBILITY_TOL {
                        None
                    } else {
                        return Err(
                            "return target unreachable on the remaining free assets".into()
                        );
                    }
                } else {
                    Some(t)
                }
            }
            None => None,
        };

        let (w_free, lambda, nu) = solve_equality_constrained(mu, cov, &free, effective_target)?;

        // Clamp the most negative free weight, if any.
        let mut worst_clamp: Option<(usize, f64)> = None;
        for (k, &w) in w_free.iter().enumerate() {
            if w < -WEIGHT_CLIP_TOL && worst_clamp.map_or(true, |(_, v)| w < v) {
                worst_clamp = Some((k, w));
            }
        }
        if let Some((k, _)) = worst_clamp {
            clamped[free[k]] = true;
            continue;
        }

        let mut weights = vec![0.0; n];
        for (k, &i) in free.iter().enumerate() {
            weights[i] = w_free[k].max(0.0);
        }

        // Bound multipliers on clamped assets must be non-negative at the
        // optimum; release the worst violator and re-solve.
        let grad = mat_vec(cov, &weights);
        let mut worst_release: Option<(usize, f64)> = None;
        for i in 0..n {
            if clamped[i] {
                let sigma = 2.0 * grad[i] - lambda - nu * mu[i];
                if sigma < -MULTIPLIER_TOL && worst_release.map_or(true, |(_, v)| sigma < v) {
                    worst_release = Some((i, sigma));
                }
            }
        }
        if let Some((i, _)) = worst_release {
            clamped[i] = false;
            continue;
        }

        renormalize(&mut weights);
        return Ok(weights);
    }
}

/// Solve the KKT system for the equality-constrained subproblem on the
/// free index set. Returns the free weights and the multipliers for the
/// budget and return constraints.
fn solve_equality_constrained(
    mu: &[f64],
    cov: &[Vec<f64>],
    free: &[usize],
    target: Option<f64>,
) -> Result<(Vec<f64>, f64, f64), String> {
    let m = free.len();
    let rows = m + 1 + usize::from(target.is_some());

    // Bordered system: [2C_FF  -1  -mu_F; 1' 0 0; mu_F' 0 0]
    let mut a = vec![vec![0.0; rows]; rows];
    let mut b = vec![0.0; rows];
    for (r, &i) in free.iter().enumerate() {
        for (c, &j) in free.iter().enumerate() {
            a[r][c] = 2.0 * cov[i][j];
        }
        a[r][m] = -1.0;
        a[m][r] = 1.0;
        if target.is_some() {
            a[r][m + 1] = -mu[i];
            a[m + 1][r] = mu[i];
        }
    }
    b[m] = 1.0;
    if let Some(t) = target {
        b[m + 1] = t;
    }

    let x = gauss_solve(a, b)?;
    let weights = x[..m].to_vec();
    let lambda = x[m];
    let nu = if target.is_some() { x[m + 1] } else { 0.0 };
    Ok((weights, lambda, nu))
}

/// Gauss-Jordan elimination with partial pivoting. Consumes the system and
/// returns the solution vector.
fn gauss_solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, String> {
    let n = b.len();
    for col in 0..n {
        let mut pivot_row = col;
        let mut pivot_mag = a[col][col].abs();
        for row in (col + 1)..n {
            if a[row][col].abs() > pivot_mag {
                pivot_row = row;
                pivot_mag = a[row][col].abs();
            }
        }
        if pivot_mag < PIVOT_TOL {
            return Err("singular KKT system (pivot below tolerance)".into());
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        let pivot = a[col][col];
        for j in col..n {
            a[col][j] /= pivot;
        }
        b[col] /= pivot;

        for row in 0..n {
            if row != col {
                let factor = a[row][col];
                if factor != 0.0 {
                    for j in col..n {
                        a[row][j] -= factor * a[col][j];
                    }
                    b[row] -= factor * b[col];
                }
            }
        }
    }
    Ok(b)
}

fn mat_vec(matrix: &[Vec<f64>], vector: &[f64]) -> Vec<f64> {
    matrix
        .iter()
        .map(|row| row.iter().zip(vector.iter()).map(|(a, b)| a * b).sum())
        .collect()
}

/// Clip residual negatives from clamping and rescale so the weights sum to
/// exactly one.
fn renormalize(weights: &mut [f64]) {
    for w in weights.iter_mut() {
        if *w < 0.0 {
            *w = 0.0;
        }
    }
    let sum: f64 = weights.iter().sum();
    if sum > 0.0 {
        for w in weights.iter_mut() {
            *w /= sum;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn input(
        expected_returns: Vec<f64>,
        covariance: Vec<Vec<f64>>,
        target_return: f64,
    ) -> OptimizationInput {
        OptimizationInput {
            expected_returns,
            covariance,
            target_return,
            risk_free_rate: 0.03,
        }
    }

    fn optimal_weights(out: &ComputationOutput<MeanVarianceOutput>) -> Vec<f64> {
        match &out.result.status {
            SolverStatus::Optimal { weights, .. } => weights.clone(),
            other => panic!("expected Optimal, got {other:?}"),
        }
    }

    #[test]
    fn test_equal_returns_min_variance_split() {
        // Both assets earn the target, so the solve reduces to minimum
        // variance and weights split inversely to variance: [1/3, 2/3].
        let out = optimize(&input(
            vec![0.15, 0.15],
            vec![vec![0.2, 0.0], vec![0.0, 0.1]],
            0.15,
        ))
        .unwrap();
        let w = optimal_weights(&out);
        assert!((w[0] - 1.0 / 3.0).abs() < 1e-6, "w0={}", w[0]);
        assert!((w[1] - 2.0 / 3.0).abs() < 1e-6, "w1={}", w[1]);
    }

    #[test]
    fn test_weights_sum_to_one_and_non_negative() {
        let out = optimize(&input(
            vec![0.08, 0.12, 0.2],
            vec![
                vec![0.10, 0.01, 0.00],
                vec![0.01, 0.15, 0.02],
                vec![0.00, 0.02, 0.30],
            ],
            0.15,
        ))
        .unwrap();
        let w = optimal_weights(&out);
        let sum: f64 = w.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "sum={}", sum);
        for (i, wi) in w.iter().enumerate() {
            assert!(*wi >= -1e-12, "w[{}]={}", i, wi);
        }
    }

    #[test]
    fn test_return_constraint_binds_above_min_variance() {
        let out = optimize(&input(
            vec![0.1, 0.2],
            vec![vec![0.2, 0.0], vec![0.0, 0.1]],
            0.18,
        ))
        .unwrap();
        match &out.result.status {
            SolverStatus::Optimal {
                weights,
                expected_return,
                return_constraint_binding,
                ..
            } => {
                assert!((weights[0] - 0.2).abs() < 1e-9, "w0={}", weights[0]);
                assert!((weights[1] - 0.8).abs() < 1e-9, "w1={}", weights[1]);
                assert!((expected_return - 0.18).abs() < 1e-9);
                assert!(return_constraint_binding);
            }
            other => panic!("expected Optimal, got {other:?}"),
        }
    }

    #[test]
    fn test_return_constraint_slack_at_low_target() {
        let out = optimize(&input(
            vec![0.1, 0.2],
            vec![vec![0.2, 0.0], vec![0.0, 0.1]],
            0.05,
        ))
        .unwrap();
        match &out.result.status {
            SolverStatus::Optimal {
                weights,
                expected_return,
                return_constraint_binding,
                ..
            } => {
                // Minimum variance portfolio, unchanged by the low target.
                assert!((weights[0] - 1.0 / 3.0).abs() < 1e-6);
                assert!((weights[1] - 2.0 / 3.0).abs() < 1e-6);
                assert!(*expected_return > 0.05);
                assert!(!return_constraint_binding);
            }
            other => panic!("expected Optimal, got {other:?}"),
        }
    }

    #[test]
    fn test_phase_two_clamps_low_return_asset() {
        // Equal variances; the 5% asset leaves the basket at a 19% target.
        let out = optimize(&input(
            vec![0.05, 0.1, 0.2],
            vec![
                vec![0.1, 0.0, 0.0],
                vec![0.0, 0.1, 0.0],
                vec![0.0, 0.0, 0.1],
            ],
            0.19,
        ))
        .unwrap();
        let w = optimal_weights(&out);
        assert!(w[0].abs() < 1e-9, "w0={}", w[0]);
        assert!((w[1] - 0.1).abs() < 1e-6, "w1={}", w[1]);
        assert!((w[2] - 0.9).abs() < 1e-6, "w2={}", w[2]);
    }

    #[test]
    fn test_infeasible_target_is_tagged_not_error() {
        let out = optimize(&input(
            vec![0.1, 0.2],
            vec![vec![0.2, 0.0], vec![0.0, 0.1]],
            0.5,
        ))
        .unwrap();
        match &out.result.status {
            SolverStatus::Infeasible {
                target_return,
                max_attainable,
            } => {
                assert_eq!(*target_return, 0.5);
                assert!((max_attainable - 0.2).abs() < 1e-12);
            }
            other => panic!("expected Infeasible, got {other:?}"),
        }
        assert!(!out.warnings.is_empty());
    }

    #[test]
    fn test_target_at_maximum_return_corner() {
        let out = optimize(&input(
            vec![0.1, 0.2],
            vec![vec![0.2, 0.0], vec![0.0, 0.1]],
            0.2,
        ))
        .unwrap();
        let w = optimal_weights(&out);
        assert!(w[0].abs() < 1e-9, "w0={}", w[0]);
        assert!((w[1] - 1.0).abs() < 1e-9, "w1={}", w[1]);
    }

    #[test]
    fn test_single_asset() {
        let out = optimize(&input(vec![0.08], vec![vec![0.1]], 0.05)).unwrap();
        let w = optimal_weights(&out);
        assert_eq!(w.len(), 1);
        assert!((w[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_singular_covariance_reports_failure() {
        // Perfectly duplicated assets make the KKT system singular.
        let out = optimize(&input(
            vec![0.1, 0.1],
            vec![vec![0.2, 0.2], vec![0.2, 0.2]],
            0.1,
        ))
        .unwrap();
        match &out.result.status {
            SolverStatus::Failed { reason } => {
                assert!(reason.contains("singular"), "reason={}", reason);
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn test_require_optimal_returns_weights() {
        let out = optimize(&input(
            vec![0.1, 0.2],
            vec![vec![0.2, 0.0], vec![0.0, 0.1]],
            0.18,
        ))
        .unwrap();
        let w = out.result.require_optimal().unwrap();
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn test_require_optimal_maps_infeasible() {
        let out = optimize(&input(
            vec![0.1, 0.2],
            vec![vec![0.2, 0.0], vec![0.0, 0.1]],
            0.9,
        ))
        .unwrap();
        let err = out.result.require_optimal().unwrap_err();
        assert!(matches!(err, PortfolioError::Infeasible { .. }));
    }

    #[test]
    fn test_invalid_input_propagates_as_error() {
        let result = optimize(&input(
            vec![0.1, 0.2],
            vec![vec![0.2, 0.05], vec![0.06, 0.1]],
            0.15,
        ));
        assert!(matches!(
            result,
            Err(PortfolioError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_nan_target_rejected() {
        let result = optimize(&input(
            vec![0.1, 0.2],
            vec![vec![0.2, 0.0], vec![0.0, 0.1]],
            f64::NAN,
        ));
        assert!(result.is_err());
    }

    #[test]
    fn test_three_asset_inverse_variance_split() {
        // Diagonal covariance with a slack return constraint: weights fall
        // out proportional to 1/variance.
        let out = optimize(&input(
            vec![0.1, 0.15, 0.2],
            vec![
                vec![0.1, 0.0, 0.0],
                vec![0.0, 0.2, 0.0],
                vec![0.0, 0.0, 0.4],
            ],
            0.05,
        ))
        .unwrap();
        let w = optimal_weights(&out);
        assert!((w[0] - 4.0 / 7.0).abs() < 1e-6, "w0={}", w[0]);
        assert!((w[1] - 2.0 / 7.0).abs() < 1e-6, "w1={}", w[1]);
        assert!((w[2] - 1.0 / 7.0).abs() < 1e-6, "w2={}", w[2]);
    }

    #[test]
    fn test_iterations_reported() {
        let out = optimize(&input(
            vec![0.1, 0.2],
            vec![vec![0.2, 0.0], vec![0.0, 0.1]],
            0.18,
        ))
        .unwrap();
        assert!(out.result.iterations >= 1);
    }

    #[test]
    fn test_methodology() {
        let out = optimize(&input(
            vec![0.1, 0.2],
            vec![vec![0.2, 0.0], vec![0.0, 0.1]],
            0.15,
        ))
        .unwrap();
        assert!(out.methodology.contains("Mean-Variance"));
        assert_eq!(out.metadata.precision, "ieee754_f64");
    }

    #[test]
    fn test_correlated_assets_beat_concentration() {
        // Negative correlation rewards diversification; both assets should
        // stay in the basket at the minimum-variance point.
        let out = optimize(&input(
            vec![0.12, 0.12],
            vec![vec![0.2, -0.05], vec![-0.05, 0.1]],
            0.10,
        ))
        .unwrap();
        let w = optimal_weights(&out);
        assert!(w[0] > 0.0 && w[1] > 0.0, "w={:?}", w);
    }
}
