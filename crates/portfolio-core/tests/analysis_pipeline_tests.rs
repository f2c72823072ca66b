use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use portfolio_core::market::returns::{estimate_market, MarketInput, PriceSeries};
use portfolio_core::optimization::frontier::{generate_frontier, FrontierInput, PointStatus};
use portfolio_core::optimization::mean_variance::{optimize, OptimizationInput, SolverStatus};
use portfolio_core::sampling::random_portfolios::{
    find_portfolio_for_return, sample_portfolios, MatchStatus, ReturnMatchInput, SampleInput,
};
use portfolio_core::simulation::gbm::{simulate_paths, GbmInput};

// ===========================================================================
// End-to-end pipeline tests
// Price history -> market estimates -> optimizer -> frontier -> sampling ->
// simulation, checking the hand-offs rather than any single module.
// ===========================================================================

const SEED: u64 = 42;

/// Synthetic daily closes with a small per-asset drift and bounded noise,
/// so prices stay positive and annualized estimates stay in a sane range.
fn synthetic_market(seed: u64) -> MarketInput {
    let mut rng = StdRng::seed_from_u64(seed);
    let assets: [(&str, f64, f64); 3] = [
        ("AAA", 100.0, 0.0004),
        ("BBB", 50.0, 0.0006),
        ("CCC", 200.0, 0.0008),
    ];
    let series = assets
        .iter()
        .map(|&(symbol, start, daily_drift)| {
            let mut closes = vec![start];
            for _ in 0..59 {
                let noise: f64 = rng.gen_range(-0.005..0.005);
                let prev = *closes.last().unwrap();
                closes.push(prev * (1.0 + daily_drift + noise));
            }
            PriceSeries {
                symbol: symbol.to_string(),
                closes,
            }
        })
        .collect();
    MarketInput { series }
}

fn mu_range(expected_returns: &[f64]) -> (f64, f64) {
    let lo = expected_returns.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = expected_returns
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    (lo, hi)
}

// ---------------------------------------------------------------------------
// Market estimation hand-off
// ---------------------------------------------------------------------------

#[test]
fn test_estimates_have_expected_shape() {
    let market = synthetic_market(SEED);
    let estimates = estimate_market(&market).unwrap().result;

    assert_eq!(estimates.symbols, vec!["AAA", "BBB", "CCC"]);
    assert_eq!(estimates.expected_returns.len(), 3);
    assert_eq!(estimates.observations, 59);
    for (i, row) in estimates.covariance.iter().enumerate() {
        assert_eq!(row.len(), 3);
        assert!(row[i] >= 0.0, "negative variance on diagonal at {i}");
        for (j, &v) in row.iter().enumerate() {
            assert_eq!(
                v, estimates.covariance[j][i],
                "covariance not symmetric at ({i},{j})"
            );
        }
    }
}

#[test]
fn test_estimates_stay_symmetric_across_seeds() {
    for seed in 0..10 {
        let estimates = estimate_market(&synthetic_market(seed)).unwrap().result;
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(estimates.covariance[i][j], estimates.covariance[j][i]);
            }
        }
        // Estimates must be directly consumable by the optimizer.
        let (lo, _) = mu_range(&estimates.expected_returns);
        let out = optimize(&OptimizationInput {
            expected_returns: estimates.expected_returns.clone(),
            covariance: estimates.covariance.clone(),
            target_return: lo,
            risk_free_rate: 0.03,
        })
        .unwrap();
        assert!(
            matches!(out.result.status, SolverStatus::Optimal { .. }),
            "seed {seed}: lowest asset return should always be attainable"
        );
    }
}

// ---------------------------------------------------------------------------
// Full pipeline on one seeded market
// ---------------------------------------------------------------------------

#[test]
fn test_prices_to_simulation_pipeline() {
    let market = synthetic_market(SEED);
    let estimates = estimate_market(&market).unwrap().result;
    let (lo, hi) = mu_range(&estimates.expected_returns);

    // Optimize at a mid-range target so the solve must succeed.
    let target = 0.5 * (lo + hi);
    let optimized = optimize(&OptimizationInput {
        expected_returns: estimates.expected_returns.clone(),
        covariance: estimates.covariance.clone(),
        target_return: target,
        risk_free_rate: 0.03,
    })
    .unwrap();
    let (weights, portfolio_return, portfolio_risk) = match &optimized.result.status {
        SolverStatus::Optimal {
            weights,
            expected_return,
            risk,
            ..
        } => (weights.clone(), *expected_return, *risk),
        other => panic!("mid-range target must be attainable, got {other:?}"),
    };
    let weight_sum: f64 = weights.iter().sum();
    assert!((weight_sum - 1.0).abs() < 1e-9);
    assert!(weights.iter().all(|&w| w >= -1e-12));
    assert!(portfolio_return >= target - 1e-9);

    // Frontier across the attainable band: every point must resolve.
    let frontier = generate_frontier(&FrontierInput {
        expected_returns: estimates.expected_returns.clone(),
        covariance: estimates.covariance.clone(),
        min_return: lo,
        max_return: hi,
        num_points: 20,
        risk_free_rate: 0.03,
    })
    .unwrap();
    assert_eq!(frontier.result.num_points, 20);
    assert_eq!(
        frontier.result.num_optimal, 20,
        "all targets inside [min mu, max mu] are attainable"
    );
    let minvar_risk = frontier
        .result
        .points
        .iter()
        .filter_map(|p| p.risk)
        .fold(f64::INFINITY, f64::min);
    for p in &frontier.result.points {
        assert_eq!(p.status, PointStatus::Optimal);
        let risk = p.risk.unwrap();
        assert!(risk >= minvar_risk - 1e-9);
    }
    // The chosen portfolio sits on or above the frontier's minimum risk.
    assert!(portfolio_risk >= minvar_risk - 1e-9);

    // Random portfolios over the same estimates.
    let sampled = sample_portfolios(&SampleInput {
        expected_returns: estimates.expected_returns.clone(),
        covariance: estimates.covariance.clone(),
        num_portfolios: 500,
        risk_free_rate: 0.03,
        seed: Some(SEED),
    })
    .unwrap()
    .result;
    assert_eq!(sampled.portfolios.len(), 500);
    for p in &sampled.portfolios {
        let sum: f64 = p.weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(p.expected_return >= lo - 1e-9 && p.expected_return <= hi + 1e-9);
        assert!(p.risk >= 0.0);
    }
    let min_risk_index = sampled.min_risk_index.unwrap() as usize;
    // No random portfolio can undercut the optimizer's minimum-variance risk.
    assert!(sampled.portfolios[min_risk_index].risk >= minvar_risk - 1e-9);

    // Simulate the optimized portfolio forward one year.
    let simulated = simulate_paths(&GbmInput {
        initial_value: 10_000.0,
        drift: portfolio_return,
        volatility: portfolio_risk,
        horizon: 1.0,
        step_size: 1.0 / 252.0,
        num_paths: 200,
        seed: Some(SEED),
    })
    .unwrap()
    .result;
    assert_eq!(simulated.steps, 252);
    assert_eq!(simulated.paths.len(), 200);
    for path in &simulated.paths {
        assert_eq!(path.len(), 253);
        assert_eq!(path[0], 10_000.0);
        assert!(path.iter().all(|&v| v > 0.0 && v.is_finite()));
    }
    assert!(simulated.terminal.min <= simulated.terminal.median);
    assert!(simulated.terminal.median <= simulated.terminal.max);
    assert!(
        (0.0..=1.0).contains(&simulated.terminal.probability_below_initial),
        "probability_below_initial={}",
        simulated.terminal.probability_below_initial
    );
}

// ---------------------------------------------------------------------------
// Return matching against estimated markets
// ---------------------------------------------------------------------------

#[test]
fn test_return_match_on_estimated_market() {
    let estimates = estimate_market(&synthetic_market(SEED)).unwrap().result;
    let (lo, hi) = mu_range(&estimates.expected_returns);

    // A target at the center of the attainable band with a generous tolerance
    // is hit almost immediately by rejection sampling.
    let target = 0.5 * (lo + hi);
    let tolerance = 0.1 * (hi - lo).max(1e-6);
    let matched = find_portfolio_for_return(&ReturnMatchInput {
        expected_returns: estimates.expected_returns.clone(),
        covariance: estimates.covariance.clone(),
        target_return: target,
        tolerance,
        max_attempts: 100_000,
        risk_free_rate: 0.03,
        seed: Some(SEED),
    })
    .unwrap()
    .result;

    match matched.status {
        MatchStatus::Found {
            weights,
            expected_return,
            attempts,
            ..
        } => {
            let sum: f64 = weights.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
            assert!(
                (expected_return - target).abs() <= tolerance,
                "matched return {expected_return} misses {target} by more than {tolerance}"
            );
            assert!(attempts >= 1);
        }
        MatchStatus::NotFound { attempts } => {
            panic!("center target should be matched, gave up after {attempts} attempts")
        }
    }
}

#[test]
fn test_pipeline_is_reproducible_under_a_fixed_seed() {
    let estimates = estimate_market(&synthetic_market(SEED)).unwrap().result;

    let run = |seed: Option<u64>| {
        sample_portfolios(&SampleInput {
            expected_returns: estimates.expected_returns.clone(),
            covariance: estimates.covariance.clone(),
            num_portfolios: 50,
            risk_free_rate: 0.03,
            seed,
        })
        .unwrap()
        .result
    };
    let a = run(Some(7));
    let b = run(Some(7));
    for (pa, pb) in a.portfolios.iter().zip(&b.portfolios) {
        assert_eq!(pa.weights, pb.weights);
    }
}
