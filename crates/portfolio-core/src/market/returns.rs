use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::PortfolioError;
use crate::types::{with_metadata, ComputationOutput, Rate};
use crate::PortfolioResult;

/// Trading days per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: i32 = 252;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Aligned closing prices for one asset, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub closes: Vec<f64>,
}

/// Input for market estimate generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketInput {
    /// One series per asset; all series must cover the same dates.
    pub series: Vec<PriceSeries>,
}

/// Annualized return and covariance estimates ready for the optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketEstimates {
    pub symbols: Vec<String>,
    /// Annualized expected return per asset, index-aligned with `symbols`.
    pub expected_returns: Vec<Rate>,
    /// Annualized covariance of daily returns, symmetric by construction.
    pub covariance: Vec<Vec<f64>>,
    /// Price observations per series.
    pub observations: u32,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Turn aligned close-price history into annualized mean returns and an
/// annualized covariance matrix of daily returns.
///
/// Mean daily returns compound into annual figures,
/// `(1 + mean_daily)^252 - 1`; the unbiased daily covariance scales
/// linearly by 252. Each unordered pair is computed once and mirrored, so
/// the matrix is symmetric to the bit.
pub fn estimate_market(input: &MarketInput) -> PortfolioResult<ComputationOutput<MarketEstimates>> {
    let start = Instant::now();
    let warnings: Vec<String> = Vec::new();

    validate(input)?;

    let num_assets = input.series.len();
    let observations = input.series[0].closes.len();

    // Daily simple returns, one row per asset.
    let daily_returns: Vec<Vec<f64>> = input
        .series
        .iter()
        .map(|s| {
            s.closes
                .windows(2)
                .map(|pair| pair[1] / pair[0] - 1.0)
                .collect()
        })
        .collect();
    let num_returns = observations - 1;

    let daily_means: Vec<f64> = daily_returns
        .iter()
        .map(|r| r.iter().sum::<f64>() / num_returns as f64)
        .collect();

    let expected_returns: Vec<f64> = daily_means
        .iter()
        .map(|m| (1.0 + m).powi(TRADING_DAYS_PER_YEAR) - 1.0)
        .collect();

    let mut covariance = vec![vec![0.0; num_assets]; num_assets];
    for i in 0..num_assets {
        for j in i..num_assets {
            let mut accum = 0.0;
            for t in 0..num_returns {
                accum += (daily_returns[i][t] - daily_means[i])
                    * (daily_returns[j][t] - daily_means[j]);
            }
            let daily_cov = accum / (num_returns - 1) as f64;
            let annualized = daily_cov * TRADING_DAYS_PER_YEAR as f64;
            covariance[i][j] = annualized;
            covariance[j][i] = annualized;
        }
    }

    let output = MarketEstimates {
        symbols: input.series.iter().map(|s| s.symbol.clone()).collect(),
        expected_returns,
        covariance,
        observations: observations as u32,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Historical Market Estimates (annualized)",
        &serde_json::json!({
            "num_assets": num_assets,
            "observations": observations,
            "trading_days_per_year": TRADING_DAYS_PER_YEAR,
            "mean_annualization": "compound",
            "covariance_annualization": "linear",
            "covariance_estimator": "unbiased (n - 1)",
        }),
        warnings,
        elapsed,
        output,
    ))
}

fn validate(input: &MarketInput) -> PortfolioResult<()> {
    if input.series.is_empty() {
        return Err(PortfolioError::InvalidInput {
            field: "series".into(),
            reason: "At least one price series is required".into(),
        });
    }
    let len = input.series[0].closes.len();
    if len < 3 {
        return Err(PortfolioError::InsufficientData(format!(
            "Covariance estimation needs at least 3 price observations per series, got {}",
            len
        )));
    }
    for s in &input.series {
        if s.closes.len() != len {
            return Err(PortfolioError::InvalidInput {
                field: "series".into(),
                reason: format!(
                    "Series '{}' has {} observations; all series must have {}",
                    s.symbol,
                    s.closes.len(),
                    len
                ),
            });
        }
        if s.closes.iter().any(|p| !(p.is_finite() && *p > 0.0)) {
            return Err(PortfolioError::InvalidInput {
                field: "closes".into(),
                reason: format!("Series '{}' contains a non-positive or non-finite price", s.symbol),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
