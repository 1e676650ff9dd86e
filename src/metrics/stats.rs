//! Order statistics and the deflated Sharpe ratio.

use statrs::distribution::{ContinuousCDF, Normal};

/// Observations per year assumed when estimating Sharpe uncertainty.
const SHARPE_OBSERVATIONS: f64 = 252.0;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median; the average of the two middle values for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

/// Approximate deflated Sharpe ratio.
///
/// Probability that the observed Sharpe beats the expected maximum Sharpe of
/// `n_trials` independent trials under the null. Skewness 0 and kurtosis 3
/// (normal returns) are assumed; reference Sharpe is 0. `None` below two
/// trials or for a non-finite Sharpe.
pub fn deflated_sharpe_ratio(sharpe: f64, n_trials: usize) -> Option<f64> {
    deflated_sharpe_ratio_with(sharpe, n_trials, 0.0, 3.0, 0.0)
}

/// Deflated Sharpe ratio with explicit return moments and reference Sharpe.
pub fn deflated_sharpe_ratio_with(
    sharpe: f64,
    n_trials: usize,
    skew: f64,
    kurtosis: f64,
    sr_ref: f64,
) -> Option<f64> {
    if n_trials < 2 || !sharpe.is_finite() {
        return None;
    }

    let expected_max = (2.0 * (n_trials as f64).ln()).sqrt();
    let variance = (1.0 - skew * sharpe + (kurtosis - 1.0) / 4.0 * sharpe.powi(2))
        / (SHARPE_OBSERVATIONS - 1.0);
    let sd = variance.max(1e-12).sqrt();

    let threshold = sr_ref + expected_max * sd;
    let z = (sharpe - threshold) / sd;

    let normal = Normal::new(0.0, 1.0).ok()?;
    Some(normal.cdf(z).clamp(0.0, 1.0))
}
