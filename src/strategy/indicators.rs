//! Indicator values at the last bar of a history window.
//!
//! Each function looks only at the slice it is given and returns `None`
//! while the window is too short to produce a value.

/// Simple moving average of the last `period` values.
pub fn sma_last(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Population standard deviation of the last `period` values.
pub fn stddev_last(values: &[f64], period: usize) -> Option<f64> {
    let mean = sma_last(values, period)?;
    let window = &values[values.len() - period..];
    let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
    Some(variance.sqrt())
}

/// Wilder RSI, seeded with the simple average of the first `period` changes.
///
/// A flat window (no gains, no losses) reads 50; no losses reads 100.
pub fn rsi_last(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let (seed, rest) = changes.split_at(period);

    let mut avg_gain = seed.iter().map(|c| c.max(0.0)).sum::<f64>() / period as f64;
    let mut avg_loss = seed.iter().map(|c| (-c).max(0.0)).sum::<f64>() / period as f64;

    let alpha = 1.0 / period as f64;
    for change in rest {
        avg_gain += alpha * (change.max(0.0) - avg_gain);
        avg_loss += alpha * ((-change).max(0.0) - avg_loss);
    }

    Some(match (avg_gain == 0.0, avg_loss == 0.0) {
        (true, true) => 50.0,
        (_, true) => 100.0,
        _ => 100.0 - 100.0 / (1.0 + avg_gain / avg_loss),
    })
}
