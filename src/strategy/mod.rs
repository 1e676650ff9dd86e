//! Strategies and the strategy catalog.
//!
//! Strategies are pure signal functions plus a default parameter grid. The
//! evaluation pipeline depends only on [`Strategy`] and [`StrategySpec`].

pub mod bollinger;
pub mod indicators;
pub mod pairs;
pub mod registry;
pub mod rsi2;
pub mod signal;
pub mod vwap;
pub mod zscore;

pub use bollinger::BollingerMr;
pub use pairs::PairsMr;
pub use registry::{CatalogError, StrategyCatalog, StrategySpec};
pub use rsi2::Rsi2;
pub use signal::{BracketExit, OrderIntent, PositionState, Strategy};
pub use vwap::VwapMr;
pub use zscore::ZScoreMr;

#[cfg(test)]
pub(crate) fn test_bars(closes: &[f64]) -> Vec<crate::data::Bar> {
    use chrono::{Duration, TimeZone, Utc};

    let start = Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| crate::data::Bar {
            ts: start + Duration::hours(i as i64),
            open: c,
            high: c,
            low: c,
            close: c,
            volume: 1.0,
        })
        .collect()
}
