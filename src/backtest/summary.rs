//! Immutable result of one engine invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::TimeRange;
use crate::metrics::TradeStats;
use crate::params::ParameterSet;

/// Metrics for one strategy and parameter set over one evaluation range.
///
/// Produced only by a [`BacktestEngine`](super::BacktestEngine). `coverage`
/// is the range of bars actually measured, which may be shorter than `range`
/// when data is missing at either end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Snapshot the run was measured on.
    pub snapshot_id: String,
    /// Registry id of the strategy.
    pub strategy_id: String,
    /// Parameters the strategy was built from.
    pub params: ParameterSet,
    /// Requested evaluation range.
    pub range: TimeRange,
    /// Range actually covered by bars; `None` when no bar fell in `range`.
    pub coverage: Option<TimeRange>,
    /// Bars measured.
    pub bars: usize,

    /// Account value before the first bar.
    pub start_value: f64,
    /// Account value at the last close, open positions marked.
    pub end_value: f64,
    /// `end_value - start_value`.
    pub net_pnl: f64,
    /// Net P&L as a percentage of `start_value`.
    pub net_return_pct: f64,

    /// Peak-to-trough drawdown of the close-marked equity, in percent.
    pub max_drawdown_close_pct: f64,
    /// Longest close-marked drawdown, in bars.
    pub max_drawdown_close_len: usize,
    /// Drawdown with open positions marked at the adverse bar extreme.
    pub max_drawdown_intrabar_pct: Option<f64>,
    /// Annualised Sharpe ratio of daily returns.
    pub sharpe: Option<f64>,

    /// Statistics over closed trades.
    #[serde(flatten)]
    pub trades: TradeStats,
}

impl RunSummary {
    /// A summary with no trades and no change in value.
    pub fn flat(
        snapshot_id: &str,
        strategy_id: &str,
        params: ParameterSet,
        range: TimeRange,
        start_value: f64,
    ) -> Self {
        Self {
            snapshot_id: snapshot_id.to_string(),
            strategy_id: strategy_id.to_string(),
            params,
            range,
            coverage: Some(range),
            bars: 0,
            start_value,
            end_value: start_value,
            net_pnl: 0.0,
            net_return_pct: 0.0,
            max_drawdown_close_pct: 0.0,
            max_drawdown_close_len: 0,
            max_drawdown_intrabar_pct: Some(0.0),
            sharpe: None,
            trades: TradeStats::default(),
        }
    }

    /// Days of data actually measured, at least one.
    pub fn covered_days(&self) -> f64 {
        self.coverage.map(|c| c.days()).unwrap_or(0.0).max(1.0)
    }

    pub fn data_start(&self) -> Option<DateTime<Utc>> {
        self.coverage.map(|c| c.start())
    }

    pub fn data_end(&self) -> Option<DateTime<Utc>> {
        self.coverage.map(|c| c.end())
    }
}
