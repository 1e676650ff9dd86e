//! Hard pass/fail gates on a metrics summary.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backtest::RunSummary;
use crate::walkforward::CandidateAggregate;

/// Days per year used to annualise trade counts.
pub const DAYS_PER_YEAR: f64 = 365.25;

/// Gate thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Largest intrabar drawdown allowed, in percent.
    pub max_drawdown_intrabar_pct: f64,
    /// Fewest closed trades per year allowed.
    pub min_annualized_trades: f64,
    /// Reject runs whose net P&L is not positive.
    pub require_positive_net: bool,
    /// Realism gate; disabled when unset.
    pub min_avg_hold_bars: Option<f64>,
    /// Realism gate; disabled when unset.
    pub max_annualized_trades: Option<f64>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_drawdown_intrabar_pct: 10.0,
            min_annualized_trades: 200.0,
            require_positive_net: true,
            min_avg_hold_bars: None,
            max_annualized_trades: None,
        }
    }
}

impl GateConfig {
    pub fn with_max_drawdown(mut self, pct: f64) -> Self {
        self.max_drawdown_intrabar_pct = pct;
        self
    }

    pub fn with_min_annualized_trades(mut self, trades: f64) -> Self {
        self.min_annualized_trades = trades;
        self
    }

    pub fn with_require_positive_net(mut self, require: bool) -> Self {
        self.require_positive_net = require;
        self
    }
}

/// Stable identifier of a violated gate rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    MaxDrawdownIntrabar,
    MissingMaxDrawdownIntrabar,
    MinAnnualizedTrades,
    MissingTrades,
    NonPositiveNet,
    MinAvgHoldBars,
    MaxAnnualizedTrades,
}

impl GateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxDrawdownIntrabar => "max_drawdown_intrabar",
            Self::MissingMaxDrawdownIntrabar => "missing_max_drawdown_intrabar",
            Self::MinAnnualizedTrades => "min_annualized_trades",
            Self::MissingTrades => "missing_trades",
            Self::NonPositiveNet => "non_positive_net",
            Self::MinAvgHoldBars => "min_avg_hold_bars",
            Self::MaxAnnualizedTrades => "max_annualized_trades",
        }
    }
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a gate check; `ok` iff `reasons` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    /// Every rule passed.
    pub ok: bool,
    /// Violated rules in check order.
    pub reasons: Vec<GateReason>,
    /// Closed trades per year of coverage.
    pub annualized_trades: Option<f64>,
    /// Thresholds the run was checked against.
    pub thresholds: GateConfig,
}

impl GateResult {
    pub fn has(&self, reason: GateReason) -> bool {
        self.reasons.contains(&reason)
    }
}

/// Metrics a gate can be evaluated on.
pub trait GateSubject {
    fn max_drawdown_intrabar_pct(&self) -> Option<f64>;
    fn trade_count(&self) -> Option<usize>;
    /// Days of data the trade count was observed over.
    fn covered_days(&self) -> Option<f64>;
    fn net_pnl(&self) -> Option<f64>;
    fn avg_hold_bars(&self) -> Option<f64>;
}

impl GateSubject for RunSummary {
    fn max_drawdown_intrabar_pct(&self) -> Option<f64> {
        self.max_drawdown_intrabar_pct
    }

    fn trade_count(&self) -> Option<usize> {
        Some(self.trades.total_trades)
    }

    fn covered_days(&self) -> Option<f64> {
        self.coverage.map(|_| RunSummary::covered_days(self))
    }

    fn net_pnl(&self) -> Option<f64> {
        Some(self.net_pnl)
    }

    fn avg_hold_bars(&self) -> Option<f64> {
        self.trades.avg_hold_bars
    }
}

impl GateSubject for CandidateAggregate {
    fn max_drawdown_intrabar_pct(&self) -> Option<f64> {
        self.worst_intrabar_dd_pct
    }

    fn trade_count(&self) -> Option<usize> {
        Some(self.total_trades)
    }

    fn covered_days(&self) -> Option<f64> {
        (self.covered_days > 0.0).then_some(self.covered_days)
    }

    fn net_pnl(&self) -> Option<f64> {
        Some(self.total_net_pnl)
    }

    fn avg_hold_bars(&self) -> Option<f64> {
        self.avg_hold_bars
    }
}

/// `trades * 365.25 / covered_days`, with coverage floored at one day.
pub fn annualized_trades(trades: usize, covered_days: f64) -> f64 {
    trades as f64 * DAYS_PER_YEAR / covered_days.max(1.0)
}

/// Evaluate every gate rule, collecting violations in a fixed order.
pub fn evaluate_gate(subject: &impl GateSubject, config: &GateConfig) -> GateResult {
    let mut reasons = Vec::new();

    match subject.max_drawdown_intrabar_pct() {
        None => reasons.push(GateReason::MissingMaxDrawdownIntrabar),
        Some(dd) if dd > config.max_drawdown_intrabar_pct => reasons.push(GateReason::MaxDrawdownIntrabar),
        Some(_) => {}
    }

    let annualized = match (subject.trade_count(), subject.covered_days()) {
        (Some(trades), Some(days)) => Some(annualized_trades(trades, days)),
        _ => None,
    };
    match annualized {
        None => reasons.push(GateReason::MissingTrades),
        Some(per_year) if per_year < config.min_annualized_trades => {
            reasons.push(GateReason::MinAnnualizedTrades)
        }
        Some(_) => {}
    }

    if let Some(min_hold) = config.min_avg_hold_bars {
        if subject.avg_hold_bars().map(|h| h < min_hold).unwrap_or(true) {
            reasons.push(GateReason::MinAvgHoldBars);
        }
    }

    if let Some(max_per_year) = config.max_annualized_trades {
        if annualized.map(|t| t > max_per_year).unwrap_or(true) {
            reasons.push(GateReason::MaxAnnualizedTrades);
        }
    }

    if config.require_positive_net && subject.net_pnl().map(|n| n <= 0.0).unwrap_or(true) {
        reasons.push(GateReason::NonPositiveNet);
    }

    GateResult {
        ok: reasons.is_empty(),
        reasons,
        annualized_trades: annualized,
        thresholds: config.clone(),
    }
}
