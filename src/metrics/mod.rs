//! Performance metrics.
//!
//! - Trade statistics: win rate, profit factor, expectancy
//! - Close and intrabar drawdown
//! - Daily Sharpe ratio
//! - Order statistics and the deflated Sharpe ratio

pub mod calculator;
pub mod stats;

pub use calculator::{DrawdownAnalysis, MetricsCalculator, TradeStats, TRADING_DAYS_PER_YEAR};
pub use stats::{deflated_sharpe_ratio, deflated_sharpe_ratio_with, mean, median, min};
