//! Performance metrics calculator.
//!
//! Turns an engine's closed trades and equity curve into the statistics a
//! run summary carries.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::backtest::{ClosedTrade, EquityPoint};

/// Trading days per year used to annualise daily Sharpe.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Trade-level statistics.
///
/// Ratios that are undefined for the observed trades (no losses, no trades)
/// are `None` rather than a sentinel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    /// Closed round trips.
    pub total_trades: usize,
    /// Sum of winning net P&L.
    pub gross_profit: f64,
    /// Absolute sum of losing net P&L.
    pub gross_loss: f64,
    /// `gross_profit / gross_loss`.
    pub profit_factor: Option<f64>,
    /// Mean net P&L per trade, in account currency.
    pub expectancy: Option<f64>,
    /// Mean net P&L per trade as a percentage of starting value.
    pub expectancy_pct_of_start: Option<f64>,
    /// Winning trades as a percentage of all trades.
    pub win_rate_pct: Option<f64>,
    /// Mean net P&L of winners.
    pub avg_win: Option<f64>,
    /// Mean net P&L of losers (negative).
    pub avg_loss: Option<f64>,
    /// Largest net P&L.
    pub best_trade: Option<f64>,
    /// Smallest net P&L.
    pub worst_trade: Option<f64>,
    /// Mean bars held per trade.
    pub avg_hold_bars: Option<f64>,
}

/// Drawdown analysis of one equity series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DrawdownAnalysis {
    /// Largest peak-to-trough decline, in percent.
    pub max_drawdown_pct: f64,
    /// Longest stretch, in bars, spent below a prior peak.
    pub max_drawdown_len: usize,
}

/// Metrics calculator.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Trade statistics from closed trades.
    pub fn trade_stats(trades: &[ClosedTrade], start_value: Decimal) -> TradeStats {
        if trades.is_empty() {
            return TradeStats::default();
        }

        let pnls: Vec<f64> = trades.iter().map(|t| to_f64(t.pnl_net)).collect();
        let n = pnls.len() as f64;

        let wins: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = pnls.iter().copied().filter(|p| *p < 0.0).collect();
        let gross_profit: f64 = wins.iter().sum();
        let gross_loss: f64 = losses.iter().sum::<f64>().abs();

        let expectancy = pnls.iter().sum::<f64>() / n;
        let start = to_f64(start_value);

        TradeStats {
            total_trades: trades.len(),
            gross_profit,
            gross_loss,
            profit_factor: Self::profit_factor(gross_profit, gross_loss),
            expectancy: Some(expectancy),
            expectancy_pct_of_start: (start > 0.0).then(|| expectancy / start * 100.0),
            win_rate_pct: Some(wins.len() as f64 / n * 100.0),
            avg_win: mean(&wins),
            avg_loss: mean(&losses).map(f64::abs),
            best_trade: pnls.iter().copied().reduce(f64::max),
            worst_trade: pnls.iter().copied().reduce(f64::min),
            avg_hold_bars: Some(trades.iter().map(|t| t.bars_held as f64).sum::<f64>() / n),
        }
    }

    /// Gross profit over gross loss; undefined without losses.
    pub fn profit_factor(gross_profit: f64, gross_loss: f64) -> Option<f64> {
        if gross_loss == 0.0 {
            return None;
        }
        Some(gross_profit / gross_loss.abs())
    }

    /// Peak-to-trough drawdown of an equity series, peaks taken from the series itself.
    pub fn analyze_drawdown(equity: &[f64]) -> DrawdownAnalysis {
        let Some(&first) = equity.first() else {
            return DrawdownAnalysis::default();
        };

        let mut peak = first;
        let mut max_drawdown_pct = 0.0;
        let mut current_len = 0;
        let mut max_drawdown_len = 0;

        for &value in equity {
            if value >= peak {
                peak = value;
                current_len = 0;
                continue;
            }

            current_len += 1;
            max_drawdown_len = max_drawdown_len.max(current_len);

            if peak > 0.0 {
                let dd = (peak - value) / peak * 100.0;
                if dd > max_drawdown_pct {
                    max_drawdown_pct = dd;
                }
            }
        }

        DrawdownAnalysis {
            max_drawdown_pct,
            max_drawdown_len,
        }
    }

    /// Returns between consecutive UTC trading days, using each day's last close equity.
    ///
    /// The first day's return is measured against `start_value`.
    pub fn daily_returns(curve: &[EquityPoint], start_value: Decimal) -> Vec<f64> {
        let mut day_closes: Vec<(DateTime<Utc>, f64)> = Vec::new();
        for point in curve {
            let value = to_f64(point.equity_close);
            match day_closes.last_mut() {
                Some((ts, last)) if ts.date_naive() == point.ts.date_naive() => {
                    *ts = point.ts;
                    *last = value;
                }
                _ => day_closes.push((point.ts, value)),
            }
        }

        let mut prev = to_f64(start_value);
        let mut returns = Vec::with_capacity(day_closes.len());
        for (_, value) in day_closes {
            if prev > 0.0 {
                returns.push(value / prev - 1.0);
            }
            prev = value;
        }
        returns
    }

    /// Annualised Sharpe ratio of daily returns, zero risk-free rate.
    pub fn sharpe_ratio(daily_returns: &[f64]) -> Option<f64> {
        if daily_returns.len() < 2 {
            return None;
        }

        let n = daily_returns.len() as f64;
        let mean = daily_returns.iter().sum::<f64>() / n;
        let variance = daily_returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let std = variance.sqrt();

        if std == 0.0 || !std.is_finite() {
            return None;
        }
        Some(mean / std * TRADING_DAYS_PER_YEAR.sqrt())
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub(crate) fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::trade::TradeLeg;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn trade(pnl_net: Decimal, bars_held: usize) -> ClosedTrade {
        let ts = Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap();
        ClosedTrade {
            entry_ts: ts,
            exit_ts: ts + Duration::hours(bars_held as i64),
            legs: vec![TradeLeg {
                shares: dec!(1),
                entry_price: dec!(100),
                exit_price: dec!(100) + pnl_net,
            }],
            commission: Decimal::ZERO,
            pnl_net,
            bars_held,
        }
    }

    #[test]
    fn test_profit_factor() {
        assert_eq!(MetricsCalculator::profit_factor(15000.0, 5000.0), Some(3.0));
        assert_eq!(MetricsCalculator::profit_factor(15000.0, 0.0), None);
    }

    #[test]
    fn test_trade_stats() {
        let trades = vec![trade(dec!(30), 2), trade(dec!(-10), 4), trade(dec!(10), 3)];
        let stats = MetricsCalculator::trade_stats(&trades, dec!(2000));

        assert_eq!(stats.total_trades, 3);
        assert_eq!(stats.profit_factor, Some(4.0));
        assert!((stats.expectancy.unwrap() - 10.0).abs() < 1e-9);
        assert!((stats.expectancy_pct_of_start.unwrap() - 0.5).abs() < 1e-9);
        assert!((stats.win_rate_pct.unwrap() - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.best_trade, Some(30.0));
        assert_eq!(stats.worst_trade, Some(-10.0));
        assert_eq!(stats.avg_hold_bars, Some(3.0));
    }

    #[test]
    fn test_trade_stats_empty() {
        let stats = MetricsCalculator::trade_stats(&[], dec!(2000));
        assert_eq!(stats.total_trades, 0);
        assert_eq!(stats.profit_factor, None);
        assert_eq!(stats.expectancy, None);
    }

    #[test]
    fn test_drawdown_analysis() {
        let analysis = MetricsCalculator::analyze_drawdown(&[100.0, 110.0, 99.0, 104.5, 111.0, 110.0]);
        assert!((analysis.max_drawdown_pct - 10.0).abs() < 1e-9);
        assert_eq!(analysis.max_drawdown_len, 2);
    }

    #[test]
    fn test_drawdown_analysis_empty() {
        let analysis = MetricsCalculator::analyze_drawdown(&[]);
        assert_eq!(analysis.max_drawdown_pct, 0.0);
        assert_eq!(analysis.max_drawdown_len, 0);
    }

    #[test]
    fn test_daily_returns_use_last_bar_of_day() {
        let day = |d: u32, h: u32| Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap();
        let curve = vec![
            EquityPoint { ts: day(4, 15), equity_close: dec!(101), equity_intrabar: dec!(101) },
            EquityPoint { ts: day(4, 20), equity_close: dec!(102), equity_intrabar: dec!(102) },
            EquityPoint { ts: day(5, 15), equity_close: dec!(91.8), equity_intrabar: dec!(91.8) },
        ];
        let returns = MetricsCalculator::daily_returns(&curve, dec!(100));
        assert_eq!(returns.len(), 2);
        assert!((returns[0] - 0.02).abs() < 1e-12);
        assert!((returns[1] + 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_sharpe_requires_dispersion() {
        assert_eq!(MetricsCalculator::sharpe_ratio(&[0.01]), None);
        assert_eq!(MetricsCalculator::sharpe_ratio(&[0.01, 0.01, 0.01]), None);
        let sharpe = MetricsCalculator::sharpe_ratio(&[0.01, -0.005, 0.02]).unwrap();
        assert!(sharpe > 0.0);
    }
}
