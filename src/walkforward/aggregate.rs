//! Per-candidate reduction of OOS window results.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::{mean, median, min};
use crate::params::ParameterSet;

use super::sweep::{CandidateRun, WindowResult};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    #[error("Candidate {candidate} produced no usable windows")]
    Empty { candidate: usize },
}

/// OOS statistics of one candidate over all of its usable windows.
///
/// `mean`, `median` and `worst` are over OOS net return %; `worst` is the
/// observed minimum. `pos_window_rate` is the fraction of windows with
/// strictly positive net P&L.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAggregate {
    /// Candidate index.
    pub candidate: usize,
    /// Candidate parameters.
    pub params: ParameterSet,
    /// Windows with an OOS result.
    pub windows: usize,
    /// Fraction of windows with positive net P&L.
    pub pos_window_rate: f64,
    /// Mean OOS net return %.
    pub mean: f64,
    /// Median OOS net return %.
    pub median: f64,
    /// Lowest OOS net return %.
    pub worst: f64,
    /// Net P&L summed across windows.
    pub total_net_pnl: f64,
    /// Closed trades summed across windows.
    pub total_trades: usize,
    /// Sum of measured days across windows.
    pub covered_days: f64,
    /// Largest intrabar drawdown seen in any window, if every window reported one.
    pub worst_intrabar_dd_pct: Option<f64>,
    /// Trade-weighted mean holding period in bars.
    pub avg_hold_bars: Option<f64>,
    /// Windows whose run failed.
    pub failed_windows: usize,
}

impl CandidateAggregate {
    /// Reduce a candidate's window results.
    pub fn from_results(
        candidate: usize,
        params: &ParameterSet,
        results: &[WindowResult],
    ) -> Result<Self, AggregationError> {
        let returns: Vec<f64> = results.iter().map(|r| r.oos_summary.net_return_pct).collect();
        let (Some(mean), Some(median), Some(worst)) = (mean(&returns), median(&returns), min(&returns)) else {
            return Err(AggregationError::Empty { candidate });
        };

        let positive = results.iter().filter(|r| r.oos_summary.net_pnl > 0.0).count();
        let worst_intrabar_dd_pct = results
            .iter()
            .map(|r| r.oos_summary.max_drawdown_intrabar_pct)
            .try_fold(0.0f64, |acc, dd| dd.map(|dd| acc.max(dd)));

        let (held, counted) = results
            .iter()
            .filter_map(|r| {
                let t = &r.oos_summary.trades;
                t.avg_hold_bars.map(|h| (h * t.total_trades as f64, t.total_trades))
            })
            .fold((0.0, 0usize), |(h, n), (dh, dn)| (h + dh, n + dn));

        Ok(Self {
            candidate,
            params: params.clone(),
            windows: results.len(),
            pos_window_rate: positive as f64 / results.len() as f64,
            mean,
            median,
            worst,
            total_net_pnl: results.iter().map(|r| r.oos_summary.net_pnl).sum(),
            total_trades: results.iter().map(|r| r.oos_summary.trades.total_trades).sum(),
            covered_days: results.iter().map(|r| r.oos_summary.covered_days()).sum(),
            worst_intrabar_dd_pct,
            avg_hold_bars: (counted > 0).then(|| held / counted as f64),
            failed_windows: 0,
        })
    }

    /// Reduce a sweep's candidate run, carrying its failed-window count.
    pub fn from_run(run: &CandidateRun) -> Result<Self, AggregationError> {
        let mut agg = Self::from_results(run.index, &run.params, &run.results)?;
        agg.failed_windows = run.failed_windows.len();
        Ok(agg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::RunSummary;
    use crate::data::TimeRange;
    use crate::walkforward::sweep::tests::ymd;
    use crate::walkforward::WindowSet;

    fn results(nets: &[f64]) -> Vec<WindowResult> {
        let pre = TimeRange::new(ymd(2018, 1, 1), ymd(2023, 1, 1)).unwrap();
        let set = WindowSet::generate(pre, 12, 3).unwrap();
        nets.iter()
            .zip(set.iter())
            .map(|(&net, w)| {
                let mut s = RunSummary::flat("snap", "s", ParameterSet::new(), w.oos, 1000.0);
                s.net_pnl = net;
                s.net_return_pct = net / 10.0;
                s.trades.total_trades = 3;
                s.trades.avg_hold_bars = Some(4.0);
                s.max_drawdown_intrabar_pct = Some(net.abs() / 100.0);
                WindowResult {
                    window: *w,
                    candidate: 0,
                    params: ParameterSet::new(),
                    oos_summary: s,
                }
            })
            .collect()
    }

    #[test]
    fn test_exact_rates_and_order_statistics() {
        let rs = results(&[10.0, -20.0, 0.0, 30.0, 50.0]);
        let agg = CandidateAggregate::from_results(0, &ParameterSet::new(), &rs).unwrap();

        // zero P&L is not a positive window
        assert_eq!(agg.pos_window_rate, 0.6);
        assert_eq!(agg.worst, -2.0);
        assert_eq!(agg.median, 1.0);
        assert!((agg.mean - 1.4).abs() < 1e-12);
        assert_eq!(agg.windows, 5);
        assert_eq!(agg.total_trades, 15);
        assert_eq!(agg.worst_intrabar_dd_pct, Some(0.5));
        assert_eq!(agg.avg_hold_bars, Some(4.0));
    }

    #[test]
    fn test_missing_drawdown_propagates() {
        let mut rs = results(&[10.0, 20.0]);
        rs[1].oos_summary.max_drawdown_intrabar_pct = None;
        let agg = CandidateAggregate::from_results(0, &ParameterSet::new(), &rs).unwrap();
        assert_eq!(agg.worst_intrabar_dd_pct, None);
    }

    #[test]
    fn test_empty_is_error() {
        let err = CandidateAggregate::from_results(3, &ParameterSet::new(), &[]).unwrap_err();
        assert_eq!(err, AggregationError::Empty { candidate: 3 });
    }
}
