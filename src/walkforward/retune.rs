//! Retune-per-window walk-forward diagnostic.
//!
//! Each window picks its own parameters on the train range and is then
//! measured on its OOS range. The result describes how well re-optimisation
//! itself generalises; it is a diagnostic only and has no conversion into a
//! [`CandidateAggregate`](super::CandidateAggregate), so it can never reach
//! the selector.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backtest::{RunSummary, Segment};
use crate::metrics::{mean, median, min};
use crate::params::{CandidateSpace, ParameterSet};

use super::periods::{Window, WindowSet};
use super::sweep::{JobResult, SweepDriver, SweepError};

/// Train-range objective and soft filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetuneObjective {
    /// Largest acceptable train intrabar drawdown %.
    pub max_dd_intrabar_pct: f64,
    /// Fewest acceptable train trades.
    pub min_trades: usize,
    /// Weight of profit factor added to net P&L in the score.
    pub pf_weight: f64,
}

impl Default for RetuneObjective {
    fn default() -> Self {
        Self {
            max_dd_intrabar_pct: 10.0,
            min_trades: 200,
            pf_weight: 0.01,
        }
    }
}

impl RetuneObjective {
    /// `net_pnl + pf_weight * profit_factor`, an undefined PF counting as zero.
    pub fn score(&self, summary: &RunSummary) -> f64 {
        summary.net_pnl + self.pf_weight * summary.trades.profit_factor.unwrap_or(0.0)
    }

    /// Soft filters; a missing drawdown never passes.
    pub fn passes(&self, summary: &RunSummary) -> bool {
        let dd_ok = summary
            .max_drawdown_intrabar_pct
            .map(|dd| dd <= self.max_dd_intrabar_pct)
            .unwrap_or(false);
        dd_ok && summary.trades.total_trades >= self.min_trades
    }

    /// Best-scoring summary among those passing the filters, or among all
    /// when none pass. Equal scores keep the earliest candidate.
    fn choose<'s>(&self, train: &'s [(usize, RunSummary)]) -> Option<(&'s (usize, RunSummary), bool)> {
        let best = |filtered: bool| {
            train
                .iter()
                .filter(|(_, s)| !filtered || self.passes(s))
                .fold(None::<&(usize, RunSummary)>, |best, item| match best {
                    Some(b) if self.score(&b.1) >= self.score(&item.1) => Some(b),
                    _ => Some(item),
                })
        };
        match best(true) {
            Some(choice) => Some((choice, false)),
            None => best(false).map(|choice| (choice, true)),
        }
    }
}

/// One retuned window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetuneWindow {
    /// The walk-forward window.
    pub window: Window,
    /// Index of the best candidate on train.
    pub chosen_candidate: Option<usize>,
    /// Parameters of the best candidate on train.
    pub chosen_params: Option<ParameterSet>,
    /// Objective value on train.
    pub train_score: Option<f64>,
    /// Net return % on train.
    pub train_net_return_pct: Option<f64>,
    /// No candidate met the soft filters and the unfiltered best was used.
    pub filter_fallback: bool,
    /// OOS run of the chosen parameters.
    pub oos_summary: Option<RunSummary>,
    /// Why the window produced no OOS result.
    pub error: Option<String>,
}

/// Retune-per-window WFA summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetuneReport {
    /// Always `retune_per_window`.
    pub wfa_mode: String,
    /// Registry id of the strategy.
    pub strategy: String,
    /// Snapshot the windows were measured on.
    pub snapshot_id: String,
    /// Candidates tried per window.
    pub n_trials: usize,
    /// How train results were ranked.
    pub objective: RetuneObjective,
    /// Per-window results in chronological order.
    pub windows: Vec<RetuneWindow>,
    /// Windows with an OOS result.
    pub evaluated_windows: usize,
    /// Fraction of evaluated windows with positive net P&L.
    pub pos_window_rate: Option<f64>,
    /// Mean OOS net return %.
    pub mean_oos_return_pct: Option<f64>,
    /// Median OOS net return %.
    pub median_oos_return_pct: Option<f64>,
    /// Lowest OOS net return %.
    pub worst_oos_return_pct: Option<f64>,
}

/// Run the retune diagnostic over every window.
pub fn retune_per_window(
    driver: &SweepDriver<'_>,
    space: &CandidateSpace,
    windows: &WindowSet,
    objective: &RetuneObjective,
) -> Result<RetuneReport, SweepError> {
    info!(
        "Retune per window: {} candidates, {} windows",
        space.n_trials(),
        windows.len()
    );

    let train_segments: Vec<Segment> = windows.iter().map(|w| Segment::new(w.train)).collect();
    let outcomes = driver.evaluate(space.as_slice(), &train_segments, "retune train")?;

    let mut per_window: Vec<Vec<(usize, RunSummary)>> = vec![Vec::new(); windows.len()];
    for outcome in outcomes {
        if let JobResult::Done(summary) = outcome.result {
            per_window[outcome.segment_index].push((outcome.param_index, summary));
        }
    }

    let mut rows = Vec::with_capacity(windows.len());
    for (window, mut train) in windows.iter().zip(per_window) {
        train.sort_by_key(|(idx, _)| *idx);
        let Some(((idx, train_summary), filter_fallback)) = objective.choose(&train) else {
            warn!("Window {}: no candidate completed on train", window.index);
            rows.push(RetuneWindow {
                window: *window,
                chosen_candidate: None,
                chosen_params: None,
                train_score: None,
                train_net_return_pct: None,
                filter_fallback: false,
                oos_summary: None,
                error: Some("no candidate completed on the train range".to_string()),
            });
            continue;
        };
        let params = train_summary.params.clone();

        let segment = Segment::with_warmup(window.oos, window.train.start());
        let oos = driver.evaluate(std::slice::from_ref(&params), &[segment], "retune oos")?;
        let (oos_summary, error) = match oos.into_iter().next().map(|o| o.result) {
            Some(JobResult::Done(summary)) => (Some(summary), None),
            Some(JobResult::Failed { message, .. }) => (None, Some(message)),
            Some(JobResult::Skipped) | None => (None, Some("cancelled".to_string())),
        };

        info!(
            "Window {}: chose {} (train score {:.2}{})",
            window.index,
            params,
            objective.score(train_summary),
            if filter_fallback { ", unfiltered" } else { "" }
        );

        rows.push(RetuneWindow {
            window: *window,
            chosen_candidate: Some(*idx),
            chosen_params: Some(params),
            train_score: Some(objective.score(train_summary)),
            train_net_return_pct: Some(train_summary.net_return_pct),
            filter_fallback,
            oos_summary,
            error,
        });
    }

    let evaluated: Vec<&RunSummary> = rows.iter().filter_map(|r| r.oos_summary.as_ref()).collect();
    let returns: Vec<f64> = evaluated.iter().map(|s| s.net_return_pct).collect();
    let pos_window_rate = (!evaluated.is_empty())
        .then(|| evaluated.iter().filter(|s| s.net_pnl > 0.0).count() as f64 / evaluated.len() as f64);

    Ok(RetuneReport {
        wfa_mode: "retune_per_window".to_string(),
        strategy: driver.engine().strategy_id().to_string(),
        snapshot_id: driver.engine().snapshot_id().to_string(),
        n_trials: space.n_trials(),
        objective: objective.clone(),
        evaluated_windows: evaluated.len(),
        pos_window_rate,
        mean_oos_return_pct: mean(&returns),
        median_oos_return_pct: median(&returns),
        worst_oos_return_pct: min(&returns),
        windows: rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::CostConfig;
    use crate::data::TimeRange;
    use crate::walkforward::sweep::tests::{ymd, LinearEngine};

    fn summary(net: f64, pf: Option<f64>, dd: Option<f64>, trades: usize) -> RunSummary {
        let range = TimeRange::new(ymd(2020, 1, 1), ymd(2020, 2, 1)).unwrap();
        let mut s = RunSummary::flat("snap", "s", ParameterSet::new(), range, 1000.0);
        s.net_pnl = net;
        s.trades.profit_factor = pf;
        s.trades.total_trades = trades;
        s.max_drawdown_intrabar_pct = dd;
        s
    }

    #[test]
    fn test_score_and_filters() {
        let objective = RetuneObjective::default();
        assert!((objective.score(&summary(10.0, Some(2.0), Some(1.0), 300)) - 10.02).abs() < 1e-12);
        assert_eq!(objective.score(&summary(10.0, None, Some(1.0), 300)), 10.0);
        assert!(objective.passes(&summary(0.0, None, Some(10.0), 200)));
        assert!(!objective.passes(&summary(0.0, None, Some(10.1), 200)));
        assert!(!objective.passes(&summary(0.0, None, None, 500)));
        assert!(!objective.passes(&summary(0.0, None, Some(1.0), 199)));
    }

    #[test]
    fn test_choose_prefers_filtered_then_falls_back() {
        let objective = RetuneObjective::default();
        let train = vec![
            (0, summary(50.0, None, Some(30.0), 500)),
            (1, summary(20.0, None, Some(5.0), 500)),
            (2, summary(20.0, None, Some(5.0), 500)),
        ];
        let ((idx, _), fallback) = objective.choose(&train).unwrap();
        assert_eq!(*idx, 1);
        assert!(!fallback);

        let none_pass = vec![
            (0, summary(5.0, None, Some(30.0), 10)),
            (1, summary(9.0, None, None, 10)),
        ];
        let ((idx, _), fallback) = objective.choose(&none_pass).unwrap();
        assert_eq!(*idx, 1);
        assert!(fallback);
    }

    #[test]
    fn test_retune_report() {
        let engine = LinearEngine;
        let cost = CostConfig::default();
        let driver = SweepDriver::new(&engine, &cost);
        let space = CandidateSpace::new(vec![
            ParameterSet::new().with("x", 1.0),
            ParameterSet::new().with("x", -1.0),
        ]);
        let pre = TimeRange::new(ymd(2020, 1, 1), ymd(2021, 7, 1)).unwrap();
        let windows = WindowSet::generate(pre, 12, 3).unwrap();
        let objective = RetuneObjective {
            min_trades: 0,
            ..RetuneObjective::default()
        };

        let report = retune_per_window(&driver, &space, &windows, &objective).unwrap();
        assert_eq!(report.wfa_mode, "retune_per_window");
        assert_eq!(report.windows.len(), 2);
        assert_eq!(report.evaluated_windows, 2);
        // Train ranges start in January and April: x = -1 wins both (net 5, 2)
        assert_eq!(report.windows[0].chosen_candidate, Some(1));
        // OOS starts Jan 2021 and Apr 2021 with x = -1: net 5 and 2
        assert_eq!(report.pos_window_rate, Some(1.0));
        assert_eq!(report.n_trials, 2);
    }
}
