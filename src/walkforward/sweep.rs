//! Candidate sweep over walk-forward windows.
//!
//! Every `(candidate, window)` pair is one independent engine invocation,
//! executed on the rayon pool. A failed or timed-out invocation is recorded
//! and excluded; it never aborts the sweep. When the sweep is cancelled (by
//! the caller's flag or the time budget) pending pairs are skipped and any
//! candidate left with a skipped pair is reported as incomplete rather than
//! aggregated.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::backtest::{BacktestEngine, CostConfig, EngineError, RunContext, RunSummary, Segment};
use crate::params::{CandidateSpace, ParameterSet};

use super::periods::{Window, WindowSet};

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// Resource limits for engine invocations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Worker threads; the global rayon pool when unset.
    pub max_threads: Option<usize>,
    /// Bound on a single invocation.
    pub run_timeout_secs: Option<u64>,
    /// Bound on the whole sweep; exceeding it cancels pending work.
    pub time_budget_secs: Option<u64>,
    /// Draw a terminal progress bar.
    pub show_progress: bool,
}

/// Why an engine invocation produced no summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The engine returned an error.
    Engine,
    /// The run exceeded its time limit.
    Timeout,
}

/// One engine invocation that produced no summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairFailure {
    /// Candidate index.
    pub candidate: usize,
    /// Window index.
    pub window: usize,
    /// Failure class.
    pub kind: FailureKind,
    /// Engine error text.
    pub message: String,
}

/// Outcome of one engine invocation.
#[derive(Debug, Clone)]
pub enum JobResult {
    /// The engine produced a summary.
    Done(RunSummary),
    /// The engine failed or timed out.
    Failed { kind: FailureKind, message: String },
    /// Never started, or interrupted by cancellation.
    Skipped,
}

/// A finished job, addressed by parameter and segment position.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// Position in the parameter list.
    pub param_index: usize,
    /// Position in the segment list.
    pub segment_index: usize,
    /// What the engine returned.
    pub result: JobResult,
}

/// OOS result of one candidate in one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowResult {
    /// The walk-forward window.
    pub window: Window,
    /// Candidate index.
    pub candidate: usize,
    /// Candidate parameters.
    pub params: ParameterSet,
    /// Run over the window's OOS range.
    pub oos_summary: RunSummary,
}

/// All usable window results for one candidate, in chronological order.
#[derive(Debug, Clone)]
pub struct CandidateRun {
    /// Candidate index.
    pub index: usize,
    /// Candidate parameters.
    pub params: ParameterSet,
    /// Completed windows.
    pub results: Vec<WindowResult>,
    /// Windows whose run failed or timed out.
    pub failed_windows: Vec<usize>,
}

/// Everything a fixed-params sweep produced.
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    /// Candidates whose every window either completed or failed.
    pub candidates: Vec<CandidateRun>,
    /// One record per failed invocation.
    pub failures: Vec<PairFailure>,
    /// Candidates dropped because cancellation left windows unevaluated.
    pub incomplete: Vec<usize>,
    /// Cancellation or the time budget stopped the sweep.
    pub cancelled: bool,
}

impl SweepOutcome {
    /// Total invocations that produced no summary.
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

/// Runs candidates over windows on a worker pool.
pub struct SweepDriver<'a> {
    engine: &'a dyn BacktestEngine,
    cost: &'a CostConfig,
    config: SweepConfig,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> SweepDriver<'a> {
    pub fn new(engine: &'a dyn BacktestEngine, cost: &'a CostConfig) -> Self {
        Self {
            engine,
            cost,
            config: SweepConfig::default(),
            cancel: None,
        }
    }

    pub fn with_config(mut self, config: SweepConfig) -> Self {
        self.config = config;
        self
    }

    /// Observe an external cancellation flag (e.g. set on user interrupt).
    pub fn with_cancel(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn engine(&self) -> &'a dyn BacktestEngine {
        self.engine
    }

    pub fn cost(&self) -> &'a CostConfig {
        self.cost
    }

    /// Fixed-params mode: every candidate over every window's OOS range,
    /// with the train range as indicator warmup.
    pub fn run(&self, space: &CandidateSpace, windows: &WindowSet) -> Result<SweepOutcome, SweepError> {
        let segments: Vec<Segment> = windows
            .iter()
            .map(|w| Segment::with_warmup(w.oos, w.train.start()))
            .collect();

        info!(
            "Sweeping {} candidates x {} windows ({} runs)",
            space.n_trials(),
            windows.len(),
            space.n_trials() * windows.len()
        );

        let outcomes = self.evaluate(space.as_slice(), &segments, "sweep")?;

        let mut runs: Vec<CandidateRun> = space
            .iter()
            .map(|(index, params)| CandidateRun {
                index,
                params: params.clone(),
                results: Vec::with_capacity(windows.len()),
                failed_windows: Vec::new(),
            })
            .collect();
        let mut skipped = vec![false; runs.len()];
        let mut failures = Vec::new();

        for outcome in outcomes {
            let window = windows.windows()[outcome.segment_index];
            let run = &mut runs[outcome.param_index];
            match outcome.result {
                JobResult::Done(summary) => run.results.push(WindowResult {
                    window,
                    candidate: run.index,
                    params: run.params.clone(),
                    oos_summary: summary,
                }),
                JobResult::Failed { kind, message } => {
                    run.failed_windows.push(window.index);
                    failures.push(PairFailure {
                        candidate: run.index,
                        window: window.index,
                        kind,
                        message,
                    });
                }
                JobResult::Skipped => skipped[outcome.param_index] = true,
            }
        }

        let mut incomplete = Vec::new();
        let mut candidates = Vec::with_capacity(runs.len());
        for (run, was_skipped) in runs.into_iter().zip(skipped) {
            if was_skipped {
                incomplete.push(run.index);
                continue;
            }
            let mut run = run;
            run.results.sort_by_key(|r| r.window.oos.start());
            run.failed_windows.sort_unstable();
            candidates.push(run);
        }
        failures.sort_by_key(|f| (f.candidate, f.window));

        let cancelled = !incomplete.is_empty();
        if !failures.is_empty() {
            warn!("{} of {} runs failed and were excluded", failures.len(), space.n_trials() * windows.len());
        }
        if cancelled {
            warn!(
                "Sweep cancelled: {} incomplete candidates discarded",
                incomplete.len()
            );
        }

        Ok(SweepOutcome {
            candidates,
            failures,
            incomplete,
            cancelled,
        })
    }

    /// Run every parameter set over every segment.
    ///
    /// Outcomes are returned parameter-major in input order regardless of
    /// completion order.
    pub fn evaluate(
        &self,
        params: &[ParameterSet],
        segments: &[Segment],
        label: &str,
    ) -> Result<Vec<JobOutcome>, SweepError> {
        match self.config.max_threads {
            Some(threads) if threads > 0 => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| SweepError::ThreadPool(e.to_string()))?;
                Ok(pool.install(|| self.evaluate_on_pool(params, segments, label)))
            }
            _ => Ok(self.evaluate_on_pool(params, segments, label)),
        }
    }

    fn evaluate_on_pool(&self, params: &[ParameterSet], segments: &[Segment], label: &str) -> Vec<JobOutcome> {
        let total = params.len() * segments.len();
        if total == 0 {
            return Vec::new();
        }

        let started = Instant::now();
        let budget = self.config.time_budget_secs.map(Duration::from_secs);
        let run_timeout = self.config.run_timeout_secs.map(Duration::from_secs);
        let budget_tripped = AtomicBool::new(false);
        let progress = AtomicUsize::new(0);
        let bar = self.config.show_progress.then(|| progress_bar(total, label));

        let jobs: Vec<(usize, usize)> = (0..params.len())
            .flat_map(|p| (0..segments.len()).map(move |s| (p, s)))
            .collect();

        let outcomes = jobs
            .par_iter()
            .map(|&(p, s)| {
                let result = self.run_job(
                    &params[p],
                    &segments[s],
                    started,
                    budget,
                    run_timeout,
                    &budget_tripped,
                );

                let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
                if done % (total / 10).max(1) == 0 || done == total {
                    let pct = done as f64 / total as f64 * 100.0;
                    info!("  {}: {:.0}% ({}/{} runs)", label, pct, done, total);
                }

                JobOutcome {
                    param_index: p,
                    segment_index: s,
                    result,
                }
            })
            .collect();

        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        outcomes
    }

    fn run_job(
        &self,
        params: &ParameterSet,
        segment: &Segment,
        started: Instant,
        budget: Option<Duration>,
        run_timeout: Option<Duration>,
        budget_tripped: &AtomicBool,
    ) -> JobResult {
        let cancelled = self.cancel.map(|c| c.load(Ordering::Relaxed)).unwrap_or(false);
        let remaining = match budget {
            Some(budget) => match budget.checked_sub(started.elapsed()) {
                Some(left) if !left.is_zero() => Some(left),
                _ => {
                    budget_tripped.store(true, Ordering::Relaxed);
                    None
                }
            },
            None => None,
        };
        if cancelled || budget_tripped.load(Ordering::Relaxed) {
            return JobResult::Skipped;
        }

        // The deadline is whichever comes first: the per-run bound or the sweep budget.
        let deadline = match (run_timeout, remaining) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let ctx = RunContext::new(self.cancel, deadline);
        let run_started = Instant::now();

        match self.engine.run(segment, params, self.cost, &ctx) {
            Ok(summary) => match run_timeout {
                Some(limit) if run_started.elapsed() > limit => JobResult::Failed {
                    kind: FailureKind::Timeout,
                    message: format!("Run exceeded {} ms", limit.as_millis()),
                },
                _ => JobResult::Done(summary),
            },
            Err(EngineError::Cancelled) => JobResult::Skipped,
            Err(EngineError::Timeout { limit_ms }) => {
                let budget_spent = budget.map(|b| started.elapsed() >= b).unwrap_or(false);
                let run_bound_hit = run_timeout.map(|l| run_started.elapsed() >= l).unwrap_or(false);
                if budget_spent && !run_bound_hit {
                    budget_tripped.store(true, Ordering::Relaxed);
                    JobResult::Skipped
                } else {
                    JobResult::Failed {
                        kind: FailureKind::Timeout,
                        message: format!("Run exceeded {} ms", limit_ms),
                    }
                }
            }
            Err(e) => JobResult::Failed {
                kind: FailureKind::Engine,
                message: e.to_string(),
            },
        }
    }
}

fn progress_bar(total: usize, label: &str) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar.set_message(label.to_string());
    bar
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::TimeRange;
    use crate::params::ParamValue;
    use chrono::{DateTime, Datelike, TimeZone, Utc};

    /// Engine returning `net = x * (month - 6)` for the segment's first month,
    /// failing when `fail` is set.
    pub(crate) struct LinearEngine;

    impl BacktestEngine for LinearEngine {
        fn strategy_id(&self) -> &str {
            "linear"
        }

        fn snapshot_id(&self) -> &str {
            "snap"
        }

        fn run(
            &self,
            segment: &Segment,
            params: &ParameterSet,
            _cost: &CostConfig,
            ctx: &RunContext<'_>,
        ) -> Result<RunSummary, EngineError> {
            ctx.check()?;
            if params.get("fail").and_then(ParamValue::as_bool).unwrap_or(false) {
                return Err(EngineError::Failed("boom".into()));
            }
            let x = params.float("x")?;
            let month = segment.range.start().month() as f64;
            let mut summary = RunSummary::flat("snap", "linear", params.clone(), segment.range, 1000.0);
            summary.net_pnl = x * (month - 6.0);
            summary.net_return_pct = summary.net_pnl / 10.0;
            summary.end_value = 1000.0 + summary.net_pnl;
            Ok(summary)
        }
    }

    /// Sleeps for a fixed time, then honours the run context.
    struct SlowEngine {
        millis: u64,
    }

    impl BacktestEngine for SlowEngine {
        fn strategy_id(&self) -> &str {
            "slow"
        }

        fn snapshot_id(&self) -> &str {
            "snap"
        }

        fn run(
            &self,
            segment: &Segment,
            params: &ParameterSet,
            _cost: &CostConfig,
            ctx: &RunContext<'_>,
        ) -> Result<RunSummary, EngineError> {
            std::thread::sleep(Duration::from_millis(self.millis));
            ctx.check()?;
            Ok(RunSummary::flat("snap", "slow", params.clone(), segment.range, 1000.0))
        }
    }

    pub(crate) fn ymd(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn windows() -> WindowSet {
        // Four quarterly OOS windows starting in Jan, Apr, Jul, Oct 2021
        let pre = TimeRange::new(ymd(2020, 1, 1), ymd(2022, 1, 1)).unwrap();
        WindowSet::generate(pre, 12, 3).unwrap()
    }

    #[test]
    fn test_sweep_collects_sorted_results() {
        let engine = LinearEngine;
        let cost = CostConfig::default();
        let space = CandidateSpace::new(vec![
            ParameterSet::new().with("x", 1.0),
            ParameterSet::new().with("x", -1.0),
        ]);
        let outcome = SweepDriver::new(&engine, &cost).run(&space, &windows()).unwrap();

        assert_eq!(outcome.candidates.len(), 2);
        assert!(!outcome.cancelled);
        let first = &outcome.candidates[0];
        assert_eq!(first.results.len(), 4);
        for pair in first.results.windows(2) {
            assert!(pair[0].window.oos.start() < pair[1].window.oos.start());
        }
        // Jan, Apr, Jul, Oct => -5, -2, 1, 4
        let nets: Vec<f64> = first.results.iter().map(|r| r.oos_summary.net_pnl).collect();
        assert_eq!(nets, vec![-5.0, -2.0, 1.0, 4.0]);
    }

    #[test]
    fn test_failures_are_isolated() {
        let engine = LinearEngine;
        let cost = CostConfig::default();
        let space = CandidateSpace::new(vec![
            ParameterSet::new().with("x", 1.0),
            ParameterSet::new().with("x", 2.0).with("fail", true),
        ]);
        let outcome = SweepDriver::new(&engine, &cost).run(&space, &windows()).unwrap();

        assert_eq!(outcome.failure_count(), 4);
        assert_eq!(outcome.candidates[1].results.len(), 0);
        assert_eq!(outcome.candidates[1].failed_windows, vec![0, 1, 2, 3]);
        assert_eq!(outcome.failures[0].kind, FailureKind::Engine);
        assert_eq!(outcome.candidates[0].results.len(), 4);
    }

    #[test]
    fn test_cancelled_sweep_discards_candidates() {
        let engine = LinearEngine;
        let cost = CostConfig::default();
        let space = CandidateSpace::new(vec![ParameterSet::new().with("x", 1.0)]);
        let cancel = AtomicBool::new(true);
        let outcome = SweepDriver::new(&engine, &cost)
            .with_cancel(&cancel)
            .run(&space, &windows())
            .unwrap();

        assert!(outcome.cancelled);
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.incomplete, vec![0]);
    }

    #[test]
    fn test_dedicated_pool_matches_global() {
        let engine = LinearEngine;
        let cost = CostConfig::default();
        let space = CandidateSpace::new((0..5).map(|i| ParameterSet::new().with("x", i as f64)));
        let global = SweepDriver::new(&engine, &cost).run(&space, &windows()).unwrap();
        let pooled = SweepDriver::new(&engine, &cost)
            .with_config(SweepConfig {
                max_threads: Some(2),
                ..SweepConfig::default()
            })
            .run(&space, &windows())
            .unwrap();

        for (a, b) in global.candidates.iter().zip(&pooled.candidates) {
            assert_eq!(a.results, b.results);
        }
    }

    #[test]
    fn test_slow_runs_fail_with_timeout() {
        let engine = SlowEngine { millis: 1200 };
        let cost = CostConfig::default();
        let space = CandidateSpace::new(vec![ParameterSet::new().with("x", 1.0)]);
        let outcome = SweepDriver::new(&engine, &cost)
            .with_config(SweepConfig {
                run_timeout_secs: Some(1),
                ..SweepConfig::default()
            })
            .run(&space, &windows())
            .unwrap();

        assert_eq!(outcome.failure_count(), 4);
        assert!(outcome.failures.iter().all(|f| f.kind == FailureKind::Timeout));
        assert!(!outcome.cancelled);
        assert!(outcome.incomplete.is_empty());
        assert_eq!(outcome.candidates[0].failed_windows, vec![0, 1, 2, 3]);
        assert!(outcome.candidates[0].results.is_empty());
    }

    #[test]
    fn test_spent_budget_cancels_sweep() {
        let engine = SlowEngine { millis: 400 };
        let cost = CostConfig::default();
        let space = CandidateSpace::new((0..8).map(|i| ParameterSet::new().with("x", i as f64)));
        let outcome = SweepDriver::new(&engine, &cost)
            .with_config(SweepConfig {
                max_threads: Some(2),
                time_budget_secs: Some(1),
                ..SweepConfig::default()
            })
            .run(&space, &windows())
            .unwrap();

        // Runs cut short by the budget are skipped, not failed
        assert!(outcome.cancelled);
        assert!(outcome.failures.is_empty());
        assert!(!outcome.incomplete.is_empty());
        assert_eq!(outcome.candidates.len() + outcome.incomplete.len(), 8);
        for run in &outcome.candidates {
            assert_eq!(run.results.len(), 4);
        }
    }
}
