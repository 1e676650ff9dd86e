//! FreezeA orchestration.
//!
//! Everything up to FROZEN sees only the Pre range. The held-out Test range is
//! evaluated exactly once, through the frozen selection handle, and nothing
//! is ranked again afterwards.

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::artifacts::{ArtifactError, ArtifactSink};
use crate::backtest::{BacktestEngine, EngineError, RunContext};
use crate::basin::BasinEvaluator;
use crate::config::FreezeConfig;
use crate::data::TimeRange;
use crate::gates::{evaluate_gate, evaluate_wfa_gate};
use crate::params::{CandidateSpace, ParameterGrid};
use crate::scorecard::{ScorecardComposer, ScorecardInputs};
use crate::selection::{SelectionError, Selector};
use crate::strategy::{CatalogError, StrategyCatalog};
use crate::walkforward::{
    retune_per_window, trailing_history, CandidateAggregate, HeldOutTest, RetuneReport, Split, SweepDriver,
    SweepError, WindowError, WindowResult, WindowSet,
};

use super::report::{
    Diagnostics, ExcludedCandidate, FinalReport, FreezeOutcome, GateReport, Provenance, ScorecardMeta,
    ScorecardRecord, WfaSettings, WfaSummary,
};

/// Data may start this many days after the requested history start.
pub const COVERAGE_SLACK_DAYS: i64 = 7;

#[derive(Error, Debug)]
pub enum FreezeError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error("Empty candidate space for {0}")]
    EmptyCandidateSpace(String),

    #[error(transparent)]
    Sweep(#[from] SweepError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("Test evaluation failed: {0}")]
    TestRun(EngineError),

    #[error("Cannot write artifacts: {0}")]
    Artifact(#[from] ArtifactError),
}

/// What to freeze and how.
#[derive(Debug, Clone)]
pub struct FreezeRequest {
    /// Registry id of the strategy to freeze.
    pub strategy_id: String,
    /// Symbols to trade, primary leg first.
    pub symbols: Vec<String>,
    /// Run configuration.
    pub config: FreezeConfig,
    /// Replaces the strategy's default grid.
    pub grid_override: Option<ParameterGrid>,
}

impl FreezeRequest {
    pub fn new(strategy_id: &str, symbols: Vec<String>) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            symbols,
            config: FreezeConfig::default(),
            grid_override: None,
        }
    }

    pub fn with_config(mut self, config: FreezeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_grid(mut self, grid: ParameterGrid) -> Self {
        self.grid_override = Some(grid);
        self
    }
}

/// Ranges and candidates fixed before any evaluation.
struct Plan {
    space: CandidateSpace,
    split: Split,
    test: HeldOutTest,
    windows: WindowSet,
}

pub struct FreezeOrchestrator<'a> {
    catalog: &'a StrategyCatalog,
    request: FreezeRequest,
}

impl<'a> FreezeOrchestrator<'a> {
    pub fn new(catalog: &'a StrategyCatalog, request: FreezeRequest) -> Self {
        Self { catalog, request }
    }

    pub fn request(&self) -> &FreezeRequest {
        &self.request
    }

    /// Catalog, candidate space and ranges. Every fatal error surfaces here.
    fn plan(&self, coverage: Option<TimeRange>) -> Result<Plan, FreezeError> {
        let req = &self.request;
        let spec = self.catalog.get(&req.strategy_id)?;
        spec.check_legs(&req.symbols)?;

        let grid = req
            .grid_override
            .clone()
            .unwrap_or_else(|| spec.default_parameter_grid());
        let space = CandidateSpace::from_grid(&grid);
        if space.is_empty() {
            return Err(FreezeError::EmptyCandidateSpace(req.strategy_id.clone()));
        }

        let coverage = coverage.ok_or_else(|| {
            FreezeError::DataUnavailable(format!("no bars for {}", req.symbols.join(",")))
        })?;
        let wfa = &req.config.wfa;
        let history = trailing_history(coverage.end() - chrono::Duration::seconds(1), wfa.years)?;
        if coverage.start() > history.start() + chrono::Duration::days(COVERAGE_SLACK_DAYS) {
            return Err(FreezeError::DataUnavailable(format!(
                "{} years requested from {}, data covers {}",
                wfa.years,
                history.start().format("%Y-%m-%d"),
                coverage
            )));
        }

        let (split, test) = Split::trailing(history, wfa.test_months)?;
        let windows = WindowSet::generate(split.pre, wfa.train_months, wfa.oos_months)?;

        info!("History: {}", split.history);
        info!("Pre: {}  Test: {}", split.pre, split.test);
        info!(
            "{} windows ({}m train / {}m OOS), {} candidates",
            windows.len(),
            wfa.train_months,
            wfa.oos_months,
            space.n_trials()
        );

        Ok(Plan {
            space,
            split,
            test,
            windows,
        })
    }

    fn driver<'d>(&'d self, engine: &'d dyn BacktestEngine, cancel: &'d AtomicBool) -> SweepDriver<'d> {
        SweepDriver::new(engine, &self.request.config.cost)
            .with_config(self.request.config.sweep.clone())
            .with_cancel(cancel)
    }

    /// Run FreezeA end to end and write every artifact to `sink`.
    pub fn run(
        &self,
        coverage: Option<TimeRange>,
        engine: &dyn BacktestEngine,
        sink: &mut dyn ArtifactSink,
        cancel: &AtomicBool,
    ) -> Result<FreezeOutcome, FreezeError> {
        let req = &self.request;
        let config = &req.config;
        let plan = self.plan(coverage)?;
        let n_trials = plan.space.n_trials();
        let driver = self.driver(engine, cancel);

        // Pre: sweep, aggregate, select
        let sweep = driver.run(&plan.space, &plan.windows)?;
        let mut diagnostics = Diagnostics {
            failed_runs: sweep.failure_count(),
            failures: sweep.failures.clone(),
            incomplete_candidates: sweep.incomplete.clone(),
            sweep_cancelled: sweep.cancelled,
            ..Diagnostics::default()
        };

        let mut aggregates = Vec::with_capacity(sweep.candidates.len());
        for run in &sweep.candidates {
            match CandidateAggregate::from_run(run) {
                Ok(agg) => aggregates.push(agg),
                Err(err) => {
                    warn!("Candidate {} excluded: {}", run.index, err);
                    diagnostics.excluded_candidates.push(ExcludedCandidate {
                        candidate: run.index,
                        params: run.params.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let provenance = Provenance {
            strategy_id: req.strategy_id.clone(),
            symbols: req.symbols.clone(),
            snapshot_id: engine.snapshot_id().to_string(),
            n_trials,
            selection_rule: config.selection.record(),
        };
        let frozen = Selector::new(config.selection.clone()).select(aggregates, n_trials)?;
        sink.write_candidates(&provenance, frozen.ranking())?;
        let chosen = frozen.chosen().clone();
        diagnostics.fallback_used = frozen.fallback_used();

        let chosen_results: &[WindowResult] = sweep
            .candidates
            .iter()
            .find(|run| run.index == chosen.candidate)
            .map(|run| run.results.as_slice())
            .unwrap_or(&[]);
        let wfa_gate = evaluate_wfa_gate(chosen_results, &config.gate, &config.wfa_gate);
        let pre_oos_gate = evaluate_gate(&chosen, &config.gate);
        sink.write_wfa_windows(chosen_results)?;

        // Basin around the frozen point, still inside Pre
        let basin = BasinEvaluator::new(&driver, config.basin.clone(), config.gate.clone())
            .evaluate_windows(&chosen.params, &plan.windows)?;
        diagnostics.basin_failed_points = basin.windows.iter().map(|w| w.failed_points).sum();
        sink.write_basin(&basin)?;

        // The one Test invocation
        let ctx = RunContext::new(Some(cancel), config.sweep.run_timeout_secs.map(Duration::from_secs));
        let evaluation = frozen
            .evaluate_test(plan.test, engine, &config.cost, &ctx)
            .map_err(FreezeError::TestRun)?;
        let test_gate = evaluate_gate(&evaluation.summary, &config.gate);

        let inputs = ScorecardInputs::from_test(
            Some(chosen.pos_window_rate),
            basin.pass_rate_median,
            &evaluation.summary,
            n_trials,
        );
        let scorecard = ScorecardComposer::new(config.scorecard.clone()).compose(inputs);
        diagnostics.missing_metrics = scorecard.missing.clone();

        let wfa_summary = WfaSummary::fixed_params(&req.strategy_id, engine.snapshot_id(), &chosen, n_trials);
        let gate_report = GateReport {
            strategy_id: req.strategy_id.clone(),
            snapshot_id: provenance.snapshot_id.clone(),
            n_trials,
            frozen_params: chosen.params.clone(),
            pre_oos: pre_oos_gate,
            wfa: wfa_gate,
            test: test_gate.clone(),
        };

        if diagnostics.fallback_used {
            warn!("Selection used FALLBACK: no candidate met the pos_window_rate filter");
        }
        if !diagnostics.is_clean() {
            warn!(
                "Diagnostics: {} failed runs, {} excluded, {} incomplete, {} basin failures, missing {:?}",
                diagnostics.failed_runs,
                diagnostics.excluded_candidates.len(),
                diagnostics.incomplete_candidates.len(),
                diagnostics.basin_failed_points,
                diagnostics.missing_metrics
            );
        }

        let report = FinalReport {
            run_kind: "freezeA".to_string(),
            strategy_id: req.strategy_id.clone(),
            symbols: req.symbols.clone(),
            snapshot_id: provenance.snapshot_id.clone(),
            split_policy: format!("trailing_{}m_test", config.wfa.test_months),
            history: plan.split.history,
            pre: plan.split.pre,
            test: plan.split.test,
            cut_test_start: plan.split.test.start(),
            wfa: WfaSettings {
                years: config.wfa.years,
                train_months: config.wfa.train_months,
                oos_months: config.wfa.oos_months,
                windows: plan.windows.len(),
                selection_rule: evaluation.selection.rule.clone(),
                n_trials,
            },
            candidate_space_size: n_trials,
            frozen_params: chosen.params.clone(),
            fallback_used: diagnostics.fallback_used,
            selected_candidate: chosen,
            pre_wfa_summary: wfa_summary.clone(),
            basin_pass_rate_median: basin.pass_rate_median,
            test_summary: evaluation.summary,
            test_gate,
            total_score: scorecard.total_score,
            dsr: scorecard.dsr,
            cost: config.cost.clone(),
            diagnostics,
            generated_at: Utc::now(),
        };

        sink.write_gate_report(&gate_report)?;
        sink.write_wfa_summary(&wfa_summary)?;
        sink.write_scorecard(&ScorecardRecord {
            generated_at: report.generated_at,
            meta: ScorecardMeta {
                run_kind: report.run_kind.clone(),
                wfa_mode: wfa_summary.wfa_mode.clone(),
                strategy: provenance.strategy_id.clone(),
                symbols: provenance.symbols.clone(),
                snapshot_id: provenance.snapshot_id.clone(),
                chosen_params: report.frozen_params.clone(),
                n_trials,
            },
            scorecard: scorecard.clone(),
        })?;
        sink.write_final_report(&report)?;

        info!(
            "FreezeA done: {} score {:.1}, test net {:.2}%, gate {}",
            report.frozen_params,
            report.total_score,
            report.test_summary.net_return_pct,
            if report.test_gate.ok { "PASS" } else { "FAIL" }
        );

        Ok(FreezeOutcome {
            report,
            gate_report,
            scorecard,
        })
    }

    /// Retune-per-window diagnostic over the Pre windows. Never touches Test.
    pub fn retune(
        &self,
        coverage: Option<TimeRange>,
        engine: &dyn BacktestEngine,
        sink: &mut dyn ArtifactSink,
        cancel: &AtomicBool,
    ) -> Result<RetuneReport, FreezeError> {
        let plan = self.plan(coverage)?;
        let driver = self.driver(engine, cancel);
        let report = retune_per_window(&driver, &plan.space, &plan.windows, &self.request.config.retune)?;

        info!(
            "Retune: {}/{} windows evaluated, pos_window_rate {:?}, median OOS {:?}",
            report.evaluated_windows,
            report.windows.len(),
            report.pos_window_rate,
            report.median_oos_return_pct
        );
        sink.write_retune(&report)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::NullSink;
    use crate::walkforward::sweep::tests::{ymd, LinearEngine};

    fn catalog() -> StrategyCatalog {
        StrategyCatalog::with_builtins()
    }

    fn request() -> FreezeRequest {
        let mut config = FreezeConfig::default();
        config.wfa.years = 3;
        FreezeRequest::new("rsi2", vec!["QQQ".to_string()])
            .with_config(config)
            .with_grid(ParameterGrid::new().float_param("x", &[-1.0, 1.0]))
    }

    #[test]
    fn test_unknown_strategy_is_fatal() {
        let catalog = catalog();
        let req = FreezeRequest::new("nope", vec!["QQQ".to_string()]);
        let engine = LinearEngine;
        let cancel = AtomicBool::new(false);
        let coverage = TimeRange::new(ymd(2018, 1, 1), ymd(2024, 1, 1)).ok();
        let result = FreezeOrchestrator::new(&catalog, req).run(coverage, &engine, &mut NullSink, &cancel);
        assert!(matches!(result, Err(FreezeError::Catalog(_))));
    }

    #[test]
    fn test_short_coverage_is_data_unavailable() {
        let catalog = catalog();
        let engine = LinearEngine;
        let cancel = AtomicBool::new(false);
        let coverage = TimeRange::new(ymd(2022, 1, 1), ymd(2024, 1, 1)).ok();
        let result = FreezeOrchestrator::new(&catalog, request()).run(coverage, &engine, &mut NullSink, &cancel);
        assert!(matches!(result, Err(FreezeError::DataUnavailable(_))));

        let result = FreezeOrchestrator::new(&catalog, request()).run(None, &engine, &mut NullSink, &cancel);
        assert!(matches!(result, Err(FreezeError::DataUnavailable(_))));
    }

    #[test]
    fn test_empty_grid_is_fatal() {
        let catalog = catalog();
        let engine = LinearEngine;
        let cancel = AtomicBool::new(false);
        let req = request().with_grid(ParameterGrid::new());
        let coverage = TimeRange::new(ymd(2018, 1, 1), ymd(2024, 1, 1)).ok();
        let result = FreezeOrchestrator::new(&catalog, req).run(coverage, &engine, &mut NullSink, &cancel);
        assert!(matches!(result, Err(FreezeError::EmptyCandidateSpace(_))));
    }

    #[test]
    fn test_cancelled_run_leaves_nothing_to_freeze() {
        let catalog = catalog();
        let engine = LinearEngine;
        let cancel = AtomicBool::new(true);
        let coverage = TimeRange::new(ymd(2018, 1, 1), ymd(2024, 1, 1)).ok();
        let result = FreezeOrchestrator::new(&catalog, request()).run(coverage, &engine, &mut NullSink, &cancel);
        assert!(matches!(
            result,
            Err(FreezeError::Selection(SelectionError::NoEvaluableCandidate { n_trials: 2 }))
        ));
    }
}
