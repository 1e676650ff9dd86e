//! Basin evaluation: the share of a neighbourhood that still qualifies.
//!
//! A point qualifies when the hard gates pass and its profit factor is at
//! least `min_profit_factor` (an undefined profit factor does not qualify).
//! Points whose run failed or was cancelled count toward the grid but never
//! qualify.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::backtest::{RunSummary, Segment};
use crate::data::TimeRange;
use crate::gates::{evaluate_gate, GateConfig, GateResult};
use crate::metrics::{mean, median, min};
use crate::params::ParameterSet;
use crate::walkforward::{JobResult, SweepDriver, SweepError, WindowSet};

use super::grid::BasinConfig;

/// One evaluated neighbour.
#[derive(Debug, Clone, Serialize)]
pub struct BasinPoint {
    /// Neighbour parameters.
    pub params: ParameterSet,
    /// Run summary; `None` when the run failed.
    pub summary: Option<RunSummary>,
    /// Hard gate result of the run.
    pub gate: Option<GateResult>,
    /// Profit factor reached the configured minimum.
    pub profit_factor_ok: bool,
    /// Passed both the hard gate and the profit factor floor.
    pub qualifies: bool,
    /// Engine error for a failed run.
    pub error: Option<String>,
}

/// Single-segment basin result.
#[derive(Debug, Clone, Serialize)]
pub struct BasinReport {
    /// Snapshot the neighbours were measured on.
    pub snapshot_id: String,
    /// Centre of the neighbourhood.
    pub base_params: ParameterSet,
    /// Range each neighbour was run over.
    pub segment: TimeRange,
    /// Neighbours evaluated, base included.
    pub grid_points: usize,
    /// Neighbours that qualify.
    pub passed_points: usize,
    /// `passed_points / grid_points`.
    pub pass_rate: f64,
    /// Points with no summary (engine failure or cancellation).
    pub failed_points: usize,
    /// Neighbourhood settings used.
    pub config: BasinConfig,
    /// Hard gate thresholds used.
    pub gate: GateConfig,
    /// Every evaluated neighbour; written to the grid artifact only.
    #[serde(skip)]
    pub points: Vec<BasinPoint>,
}

/// Basin result for one OOS window in per-window mode.
#[derive(Debug, Clone, Serialize)]
pub struct BasinWindow {
    /// Walk-forward window index.
    pub window: usize,
    /// Start of the OOS range.
    pub oos_start: DateTime<Utc>,
    /// End of the OOS range (exclusive).
    pub oos_end: DateTime<Utc>,
    /// Neighbours evaluated, base included.
    pub grid_points: usize,
    /// Neighbours that qualify.
    pub passed_points: usize,
    /// `passed_points / grid_points`.
    pub pass_rate: f64,
    /// Neighbours with no summary.
    pub failed_points: usize,
    /// Every evaluated neighbour; written to the grid artifact only.
    #[serde(skip)]
    pub points: Vec<BasinPoint>,
}

/// Per-window basin pass rates reduced across windows.
#[derive(Debug, Clone, Serialize)]
pub struct BasinWindowsReport {
    /// Snapshot the neighbours were measured on.
    pub snapshot_id: String,
    /// Centre of the neighbourhood.
    pub base_params: ParameterSet,
    /// Neighbours per window, base included.
    pub grid_points: usize,
    /// Per-window results in chronological order.
    pub windows: Vec<BasinWindow>,
    /// Mean of the per-window pass rates.
    pub pass_rate_mean: Option<f64>,
    /// Median of the per-window pass rates.
    pub pass_rate_median: Option<f64>,
    /// Lowest per-window pass rate.
    pub pass_rate_worst: Option<f64>,
    /// Neighbourhood settings used.
    pub config: BasinConfig,
    /// Hard gate thresholds used.
    pub gate: GateConfig,
}

/// Runs perturbation grids through the sweep driver.
pub struct BasinEvaluator<'a> {
    driver: &'a SweepDriver<'a>,
    config: BasinConfig,
    gate: GateConfig,
}

impl<'a> BasinEvaluator<'a> {
    pub fn new(driver: &'a SweepDriver<'a>, config: BasinConfig, gate: GateConfig) -> Self {
        Self { driver, config, gate }
    }

    /// Qualification of one run outcome.
    pub fn assess(&self, params: ParameterSet, result: JobResult) -> BasinPoint {
        match result {
            JobResult::Done(summary) => {
                let gate = evaluate_gate(&summary, &self.gate);
                let profit_factor_ok = summary
                    .trades
                    .profit_factor
                    .map(|pf| pf >= self.config.min_profit_factor)
                    .unwrap_or(false);
                BasinPoint {
                    params,
                    qualifies: gate.ok && profit_factor_ok,
                    summary: Some(summary),
                    gate: Some(gate),
                    profit_factor_ok,
                    error: None,
                }
            }
            JobResult::Failed { message, .. } => Self::unevaluated(params, message),
            JobResult::Skipped => Self::unevaluated(params, "cancelled".to_string()),
        }
    }

    fn unevaluated(params: ParameterSet, error: String) -> BasinPoint {
        BasinPoint {
            params,
            summary: None,
            gate: None,
            profit_factor_ok: false,
            qualifies: false,
            error: Some(error),
        }
    }

    /// Evaluate the neighbourhood of `base` over one segment.
    pub fn evaluate(&self, base: &ParameterSet, segment: &Segment) -> Result<BasinReport, SweepError> {
        let grid = self.config.grid(base);
        info!("Basin: {} points around {} over {}", grid.len(), base, segment.range);

        let outcomes = self.driver.evaluate(&grid, std::slice::from_ref(segment), "basin")?;
        let points: Vec<BasinPoint> = outcomes
            .into_iter()
            .map(|o| self.assess(grid[o.param_index].clone(), o.result))
            .collect();
        let (passed, failed) = tally(&points);

        Ok(BasinReport {
            snapshot_id: self.driver.engine().snapshot_id().to_string(),
            base_params: base.clone(),
            segment: segment.range,
            grid_points: points.len(),
            passed_points: passed,
            pass_rate: passed as f64 / points.len() as f64,
            failed_points: failed,
            config: self.config.clone(),
            gate: self.gate.clone(),
            points,
        })
    }

    /// Evaluate the neighbourhood of `base` separately in every OOS window.
    pub fn evaluate_windows(&self, base: &ParameterSet, windows: &WindowSet) -> Result<BasinWindowsReport, SweepError> {
        let grid = self.config.grid(base);
        let segments: Vec<Segment> = windows
            .iter()
            .map(|w| Segment::with_warmup(w.oos, w.train.start()))
            .collect();
        info!(
            "Basin per window: {} points around {} x {} windows",
            grid.len(),
            base,
            windows.len()
        );

        let outcomes = self.driver.evaluate(&grid, &segments, "basin")?;
        let mut per_window: Vec<Vec<BasinPoint>> = vec![Vec::with_capacity(grid.len()); windows.len()];
        for outcome in outcomes {
            let point = self.assess(grid[outcome.param_index].clone(), outcome.result);
            per_window[outcome.segment_index].push(point);
        }

        let rows: Vec<BasinWindow> = windows
            .iter()
            .zip(per_window)
            .map(|(w, points)| {
                let (passed, failed) = tally(&points);
                BasinWindow {
                    window: w.index,
                    oos_start: w.oos.start(),
                    oos_end: w.oos.end(),
                    grid_points: points.len(),
                    passed_points: passed,
                    pass_rate: passed as f64 / points.len().max(1) as f64,
                    failed_points: failed,
                    points,
                }
            })
            .collect();

        for row in &rows {
            info!(
                "  Basin window {}: pass rate {:.4} ({}/{})",
                row.window, row.pass_rate, row.passed_points, row.grid_points
            );
        }

        let rates: Vec<f64> = rows.iter().map(|r| r.pass_rate).collect();
        Ok(BasinWindowsReport {
            snapshot_id: self.driver.engine().snapshot_id().to_string(),
            base_params: base.clone(),
            grid_points: grid.len(),
            pass_rate_mean: mean(&rates),
            pass_rate_median: median(&rates),
            pass_rate_worst: min(&rates),
            windows: rows,
            config: self.config.clone(),
            gate: self.gate.clone(),
        })
    }
}

fn tally(points: &[BasinPoint]) -> (usize, usize) {
    let passed = points.iter().filter(|p| p.qualifies).count();
    let failed = points.iter().filter(|p| p.summary.is_none()).count();
    (passed, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{BacktestEngine, CostConfig, EngineError, RunContext};
    use crate::basin::Perturbation;
    use crate::walkforward::sweep::tests::ymd;

    /// Qualifies exactly when `a + b <= limit`.
    struct RidgeEngine {
        limit: i64,
    }

    impl BacktestEngine for RidgeEngine {
        fn strategy_id(&self) -> &str {
            "ridge"
        }

        fn snapshot_id(&self) -> &str {
            "snap"
        }

        fn run(
            &self,
            segment: &Segment,
            params: &ParameterSet,
            _cost: &CostConfig,
            _ctx: &RunContext<'_>,
        ) -> Result<RunSummary, EngineError> {
            let a = params.int("a")?;
            let b = params.int("b")?;
            let mut s = RunSummary::flat("snap", "ridge", params.clone(), segment.range, 1000.0);
            s.max_drawdown_intrabar_pct = Some(1.0);
            s.trades.total_trades = 1000;
            s.net_pnl = 10.0;
            s.trades.profit_factor = Some(if a + b <= self.limit { 1.5 } else { 0.8 });
            Ok(s)
        }
    }

    fn config() -> BasinConfig {
        BasinConfig::default()
            .with_rule("a", Perturbation::Absolute(vec![1, 2]))
            .with_rule("b", Perturbation::Absolute(vec![1, 2]))
    }

    #[test]
    fn test_pass_rate_over_grid() {
        // a, b in {3..7}; a + b <= 9 holds for 10 of 25 points
        let engine = RidgeEngine { limit: 9 };
        let cost = CostConfig::default();
        let driver = SweepDriver::new(&engine, &cost);
        let evaluator = BasinEvaluator::new(&driver, config(), GateConfig::default());
        let base = ParameterSet::new().with("a", 5i64).with("b", 5i64);
        let segment = Segment::new(TimeRange::new(ymd(2022, 1, 1), ymd(2022, 4, 1)).unwrap());

        let report = evaluator.evaluate(&base, &segment).unwrap();
        assert_eq!(report.grid_points, 25);
        assert_eq!(report.passed_points, 10);
        assert!((report.pass_rate - 0.4).abs() < 1e-12);
        assert_eq!(report.failed_points, 0);
    }

    #[test]
    fn test_undefined_profit_factor_does_not_qualify() {
        let engine = RidgeEngine { limit: 100 };
        let cost = CostConfig::default();
        let driver = SweepDriver::new(&engine, &cost);
        let evaluator = BasinEvaluator::new(&driver, config(), GateConfig::default());
        let range = TimeRange::new(ymd(2022, 1, 1), ymd(2022, 4, 1)).unwrap();

        let mut summary = RunSummary::flat("snap", "ridge", ParameterSet::new(), range, 1000.0);
        summary.trades.total_trades = 1000;
        summary.net_pnl = 5.0;
        let point = evaluator.assess(ParameterSet::new(), JobResult::Done(summary));
        assert!(point.gate.unwrap().ok);
        assert!(!point.qualifies);
    }

    #[test]
    fn test_failed_points_count_but_never_qualify() {
        let engine = RidgeEngine { limit: 100 };
        let cost = CostConfig::default();
        let driver = SweepDriver::new(&engine, &cost);
        // Without `b` every run is rejected with a parameter error
        let evaluator = BasinEvaluator::new(&driver, config(), GateConfig::default());
        let base = ParameterSet::new().with("a", 5i64);
        let segment = Segment::new(TimeRange::new(ymd(2022, 1, 1), ymd(2022, 4, 1)).unwrap());

        let report = evaluator.evaluate(&base, &segment).unwrap();
        assert_eq!(report.grid_points, 5);
        assert_eq!(report.failed_points, 5);
        assert_eq!(report.pass_rate, 0.0);
    }

    #[test]
    fn test_per_window_mode() {
        let engine = RidgeEngine { limit: 9 };
        let cost = CostConfig::default();
        let driver = SweepDriver::new(&engine, &cost);
        let evaluator = BasinEvaluator::new(&driver, config(), GateConfig::default());
        let base = ParameterSet::new().with("a", 5i64).with("b", 5i64);
        let pre = TimeRange::new(ymd(2020, 1, 1), ymd(2021, 7, 1)).unwrap();
        let windows = WindowSet::generate(pre, 12, 3).unwrap();

        let report = evaluator.evaluate_windows(&base, &windows).unwrap();
        assert_eq!(report.windows.len(), 2);
        assert_eq!(report.grid_points, 25);
        assert_eq!(report.pass_rate_median, Some(0.4));
        assert_eq!(report.pass_rate_worst, Some(0.4));
        assert_eq!(report.snapshot_id, "snap");
    }
}
