//! Records produced by a freeze run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::backtest::{CostConfig, RunSummary};
use crate::data::TimeRange;
use crate::gates::{GateResult, WfaGateReport};
use crate::params::ParameterSet;
use crate::scorecard::Scorecard;
use crate::selection::SelectionRuleRecord;
use crate::walkforward::{CandidateAggregate, PairFailure};

/// OOS walk-forward statistics of the frozen candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WfaSummary {
    /// `fixed_params` or `retune_per_window`.
    pub wfa_mode: String,
    /// Registry id of the strategy.
    pub strategy: String,
    /// Snapshot the windows were measured on.
    pub snapshot_id: String,
    /// Windows with an OOS result.
    pub windows: usize,
    /// Fraction of windows with positive net P&L.
    pub pos_window_rate: f64,
    /// Mean OOS net return %.
    pub oos_net_return_mean: f64,
    /// Median OOS net return %.
    pub oos_net_return_median: f64,
    /// Lowest OOS net return %.
    pub oos_net_return_worst: f64,
    /// Size of the candidate space searched.
    pub n_trials: usize,
}

impl WfaSummary {
    pub fn fixed_params(strategy: &str, snapshot_id: &str, agg: &CandidateAggregate, n_trials: usize) -> Self {
        Self {
            wfa_mode: "fixed_params".to_string(),
            strategy: strategy.to_string(),
            snapshot_id: snapshot_id.to_string(),
            windows: agg.windows,
            pos_window_rate: agg.pos_window_rate,
            oos_net_return_mean: agg.mean,
            oos_net_return_median: agg.median,
            oos_net_return_worst: agg.worst,
            n_trials,
        }
    }
}

/// Inputs every artifact of a run was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Registry id of the strategy.
    pub strategy_id: String,
    /// Symbols traded, primary leg first.
    pub symbols: Vec<String>,
    /// Snapshot every run was measured on.
    pub snapshot_id: String,
    /// Size of the candidate space searched.
    pub n_trials: usize,
    /// Selection rule as applied.
    pub selection_rule: SelectionRuleRecord,
}

/// Hard gates applied to the frozen candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    /// Registry id of the strategy.
    pub strategy_id: String,
    /// Snapshot every gated run was measured on.
    pub snapshot_id: String,
    /// Size of the candidate space searched.
    pub n_trials: usize,
    /// Parameters of the frozen candidate.
    pub frozen_params: ParameterSet,
    /// Gates on the candidate's pooled OOS statistics.
    pub pre_oos: GateResult,
    /// Per-window gates and their pass rate.
    pub wfa: WfaGateReport,
    /// Gates on the held-out Test run.
    pub test: GateResult,
}

/// Identifies the run a scorecard belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorecardMeta {
    /// Always `freezeA`.
    pub run_kind: String,
    /// Walk-forward mode the robustness inputs came from.
    pub wfa_mode: String,
    /// Registry id of the strategy.
    pub strategy: String,
    /// Symbols traded, primary leg first.
    pub symbols: Vec<String>,
    /// Snapshot the scored runs were measured on.
    pub snapshot_id: String,
    /// Frozen parameters.
    pub chosen_params: ParameterSet,
    /// Size of the candidate space searched.
    pub n_trials: usize,
}

/// `scorecard.json`: the scorecard wrapped with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorecardRecord {
    /// Matches `FinalReport::generated_at`.
    pub generated_at: DateTime<Utc>,
    /// Run identification.
    pub meta: ScorecardMeta,
    /// The composed scorecard.
    pub scorecard: Scorecard,
}

/// Why a candidate never reached ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedCandidate {
    /// Candidate index.
    pub candidate: usize,
    /// Candidate parameters.
    pub params: ParameterSet,
    /// Why it was excluded.
    pub reason: String,
}

/// Everything recovered from rather than fatal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Engine invocations that failed or timed out.
    pub failed_runs: usize,
    /// One record per failed invocation.
    pub failures: Vec<PairFailure>,
    /// Candidates whose window results could not be aggregated.
    pub excluded_candidates: Vec<ExcludedCandidate>,
    /// Candidates discarded because the sweep was cancelled before they completed.
    pub incomplete_candidates: Vec<usize>,
    /// The sweep stopped on cancellation or its time budget.
    pub sweep_cancelled: bool,
    /// No candidate was eligible and the full ranking was used.
    pub fallback_used: bool,
    /// Basin neighbours with no summary.
    pub basin_failed_points: usize,
    /// Scorecard inputs that were unavailable.
    pub missing_metrics: Vec<String>,
}

impl Diagnostics {
    /// True when nothing was excluded, failed or degraded.
    pub fn is_clean(&self) -> bool {
        self.failed_runs == 0
            && self.excluded_candidates.is_empty()
            && self.incomplete_candidates.is_empty()
            && !self.sweep_cancelled
            && !self.fallback_used
            && self.basin_failed_points == 0
            && self.missing_metrics.is_empty()
    }
}

/// Walk-forward settings as applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WfaSettings {
    /// History length in years.
    pub years: u32,
    /// Train span of each window.
    pub train_months: u32,
    /// OOS span of each window.
    pub oos_months: u32,
    /// Windows in the Pre range.
    pub windows: usize,
    /// Selection rule as applied.
    pub selection_rule: SelectionRuleRecord,
    /// Size of the candidate space searched.
    pub n_trials: usize,
}

/// The single, final record of a freeze run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    /// Always `freezeA`.
    pub run_kind: String,
    /// Registry id of the strategy.
    pub strategy_id: String,
    /// Symbols traded, primary leg first.
    pub symbols: Vec<String>,
    /// Snapshot every run was measured on.
    pub snapshot_id: String,
    /// How the history was partitioned.
    pub split_policy: String,
    /// Full history range.
    pub history: TimeRange,
    /// Range used for search and selection.
    pub pre: TimeRange,
    /// Held-out range evaluated once.
    pub test: TimeRange,
    /// First instant of Test.
    pub cut_test_start: DateTime<Utc>,
    /// Walk-forward settings.
    pub wfa: WfaSettings,
    /// Candidates enumerated from the grid.
    pub candidate_space_size: usize,
    /// Parameters chosen on Pre.
    pub frozen_params: ParameterSet,
    /// No candidate was eligible and the full ranking was used.
    pub fallback_used: bool,
    /// OOS aggregate of the frozen candidate.
    pub selected_candidate: CandidateAggregate,
    /// Walk-forward statistics of the frozen candidate.
    pub pre_wfa_summary: WfaSummary,
    /// Median per-window basin pass rate.
    pub basin_pass_rate_median: Option<f64>,
    /// The single Test run.
    pub test_summary: RunSummary,
    /// Hard gates on the Test run.
    pub test_gate: GateResult,
    /// Scorecard total.
    pub total_score: f64,
    /// Deflated Sharpe ratio of the Test run.
    pub dsr: Option<f64>,
    /// Cost model every run used.
    pub cost: CostConfig,
    /// Recovered failures and degradations.
    pub diagnostics: Diagnostics,
    /// Wall-clock time the report was built; excluded from the fingerprint.
    pub generated_at: DateTime<Utc>,
}

impl FinalReport {
    /// SHA-256 of the report content with `generated_at` removed.
    ///
    /// Two runs over the same snapshot and configuration share a fingerprint.
    pub fn content_fingerprint(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.remove("generated_at");
        }
        let bytes = serde_json::to_vec(&value)?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }
}

/// Everything a freeze run produced, kept in memory.
#[derive(Debug, Clone)]
pub struct FreezeOutcome {
    /// The final report.
    pub report: FinalReport,
    /// Gate results of the frozen candidate.
    pub gate_report: GateReport,
    /// The composed scorecard.
    pub scorecard: Scorecard,
}
