//! The frozen selection handle and the single held-out Test evaluation.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backtest::{BacktestEngine, CostConfig, EngineError, RunContext, RunSummary, Segment};
use crate::params::ParameterSet;
use crate::walkforward::{CandidateAggregate, HeldOutTest};

use super::selector::{RankedCandidate, SelectionRule, SelectionRuleRecord};

/// Read-only record of a selection decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRecord {
    /// Selection rule as applied.
    pub rule: SelectionRuleRecord,
    /// Size of the candidate space searched.
    pub n_trials: usize,
    /// Candidates in the ranking.
    pub ranked_candidates: usize,
    /// Candidates that met the rule.
    pub eligible_candidates: usize,
    /// No candidate was eligible and the full ranking was used.
    pub fallback_used: bool,
    /// Parameters of the chosen candidate.
    pub frozen_params: ParameterSet,
    /// OOS aggregate of the chosen candidate.
    pub selected: CandidateAggregate,
}

/// The outcome of FreezeA selection.
///
/// Not `Clone`. The only way to reach the Test range is
/// [`FrozenSelection::evaluate_test`], which consumes both this handle and the
/// [`HeldOutTest`], so a selection cannot be revisited after Test is seen.
#[derive(Debug)]
pub struct FrozenSelection {
    rule: SelectionRule,
    ranking: Vec<RankedCandidate>,
    chosen: usize,
    eligible: usize,
    fallback_used: bool,
    n_trials: usize,
}

/// Test-range result of a frozen selection.
#[derive(Debug, Clone, Serialize)]
pub struct TestEvaluation {
    /// The decision that was evaluated.
    pub selection: SelectionRecord,
    /// The single Test run.
    pub summary: RunSummary,
}

impl FrozenSelection {
    pub(super) fn new(
        rule: SelectionRule,
        ranking: Vec<RankedCandidate>,
        chosen: usize,
        eligible: usize,
        fallback_used: bool,
        n_trials: usize,
    ) -> Self {
        Self {
            rule,
            ranking,
            chosen,
            eligible,
            fallback_used,
            n_trials,
        }
    }

    pub fn params(&self) -> &ParameterSet {
        &self.chosen().params
    }

    pub fn chosen(&self) -> &CandidateAggregate {
        &self.ranking[self.chosen].aggregate
    }

    pub fn fallback_used(&self) -> bool {
        self.fallback_used
    }

    pub fn eligible_count(&self) -> usize {
        self.eligible
    }

    pub fn n_trials(&self) -> usize {
        self.n_trials
    }

    /// Every ranked candidate, best first.
    pub fn ranking(&self) -> &[RankedCandidate] {
        &self.ranking
    }

    pub fn record(&self) -> SelectionRecord {
        SelectionRecord {
            rule: self.rule.record(),
            n_trials: self.n_trials,
            ranked_candidates: self.ranking.len(),
            eligible_candidates: self.eligible,
            fallback_used: self.fallback_used,
            frozen_params: self.params().clone(),
            selected: self.chosen().clone(),
        }
    }

    /// Run the frozen parameters once over the held-out Test range.
    pub fn evaluate_test(
        self,
        test: HeldOutTest,
        engine: &dyn BacktestEngine,
        cost: &CostConfig,
        ctx: &RunContext<'_>,
    ) -> Result<TestEvaluation, EngineError> {
        let record = self.record();
        let segment = Segment::new(test.range());
        info!("TEST: {} over {}", record.frozen_params, segment.range);

        let summary = engine.run(&segment, &record.frozen_params, cost, ctx)?;
        info!(
            "TEST: net {:.2} ({:.2}%), {} trades",
            summary.net_pnl, summary.net_return_pct, summary.trades.total_trades
        );

        Ok(TestEvaluation {
            selection: record,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TimeRange;
    use crate::selection::selector::tests::agg;
    use crate::selection::Selector;
    use crate::walkforward::sweep::tests::{ymd, LinearEngine};
    use crate::walkforward::Split;

    #[test]
    fn test_evaluate_test_runs_frozen_params() {
        let mut chosen = agg(0, 1.0, 1.0, 1.0, 1.0);
        chosen.params = ParameterSet::new().with("x", 2.0);
        let frozen = Selector::new(SelectionRule::default()).select(vec![chosen], 1).unwrap();

        let history = TimeRange::new(ymd(2019, 1, 1), ymd(2024, 1, 1)).unwrap();
        let (split, test) = Split::trailing(history, 12).unwrap();
        let engine = LinearEngine;

        let evaluation = frozen
            .evaluate_test(test, &engine, &CostConfig::default(), &RunContext::unbounded())
            .unwrap();
        assert_eq!(evaluation.summary.range, split.test);
        // Test starts in January: 2 * (1 - 6)
        assert_eq!(evaluation.summary.net_pnl, -10.0);
        assert_eq!(evaluation.selection.frozen_params, ParameterSet::new().with("x", 2.0));
        assert!(!evaluation.selection.fallback_used);
    }
}
