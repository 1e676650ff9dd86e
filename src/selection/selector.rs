//! FreezeA selection rule.
//!
//! FILTER: keep candidates with `pos_window_rate >= min_pos_window_rate`.
//! RANK: median OOS return desc, then worst desc, then mean desc, then
//! enumeration order.
//! ACCEPT: freeze the top filtered candidate.
//! FALLBACK: nothing passed the filter; freeze the top of the unfiltered
//! ranking and flag it.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::walkforward::CandidateAggregate;

use super::frozen::FrozenSelection;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("No evaluable candidate among {n_trials} trials")]
    NoEvaluableCandidate { n_trials: usize },
}

/// Ranking keys, highest priority first.
pub const SORT_KEYS: [&str; 3] = ["median_desc", "worst_desc", "mean_desc"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionRule {
    /// Lowest positive window rate a candidate may have to be eligible.
    pub min_pos_window_rate: f64,
}

impl Default for SelectionRule {
    fn default() -> Self {
        Self {
            min_pos_window_rate: 0.70,
        }
    }
}

/// Serializable description of the rule as applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRuleRecord {
    /// Eligibility floor on the positive window rate.
    pub min_pos_window_rate: f64,
    /// Ranking keys, highest priority first.
    pub sort: Vec<String>,
    /// Order among candidates equal on every key.
    pub tie_break: String,
    /// What happens when no candidate is eligible.
    pub fallback: String,
}

impl SelectionRule {
    pub fn record(&self) -> SelectionRuleRecord {
        SelectionRuleRecord {
            min_pos_window_rate: self.min_pos_window_rate,
            sort: SORT_KEYS.iter().map(|k| k.to_string()).collect(),
            tie_break: "candidate_index_asc".to_string(),
            fallback: "rank_all_candidates_if_none_eligible".to_string(),
        }
    }

    pub fn is_eligible(&self, agg: &CandidateAggregate) -> bool {
        agg.pos_window_rate >= self.min_pos_window_rate
    }
}

/// A candidate's position in the ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    /// 1-based position in the full ranking.
    pub rank: usize,
    /// Met the selection rule.
    pub eligible: bool,
    /// OOS aggregate the rank was computed from.
    pub aggregate: CandidateAggregate,
}

/// Total order used by RANK.
pub fn rank_order(a: &CandidateAggregate, b: &CandidateAggregate) -> Ordering {
    b.median
        .total_cmp(&a.median)
        .then_with(|| b.worst.total_cmp(&a.worst))
        .then_with(|| b.mean.total_cmp(&a.mean))
        .then_with(|| a.candidate.cmp(&b.candidate))
}

pub struct Selector {
    rule: SelectionRule,
}

impl Selector {
    pub fn new(rule: SelectionRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &SelectionRule {
        &self.rule
    }

    /// Run FILTER, RANK and ACCEPT/FALLBACK, freezing one candidate.
    ///
    /// Fails only when there is no aggregate at all.
    pub fn select(
        &self,
        mut aggregates: Vec<CandidateAggregate>,
        n_trials: usize,
    ) -> Result<FrozenSelection, SelectionError> {
        if aggregates.is_empty() {
            return Err(SelectionError::NoEvaluableCandidate { n_trials });
        }

        let eligible = aggregates.iter().filter(|a| self.rule.is_eligible(a)).count();
        info!(
            "FILTER: {}/{} candidates with pos_window_rate >= {:.2}",
            eligible,
            aggregates.len(),
            self.rule.min_pos_window_rate
        );

        aggregates.sort_by(rank_order);
        let ranking: Vec<RankedCandidate> = aggregates
            .into_iter()
            .enumerate()
            .map(|(i, aggregate)| RankedCandidate {
                rank: i + 1,
                eligible: self.rule.is_eligible(&aggregate),
                aggregate,
            })
            .collect();
        info!("RANK: ordered by {}", SORT_KEYS.join(", "));

        let fallback_used = eligible == 0;
        let chosen = if fallback_used {
            warn!(
                "FALLBACK: no candidate reached pos_window_rate {:.2}; ranking all {} candidates",
                self.rule.min_pos_window_rate,
                ranking.len()
            );
            0
        } else {
            ranking.iter().position(|r| r.eligible).unwrap_or(0)
        };

        let top = &ranking[chosen].aggregate;
        if !fallback_used {
            info!("ACCEPT: candidate {} at rank {}", top.candidate, chosen + 1);
        }
        info!(
            "FROZEN: {} (median {:.4}, worst {:.4}, mean {:.4}, pos_window_rate {:.2}, fallback {})",
            top.params, top.median, top.worst, top.mean, top.pos_window_rate, fallback_used
        );

        Ok(FrozenSelection::new(
            self.rule.clone(),
            ranking,
            chosen,
            eligible,
            fallback_used,
            n_trials,
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::params::ParameterSet;

    pub(crate) fn agg(candidate: usize, pos: f64, median: f64, worst: f64, mean: f64) -> CandidateAggregate {
        CandidateAggregate {
            candidate,
            params: ParameterSet::new().with("theta", candidate as i64),
            windows: 10,
            pos_window_rate: pos,
            mean,
            median,
            worst,
            total_net_pnl: 0.0,
            total_trades: 0,
            covered_days: 0.0,
            worst_intrabar_dd_pct: None,
            avg_hold_bars: None,
            failed_windows: 0,
        }
    }

    fn space() -> Vec<CandidateAggregate> {
        vec![
            agg(1, 0.80, 2.0, -1.0, 2.0),
            agg(2, 0.60, 5.0, -1.0, 5.0),
            agg(3, 0.75, 3.0, -1.0, 3.0),
        ]
    }

    #[test]
    fn test_accepts_best_filtered_candidate() {
        let frozen = Selector::new(SelectionRule::default()).select(space(), 3).unwrap();
        assert_eq!(frozen.chosen().candidate, 3);
        assert!(!frozen.fallback_used());
        assert_eq!(frozen.eligible_count(), 2);
    }

    #[test]
    fn test_fallback_ranks_everything() {
        let rule = SelectionRule {
            min_pos_window_rate: 0.90,
        };
        let frozen = Selector::new(rule).select(space(), 3).unwrap();
        assert_eq!(frozen.chosen().candidate, 2);
        assert!(frozen.fallback_used());
        assert_eq!(frozen.eligible_count(), 0);
    }

    #[test]
    fn test_tie_breaks() {
        let rule = SelectionRule::default();
        let tied = vec![
            agg(0, 1.0, 2.0, -3.0, 9.0),
            agg(1, 1.0, 2.0, -1.0, 1.0),
            agg(2, 1.0, 2.0, -1.0, 4.0),
        ];
        let frozen = Selector::new(rule.clone()).select(tied, 3).unwrap();
        assert_eq!(frozen.chosen().candidate, 2);

        // Identical statistics fall back to enumeration order, regardless of input order
        let identical = vec![agg(5, 1.0, 1.0, 1.0, 1.0), agg(4, 1.0, 1.0, 1.0, 1.0)];
        let frozen = Selector::new(rule).select(identical, 6).unwrap();
        assert_eq!(frozen.chosen().candidate, 4);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let selector = Selector::new(SelectionRule::default());
        let mut reversed = space();
        reversed.reverse();
        let a = selector.select(space(), 3).unwrap();
        let b = selector.select(reversed, 3).unwrap();
        assert_eq!(a.params(), b.params());
        assert_eq!(a.fallback_used(), b.fallback_used());
        assert_eq!(a.ranking(), b.ranking());
    }

    #[test]
    fn test_empty_is_error() {
        let err = Selector::new(SelectionRule::default()).select(Vec::new(), 4).unwrap_err();
        assert_eq!(err, SelectionError::NoEvaluableCandidate { n_trials: 4 });
    }
}
