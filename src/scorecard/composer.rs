//! Scorecard v1.
//!
//! Four weighted categories, each a [0,1] subscore built from weighted
//! components. A component whose input is missing is dropped and the rest
//! of its category re-normalised; a category with no components left is
//! dropped and the total re-normalised over the remaining weights:
//!
//! `total = 100 * sum(w_i * s_i) / sum(w_i present)`

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backtest::RunSummary;
use crate::metrics::deflated_sharpe_ratio;
use crate::params::ParameterSet;

pub const SCORE_VERSION: &str = "v1";

/// Category weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Weight of temporal consistency and basin width.
    pub robustness: f64,
    /// Weight of drawdown depth and length.
    pub risk: f64,
    /// Weight of profit factor, expectancy, Sharpe and net return.
    pub return_quality: f64,
    /// Weight of having a known parameter set.
    pub implementability: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            robustness: 55.0,
            risk: 25.0,
            return_quality: 15.0,
            implementability: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreCategory {
    Robustness,
    Risk,
    ReturnQuality,
    Implementability,
}

impl fmt::Display for ScoreCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Robustness => "robustness",
            Self::Risk => "risk",
            Self::ReturnQuality => "return_quality",
            Self::Implementability => "implementability",
        };
        f.write_str(name)
    }
}

/// Raw scorecard inputs; `None` marks a missing metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScorecardInputs {
    /// Fraction of positive OOS windows.
    pub pos_window_rate: Option<f64>,
    /// Median basin pass rate.
    pub basin_pass_rate: Option<f64>,
    /// Test intrabar drawdown, in percent.
    pub max_drawdown_intrabar_pct: Option<f64>,
    /// Longest Test drawdown, in bars.
    pub max_drawdown_close_len: Option<f64>,
    /// Test profit factor.
    pub profit_factor: Option<f64>,
    /// Expectancy as % of starting value, or in currency when that is unknown.
    pub expectancy: Option<f64>,
    /// Test Sharpe ratio.
    pub sharpe: Option<f64>,
    /// Test net return %.
    pub net_return_pct: Option<f64>,
    /// Frozen parameters.
    pub strategy_params: Option<ParameterSet>,
    /// Size of the candidate space searched.
    pub n_trials: Option<usize>,
}

impl ScorecardInputs {
    /// Inputs from the WFA robustness statistics and the Test run.
    pub fn from_test(
        pos_window_rate: Option<f64>,
        basin_pass_rate: Option<f64>,
        test: &RunSummary,
        n_trials: usize,
    ) -> Self {
        Self {
            pos_window_rate,
            basin_pass_rate,
            max_drawdown_intrabar_pct: test.max_drawdown_intrabar_pct,
            max_drawdown_close_len: Some(test.max_drawdown_close_len as f64),
            profit_factor: test.trades.profit_factor,
            expectancy: test.trades.expectancy_pct_of_start.or(test.trades.expectancy),
            sharpe: test.sharpe,
            net_return_pct: Some(test.net_return_pct),
            strategy_params: (!test.params.is_empty()).then(|| test.params.clone()),
            n_trials: Some(n_trials),
        }
    }
}

/// Category subscores in [0,1]; `None` when the category is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subscores {
    /// 60/40 blend of temporal consistency and basin.
    pub robustness: Option<f64>,
    /// Intrabar drawdown depth and close drawdown length.
    pub risk: Option<f64>,
    /// Profit factor, expectancy, Sharpe and net return.
    pub return_quality: Option<f64>,
    /// 1 when the parameters are known.
    pub implementability: Option<f64>,
    /// Score of the positive window rate.
    pub temporal_consistency: Option<f64>,
    /// Score of the basin pass rate.
    pub basin: Option<f64>,
}

/// Composite score of a frozen candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    /// Scoring formula version.
    pub score_version: String,
    /// Weighted total in [0, 100] over the categories present.
    pub total_score: f64,
    /// Weights before renormalisation.
    pub weights: ScoreWeights,
    /// Per-category scores.
    pub subscores: Subscores,
    /// Raw inputs the scores were computed from.
    pub inputs: ScorecardInputs,
    /// Input fields that were unavailable.
    pub missing: Vec<String>,
    /// Categories excluded from the total.
    pub missing_categories: Vec<ScoreCategory>,
    /// Deflated Sharpe ratio of the Test Sharpe given `n_trials`; reported,
    /// not weighted.
    pub dsr: Option<f64>,
}

impl Scorecard {
    /// Weighted categories that contributed to the total.
    pub fn present(&self) -> Vec<(ScoreCategory, f64, f64)> {
        [
            (ScoreCategory::Robustness, self.weights.robustness, self.subscores.robustness),
            (ScoreCategory::Risk, self.weights.risk, self.subscores.risk),
            (ScoreCategory::ReturnQuality, self.weights.return_quality, self.subscores.return_quality),
            (
                ScoreCategory::Implementability,
                self.weights.implementability,
                self.subscores.implementability,
            ),
        ]
        .into_iter()
        .filter_map(|(c, w, s)| s.map(|s| (c, w, s)))
        .collect()
    }
}

pub fn clip01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Map `[x0, x1]` onto `[0, 1]`, clipped; zero for a degenerate interval.
pub fn linear(x: f64, x0: f64, x1: f64) -> f64 {
    if x1 == x0 {
        return 0.0;
    }
    clip01((x - x0) / (x1 - x0))
}

/// Weighted mean of the present components.
fn blend(components: &[(f64, Option<f64>)]) -> Option<f64> {
    let (num, den) = components
        .iter()
        .filter_map(|(w, v)| v.map(|v| (w * v, *w)))
        .fold((0.0, 0.0), |(n, d), (wn, wd)| (n + wn, d + wd));
    (den > 0.0).then(|| num / den)
}

pub struct ScorecardComposer {
    weights: ScoreWeights,
}

impl Default for ScorecardComposer {
    fn default() -> Self {
        Self::new(ScoreWeights::default())
    }
}

impl ScorecardComposer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    pub fn compose(&self, inputs: ScorecardInputs) -> Scorecard {
        let mut missing = BTreeSet::new();
        let mut note = |name: &str, value: Option<f64>| {
            if value.is_none() {
                missing.insert(name.to_string());
            }
            value
        };

        let pos = note("pos_window_rate", inputs.pos_window_rate);
        let basin_rate = note("basin_pass_rate", inputs.basin_pass_rate);
        let dd = note("max_drawdown_intrabar_pct", inputs.max_drawdown_intrabar_pct);
        let dd_len = note("max_drawdown_close_len", inputs.max_drawdown_close_len);
        let pf = note("profit_factor", inputs.profit_factor);
        let expectancy = note("expectancy", inputs.expectancy);
        let sharpe = note("sharpe", inputs.sharpe);
        let net_return = note("net_return_pct", inputs.net_return_pct);
        if inputs.strategy_params.is_none() {
            missing.insert("strategy_params".to_string());
        }

        let temporal = pos.map(|p| linear(p, 0.0, 0.7));
        let basin = basin_rate.map(|b| linear(b, 0.0, 0.3));
        let robustness = blend(&[(0.6, temporal), (0.4, basin)]);

        let risk = blend(&[
            (0.7, dd.map(|d| 1.0 - linear(d, 5.0, 20.0))),
            (0.3, dd_len.map(|l| 1.0 - linear(l, 500.0, 5000.0))),
        ]);

        let return_quality = blend(&[
            (0.35, pf.map(|pf| clip01((pf - 0.7) / 0.6))),
            (0.25, expectancy.map(|e| clip01((e + 0.05) / 0.10))),
            (0.25, sharpe.map(|s| clip01((s + 1.0) / 2.0))),
            (0.15, net_return.map(|r| linear(r, -5.0, 5.0))),
        ]);

        let implementability = inputs.strategy_params.as_ref().map(|_| 1.0);

        let subscores = Subscores {
            robustness,
            risk,
            return_quality,
            implementability,
            temporal_consistency: temporal,
            basin,
        };

        let dsr = match (inputs.sharpe, inputs.n_trials) {
            (Some(sharpe), Some(n)) => deflated_sharpe_ratio(sharpe, n),
            _ => None,
        };

        let mut card = Scorecard {
            score_version: SCORE_VERSION.to_string(),
            total_score: 0.0,
            weights: self.weights.clone(),
            subscores,
            inputs,
            missing: missing.into_iter().collect(),
            missing_categories: Vec::new(),
            dsr,
        };

        let present = card.present();
        card.missing_categories = [
            ScoreCategory::Robustness,
            ScoreCategory::Risk,
            ScoreCategory::ReturnQuality,
            ScoreCategory::Implementability,
        ]
        .into_iter()
        .filter(|c| !present.iter().any(|(p, _, _)| p == c))
        .collect();

        let weight: f64 = present.iter().map(|(_, w, _)| w).sum();
        let weighted: f64 = present.iter().map(|(_, w, s)| w * s).sum();
        card.total_score = if weight > 0.0 { 100.0 * weighted / weight } else { 0.0 };
        card
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_inputs() -> ScorecardInputs {
        ScorecardInputs {
            pos_window_rate: Some(0.7),
            basin_pass_rate: Some(0.15),
            max_drawdown_intrabar_pct: Some(5.0),
            max_drawdown_close_len: Some(500.0),
            profit_factor: Some(1.3),
            expectancy: Some(0.0),
            sharpe: Some(1.0),
            net_return_pct: Some(0.0),
            strategy_params: Some(ParameterSet::new().with("a", 1i64)),
            n_trials: Some(100),
        }
    }

    fn identity_holds(card: &Scorecard) {
        let present = card.present();
        let weight: f64 = present.iter().map(|(_, w, _)| w).sum();
        let expected: f64 = present.iter().map(|(_, w, s)| 100.0 * w / weight * s).sum();
        assert!((card.total_score - expected).abs() < 1e-9);
        assert!((0.0..=100.0).contains(&card.total_score));
    }

    #[test]
    fn test_linear_mapping() {
        assert_eq!(linear(0.35, 0.0, 0.7), 0.5);
        assert_eq!(linear(2.0, 0.0, 0.7), 1.0);
        assert_eq!(linear(-1.0, 0.0, 0.7), 0.0);
        assert_eq!(linear(1.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn test_full_scorecard() {
        let card = ScorecardComposer::default().compose(full_inputs());

        // robustness = 0.6 * 1 + 0.4 * 0.5
        assert!((card.subscores.robustness.unwrap() - 0.8).abs() < 1e-12);
        assert_eq!(card.subscores.risk, Some(1.0));
        // 0.35 * 1 + 0.25 * 0.5 + 0.25 * 1 + 0.15 * 0.5
        assert!((card.subscores.return_quality.unwrap() - 0.8).abs() < 1e-12);
        assert_eq!(card.subscores.implementability, Some(1.0));
        // 55 * 0.8 + 25 + 15 * 0.8 + 5
        assert!((card.total_score - 86.0).abs() < 1e-9);
        assert!(card.missing.is_empty());
        assert!(card.dsr.is_some());
        identity_holds(&card);
    }

    #[test]
    fn test_missing_component_renormalises_within_category() {
        let inputs = ScorecardInputs {
            max_drawdown_close_len: None,
            max_drawdown_intrabar_pct: Some(12.5),
            ..full_inputs()
        };
        let card = ScorecardComposer::default().compose(inputs);
        // Only the drawdown component remains: 1 - linear(12.5, 5, 20)
        assert!((card.subscores.risk.unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(card.missing, vec!["max_drawdown_close_len"]);
        assert!(card.missing_categories.is_empty());
        identity_holds(&card);
    }

    #[test]
    fn test_missing_category_is_excluded() {
        let inputs = ScorecardInputs {
            pos_window_rate: None,
            basin_pass_rate: None,
            ..full_inputs()
        };
        let card = ScorecardComposer::default().compose(inputs);
        assert_eq!(card.subscores.robustness, None);
        assert_eq!(card.missing_categories, vec![ScoreCategory::Robustness]);
        // (25 + 15 * 0.8 + 5) / 45
        assert!((card.total_score - 100.0 * 42.0 / 45.0).abs() < 1e-9);
        identity_holds(&card);
    }

    #[test]
    fn test_identity_for_every_missing_pattern() {
        for mask in 0u32..(1 << 9) {
            let base = full_inputs();
            let keep = |bit: u32| mask & (1 << bit) == 0;
            let inputs = ScorecardInputs {
                pos_window_rate: base.pos_window_rate.filter(|_| keep(0)),
                basin_pass_rate: base.basin_pass_rate.filter(|_| keep(1)),
                max_drawdown_intrabar_pct: base.max_drawdown_intrabar_pct.filter(|_| keep(2)),
                max_drawdown_close_len: base.max_drawdown_close_len.filter(|_| keep(3)),
                profit_factor: base.profit_factor.filter(|_| keep(4)),
                expectancy: base.expectancy.filter(|_| keep(5)),
                sharpe: base.sharpe.filter(|_| keep(6)),
                net_return_pct: base.net_return_pct.filter(|_| keep(7)),
                strategy_params: base.strategy_params.clone().filter(|_| keep(8)),
                n_trials: base.n_trials,
            };
            identity_holds(&ScorecardComposer::default().compose(inputs));
        }
    }

    #[test]
    fn test_everything_missing_scores_zero() {
        let card = ScorecardComposer::default().compose(ScorecardInputs::default());
        assert_eq!(card.total_score, 0.0);
        assert_eq!(card.missing_categories.len(), 4);
        assert_eq!(card.dsr, None);
    }
}
