//! Gate pass rate across walk-forward OOS windows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::walkforward::WindowResult;

use super::hard::{evaluate_gate, GateConfig, GateResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WfaGateConfig {
    /// Fraction of windows that must pass the hard gates.
    pub min_pass_rate: f64,
}

impl Default for WfaGateConfig {
    fn default() -> Self {
        Self { min_pass_rate: 0.70 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WfaGateReason {
    MissingWindows,
    PassRateBelowMin,
}

/// Gate outcome for one OOS window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowGate {
    /// Walk-forward window index.
    pub window: usize,
    /// Start of the OOS range.
    pub oos_start: DateTime<Utc>,
    /// End of the OOS range (exclusive).
    pub oos_end: DateTime<Utc>,
    /// Hard gate result of the OOS run.
    pub gate: GateResult,
}

/// Per-window gates reduced to a pass rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WfaGateReport {
    /// The pass rate reached `min_pass_rate`.
    pub ok: bool,
    /// Why the gate failed.
    pub reasons: Vec<WfaGateReason>,
    /// Windows checked.
    pub windows: usize,
    /// Fraction of windows whose hard gate passed.
    pub pass_rate: Option<f64>,
    /// Configured pass rate floor.
    pub min_pass_rate: f64,
    /// Thresholds applied to each window.
    pub hard_gate: GateConfig,
    /// Per-window results in chronological order.
    pub per_window: Vec<WindowGate>,
}

/// Gate every window result and compare the pass rate with the minimum.
pub fn evaluate_wfa_gate(results: &[WindowResult], hard: &GateConfig, config: &WfaGateConfig) -> WfaGateReport {
    let per_window: Vec<WindowGate> = results
        .iter()
        .map(|r| WindowGate {
            window: r.window.index,
            oos_start: r.window.oos.start(),
            oos_end: r.window.oos.end(),
            gate: evaluate_gate(&r.oos_summary, hard),
        })
        .collect();

    let passed = per_window.iter().filter(|w| w.gate.ok).count();
    let pass_rate = (!per_window.is_empty()).then(|| passed as f64 / per_window.len() as f64);

    let mut reasons = Vec::new();
    match pass_rate {
        None => reasons.push(WfaGateReason::MissingWindows),
        Some(rate) if rate < config.min_pass_rate => reasons.push(WfaGateReason::PassRateBelowMin),
        Some(_) => {}
    }

    WfaGateReport {
        ok: reasons.is_empty(),
        reasons,
        windows: per_window.len(),
        pass_rate,
        min_pass_rate: config.min_pass_rate,
        hard_gate: hard.clone(),
        per_window,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::RunSummary;
    use crate::data::TimeRange;
    use crate::params::ParameterSet;
    use crate::walkforward::sweep::tests::ymd;
    use crate::walkforward::WindowSet;

    fn results(dds: &[f64]) -> Vec<WindowResult> {
        let pre = TimeRange::new(ymd(2018, 1, 1), ymd(2023, 1, 1)).unwrap();
        let set = WindowSet::generate(pre, 12, 3).unwrap();
        dds.iter()
            .zip(set.iter())
            .map(|(&dd, w)| {
                let mut s = RunSummary::flat("snap", "s", ParameterSet::new(), w.oos, 1000.0);
                s.max_drawdown_intrabar_pct = Some(dd);
                s.trades.total_trades = 100;
                s.net_pnl = 10.0;
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
    fn test_pass_rate_threshold() {
        let hard = GateConfig::default();
        let report = evaluate_wfa_gate(&results(&[1.0, 2.0, 3.0, 15.0]), &hard, &WfaGateConfig::default());
        assert_eq!(report.pass_rate, Some(0.75));
        assert!(report.ok);
        assert!(!report.per_window[3].gate.ok);

        let report = evaluate_wfa_gate(&results(&[1.0, 15.0, 3.0, 15.0]), &hard, &WfaGateConfig::default());
        assert_eq!(report.reasons, vec![WfaGateReason::PassRateBelowMin]);
    }

    #[test]
    fn test_no_windows() {
        let report = evaluate_wfa_gate(&[], &GateConfig::default(), &WfaGateConfig::default());
        assert!(!report.ok);
        assert_eq!(report.pass_rate, None);
        assert_eq!(report.reasons, vec![WfaGateReason::MissingWindows]);
    }
}
