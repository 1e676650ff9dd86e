//! Hard gates.
//!
//! Pure pass/fail checks on a run summary or candidate aggregate, plus the
//! walk-forward aggregation of per-window gate results.

pub mod hard;
pub mod wfa;

pub use hard::{annualized_trades, evaluate_gate, GateConfig, GateReason, GateResult, GateSubject, DAYS_PER_YEAR};
pub use wfa::{evaluate_wfa_gate, WfaGateConfig, WfaGateReason, WfaGateReport, WindowGate};
