//! Walk-forward evaluation, robustness gating and frozen-parameter selection.
//!
//! The FreezeA pipeline splits a trailing history into Pre and a held-out
//! Test range, sweeps a candidate space over walk-forward windows inside Pre,
//! selects one parameter set by a fixed rule, checks its parameter basin and
//! evaluates it exactly once on Test.

pub mod artifacts;
pub mod backtest;
pub mod basin;
pub mod config;
pub mod data;
pub mod freeze;
pub mod gates;
pub mod metrics;
pub mod params;
pub mod scorecard;
pub mod selection;
pub mod strategy;
pub mod walkforward;

// Re-export commonly used types
pub use artifacts::{ArtifactSink, ArtifactWriter, NullSink};
pub use backtest::{BacktestEngine, BarBacktester, CostConfig, RunSummary, Segment};
pub use basin::{BasinConfig, BasinEvaluator};
pub use config::FreezeConfig;
pub use data::{Snapshot, SnapshotLoader, TimeRange};
pub use freeze::{FinalReport, FreezeError, FreezeOrchestrator, FreezeRequest};
pub use gates::{evaluate_gate, GateConfig, GateResult};
pub use params::{CandidateSpace, ParamValue, ParameterGrid, ParameterSet};
pub use scorecard::{Scorecard, ScorecardComposer};
pub use selection::{FrozenSelection, Selector};
pub use strategy::{Strategy, StrategyCatalog};
pub use walkforward::{SweepDriver, WindowSet};
