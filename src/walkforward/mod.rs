//! Walk-forward evaluation.
//!
//! - Trailing Pre/Test split of the history
//! - Contiguous train/OOS windows over Pre
//! - Parallel candidate sweep, fixed-params and retune-per-window
//! - Per-candidate aggregation of OOS results

pub mod aggregate;
pub mod periods;
pub mod retune;
pub mod sweep;

pub use aggregate::{AggregationError, CandidateAggregate};
pub use periods::{trailing_history, HeldOutTest, Split, Window, WindowConfig, WindowError, WindowSet};
pub use retune::{retune_per_window, RetuneObjective, RetuneReport, RetuneWindow};
pub use sweep::{
    CandidateRun, FailureKind, JobOutcome, JobResult, PairFailure, SweepConfig, SweepDriver, SweepError,
    SweepOutcome, WindowResult,
};
