//! FreezeA: select one parameter set on Pre, then evaluate it once on Test.

pub mod orchestrator;
pub mod report;

pub use orchestrator::{FreezeError, FreezeOrchestrator, FreezeRequest, COVERAGE_SLACK_DAYS};
pub use report::{
    Diagnostics, ExcludedCandidate, FinalReport, FreezeOutcome, GateReport, Provenance, ScorecardMeta,
    ScorecardRecord, WfaSettings, WfaSummary,
};
