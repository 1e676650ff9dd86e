//! The artifact boundary.
//!
//! Pipeline stages hand finished value objects to a sink; nothing inside the
//! pipeline touches the filesystem itself. Every method defaults to a no-op.

use thiserror::Error;

use crate::basin::BasinWindowsReport;
use crate::freeze::{FinalReport, GateReport, Provenance, ScorecardRecord, WfaSummary};
use crate::selection::RankedCandidate;
use crate::walkforward::{RetuneReport, WindowResult};

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub trait ArtifactSink {
    /// Per-candidate OOS aggregates in rank order.
    fn write_candidates(
        &mut self,
        _provenance: &Provenance,
        _ranking: &[RankedCandidate],
    ) -> Result<(), ArtifactError> {
        Ok(())
    }

    /// OOS window results of the frozen candidate, chronological.
    fn write_wfa_windows(&mut self, _results: &[WindowResult]) -> Result<(), ArtifactError> {
        Ok(())
    }

    fn write_wfa_summary(&mut self, _summary: &WfaSummary) -> Result<(), ArtifactError> {
        Ok(())
    }

    fn write_gate_report(&mut self, _report: &GateReport) -> Result<(), ArtifactError> {
        Ok(())
    }

    fn write_basin(&mut self, _report: &BasinWindowsReport) -> Result<(), ArtifactError> {
        Ok(())
    }

    fn write_scorecard(&mut self, _record: &ScorecardRecord) -> Result<(), ArtifactError> {
        Ok(())
    }

    fn write_final_report(&mut self, _report: &FinalReport) -> Result<(), ArtifactError> {
        Ok(())
    }

    fn write_retune(&mut self, _report: &RetuneReport) -> Result<(), ArtifactError> {
        Ok(())
    }
}

/// Discards every artifact.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ArtifactSink for NullSink {}
