//! Persisted artifacts for the dashboard and for audit.

pub mod sink;
pub mod writer;

pub use sink::{ArtifactError, ArtifactSink, NullSink};
pub use writer::ArtifactWriter;
