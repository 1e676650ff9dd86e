//! Market data snapshots.
//!
//! Read-only OHLCV data and its provenance. Every backtest invocation reads
//! from one immutable snapshot, identified by a content hash.

pub mod loader;
pub mod types;

pub use loader::{LoaderError, SnapshotLoader, EXPECTED_COLUMNS};
pub use types::{Bar, BarSeries, RangeError, Snapshot, SnapshotMeta, TimeRange};
