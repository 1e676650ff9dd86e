//! Core data types for bar-based evaluation.
//!
//! These types describe the read-only market data every backtest invocation
//! consumes: half-open UTC time ranges, OHLCV bars, and a versioned snapshot
//! carrying its provenance.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("Invalid time range: start {start} is not before end {end}")]
    Empty {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Half-open UTC time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a range, rejecting empty or inverted bounds.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, RangeError> {
        if start >= end {
            return Err(RangeError::Empty { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Length in fractional days.
    pub fn days(&self) -> f64 {
        self.duration().num_seconds() as f64 / 86_400.0
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    /// True when the two ranges share at least one instant.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%Y-%m-%dT%H:%M:%SZ"),
            self.end.format("%Y-%m-%dT%H:%M:%SZ")
        )
    }
}

/// A single OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time.
    pub ts: DateTime<Utc>,
    /// Opening price.
    pub open: f64,
    /// Highest traded price.
    pub high: f64,
    /// Lowest traded price.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Shares traded.
    pub volume: f64,
}

/// Bars for one symbol, sorted by timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarSeries {
    /// Ticker symbol.
    pub symbol: String,
    /// Bars sorted by `ts`, no duplicates.
    pub bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(symbol: &str, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.ts);
        bars.dedup_by_key(|b| b.ts);
        Self {
            symbol: symbol.to_string(),
            bars,
        }
    }

    pub fn first_ts(&self) -> Option<DateTime<Utc>> {
        self.bars.first().map(|b| b.ts)
    }

    pub fn last_ts(&self) -> Option<DateTime<Utc>> {
        self.bars.last().map(|b| b.ts)
    }

    /// Index of the first bar at or after `ts`.
    pub fn lower_bound(&self, ts: DateTime<Utc>) -> usize {
        self.bars.partition_point(|b| b.ts < ts)
    }

    /// Keep only the timestamps present in `keep` (sorted).
    fn retain_timestamps(&mut self, keep: &[DateTime<Utc>]) {
        self.bars.retain(|b| keep.binary_search(&b.ts).is_ok());
    }
}

/// Provenance recorded alongside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Data vendor or file the bars came from.
    #[serde(default = "unknown")]
    pub source: String,
    /// Split and dividend adjustment applied.
    #[serde(default = "unknown")]
    pub adjustment: String,
    /// Trading session the bars were restricted to.
    #[serde(default = "unknown")]
    pub session_filter: String,
    /// Bar interval.
    #[serde(default = "unknown")]
    pub timeframe: String,
    /// When the snapshot was materialised.
    #[serde(default)]
    pub created_utc: Option<DateTime<Utc>>,
}

fn unknown() -> String {
    "unknown".to_string()
}

impl Default for SnapshotMeta {
    fn default() -> Self {
        Self {
            source: unknown(),
            adjustment: unknown(),
            session_filter: unknown(),
            timeframe: unknown(),
            created_utc: None,
        }
    }
}

/// Immutable, versioned market data for a symbol set.
///
/// All legs are aligned to the same timestamps. `id` identifies the exact
/// content and is stamped on every run summary produced from it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Content identifier.
    pub id: String,
    /// Recorded provenance.
    pub meta: SnapshotMeta,
    legs: Vec<BarSeries>,
}

impl Snapshot {
    /// Build a snapshot, aligning multi-leg data to the common timestamp set.
    pub fn new(id: String, meta: SnapshotMeta, mut legs: Vec<BarSeries>) -> Self {
        if legs.len() > 1 {
            let mut common: Vec<DateTime<Utc>> = legs[0].bars.iter().map(|b| b.ts).collect();
            for leg in &legs[1..] {
                common.retain(|ts| leg.bars.binary_search_by_key(ts, |b| b.ts).is_ok());
            }
            for leg in &mut legs {
                leg.retain_timestamps(&common);
            }
        }
        Self { id, meta, legs }
    }

    pub fn legs(&self) -> &[BarSeries] {
        &self.legs
    }

    pub fn symbols(&self) -> Vec<String> {
        self.legs.iter().map(|l| l.symbol.clone()).collect()
    }

    /// The reference leg used for time splitting.
    pub fn primary(&self) -> Option<&BarSeries> {
        self.legs.first()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.iter().all(|l| l.bars.is_empty())
    }

    /// Range covered by the primary leg, end exclusive one second after the last bar.
    pub fn coverage(&self) -> Option<TimeRange> {
        let primary = self.primary()?;
        let first = primary.first_ts()?;
        let last = primary.last_ts()?;
        TimeRange::new(first, last + Duration::seconds(1)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 15, 0, 0).unwrap()
    }

    fn bar(day: u32, close: f64) -> Bar {
        Bar {
            ts: ts(day),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn test_time_range_rejects_empty() {
        assert!(TimeRange::new(ts(2), ts(2)).is_err());
        assert!(TimeRange::new(ts(3), ts(2)).is_err());
        assert!(TimeRange::new(ts(2), ts(3)).is_ok());
    }

    #[test]
    fn test_time_range_half_open() {
        let range = TimeRange::new(ts(2), ts(4)).unwrap();
        assert!(range.contains(ts(2)));
        assert!(range.contains(ts(3)));
        assert!(!range.contains(ts(4)));

        let next = TimeRange::new(ts(4), ts(6)).unwrap();
        assert!(!range.overlaps(&next));
        assert!((range.days() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_series_sorted_and_deduped() {
        let series = BarSeries::new("QQQ", vec![bar(3, 3.0), bar(1, 1.0), bar(3, 3.5)]);
        assert_eq!(series.bars.len(), 2);
        assert_eq!(series.first_ts(), Some(ts(1)));
        assert_eq!(series.lower_bound(ts(2)), 1);
    }

    #[test]
    fn test_snapshot_aligns_legs() {
        let a = BarSeries::new("QQQ", vec![bar(1, 1.0), bar(2, 2.0), bar(3, 3.0)]);
        let b = BarSeries::new("SPY", vec![bar(2, 2.0), bar(3, 3.0), bar(4, 4.0)]);
        let snapshot = Snapshot::new("id".into(), SnapshotMeta::default(), vec![a, b]);

        for leg in snapshot.legs() {
            let days: Vec<_> = leg.bars.iter().map(|b| b.ts).collect();
            assert_eq!(days, vec![ts(2), ts(3)]);
        }
        assert_eq!(snapshot.symbols(), vec!["QQQ", "SPY"]);
    }

    #[test]
    fn test_snapshot_coverage_includes_last_bar() {
        let a = BarSeries::new("QQQ", vec![bar(1, 1.0), bar(5, 2.0)]);
        let snapshot = Snapshot::new("id".into(), SnapshotMeta::default(), vec![a]);
        let coverage = snapshot.coverage().unwrap();
        assert_eq!(coverage.start(), ts(1));
        assert!(coverage.contains(ts(5)));
    }
}
