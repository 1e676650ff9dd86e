//! Snapshot loader for OHLCV parquet files.
//!
//! A snapshot directory holds one parquet file per symbol plus optional
//! provenance metadata:
//! - `bars_<SYMBOL>.parquet` with columns ts (epoch milliseconds, UTC),
//!   open, high, low, close, volume
//! - `meta.json` with source, adjustment policy, session filter, timeframe
//!   and creation time
//!
//! The snapshot id is a SHA-256 over the symbol list and the raw file bytes,
//! so two snapshots with identical content always share an id.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use polars::prelude::*;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use super::types::{Bar, BarSeries, Snapshot, SnapshotMeta};

/// Expected columns in the bar files.
pub const EXPECTED_COLUMNS: &[&str] = &["ts", "open", "high", "low", "close", "volume"];

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid snapshot metadata: {0}")]
    Meta(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parquet loader for bar snapshots.
pub struct SnapshotLoader {
    snapshot_dir: PathBuf,
}

impl SnapshotLoader {
    /// Create a loader pointing at a snapshot directory.
    pub fn new(snapshot_dir: impl AsRef<Path>) -> Self {
        Self {
            snapshot_dir: snapshot_dir.as_ref().to_path_buf(),
        }
    }

    /// Path of a symbol's bar file.
    pub fn bars_path(&self, symbol: &str) -> PathBuf {
        self.snapshot_dir.join(format!("bars_{}.parquet", symbol))
    }

    fn meta_path(&self) -> PathBuf {
        self.snapshot_dir.join("meta.json")
    }

    /// Load provenance metadata, defaulting every field when the file is absent.
    pub fn load_meta(&self) -> Result<SnapshotMeta, LoaderError> {
        let path = self.meta_path();
        if !path.exists() {
            return Ok(SnapshotMeta::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load bars for one symbol.
    pub fn load_series(&self, symbol: &str) -> Result<BarSeries, LoaderError> {
        let path = self.bars_path(symbol);
        if !path.exists() {
            return Err(LoaderError::FileNotFound(path.display().to_string()));
        }

        let df = LazyFrame::scan_parquet(&path, ScanArgsParquet::default())?
            .select([
                col("ts").cast(DataType::Int64),
                col("open").cast(DataType::Float64),
                col("high").cast(DataType::Float64),
                col("low").cast(DataType::Float64),
                col("close").cast(DataType::Float64),
                col("volume").cast(DataType::Float64),
            ])
            .collect()?;

        let bars = dataframe_to_bars(&df)?;
        debug!("Loaded {} bars for {} from {}", bars.len(), symbol, path.display());
        Ok(BarSeries::new(symbol, bars))
    }

    /// Load an aligned multi-leg snapshot.
    pub fn load(&self, symbols: &[String]) -> Result<Snapshot, LoaderError> {
        if symbols.is_empty() {
            return Err(LoaderError::InvalidData("No symbols requested".to_string()));
        }

        let mut legs = Vec::with_capacity(symbols.len());
        let mut hasher = Sha256::new();
        for symbol in symbols {
            let path = self.bars_path(symbol);
            if !path.exists() {
                return Err(LoaderError::FileNotFound(path.display().to_string()));
            }
            hasher.update(symbol.as_bytes());
            hasher.update(fs::read(&path)?);
            legs.push(self.load_series(symbol)?);
        }

        let id = format!("{:x}", hasher.finalize());
        let meta = self.load_meta()?;
        let snapshot = Snapshot::new(id, meta, legs);

        if snapshot.is_empty() {
            return Err(LoaderError::InvalidData(format!(
                "Snapshot {} contains no bars",
                self.snapshot_dir.display()
            )));
        }

        info!(
            "Loaded snapshot {} ({} legs, id {})",
            self.snapshot_dir.display(),
            symbols.len(),
            &snapshot.id[..12]
        );
        Ok(snapshot)
    }
}

/// Convert a bar DataFrame into typed bars.
fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<Bar>, LoaderError> {
    let ts = df.column("ts")?.i64()?;
    let open = df.column("open")?.f64()?;
    let high = df.column("high")?.f64()?;
    let low = df.column("low")?.f64()?;
    let close = df.column("close")?.f64()?;
    let volume = df.column("volume")?.f64()?;

    let mut bars = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let millis = ts
            .get(i)
            .ok_or_else(|| LoaderError::InvalidData(format!("Null timestamp at row {}", i)))?;
        let ts = timestamp_from_millis(millis)?;
        let (Some(o), Some(h), Some(l), Some(c)) = (open.get(i), high.get(i), low.get(i), close.get(i))
        else {
            return Err(LoaderError::InvalidData(format!("Null price at {}", ts)));
        };
        bars.push(Bar {
            ts,
            open: o,
            high: h,
            low: l,
            close: c,
            volume: volume.get(i).unwrap_or(0.0),
        });
    }
    Ok(bars)
}

fn timestamp_from_millis(millis: i64) -> Result<DateTime<Utc>, LoaderError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| LoaderError::InvalidData(format!("Invalid timestamp {}", millis)))
}
