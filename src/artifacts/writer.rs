//! Parquet and JSON artifact writer.
//!
//! Layout of a run directory:
//! - `candidates_oos_agg.parquet`
//! - `wfa_windows.parquet`, `wfa_summary.json`
//! - `gate_report.json`
//! - `basin_grid.parquet`, `basin_report.json`
//! - `scorecard.json` (scorecard plus a `meta` provenance block)
//! - `final_report.json`
//! - `retune_windows.parquet`, `retune_summary.json` for retune runs
//!
//! Parquet rows carry the snapshot id they were measured on.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::basin::BasinWindowsReport;
use crate::freeze::{FinalReport, GateReport, Provenance, ScorecardRecord, WfaSummary};
use crate::selection::RankedCandidate;
use crate::walkforward::{RetuneReport, WindowResult};

use super::sink::{ArtifactError, ArtifactSink};

/// Writes artifacts into one run directory.
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    /// Create (if needed) and write into `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// `<root>/<kind>_<strategy>_<symbols>_<run_id>/`
    pub fn for_run(
        root: impl AsRef<Path>,
        kind: &str,
        strategy_id: &str,
        symbols: &[String],
        run_id: &str,
    ) -> Result<Self, ArtifactError> {
        let name = format!("{}_{}_{}_{}", kind, strategy_id, symbols.join("-"), run_id);
        Self::new(root.as_ref().join(name))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), ArtifactError> {
        let path = self.dir.join(name);
        fs::write(&path, serde_json::to_string_pretty(value)?)?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    fn write_parquet(&self, name: &str, mut df: DataFrame) -> Result<(), ArtifactError> {
        let path = self.dir.join(name);
        let file = File::create(&path)?;
        ParquetWriter::new(file).finish(&mut df)?;
        debug!("Wrote {} ({} rows)", path.display(), df.height());
        Ok(())
    }
}

fn utc(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

impl ArtifactSink for ArtifactWriter {
    fn write_candidates(
        &mut self,
        provenance: &Provenance,
        ranking: &[RankedCandidate],
    ) -> Result<(), ArtifactError> {
        let aggs: Vec<_> = ranking.iter().map(|r| &r.aggregate).collect();
        let n = ranking.len();
        let df = df!(
            "rank" => ranking.iter().map(|r| r.rank as i64).collect::<Vec<_>>(),
            "candidate" => aggs.iter().map(|a| a.candidate as i64).collect::<Vec<_>>(),
            "params" => aggs.iter().map(|a| a.params.key()).collect::<Vec<_>>(),
            "eligible" => ranking.iter().map(|r| r.eligible).collect::<Vec<_>>(),
            "windows" => aggs.iter().map(|a| a.windows as i64).collect::<Vec<_>>(),
            "failed_windows" => aggs.iter().map(|a| a.failed_windows as i64).collect::<Vec<_>>(),
            "pos_window_rate" => aggs.iter().map(|a| a.pos_window_rate).collect::<Vec<_>>(),
            "oos_net_return_mean" => aggs.iter().map(|a| a.mean).collect::<Vec<_>>(),
            "oos_net_return_median" => aggs.iter().map(|a| a.median).collect::<Vec<_>>(),
            "oos_net_return_worst" => aggs.iter().map(|a| a.worst).collect::<Vec<_>>(),
            "oos_net_pnl_total" => aggs.iter().map(|a| a.total_net_pnl).collect::<Vec<_>>(),
            "oos_trades_total" => aggs.iter().map(|a| a.total_trades as i64).collect::<Vec<_>>(),
            "oos_maxdd_intrabar_worst_pct" => aggs.iter().map(|a| a.worst_intrabar_dd_pct).collect::<Vec<_>>(),
            "strategy_id" => vec![provenance.strategy_id.clone(); n],
            "snapshot_id" => vec![provenance.snapshot_id.clone(); n],
            "min_pos_window_rate" => vec![provenance.selection_rule.min_pos_window_rate; n],
            "n_trials" => vec![provenance.n_trials as i64; n],
        )?;
        self.write_parquet("candidates_oos_agg.parquet", df)
    }

    fn write_wfa_windows(&mut self, results: &[WindowResult]) -> Result<(), ArtifactError> {
        let mut sorted: Vec<&WindowResult> = results.iter().collect();
        sorted.sort_by_key(|r| r.window.oos.start());

        let df = df!(
            "window" => sorted.iter().map(|r| r.window.index as i64).collect::<Vec<_>>(),
            "train_start_utc" => sorted.iter().map(|r| utc(r.window.train.start())).collect::<Vec<_>>(),
            "oos_start_utc" => sorted.iter().map(|r| utc(r.window.oos.start())).collect::<Vec<_>>(),
            "oos_end_utc" => sorted.iter().map(|r| utc(r.window.oos.end())).collect::<Vec<_>>(),
            "params" => sorted.iter().map(|r| r.params.key()).collect::<Vec<_>>(),
            "snapshot_id" => sorted.iter().map(|r| r.oos_summary.snapshot_id.clone()).collect::<Vec<_>>(),
            "oos_net_pnl" => sorted.iter().map(|r| r.oos_summary.net_pnl).collect::<Vec<_>>(),
            "oos_net_return_pct" => sorted.iter().map(|r| r.oos_summary.net_return_pct).collect::<Vec<_>>(),
            "oos_maxdd_intrabar_pct" => sorted.iter().map(|r| r.oos_summary.max_drawdown_intrabar_pct).collect::<Vec<_>>(),
            "oos_trades" => sorted.iter().map(|r| r.oos_summary.trades.total_trades as i64).collect::<Vec<_>>(),
            "oos_profit_factor" => sorted.iter().map(|r| r.oos_summary.trades.profit_factor).collect::<Vec<_>>(),
        )?;
        self.write_parquet("wfa_windows.parquet", df)
    }

    fn write_wfa_summary(&mut self, summary: &WfaSummary) -> Result<(), ArtifactError> {
        self.write_json("wfa_summary.json", summary)
    }

    fn write_gate_report(&mut self, report: &GateReport) -> Result<(), ArtifactError> {
        self.write_json("gate_report.json", report)
    }

    fn write_basin(&mut self, report: &BasinWindowsReport) -> Result<(), ArtifactError> {
        let rows: Vec<_> = report
            .windows
            .iter()
            .flat_map(|w| w.points.iter().enumerate().map(move |(i, p)| (w.window, i, p)))
            .collect();

        let df = df!(
            "window" => rows.iter().map(|(w, _, _)| *w as i64).collect::<Vec<_>>(),
            "point" => rows.iter().map(|(_, i, _)| *i as i64).collect::<Vec<_>>(),
            "params" => rows.iter().map(|(_, _, p)| p.params.key()).collect::<Vec<_>>(),
            "qualifies" => rows.iter().map(|(_, _, p)| p.qualifies).collect::<Vec<_>>(),
            "gate_ok" => rows.iter().map(|(_, _, p)| p.gate.as_ref().map(|g| g.ok)).collect::<Vec<_>>(),
            "profit_factor" => rows
                .iter()
                .map(|(_, _, p)| p.summary.as_ref().and_then(|s| s.trades.profit_factor))
                .collect::<Vec<_>>(),
            "net_pnl" => rows.iter().map(|(_, _, p)| p.summary.as_ref().map(|s| s.net_pnl)).collect::<Vec<_>>(),
            "maxdd_intrabar_pct" => rows
                .iter()
                .map(|(_, _, p)| p.summary.as_ref().and_then(|s| s.max_drawdown_intrabar_pct))
                .collect::<Vec<_>>(),
            "trades" => rows
                .iter()
                .map(|(_, _, p)| p.summary.as_ref().map(|s| s.trades.total_trades as i64))
                .collect::<Vec<_>>(),
            "error" => rows.iter().map(|(_, _, p)| p.error.clone()).collect::<Vec<_>>(),
            "snapshot_id" => vec![report.snapshot_id.clone(); rows.len()],
        )?;
        self.write_parquet("basin_grid.parquet", df)?;
        self.write_json("basin_report.json", report)
    }

    fn write_scorecard(&mut self, record: &ScorecardRecord) -> Result<(), ArtifactError> {
        self.write_json("scorecard.json", record)
    }

    fn write_final_report(&mut self, report: &FinalReport) -> Result<(), ArtifactError> {
        self.write_json("final_report.json", report)?;
        info!("Artifacts written to {}", self.dir.display());
        Ok(())
    }

    fn write_retune(&mut self, report: &RetuneReport) -> Result<(), ArtifactError> {
        let rows = &report.windows;
        let oos = |f: fn(&crate::backtest::RunSummary) -> Option<f64>| -> Vec<Option<f64>> {
            rows.iter().map(|r| r.oos_summary.as_ref().and_then(f)).collect()
        };

        let df = df!(
            "window" => rows.iter().map(|r| r.window.index as i64).collect::<Vec<_>>(),
            "train_start_utc" => rows.iter().map(|r| utc(r.window.train.start())).collect::<Vec<_>>(),
            "oos_start_utc" => rows.iter().map(|r| utc(r.window.oos.start())).collect::<Vec<_>>(),
            "oos_end_utc" => rows.iter().map(|r| utc(r.window.oos.end())).collect::<Vec<_>>(),
            "chosen_params" => rows.iter().map(|r| r.chosen_params.as_ref().map(|p| p.key())).collect::<Vec<_>>(),
            "train_net_return_pct" => rows.iter().map(|r| r.train_net_return_pct).collect::<Vec<_>>(),
            "filter_fallback" => rows.iter().map(|r| r.filter_fallback).collect::<Vec<_>>(),
            "oos_net_pnl" => oos(|s| Some(s.net_pnl)),
            "oos_net_return_pct" => oos(|s| Some(s.net_return_pct)),
            "oos_maxdd_intrabar_pct" => oos(|s| s.max_drawdown_intrabar_pct),
            "oos_trades" => oos(|s| Some(s.trades.total_trades as f64)),
            "error" => rows.iter().map(|r| r.error.clone()).collect::<Vec<_>>(),
            "snapshot_id" => rows
                .iter()
                .map(|r| r.oos_summary.as_ref().map(|s| s.snapshot_id.clone()))
                .collect::<Vec<_>>(),
        )?;
        self.write_parquet("retune_windows.parquet", df)?;
        self.write_json("retune_summary.json", report)
    }
}
