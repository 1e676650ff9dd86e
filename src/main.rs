//! harbor-backtest CLI
//!
//! ```bash
//! # Freeze one parameter set for a strategy
//! harbor-backtest freeze --strategy rsi2 --symbols QQQ --snapshot data/snapshots/qqq_1h
//!
//! # Retune-per-window diagnostic over the same windows
//! harbor-backtest retune --strategy rsi2 --symbols QQQ --snapshot data/snapshots/qqq_1h
//!
//! # One backtest over the whole snapshot
//! harbor-backtest backtest --strategy rsi2 --symbols QQQ --snapshot data/snapshots/qqq_1h \
//!     --params '{"rsi_period": 2, "entry_rsi": 10.0, "stop_pct": 0.006, "take_pct": 0.009, "max_bars_hold": 8}'
//!
//! # Two-leg pairs strategy
//! harbor-backtest freeze --strategy pairs_mr --symbols QQQ,SPY --snapshot data/snapshots/qqq_spy_1h
//! ```
//!
//! Ctrl-C cancels a running sweep: in-flight runs finish, incomplete
//! candidates are discarded. A second Ctrl-C exits immediately.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::warn;

use harbor_backtest::artifacts::ArtifactWriter;
use harbor_backtest::backtest::{BacktestEngine, BarBacktester, RunContext, Segment};
use harbor_backtest::config::FreezeConfig;
use harbor_backtest::data::{Snapshot, SnapshotLoader};
use harbor_backtest::freeze::{FreezeOrchestrator, FreezeRequest};
use harbor_backtest::params::{ParameterGrid, ParameterSet};
use harbor_backtest::strategy::StrategyCatalog;

const SEPARATOR: &str = "============================================================";

#[derive(Parser)]
#[command(name = "harbor-backtest")]
#[command(about = "Walk-forward evaluation and frozen-parameter selection")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RunArgs {
    /// Strategy id from the catalog
    #[arg(long)]
    strategy: String,

    /// Comma-separated symbols, one per strategy leg
    #[arg(long)]
    symbols: String,

    /// Snapshot directory
    #[arg(long)]
    snapshot: PathBuf,

    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct WfaArgs {
    /// Trailing history in years
    #[arg(long)]
    years: Option<u32>,

    /// Train window length in months
    #[arg(long)]
    train_months: Option<u32>,

    /// OOS window length (and step) in months
    #[arg(long)]
    oos_months: Option<u32>,

    /// Parameter grid replacing the strategy default, as JSON
    #[arg(long)]
    grid_json: Option<String>,

    /// Worker threads for the sweep
    #[arg(long)]
    threads: Option<usize>,

    /// Output directory for results
    #[arg(short, long, default_value = "results")]
    output: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Select and freeze one parameter set, then evaluate it on the held-out test range
    Freeze {
        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        wfa: WfaArgs,

        /// Minimum share of positive OOS windows for eligibility
        #[arg(long)]
        min_pos_window_rate: Option<f64>,
    },

    /// Retune-per-window walk-forward diagnostic
    Retune {
        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        wfa: WfaArgs,
    },

    /// Run one backtest over the whole snapshot
    Backtest {
        #[command(flatten)]
        run: RunArgs,

        /// Parameters as JSON; strategy defaults are not assumed
        #[arg(long)]
        params: String,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("harbor_backtest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let catalog = StrategyCatalog::with_builtins();

    match cli.command {
        Commands::Freeze {
            run,
            wfa,
            min_pos_window_rate,
        } => {
            let mut config = load_config(&run, &wfa)?;
            if let Some(rate) = min_pos_window_rate {
                config.selection.min_pos_window_rate = rate;
            }
            config.validate()?;
            cmd_freeze(&catalog, &run, &wfa, config)?;
        }
        Commands::Retune { run, wfa } => {
            let config = load_config(&run, &wfa)?;
            config.validate()?;
            cmd_retune(&catalog, &run, &wfa, config)?;
        }
        Commands::Backtest { run, params } => {
            let config = match &run.config {
                Some(path) => FreezeConfig::load(path)?,
                None => FreezeConfig::default(),
            };
            cmd_backtest(&catalog, &run, &params, config)?;
        }
    }

    Ok(())
}

fn parse_symbols(symbols: &str) -> Vec<String> {
    symbols
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn load_config(run: &RunArgs, wfa: &WfaArgs) -> Result<FreezeConfig> {
    let mut config = match &run.config {
        Some(path) => FreezeConfig::load(path)?,
        None => FreezeConfig::default(),
    };
    if let Some(years) = wfa.years {
        config.wfa.years = years;
    }
    if let Some(months) = wfa.train_months {
        config.wfa.train_months = months;
    }
    if let Some(months) = wfa.oos_months {
        config.wfa.oos_months = months;
    }
    if let Some(threads) = wfa.threads {
        config.sweep.max_threads = Some(threads);
    }
    config.sweep.show_progress = true;
    Ok(config)
}

fn load_snapshot(run: &RunArgs, symbols: &[String]) -> Result<Snapshot> {
    SnapshotLoader::new(&run.snapshot)
        .load(symbols)
        .with_context(|| format!("Failed to load snapshot {}", run.snapshot.display()))
}

fn request(run: &RunArgs, wfa: &WfaArgs, config: FreezeConfig) -> Result<FreezeRequest> {
    let mut request = FreezeRequest::new(&run.strategy, parse_symbols(&run.symbols)).with_config(config);
    if let Some(json) = &wfa.grid_json {
        let grid = ParameterGrid::from_json(json).context("Invalid --grid-json")?;
        request = request.with_grid(grid);
    }
    Ok(request)
}

/// Flag set by the first Ctrl-C; the second one exits the process.
fn cancel_on_ctrl_c() -> Result<Arc<AtomicBool>> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;

    std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    if flag.swap(true, Ordering::Relaxed) {
                        warn!("Second Ctrl+C, exiting");
                        std::process::exit(130);
                    }
                    warn!("Received Ctrl+C, cancelling after in-flight runs");
                }
            })
        })
        .context("Failed to spawn signal thread")?;

    Ok(cancel)
}

fn run_id() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

fn cmd_freeze(catalog: &StrategyCatalog, run: &RunArgs, wfa: &WfaArgs, config: FreezeConfig) -> Result<()> {
    let request = request(run, wfa, config)?;
    let spec = catalog.get(&request.strategy_id)?.clone();
    spec.check_legs(&request.symbols)?;

    let snapshot = load_snapshot(run, &request.symbols)?;
    let coverage = snapshot.coverage();
    let engine = BarBacktester::new(Arc::new(snapshot), spec);

    let mut writer = ArtifactWriter::for_run(&wfa.output, "freezeA", &request.strategy_id, &request.symbols, &run_id())
        .context("Failed to create output directory")?;
    let cancel = cancel_on_ctrl_c()?;

    let outcome = FreezeOrchestrator::new(catalog, request).run(coverage, &engine, &mut writer, &cancel)?;
    let report = &outcome.report;

    println!("{}", SEPARATOR);
    println!("FreezeA: {} {}", report.strategy_id, report.symbols.join(","));
    println!("{}", SEPARATOR);
    println!("  Snapshot:        {}", report.snapshot_id);
    println!("  Pre:             {}", report.pre);
    println!("  Test:            {}", report.test);
    println!("  Windows:         {}", report.wfa.windows);
    println!("  Candidates:      {}", report.candidate_space_size);
    println!("  Frozen params:   {}", report.frozen_params);
    println!("  Fallback used:   {}", report.fallback_used);
    println!("  Pos window rate: {:.2}", report.selected_candidate.pos_window_rate);
    println!("  Basin (median):  {:?}", report.basin_pass_rate_median);
    println!("  Test net:        {:.2}%", report.test_summary.net_return_pct);
    println!("  Test gate:       {}", if report.test_gate.ok { "PASS" } else { "FAIL" });
    for reason in &report.test_gate.reasons {
        println!("    - {}", reason);
    }
    println!("  Score:           {:.1}", report.total_score);
    println!("  DSR:             {:?}", report.dsr);
    if !report.diagnostics.is_clean() {
        println!("  Diagnostics:     {:?}", report.diagnostics);
    }
    println!("\nArtifacts: {}", writer.dir().display());
    Ok(())
}

fn cmd_retune(catalog: &StrategyCatalog, run: &RunArgs, wfa: &WfaArgs, config: FreezeConfig) -> Result<()> {
    let request = request(run, wfa, config)?;
    let spec = catalog.get(&request.strategy_id)?.clone();
    spec.check_legs(&request.symbols)?;

    let snapshot = load_snapshot(run, &request.symbols)?;
    let coverage = snapshot.coverage();
    let engine = BarBacktester::new(Arc::new(snapshot), spec);

    let mut writer = ArtifactWriter::for_run(&wfa.output, "retune", &request.strategy_id, &request.symbols, &run_id())
        .context("Failed to create output directory")?;
    let cancel = cancel_on_ctrl_c()?;

    let report = FreezeOrchestrator::new(catalog, request).retune(coverage, &engine, &mut writer, &cancel)?;

    println!("{}", SEPARATOR);
    println!("Retune per window: {}", report.strategy);
    println!("{}", SEPARATOR);
    for row in &report.windows {
        let oos = row
            .oos_summary
            .as_ref()
            .map(|s| format!("{:.2}%", s.net_return_pct))
            .unwrap_or_else(|| row.error.clone().unwrap_or_default());
        let params = row.chosen_params.as_ref().map(|p| p.to_string()).unwrap_or_default();
        println!("  {:>3} {}  {}  {}", row.window.index, row.window.oos, params, oos);
    }
    println!("  Pos window rate: {:?}", report.pos_window_rate);
    println!("  Median OOS:      {:?}", report.median_oos_return_pct);
    println!("\nArtifacts: {}", writer.dir().display());
    Ok(())
}

fn cmd_backtest(catalog: &StrategyCatalog, run: &RunArgs, params: &str, config: FreezeConfig) -> Result<()> {
    let symbols = parse_symbols(&run.symbols);
    let spec = catalog.get(&run.strategy)?.clone();
    spec.check_legs(&symbols)?;
    let params: ParameterSet = serde_json::from_str(params).context("Invalid --params")?;

    let snapshot = load_snapshot(run, &symbols)?;
    let coverage = snapshot.coverage().context("Snapshot has no bars")?;
    let engine = BarBacktester::new(Arc::new(snapshot), spec);

    let cancel = cancel_on_ctrl_c()?;
    let ctx = RunContext::new(Some(cancel.as_ref()), None);
    let summary = engine.run(&Segment::new(coverage), &params, &config.cost, &ctx)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
