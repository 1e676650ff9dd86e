//! Single-run backtesting.
//!
//! - The engine contract consumed by the evaluation pipeline
//! - A reference bar engine over single- and multi-leg snapshots
//! - Slippage and commission costs
//! - Run summaries

pub mod cost;
pub mod engine;
pub mod summary;
pub mod trade;

pub use cost::CostConfig;
pub use engine::{BacktestEngine, BarBacktester, EngineError, RunContext, Segment};
pub use summary::RunSummary;
pub use trade::{ClosedTrade, EquityPoint, TradeLeg};
