//! Backtest engine contract and the reference bar engine.
//!
//! The pipeline only depends on [`BacktestEngine::run`]: one strategy, one
//! parameter set, one evaluation range, deterministic for a given snapshot.
//!
//! [`BarBacktester`] simulation loop, per bar:
//! 1. Fill the order decided at the previous close at this bar's open
//! 2. Mark equity at the close and at the adverse extreme of each held leg
//! 3. Ask the strategy for an intent over its lookback window on every leg
//!
//! Bars before the evaluation range (the warmup) are visible to the strategy
//! as history but are never traded or measured.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use crate::data::{Bar, BarSeries, Snapshot, TimeRange};
use crate::metrics::calculator::to_f64;
use crate::metrics::MetricsCalculator;
use crate::params::{ParamError, ParameterSet};
use crate::strategy::{OrderIntent, PositionState, StrategySpec};

use super::cost::CostConfig;
use super::summary::RunSummary;
use super::trade::{EquityPoint, Holding, OpenPosition};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid parameters: {0}")]
    Params(#[from] ParamError),

    #[error("No bars in {0}")]
    NoData(TimeRange),

    #[error("Run exceeded {limit_ms} ms")]
    Timeout { limit_ms: u64 },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Engine failure: {0}")]
    Failed(String),
}

/// The range to measure, with an optional earlier start for indicator warmup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Range whose bars are measured.
    pub range: TimeRange,
    /// Earliest bar the strategy may read for indicator warmup.
    pub warmup_from: Option<DateTime<Utc>>,
}

impl Segment {
    pub fn new(range: TimeRange) -> Self {
        Self {
            range,
            warmup_from: None,
        }
    }

    pub fn with_warmup(range: TimeRange, warmup_from: DateTime<Utc>) -> Self {
        Self {
            range,
            warmup_from: Some(warmup_from),
        }
    }
}

/// Cooperative cancellation and deadline for one invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunContext<'a> {
    cancel: Option<&'a AtomicBool>,
    deadline: Option<(Instant, Duration)>,
}

impl<'a> RunContext<'a> {
    /// No cancellation, no deadline.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(cancel: Option<&'a AtomicBool>, timeout: Option<Duration>) -> Self {
        Self {
            cancel,
            deadline: timeout.map(|limit| (Instant::now() + limit, limit)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.map(|c| c.load(Ordering::Relaxed)).unwrap_or(false)
    }

    /// Fail fast when cancelled or past the deadline.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if let Some((deadline, limit)) = self.deadline {
            if Instant::now() > deadline {
                return Err(EngineError::Timeout {
                    limit_ms: limit.as_millis() as u64,
                });
            }
        }
        Ok(())
    }
}

/// Single-run backtest engine.
pub trait BacktestEngine: Send + Sync {
    fn strategy_id(&self) -> &str;

    fn snapshot_id(&self) -> &str;

    fn run(
        &self,
        segment: &Segment,
        params: &ParameterSet,
        cost: &CostConfig,
        ctx: &RunContext<'_>,
    ) -> Result<RunSummary, EngineError>;
}

/// Bar engine over an in-memory snapshot.
///
/// Trades the first `n_legs` legs of the snapshot; each leg gets
/// `leg_fraction` of the sized allocation at entry.
pub struct BarBacktester {
    snapshot: Arc<Snapshot>,
    spec: StrategySpec,
}

impl BarBacktester {
    pub fn new(snapshot: Arc<Snapshot>, spec: StrategySpec) -> Self {
        Self { snapshot, spec }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// The legs the strategy trades, primary first, checked for alignment.
    fn legs(&self) -> Result<&[BarSeries], EngineError> {
        let all = self.snapshot.legs();
        let wanted = self.spec.n_legs.max(1);
        if all.len() < wanted {
            return Err(EngineError::Failed(format!(
                "{} needs {} legs, snapshot {} has {}",
                self.spec.id,
                wanted,
                self.snapshot.id,
                all.len()
            )));
        }
        let legs = &all[..wanted];
        let aligned = legs.windows(2).all(|pair| {
            pair[0].bars.len() == pair[1].bars.len()
                && pair[0].bars.iter().zip(&pair[1].bars).all(|(a, b)| a.ts == b.ts)
        });
        if !aligned {
            return Err(EngineError::Failed(format!(
                "Legs of snapshot {} are not aligned",
                self.snapshot.id
            )));
        }
        Ok(legs)
    }
}

impl BacktestEngine for BarBacktester {
    fn strategy_id(&self) -> &str {
        self.spec.id
    }

    fn snapshot_id(&self) -> &str {
        &self.snapshot.id
    }

    fn run(
        &self,
        segment: &Segment,
        params: &ParameterSet,
        cost: &CostConfig,
        ctx: &RunContext<'_>,
    ) -> Result<RunSummary, EngineError> {
        let strategy = self.spec.build(params)?;
        let range = segment.range;

        let legs = self.legs()?;
        let primary = legs.first().ok_or(EngineError::NoData(range))?;
        let bars = &primary.bars;

        let start = primary.lower_bound(range.start());
        let end = primary.lower_bound(range.end());
        if start >= end {
            return Err(EngineError::NoData(range));
        }
        let warmup = segment
            .warmup_from
            .map(|ts| primary.lower_bound(ts))
            .unwrap_or(start)
            .min(start);
        let lookback = strategy.lookback().max(1);
        let fraction = strategy.leg_fraction();

        let mut cash = cost.cash;
        let mut position: Option<OpenPosition> = None;
        let mut pending: Option<OrderIntent> = None;
        let mut trades = Vec::new();
        let mut curve = Vec::with_capacity(end - start);

        for i in start..end {
            ctx.check()?;
            let ts = bars[i].ts;

            match pending.take() {
                Some(intent @ (OrderIntent::EnterLong | OrderIntent::EnterShort))
                    if position.is_none() =>
                {
                    let side = if intent == OrderIntent::EnterLong {
                        Decimal::ONE
                    } else {
                        Decimal::NEGATIVE_ONE
                    };
                    let budget = cash * Decimal::from_f64(fraction).unwrap_or(Decimal::ONE);
                    let mut holdings = Vec::with_capacity(legs.len());
                    for (n, leg) in legs.iter().enumerate() {
                        let sign = if n == 0 { side } else { -side };
                        let open = price(leg.bars[i].open, ts)?;
                        let fill = if sign > Decimal::ZERO {
                            cost.buy_fill(open)
                        } else {
                            cost.sell_fill(open)
                        };
                        holdings.push(Holding {
                            shares: sign * cost.shares_for(budget, fill),
                            entry_price: fill,
                        });
                    }
                    if holdings.iter().all(|h| !h.shares.is_zero()) {
                        let commission = holdings
                            .iter()
                            .map(|h| cost.commission(h.shares * h.entry_price))
                            .sum::<Decimal>();
                        let opened = OpenPosition {
                            entry_ts: ts,
                            entry_index: i,
                            holdings,
                            entry_commission: commission,
                        };
                        cash -= opened.cost_basis();
                        position = Some(opened);
                    }
                }
                Some(OrderIntent::Exit) => {
                    if let Some(open) = position.take() {
                        let mut fills = Vec::with_capacity(legs.len());
                        for (leg, held) in legs.iter().zip(&open.holdings) {
                            let px = price(leg.bars[i].open, ts)?;
                            fills.push(if held.shares > Decimal::ZERO {
                                cost.sell_fill(px)
                            } else {
                                cost.buy_fill(px)
                            });
                        }
                        let commission = open
                            .holdings
                            .iter()
                            .zip(&fills)
                            .map(|(h, fill)| cost.commission(h.shares * fill))
                            .sum::<Decimal>();
                        let (trade, proceeds) = open.close(ts, i, &fills, commission);
                        cash += proceeds;
                        trades.push(trade);
                    }
                }
                _ => {}
            }

            let (equity_close, equity_intrabar) = match &position {
                Some(open) => {
                    let mut closes = Vec::with_capacity(legs.len());
                    let mut worst = Vec::with_capacity(legs.len());
                    for (leg, held) in legs.iter().zip(&open.holdings) {
                        let bar = &leg.bars[i];
                        let close = price(bar.close, ts)?;
                        // Longs mark at the low, shorts at the high
                        let adverse = if held.shares > Decimal::ZERO {
                            price(bar.low, ts)?.min(close)
                        } else {
                            price(bar.high, ts)?.max(close)
                        };
                        closes.push(close);
                        worst.push(adverse);
                    }
                    (cash + open.market_value(&closes), cash + open.market_value(&worst))
                }
                None => (cash, cash),
            };
            curve.push(EquityPoint {
                ts,
                equity_close,
                equity_intrabar,
            });

            let from = warmup.max((i + 1).saturating_sub(lookback));
            let state = position.as_ref().and_then(|open| {
                open.primary_entry().map(|entry| PositionState {
                    entry_price: to_f64(entry),
                    bars_held: i - open.entry_index,
                })
            });
            let windows: Vec<&[Bar]> = legs.iter().map(|leg| &leg.bars[from..=i]).collect();
            let intent = strategy.signal_legs(&windows, state.as_ref());
            pending = match (intent, position.is_some()) {
                (OrderIntent::EnterLong | OrderIntent::EnterShort, false)
                | (OrderIntent::Exit, true) => Some(intent),
                _ => None,
            };
        }

        let start_value = to_f64(cost.cash);
        let end_value = curve.last().map(|p| to_f64(p.equity_close)).unwrap_or(start_value);

        let close_series: Vec<f64> = std::iter::once(start_value)
            .chain(curve.iter().map(|p| to_f64(p.equity_close)))
            .collect();
        let intrabar_series: Vec<f64> = std::iter::once(start_value)
            .chain(curve.iter().map(|p| to_f64(p.equity_intrabar)))
            .collect();
        let close_dd = MetricsCalculator::analyze_drawdown(&close_series);
        let intrabar_dd = MetricsCalculator::analyze_drawdown(&intrabar_series);
        let sharpe = MetricsCalculator::sharpe_ratio(&MetricsCalculator::daily_returns(&curve, cost.cash));

        let coverage = TimeRange::new(bars[start].ts, bars[end - 1].ts + chrono::Duration::seconds(1)).ok();

        debug!(
            "{} {} over {}: {} trades, net {:.2}",
            self.spec.id,
            params,
            range,
            trades.len(),
            end_value - start_value
        );

        Ok(RunSummary {
            snapshot_id: self.snapshot.id.clone(),
            strategy_id: self.spec.id.to_string(),
            params: params.clone(),
            range,
            coverage,
            bars: end - start,
            start_value,
            end_value,
            net_pnl: end_value - start_value,
            net_return_pct: if start_value > 0.0 {
                (end_value / start_value - 1.0) * 100.0
            } else {
                0.0
            },
            max_drawdown_close_pct: close_dd.max_drawdown_pct,
            max_drawdown_close_len: close_dd.max_drawdown_len,
            max_drawdown_intrabar_pct: Some(intrabar_dd.max_drawdown_pct),
            sharpe,
            trades: MetricsCalculator::trade_stats(&trades, cost.cash),
        })
    }
}

fn price(value: f64, ts: DateTime<Utc>) -> Result<Decimal, EngineError> {
    Decimal::from_f64(value).ok_or_else(|| EngineError::Failed(format!("Non-finite price at {}", ts)))
}
