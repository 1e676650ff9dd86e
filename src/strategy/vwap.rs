//! Deviation from the session VWAP, long only.
//!
//! The VWAP resets at each UTC calendar date. Entry when the close sits
//! `dev_entry` below it; exit once the deviation recovers to `-dev_exit`,
//! on the bracket levels, or after `max_bars_hold` bars.

use crate::data::Bar;
use crate::params::{ParamError, ParameterGrid, ParameterSet};

use super::signal::{BracketExit, OrderIntent, PositionState, Strategy};

/// One trading day of one-minute bars.
const SESSION_BARS: usize = 1440;

#[derive(Debug, Clone)]
pub struct VwapMr {
    dev_entry: f64,
    dev_exit: f64,
    bracket: BracketExit,
}

impl VwapMr {
    pub fn from_params(params: &ParameterSet) -> Result<Self, ParamError> {
        Ok(Self {
            dev_entry: params.float("dev_entry")?.abs(),
            dev_exit: params.float("dev_exit")?.abs(),
            bracket: BracketExit::from_params(params)?,
        })
    }

    pub fn default_grid() -> ParameterGrid {
        ParameterGrid::new()
            .float_param("dev_entry", &[0.004, 0.006, 0.008])
            .float_param("dev_exit", &[0.0, 0.002])
            .float_param("stop_pct", &[0.008, 0.010, 0.012])
            .float_param("take_pct", &[0.008, 0.010, 0.012])
            .int_param("max_bars_hold", &[8, 12, 16])
    }
}

/// Volume-weighted close over the bars sharing the last bar's date.
///
/// Falls back to the last close when the session has no volume.
pub fn session_vwap(history: &[Bar]) -> Option<f64> {
    let last = history.last()?;
    let date = last.ts.date_naive();

    let (pv, v) = history
        .iter()
        .rev()
        .take_while(|b| b.ts.date_naive() == date)
        .fold((0.0, 0.0), |(pv, v), b| (pv + b.close * b.volume, v + b.volume));

    if v > 0.0 {
        Some(pv / v)
    } else {
        Some(last.close)
    }
}

impl Strategy for VwapMr {
    fn lookback(&self) -> usize {
        SESSION_BARS
    }

    fn signal(&self, history: &[Bar], position: Option<&PositionState>) -> OrderIntent {
        let (Some(bar), Some(vwap)) = (history.last(), session_vwap(history)) else {
            return OrderIntent::Hold;
        };
        if vwap <= 0.0 {
            return OrderIntent::Hold;
        }
        let dev = (bar.close - vwap) / vwap;

        match position {
            None if dev <= -self.dev_entry => OrderIntent::EnterLong,
            None => OrderIntent::Hold,
            Some(pos) => {
                if self.bracket.stop_hit(bar.close, pos)
                    || self.bracket.take_hit(bar.close, pos)
                    || dev >= -self.dev_exit
                    || self.bracket.expired(pos)
                {
                    OrderIntent::Exit
                } else {
                    OrderIntent::Hold
                }
            }
        }
    }
}
