//! Bollinger band mean reversion, long only.
//!
//! Entry below the lower band; exit at the middle band, on the bracket
//! levels, or after `max_bars_hold` bars.

use crate::data::Bar;
use crate::params::{ParamError, ParameterGrid, ParameterSet};

use super::indicators::{sma_last, stddev_last};
use super::signal::{closes, BracketExit, OrderIntent, PositionState, Strategy};

#[derive(Debug, Clone)]
pub struct BollingerMr {
    bb_period: usize,
    bb_dev: f64,
    bracket: BracketExit,
}

impl BollingerMr {
    pub fn from_params(params: &ParameterSet) -> Result<Self, ParamError> {
        Ok(Self {
            bb_period: params.int_at_least("bb_period", 2)? as usize,
            bb_dev: params.float("bb_dev")?,
            bracket: BracketExit::from_params(params)?,
        })
    }

    pub fn default_grid() -> ParameterGrid {
        ParameterGrid::new()
            .int_param("bb_period", &[15, 20, 30])
            .float_param("bb_dev", &[1.5, 2.0, 2.5])
            .float_param("stop_pct", &[0.006, 0.008, 0.010])
            .float_param("take_pct", &[0.008, 0.010, 0.012])
            .int_param("max_bars_hold", &[12, 16, 24])
    }

    /// (middle, lower) band at the last bar.
    fn bands(&self, history: &[Bar]) -> Option<(f64, f64)> {
        let closes = closes(history);
        let mid = sma_last(&closes, self.bb_period)?;
        let sd = stddev_last(&closes, self.bb_period)?;
        Some((mid, mid - self.bb_dev * sd))
    }
}

impl Strategy for BollingerMr {
    fn lookback(&self) -> usize {
        self.bb_period
    }

    fn signal(&self, history: &[Bar], position: Option<&PositionState>) -> OrderIntent {
        let Some(bar) = history.last() else {
            return OrderIntent::Hold;
        };
        let Some((mid, lower)) = self.bands(history) else {
            return OrderIntent::Hold;
        };

        match position {
            None if bar.close < lower => OrderIntent::EnterLong,
            None => OrderIntent::Hold,
            Some(pos) => {
                if self.bracket.stop_hit(bar.close, pos)
                    || self.bracket.take_hit(bar.close, pos)
                    || bar.close >= mid
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
