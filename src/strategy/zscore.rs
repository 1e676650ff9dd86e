//! Z-score of price against its rolling mean, long only.

use crate::data::Bar;
use crate::params::{ParamError, ParameterGrid, ParameterSet};

use super::indicators::{sma_last, stddev_last};
use super::signal::{closes, BracketExit, OrderIntent, PositionState, Strategy};

const MIN_STD: f64 = 1e-8;

#[derive(Debug, Clone)]
pub struct ZScoreMr {
    lookback: usize,
    z_entry: f64,
    z_exit: f64,
    bracket: BracketExit,
}

impl ZScoreMr {
    pub fn from_params(params: &ParameterSet) -> Result<Self, ParamError> {
        Ok(Self {
            lookback: params.int_at_least("lookback", 2)? as usize,
            z_entry: params.float("z_entry")?.abs(),
            z_exit: params.float("z_exit")?.abs(),
            bracket: BracketExit::from_params(params)?,
        })
    }

    pub fn default_grid() -> ParameterGrid {
        ParameterGrid::new()
            .int_param("lookback", &[30, 50, 80])
            .float_param("z_entry", &[1.5, 2.0, 2.5])
            .float_param("z_exit", &[0.0, 0.5])
            .float_param("stop_pct", &[0.008, 0.010, 0.012])
            .float_param("take_pct", &[0.010, 0.012, 0.015])
            .int_param("max_bars_hold", &[12, 24, 36])
    }

    fn zscore(&self, history: &[Bar]) -> Option<f64> {
        let closes = closes(history);
        let mean = sma_last(&closes, self.lookback)?;
        let sd = stddev_last(&closes, self.lookback)?;
        let last = *closes.last()?;
        Some((last - mean) / (sd + MIN_STD))
    }
}

impl Strategy for ZScoreMr {
    fn lookback(&self) -> usize {
        self.lookback
    }

    fn signal(&self, history: &[Bar], position: Option<&PositionState>) -> OrderIntent {
        let (Some(bar), Some(z)) = (history.last(), self.zscore(history)) else {
            return OrderIntent::Hold;
        };

        match position {
            None if z <= -self.z_entry => OrderIntent::EnterLong,
            None => OrderIntent::Hold,
            Some(pos) => {
                if self.bracket.stop_hit(bar.close, pos)
                    || self.bracket.take_hit(bar.close, pos)
                    || z >= -self.z_exit
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_bars;

    fn strategy() -> ZScoreMr {
        let params = ParameterSet::new()
            .with("lookback", 4i64)
            .with("z_entry", 1.5)
            .with("z_exit", 0.0)
            .with("stop_pct", 0.5)
            .with("take_pct", 0.5)
            .with("max_bars_hold", 10i64);
        ZScoreMr::from_params(&params).unwrap()
    }

    #[test]
    fn test_entry_on_deep_negative_z() {
        let s = strategy();
        let history = test_bars(&[10.0, 10.0, 10.0, 7.0]);
        assert_eq!(s.signal(&history, None), OrderIntent::EnterLong);
    }

    #[test]
    fn test_exit_when_z_recovers() {
        let s = strategy();
        let pos = PositionState {
            entry_price: 9.0,
            bars_held: 2,
        };
        let history = test_bars(&[9.0, 9.0, 9.5, 10.0]);
        assert_eq!(s.signal(&history, Some(&pos)), OrderIntent::Exit);
    }
}
