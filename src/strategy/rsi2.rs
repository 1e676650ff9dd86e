//! Short-period RSI mean reversion.
//!
//! Long when RSI drops below `entry_rsi`; flat on stop, take profit or after
//! `max_bars_hold` bars.

use crate::data::Bar;
use crate::params::{ParamError, ParameterGrid, ParameterSet};

use super::indicators::rsi_last;
use super::signal::{closes, BracketExit, OrderIntent, PositionState, Strategy};

/// Bars of Wilder smoothing history per unit of RSI period.
const WARMUP_PER_PERIOD: usize = 10;

#[derive(Debug, Clone)]
pub struct Rsi2 {
    rsi_period: usize,
    entry_rsi: f64,
    bracket: BracketExit,
}

impl Rsi2 {
    pub fn from_params(params: &ParameterSet) -> Result<Self, ParamError> {
        Ok(Self {
            rsi_period: params.int_at_least("rsi_period", 1)? as usize,
            entry_rsi: params.float("entry_rsi")?,
            bracket: BracketExit::from_params(params)?,
        })
    }

    pub fn default_grid() -> ParameterGrid {
        ParameterGrid::new()
            .int_param("rsi_period", &[2, 3, 4, 5])
            .float_param("entry_rsi", &[10.0, 15.0, 20.0])
            .float_param("stop_pct", &[0.004, 0.006, 0.008])
            .float_param("take_pct", &[0.006, 0.009, 0.012])
            .int_param("max_bars_hold", &[4, 8, 12])
    }
}

impl Strategy for Rsi2 {
    fn lookback(&self) -> usize {
        self.rsi_period * WARMUP_PER_PERIOD + 1
    }

    fn signal(&self, history: &[Bar], position: Option<&PositionState>) -> OrderIntent {
        let Some(bar) = history.last() else {
            return OrderIntent::Hold;
        };

        match position {
            None => match rsi_last(&closes(history), self.rsi_period) {
                Some(rsi) if rsi < self.entry_rsi => OrderIntent::EnterLong,
                _ => OrderIntent::Hold,
            },
            Some(pos) => {
                if self.bracket.stop_hit(bar.close, pos)
                    || self.bracket.take_hit(bar.close, pos)
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

    fn params() -> ParameterSet {
        ParameterSet::new()
            .with("rsi_period", 2i64)
            .with("entry_rsi", 15.0)
            .with("stop_pct", 0.01)
            .with("take_pct", 0.01)
            .with("max_bars_hold", 3i64)
    }

    #[test]
    fn test_enters_after_pullback() {
        let strategy = Rsi2::from_params(&params()).unwrap();
        let history = test_bars(&[10.0, 10.5, 11.0, 10.5, 10.0, 9.5]);
        assert_eq!(strategy.signal(&history, None), OrderIntent::EnterLong);

        let rising = test_bars(&[10.0, 10.5, 11.0, 11.5]);
        assert_eq!(strategy.signal(&rising, None), OrderIntent::Hold);
    }

    #[test]
    fn test_exits() {
        let strategy = Rsi2::from_params(&params()).unwrap();
        let pos = PositionState {
            entry_price: 10.0,
            bars_held: 1,
        };

        assert_eq!(strategy.signal(&test_bars(&[10.2]), Some(&pos)), OrderIntent::Exit);
        assert_eq!(strategy.signal(&test_bars(&[9.85]), Some(&pos)), OrderIntent::Exit);
        assert_eq!(strategy.signal(&test_bars(&[10.05]), Some(&pos)), OrderIntent::Hold);

        let old = PositionState { bars_held: 3, ..pos };
        assert_eq!(strategy.signal(&test_bars(&[10.05]), Some(&old)), OrderIntent::Exit);
    }

    #[test]
    fn test_grid_size() {
        assert_eq!(Rsi2::default_grid().total_combinations(), 4 * 3 * 3 * 3 * 3);
    }

    #[test]
    fn test_builds_from_cli_json() {
        let json = r#"{"rsi_period": 2, "entry_rsi": 10.0, "stop_pct": 0.006, "take_pct": 0.009, "max_bars_hold": 8}"#;
        let params: ParameterSet = serde_json::from_str(json).unwrap();
        assert!(Rsi2::from_params(&params).is_ok());

        let partial: ParameterSet = serde_json::from_str(r#"{"rsi_period": 2, "oversold": 10.0}"#).unwrap();
        assert!(matches!(
            Rsi2::from_params(&partial),
            Err(ParamError::Missing(name)) if name == "entry_rsi"
        ));
    }

    #[test]
    fn test_rejects_bad_period() {
        let bad = params().with("rsi_period", 0i64);
        assert!(Rsi2::from_params(&bad).is_err());
    }
}
