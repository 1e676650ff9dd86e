//! The strategy capability contract.
//!
//! A strategy is a pure function from a bounded history window and the
//! current position state to an order intent. It never sees the evaluation
//! pipeline and holds no mutable state between bars.
//!
//! Multi-leg strategies see one aligned window per leg, primary leg first.
//! A long intent buys the primary leg and sells the others; a short intent
//! does the reverse.

use crate::data::Bar;
use crate::params::{ParamError, ParameterSet};

/// What the strategy wants to do at the close of the current bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderIntent {
    /// Do nothing.
    Hold,
    /// Open long on the primary leg.
    EnterLong,
    /// Open short on the primary leg.
    EnterShort,
    /// Close every leg.
    Exit,
}

/// The open position as the strategy sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionState {
    /// Fill price of the entry.
    pub entry_price: f64,
    /// Bars elapsed since the fill bar (0 on the fill bar itself).
    pub bars_held: usize,
}

/// Pure signal function with its parameters already bound.
pub trait Strategy: Send + Sync {
    /// Number of trailing bars `signal` needs, including the current one.
    fn lookback(&self) -> usize;

    /// Decide at the close of `history.last()`.
    fn signal(&self, history: &[Bar], position: Option<&PositionState>) -> OrderIntent;

    /// Decide with every leg visible. All windows end on the same timestamp.
    fn signal_legs(&self, legs: &[&[Bar]], position: Option<&PositionState>) -> OrderIntent {
        match legs.first() {
            Some(primary) => self.signal(primary, position),
            None => OrderIntent::Hold,
        }
    }

    /// Fraction of the sized allocation committed to each leg on entry.
    fn leg_fraction(&self) -> f64 {
        1.0
    }
}

/// Fixed stop, take profit and time exit shared by the mean-reversion family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BracketExit {
    /// Exit when the close falls this fraction below entry.
    pub stop_pct: f64,
    /// Exit when the close rises this fraction above entry.
    pub take_pct: f64,
    /// Exit after this many bars.
    pub max_bars_hold: usize,
}

impl BracketExit {
    pub fn from_params(params: &ParameterSet) -> Result<Self, ParamError> {
        Ok(Self {
            stop_pct: params.float("stop_pct")?,
            take_pct: params.float("take_pct")?,
            max_bars_hold: params.int_at_least("max_bars_hold", 1)? as usize,
        })
    }

    pub fn stop_hit(&self, close: f64, position: &PositionState) -> bool {
        close <= position.entry_price * (1.0 - self.stop_pct)
    }

    pub fn take_hit(&self, close: f64, position: &PositionState) -> bool {
        close >= position.entry_price * (1.0 + self.take_pct)
    }

    pub fn expired(&self, position: &PositionState) -> bool {
        position.bars_held >= self.max_bars_hold
    }
}

pub(crate) fn closes(history: &[Bar]) -> Vec<f64> {
    history.iter().map(|b| b.close).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracket_levels() {
        let bracket = BracketExit {
            stop_pct: 0.01,
            take_pct: 0.02,
            max_bars_hold: 3,
        };
        let pos = PositionState {
            entry_price: 100.0,
            bars_held: 2,
        };

        assert!(bracket.stop_hit(99.0, &pos));
        assert!(!bracket.stop_hit(99.5, &pos));
        assert!(bracket.take_hit(102.0, &pos));
        assert!(!bracket.expired(&pos));
        assert!(bracket.expired(&PositionState { bars_held: 3, ..pos }));
    }

    #[test]
    fn test_bracket_requires_params() {
        let params = ParameterSet::new().with("stop_pct", 0.01).with("take_pct", 0.02);
        assert!(matches!(
            BracketExit::from_params(&params),
            Err(ParamError::Missing(name)) if name == "max_bars_hold"
        ));
    }
}
