//! Two-leg ratio z-score mean reversion.
//!
//! `ratio = close(A) / close(B)` over aligned bars. Long the ratio (long A,
//! short B) when its z-score drops below `-z_entry`, short it above
//! `z_entry`, flat once `|z| <= z_exit` or after `max_bars_hold` bars.

use crate::data::Bar;
use crate::params::{ParamError, ParameterGrid, ParameterSet};

use super::indicators::{sma_last, stddev_last};
use super::signal::{OrderIntent, PositionState, Strategy};

const MIN_STD: f64 = 1e-8;

#[derive(Debug, Clone)]
pub struct PairsMr {
    lookback: usize,
    z_entry: f64,
    z_exit: f64,
    max_bars_hold: usize,
    leg_value_frac: f64,
}

impl PairsMr {
    pub fn from_params(params: &ParameterSet) -> Result<Self, ParamError> {
        let leg_value_frac = params.float("leg_value_frac")?;
        if !(leg_value_frac > 0.0 && leg_value_frac <= 1.0) {
            return Err(ParamError::Invalid {
                name: "leg_value_frac".to_string(),
                reason: format!("{} is outside (0, 1]", leg_value_frac),
            });
        }

        Ok(Self {
            lookback: params.int_at_least("lookback", 2)? as usize,
            z_entry: params.float("z_entry")?.abs(),
            z_exit: params.float("z_exit")?.abs(),
            max_bars_hold: params.int_at_least("max_bars_hold", 1)? as usize,
            leg_value_frac,
        })
    }

    pub fn default_grid() -> ParameterGrid {
        ParameterGrid::new()
            .int_param("lookback", &[30, 50, 80])
            .float_param("z_entry", &[1.5, 2.0, 2.5])
            .float_param("z_exit", &[0.25, 0.5, 0.75])
            .int_param("max_bars_hold", &[24, 48, 72])
            .float_param("leg_value_frac", &[0.35, 0.45])
    }

    fn zscore(&self, a: &[Bar], b: &[Bar]) -> Option<f64> {
        let ratios = a
            .iter()
            .zip(b)
            .map(|(x, y)| (y.close > 0.0).then(|| x.close / y.close))
            .collect::<Option<Vec<f64>>>()?;
        let mean = sma_last(&ratios, self.lookback)?;
        let sd = stddev_last(&ratios, self.lookback)?;
        let last = *ratios.last()?;
        Some((last - mean) / (sd + MIN_STD))
    }
}

impl Strategy for PairsMr {
    fn lookback(&self) -> usize {
        self.lookback
    }

    /// A lone leg carries no ratio.
    fn signal(&self, _history: &[Bar], _position: Option<&PositionState>) -> OrderIntent {
        OrderIntent::Hold
    }

    fn signal_legs(&self, legs: &[&[Bar]], position: Option<&PositionState>) -> OrderIntent {
        let [a, b] = legs else {
            return OrderIntent::Hold;
        };
        let Some(z) = self.zscore(a, b) else {
            return OrderIntent::Hold;
        };

        match position {
            Some(pos) if z.abs() <= self.z_exit || pos.bars_held >= self.max_bars_hold => {
                OrderIntent::Exit
            }
            Some(_) => OrderIntent::Hold,
            None if z <= -self.z_entry => OrderIntent::EnterLong,
            None if z >= self.z_entry => OrderIntent::EnterShort,
            None => OrderIntent::Hold,
        }
    }

    fn leg_fraction(&self) -> f64 {
        self.leg_value_frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_bars;

    fn strategy() -> PairsMr {
        let params = ParameterSet::new()
            .with("lookback", 4i64)
            .with("z_entry", 1.5)
            .with("z_exit", 0.5)
            .with("max_bars_hold", 5i64)
            .with("leg_value_frac", 0.45);
        PairsMr::from_params(&params).unwrap()
    }

    #[test]
    fn test_cheap_ratio_goes_long_rich_ratio_goes_short() {
        let s = strategy();
        let b = test_bars(&[10.0, 10.0, 10.0, 10.0]);

        let cheap = test_bars(&[20.0, 20.0, 20.0, 17.0]);
        assert_eq!(s.signal_legs(&[cheap.as_slice(), b.as_slice()], None), OrderIntent::EnterLong);

        let rich = test_bars(&[20.0, 20.0, 20.0, 23.0]);
        assert_eq!(s.signal_legs(&[rich.as_slice(), b.as_slice()], None), OrderIntent::EnterShort);

        let flat = test_bars(&[20.0, 20.0, 20.0, 20.0]);
        assert_eq!(s.signal_legs(&[flat.as_slice(), b.as_slice()], None), OrderIntent::Hold);
    }

    #[test]
    fn test_exit_on_convergence_or_age() {
        let s = strategy();
        let b = test_bars(&[10.0, 10.0, 10.0, 10.0]);
        let flat = test_bars(&[20.0, 20.0, 20.0, 20.0]);
        let stretched = test_bars(&[20.0, 20.0, 20.0, 17.0]);
        let young = PositionState {
            entry_price: 17.0,
            bars_held: 1,
        };

        let converged = [flat.as_slice(), b.as_slice()];
        let wide = [stretched.as_slice(), b.as_slice()];
        assert_eq!(s.signal_legs(&converged, Some(&young)), OrderIntent::Exit);
        assert_eq!(s.signal_legs(&wide, Some(&young)), OrderIntent::Hold);

        let old = PositionState { bars_held: 5, ..young };
        assert_eq!(s.signal_legs(&wide, Some(&old)), OrderIntent::Exit);
    }

    #[test]
    fn test_single_leg_holds() {
        let s = strategy();
        let a = test_bars(&[20.0, 20.0, 20.0, 17.0]);
        assert_eq!(s.signal_legs(&[a.as_slice()], None), OrderIntent::Hold);
        assert_eq!(s.signal(&a, None), OrderIntent::Hold);
    }

    #[test]
    fn test_leg_fraction_bounds() {
        assert_eq!(strategy().leg_fraction(), 0.45);
        let params = ParameterSet::new()
            .with("lookback", 4i64)
            .with("z_entry", 1.5)
            .with("z_exit", 0.5)
            .with("max_bars_hold", 5i64)
            .with("leg_value_frac", 1.5);
        assert!(matches!(
            PairsMr::from_params(&params),
            Err(ParamError::Invalid { name, .. }) if name == "leg_value_frac"
        ));
    }
}
