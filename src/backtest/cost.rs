//! Execution cost model: account size, per-side slippage, commission, sizing.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Cost configuration passed to every engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// Starting cash.
    pub cash: Decimal,
    /// Slippage per side in basis points of the fill price.
    pub slippage_bps_side: f64,
    /// Commission as a fraction of traded notional (0.001 = 0.1%).
    pub commission_pct: f64,
    /// Fraction of available cash committed on entry.
    pub allocation: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            cash: Decimal::from(2000),
            slippage_bps_side: 5.0,
            commission_pct: 0.0,
            allocation: 0.95,
        }
    }
}

impl CostConfig {
    pub fn with_slippage_bps(mut self, bps: f64) -> Self {
        self.slippage_bps_side = bps;
        self
    }

    pub fn with_commission_pct(mut self, pct: f64) -> Self {
        self.commission_pct = pct;
        self
    }

    fn slippage_frac(&self) -> Decimal {
        Decimal::from_f64(self.slippage_bps_side / 10_000.0).unwrap_or(Decimal::ZERO)
    }

    /// Fill price paid when buying at `price`.
    pub fn buy_fill(&self, price: Decimal) -> Decimal {
        price * (Decimal::ONE + self.slippage_frac())
    }

    /// Fill price received when selling at `price`.
    pub fn sell_fill(&self, price: Decimal) -> Decimal {
        price * (Decimal::ONE - self.slippage_frac())
    }

    /// Commission on a given notional.
    pub fn commission(&self, notional: Decimal) -> Decimal {
        let pct = Decimal::from_f64(self.commission_pct).unwrap_or(Decimal::ZERO);
        (notional * pct).abs()
    }

    /// Whole shares affordable at `fill_price` including commission.
    pub fn shares_for(&self, cash: Decimal, fill_price: Decimal) -> Decimal {
        if fill_price <= Decimal::ZERO || cash <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let allocation = Decimal::from_f64(self.allocation.clamp(0.0, 1.0)).unwrap_or(Decimal::ONE);
        let pct = Decimal::from_f64(self.commission_pct.max(0.0)).unwrap_or(Decimal::ZERO);
        let per_share = fill_price * (Decimal::ONE + pct);
        (cash * allocation / per_share).floor()
    }
}
