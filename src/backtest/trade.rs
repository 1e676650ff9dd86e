//! Trade and equity records produced by the reference engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One leg of a round trip. Negative share counts are short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLeg {
    /// Signed share count.
    pub shares: Decimal,
    /// Fill price after slippage.
    pub entry_price: Decimal,
    /// Fill price after slippage.
    pub exit_price: Decimal,
}

/// A completed round trip across every leg the strategy trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    /// Timestamp of the entry fill bar.
    pub entry_ts: DateTime<Utc>,
    /// Timestamp of the exit fill bar.
    pub exit_ts: DateTime<Utc>,
    /// Fills per leg, primary leg first.
    pub legs: Vec<TradeLeg>,
    /// Commission paid on entry and exit of every leg.
    pub commission: Decimal,
    /// P&L after slippage and commission.
    pub pnl_net: Decimal,
    /// Bars between the entry fill and the exit fill.
    pub bars_held: usize,
}

impl ClosedTrade {
    pub fn is_winner(&self) -> bool {
        self.pnl_net > Decimal::ZERO
    }
}

/// Entry fill of one leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Holding {
    /// Signed share count.
    pub shares: Decimal,
    /// Fill price after slippage.
    pub entry_price: Decimal,
}

/// Open position, one holding per leg.
#[derive(Debug, Clone)]
pub(crate) struct OpenPosition {
    /// Timestamp of the entry fill bar.
    pub entry_ts: DateTime<Utc>,
    /// Index of the entry fill bar in the leg series.
    pub entry_index: usize,
    /// One holding per leg, primary leg first.
    pub holdings: Vec<Holding>,
    /// Commission paid on entry across every leg.
    pub entry_commission: Decimal,
}

impl OpenPosition {
    /// Net cash paid to open; negative when short proceeds exceed long cost.
    pub fn cost_basis(&self) -> Decimal {
        self.holdings
            .iter()
            .map(|h| h.shares * h.entry_price)
            .sum::<Decimal>()
            + self.entry_commission
    }

    /// Entry fill of the primary leg.
    pub fn primary_entry(&self) -> Option<Decimal> {
        self.holdings.first().map(|h| h.entry_price)
    }

    /// Mark-to-market value of the holdings at one price per leg.
    pub fn market_value(&self, prices: &[Decimal]) -> Decimal {
        self.holdings
            .iter()
            .zip(prices)
            .map(|(h, p)| h.shares * p)
            .sum()
    }

    /// Close every leg at `exit_prices`, returning the trade and the net cash flow.
    pub fn close(
        self,
        exit_ts: DateTime<Utc>,
        exit_index: usize,
        exit_prices: &[Decimal],
        exit_commission: Decimal,
    ) -> (ClosedTrade, Decimal) {
        let proceeds = self.market_value(exit_prices) - exit_commission;
        let pnl_net = proceeds - self.cost_basis();
        let legs = self
            .holdings
            .iter()
            .zip(exit_prices)
            .map(|(h, &exit_price)| TradeLeg {
                shares: h.shares,
                entry_price: h.entry_price,
                exit_price,
            })
            .collect();
        let trade = ClosedTrade {
            entry_ts: self.entry_ts,
            exit_ts,
            legs,
            commission: self.entry_commission + exit_commission,
            pnl_net,
            bars_held: exit_index.saturating_sub(self.entry_index),
        };
        (trade, proceeds)
    }
}

/// Equity at the close of one bar plus a conservative intrabar mark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    /// Bar timestamp.
    pub ts: DateTime<Utc>,
    /// Cash plus positions marked at the close.
    pub equity_close: Decimal,
    /// Cash plus positions marked at the adverse extreme of the bar.
    pub equity_intrabar: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 14, 30, 0).unwrap()
    }

    #[test]
    fn test_close_position_accounts_for_commission() {
        let position = OpenPosition {
            entry_ts: ts(),
            entry_index: 3,
            holdings: vec![Holding {
                shares: dec!(10),
                entry_price: dec!(100),
            }],
            entry_commission: dec!(1),
        };

        let (trade, proceeds) = position.close(ts(), 7, &[dec!(102)], dec!(1));
        assert_eq!(proceeds, dec!(1019));
        assert_eq!(trade.pnl_net, dec!(18));
        assert_eq!(trade.commission, dec!(2));
        assert_eq!(trade.bars_held, 4);
        assert!(trade.is_winner());
    }

    #[test]
    fn test_short_leg_gains_when_price_falls() {
        let position = OpenPosition {
            entry_ts: ts(),
            entry_index: 0,
            holdings: vec![
                Holding {
                    shares: dec!(5),
                    entry_price: dec!(100),
                },
                Holding {
                    shares: dec!(-10),
                    entry_price: dec!(50),
                },
            ],
            entry_commission: Decimal::ZERO,
        };
        assert_eq!(position.cost_basis(), Decimal::ZERO);

        // Long leg flat, short leg down 2 a share
        let (trade, proceeds) = position.close(ts(), 2, &[dec!(100), dec!(48)], Decimal::ZERO);
        assert_eq!(proceeds, dec!(20));
        assert_eq!(trade.pnl_net, dec!(20));
        assert_eq!(trade.legs[1].shares, dec!(-10));
        assert_eq!(trade.legs[1].exit_price, dec!(48));
    }
}
