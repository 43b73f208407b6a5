//! Fill and PnL Ledger
//!
//! Append-only logs of fills and ledger entries with average-cost realized PnL.
//!
//! # Invariants
//!
//! 1. **Immutability**: fills and entries are only ever appended.
//! 2. **One entry per event**: every fill and every funding tick yields exactly one entry.
//! 3. **Derived state**: inventory is the signed sum of fill quantities; the cached
//!    running position is verifiable with [`Ledger::recompute_inventory`].

use crate::backtest::clock::Nanos;
use crate::backtest::events::{OrderId, Price, Side, Size, QTY_EPSILON};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a fill added or removed liquidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liquidity {
    Maker,
    Taker,
}

impl Liquidity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Liquidity::Maker => "maker",
            Liquidity::Taker => "taker",
        }
    }
}

impl fmt::Display for Liquidity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub fill_id: u64,
    pub order_id: OrderId,
    pub timestamp_ns: Nanos,
    pub side: Side,
    pub price: Price,
    pub quantity: Size,
    pub fee_bps_applied: f64,
    pub fee_paid: f64,
    pub liquidity: Liquidity,
}

impl Fill {
    #[inline]
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }

    #[inline]
    pub fn signed_quantity(&self) -> f64 {
        self.side.sign() * self.quantity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Fill,
    Funding,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Fill => "fill",
            EntryKind::Funding => "funding",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: u64,
    pub timestamp_ns: Nanos,
    pub kind: EntryKind,
    pub realized_pnl_delta: f64,
    pub fee_paid: f64,
    pub funding_paid: f64,
    pub inventory_after: f64,
}

impl LedgerEntry {
    /// `realized_pnl_delta - fee_paid - funding_paid`
    #[inline]
    pub fn net_pnl(&self) -> f64 {
        self.realized_pnl_delta - self.fee_paid - self.funding_paid
    }
}

/// `price * quantity * bps / 10_000`
#[inline]
pub fn fee_for(price: Price, quantity: Size, bps: f64) -> f64 {
    price * quantity * bps / 10_000.0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerStats {
    pub fills: u64,
    pub maker_fills: u64,
    pub taker_fills: u64,
    pub buy_quantity: f64,
    pub sell_quantity: f64,
    pub notional: f64,
    pub realized_pnl: f64,
    pub fees_paid: f64,
    pub funding_paid: f64,
    pub funding_ticks: u64,
}

impl LedgerStats {
    pub fn volume(&self) -> f64 {
        self.buy_quantity + self.sell_quantity
    }

    pub fn net_pnl(&self) -> f64 {
        self.realized_pnl - self.fees_paid - self.funding_paid
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    fills: Vec<Fill>,
    entries: Vec<LedgerEntry>,
    /// Signed running position.
    position: f64,
    /// Average entry price of the open position (0 when flat).
    avg_price: f64,
    last_fill_price: Option<Price>,
    pub stats: LedgerStats,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fill and its ledger entry. Returns the new fill's id.
    pub fn post_fill(
        &mut self,
        order_id: OrderId,
        timestamp_ns: Nanos,
        side: Side,
        price: Price,
        quantity: Size,
        liquidity: Liquidity,
        fee_bps: f64,
    ) -> u64 {
        let fill_id = self.fills.len() as u64 + 1;
        let fee_paid = fee_for(price, quantity, fee_bps);
        let realized = self.apply_position(side, price, quantity);

        let fill = Fill {
            fill_id,
            order_id,
            timestamp_ns,
            side,
            price,
            quantity,
            fee_bps_applied: fee_bps,
            fee_paid,
            liquidity,
        };
        self.stats.notional += fill.notional();
        self.fills.push(fill);
        self.push_entry(timestamp_ns, EntryKind::Fill, realized, fee_paid, 0.0);

        self.last_fill_price = Some(price);
        self.stats.fills += 1;
        match liquidity {
            Liquidity::Maker => self.stats.maker_fills += 1,
            Liquidity::Taker => self.stats.taker_fills += 1,
        }
        match side {
            Side::Buy => self.stats.buy_quantity += quantity,
            Side::Sell => self.stats.sell_quantity += quantity,
        }
        self.stats.realized_pnl += realized;
        self.stats.fees_paid += fee_paid;
        fill_id
    }

    /// Record one funding tick against the current inventory.
    pub fn post_funding(&mut self, timestamp_ns: Nanos, mark: Price, bps: f64) -> f64 {
        let funding_paid = self.position * mark * bps / 10_000.0;
        self.push_entry(timestamp_ns, EntryKind::Funding, 0.0, 0.0, funding_paid);
        self.stats.funding_paid += funding_paid;
        self.stats.funding_ticks += 1;
        funding_paid
    }

    fn push_entry(
        &mut self,
        timestamp_ns: Nanos,
        kind: EntryKind,
        realized_pnl_delta: f64,
        fee_paid: f64,
        funding_paid: f64,
    ) {
        let entry_id = self.entries.len() as u64 + 1;
        self.entries.push(LedgerEntry {
            entry_id,
            timestamp_ns,
            kind,
            realized_pnl_delta,
            fee_paid,
            funding_paid,
            inventory_after: self.position,
        });
    }

    /// Average-cost position update; returns realized PnL of the closed part.
    fn apply_position(&mut self, side: Side, price: Price, quantity: Size) -> f64 {
        let signed = side.sign() * quantity;
        let same_direction = self.position.abs() <= QTY_EPSILON
            || self.position.signum() == signed.signum();

        if same_direction {
            let held = self.position.abs();
            self.avg_price = (held * self.avg_price + quantity * price) / (held + quantity);
            self.position += signed;
            return 0.0;
        }

        let closed = quantity.min(self.position.abs());
        let realized = closed * (price - self.avg_price) * self.position.signum();
        self.position += signed;

        if self.position.abs() <= QTY_EPSILON {
            self.position = 0.0;
            self.avg_price = 0.0;
        } else if quantity > closed {
            // Flipped through flat: remainder opens at this price
            self.avg_price = price;
        }
        realized
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Cached running inventory.
    #[inline]
    pub fn inventory(&self) -> f64 {
        self.position
    }

    #[inline]
    pub fn avg_entry_price(&self) -> f64 {
        self.avg_price
    }

    pub fn last_fill_price(&self) -> Option<Price> {
        self.last_fill_price
    }

    /// Inventory recomputed from the fill log.
    pub fn recompute_inventory(&self) -> f64 {
        self.fills.iter().map(Fill::signed_quantity).sum()
    }

    /// Unrealized PnL of the open position at `mark`.
    pub fn unrealized_pnl(&self, mark: Price) -> f64 {
        self.position * (mark - self.avg_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_realizes_spread_minus_fees() {
        let mut ledger = Ledger::new();
        ledger.post_fill(1, 10, Side::Buy, 100.0, 2.0, Liquidity::Maker, 1.0);
        ledger.post_fill(2, 20, Side::Sell, 101.0, 2.0, Liquidity::Taker, 5.0);

        assert_eq!(ledger.inventory(), 0.0);
        assert_eq!(ledger.recompute_inventory(), 0.0);
        assert!((ledger.stats.realized_pnl - 2.0).abs() < 1e-9);

        let entries = ledger.entries();
        assert_eq!(entries.len(), 2);
        assert!((entries[0].fee_paid - 0.02).abs() < 1e-12);
        assert!((entries[1].fee_paid - 0.101).abs() < 1e-12);
        assert!((ledger.stats.net_pnl() - (2.0 - 0.121)).abs() < 1e-9);
        assert_eq!(ledger.stats.maker_fills, 1);
        assert_eq!(ledger.stats.taker_fills, 1);

        let notional: f64 = ledger.fills().iter().map(Fill::notional).sum();
        assert_eq!(ledger.stats.notional, notional);
        assert!((notional - 402.0).abs() < 1e-9);
    }

    #[test]
    fn test_average_cost_and_flip() {
        let mut ledger = Ledger::new();
        ledger.post_fill(1, 1, Side::Buy, 100.0, 1.0, Liquidity::Maker, 0.0);
        ledger.post_fill(2, 2, Side::Buy, 102.0, 1.0, Liquidity::Maker, 0.0);
        assert!((ledger.avg_entry_price() - 101.0).abs() < 1e-12);

        // Sell 3: closes 2 at +1 each, opens 1 short at 102
        ledger.post_fill(3, 3, Side::Sell, 102.0, 3.0, Liquidity::Maker, 0.0);
        assert!((ledger.entries()[2].realized_pnl_delta - 2.0).abs() < 1e-12);
        assert_eq!(ledger.inventory(), -1.0);
        assert_eq!(ledger.avg_entry_price(), 102.0);
        assert!((ledger.unrealized_pnl(100.0) - 2.0).abs() < 1e-12);
        assert_eq!(ledger.recompute_inventory(), ledger.inventory());
    }

    #[test]
    fn test_funding_entry_uses_inventory_and_mark() {
        let mut ledger = Ledger::new();
        ledger.post_fill(1, 1, Side::Buy, 100.0, 2.0, Liquidity::Maker, 0.0);
        let paid = ledger.post_funding(2, 110.0, 1.0);
        assert!((paid - 0.022).abs() < 1e-12);

        let entry = &ledger.entries()[1];
        assert_eq!(entry.kind, EntryKind::Funding);
        assert_eq!(entry.inventory_after, 2.0);
        assert!((entry.net_pnl() + 0.022).abs() < 1e-12);
        assert_eq!(ledger.stats.funding_ticks, 1);
        assert_eq!(ledger.fills().len(), 1);
    }
}
