//! Order Book State
//!
//! Maintains the visible L2 ladder from add/modify/delete/trade deltas.
//! Levels are keyed by fixed-point ticks so float noise never splits a level.

use crate::backtest::clock::Nanos;
use crate::backtest::events::{
    from_ticks, to_ticks, BookEvent, BookEventKind, Level, PriceTicks, Side, Size, QTY_EPSILON,
};
use crate::error::InvalidEventError;
use std::collections::BTreeMap;

/// Effect of one applied delta.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BookChange {
    /// Quantity left at the touched level (0 when the level is gone).
    pub level_quantity: Size,
    /// Visible quantity at the level went down.
    pub reduced: bool,
    /// Best bid or best ask (price or quantity) changed.
    pub top_changed: bool,
}

/// Single-instrument L2 order book.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    /// Ascending ticks; best bid is the last key.
    bids: BTreeMap<PriceTicks, Size>,
    /// Ascending ticks; best ask is the first key.
    asks: BTreeMap<PriceTicks, Size>,
    pub last_update: Nanos,
    pub update_count: u64,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn ladder(&self, side: Side) -> &BTreeMap<PriceTicks, Size> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    #[inline]
    fn ladder_mut(&mut self, side: Side) -> &mut BTreeMap<PriceTicks, Size> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Apply one delta. Invalid deltas leave the book untouched.
    pub fn apply(&mut self, event: &BookEvent) -> Result<BookChange, InvalidEventError> {
        if !event.price.is_finite() || event.price <= 0.0 {
            return Err(InvalidEventError::InvalidPrice { price: event.price });
        }
        let qty = event.quantity;
        if !qty.is_finite() || qty < 0.0 || (event.kind == BookEventKind::Add && qty <= 0.0) {
            return Err(InvalidEventError::InvalidQuantity { quantity: qty });
        }

        let ticks = to_ticks(event.price);
        let top_before = self.top();
        let ladder = self.ladder_mut(event.side);
        let before = ladder.get(&ticks).copied();

        let after = match event.kind {
            BookEventKind::Add => before.unwrap_or(0.0) + qty,
            BookEventKind::Modify => {
                if before.is_none() {
                    return Err(InvalidEventError::UnknownLevel {
                        side: event.side,
                        price: event.price,
                    });
                }
                qty
            }
            BookEventKind::Delete => {
                if before.is_none() {
                    return Err(InvalidEventError::UnknownLevel {
                        side: event.side,
                        price: event.price,
                    });
                }
                0.0
            }
            BookEventKind::Trade => (before.unwrap_or(0.0) - qty).max(0.0),
        };

        if after <= QTY_EPSILON {
            ladder.remove(&ticks);
        } else {
            ladder.insert(ticks, after);
        }

        self.last_update = event.timestamp_ns;
        self.update_count += 1;

        let level_quantity = if after <= QTY_EPSILON { 0.0 } else { after };
        Ok(BookChange {
            level_quantity,
            reduced: level_quantity < before.unwrap_or(0.0),
            top_changed: self.top() != top_before,
        })
    }

    pub fn best_bid(&self) -> Option<Level> {
        self.bids
            .last_key_value()
            .map(|(k, q)| Level::new(from_ticks(*k), *q))
    }

    pub fn best_ask(&self) -> Option<Level> {
        self.asks
            .first_key_value()
            .map(|(k, q)| Level::new(from_ticks(*k), *q))
    }

    /// Best level on `side`.
    pub fn best(&self, side: Side) -> Option<Level> {
        match side {
            Side::Buy => self.best_bid(),
            Side::Sell => self.best_ask(),
        }
    }

    pub fn top(&self) -> (Option<Level>, Option<Level>) {
        (self.best_bid(), self.best_ask())
    }

    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / 2.0),
            _ => None,
        }
    }

    /// Visible quantity resting at a level right now.
    #[inline]
    pub fn queue_ahead(&self, side: Side, price_ticks: PriceTicks) -> Size {
        self.ladder(side).get(&price_ticks).copied().unwrap_or(0.0)
    }

    /// Remove up to `quantity` from a level (own aggressive order). Returns what is left.
    pub fn consume(&mut self, side: Side, price_ticks: PriceTicks, quantity: Size) -> Size {
        let ladder = self.ladder_mut(side);
        let Some(level) = ladder.get_mut(&price_ticks) else {
            return 0.0;
        };
        *level = (*level - quantity).max(0.0);
        let left = *level;
        if left <= QTY_EPSILON {
            ladder.remove(&price_ticks);
            0.0
        } else {
            left
        }
    }

    /// Levels on `side` an order with limit `limit_ticks` from the other side
    /// would cross, best first.
    pub fn crossable_levels(&self, side: Side, limit_ticks: PriceTicks) -> Vec<(PriceTicks, Size)> {
        match side {
            Side::Sell => self
                .asks
                .range(..=limit_ticks)
                .map(|(k, q)| (*k, *q))
                .collect(),
            Side::Buy => self
                .bids
                .range(limit_ticks..)
                .rev()
                .map(|(k, q)| (*k, *q))
                .collect(),
        }
    }

    /// Top `n` levels of a side, best first.
    pub fn depth(&self, side: Side, n: usize) -> Vec<Level> {
        let to_level = |(k, q): (&PriceTicks, &Size)| Level::new(from_ticks(*k), *q);
        match side {
            Side::Buy => self.bids.iter().rev().take(n).map(to_level).collect(),
            Side::Sell => self.asks.iter().take(n).map(to_level).collect(),
        }
    }

    #[inline]
    pub fn level_count(&self, side: Side) -> usize {
        self.ladder(side).len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}
