//! Strategy Harness
//!
//! Capability interface between the simulator and a quoting policy. Strategies
//! never see wall-clock time; `MarketView::timestamp` is the only clock.

use crate::backtest::clock::Nanos;
use crate::backtest::events::{Level, OrderId, Price, Side, Size};
use crate::backtest::order::OrderStatus;
use serde::{Deserialize, Serialize};

/// Why the strategy is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WakeReason {
    /// Top of book changed (delivered after feed latency).
    Tick,
    /// Periodic cadence timer.
    Cadence,
}

/// An order of ours that has not reached a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    pub quantity_remaining: Size,
    pub status: OrderStatus,
}

/// Read-only market state handed to `on_schedule`.
#[derive(Debug, Clone)]
pub struct MarketView {
    pub timestamp: Nanos,
    pub reason: WakeReason,
    pub best_bid: Option<Level>,
    pub best_ask: Option<Level>,
    pub inventory: f64,
    pub open_orders: Vec<OpenOrder>,
}

impl MarketView {
    pub fn mid_price(&self) -> Option<Price> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / 2.0),
            _ => None,
        }
    }

    pub fn open_on(&self, side: Side) -> impl Iterator<Item = &OpenOrder> {
        self.open_orders.iter().filter(move |o| o.side == side)
    }
}

/// What a strategy asks the simulator to do.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderAction {
    Submit { side: Side, price: Price, quantity: Size },
    Cancel { order_id: OrderId },
}

/// Strategy parameters. Immutable per run; a sweep builds a new one per combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyContext {
    pub inventory_target: f64,
    pub quote_width_bps: f64,
    pub imbalance_threshold: f64,
    pub cancel_cadence_ms: u64,
    pub max_orders_per_minute: u32,
    pub order_size: f64,
}

impl Default for StrategyContext {
    fn default() -> Self {
        Self {
            inventory_target: 0.0,
            quote_width_bps: 5.0,
            imbalance_threshold: 0.0,
            cancel_cadence_ms: 1000,
            max_orders_per_minute: 60,
            order_size: 0.001,
        }
    }
}

impl StrategyContext {
    /// Parameter names accepted by sweeps, in declaration order.
    pub const FIELDS: [&'static str; 6] = [
        "inventory_target",
        "quote_width_bps",
        "imbalance_threshold",
        "cancel_cadence_ms",
        "max_orders_per_minute",
        "order_size",
    ];

    /// Fields that only take whole numbers.
    pub const INTEGER_FIELDS: [&'static str; 2] = ["cancel_cadence_ms", "max_orders_per_minute"];
}

/// A quoting policy driven by the simulator.
pub trait Strategy: Send {
    /// Called at each scheduling point; returned actions are applied in order.
    fn on_schedule(&mut self, view: &MarketView) -> Vec<OrderAction>;

    /// Get strategy name for logging.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let ctx = StrategyContext::default();
        assert_eq!(ctx.quote_width_bps, 5.0);
        assert_eq!(ctx.cancel_cadence_ms, 1000);
        assert_eq!(ctx.max_orders_per_minute, 60);
        assert_eq!(ctx.order_size, 0.001);
    }

    #[test]
    fn test_view_helpers() {
        let view = MarketView {
            timestamp: 0,
            reason: WakeReason::Tick,
            best_bid: Some(Level::new(99.0, 1.0)),
            best_ask: Some(Level::new(101.0, 1.0)),
            inventory: 0.0,
            open_orders: vec![OpenOrder {
                order_id: 1,
                side: Side::Buy,
                price: 99.0,
                quantity_remaining: 1.0,
                status: OrderStatus::Resting,
            }],
        };
        assert_eq!(view.mid_price(), Some(100.0));
        assert_eq!(view.open_on(Side::Buy).count(), 1);
        assert_eq!(view.open_on(Side::Sell).count(), 0);
    }
}
