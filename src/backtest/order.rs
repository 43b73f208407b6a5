//! Simulator-owned order record and lifecycle states.

use crate::backtest::clock::Nanos;
use crate::backtest::events::{OrderId, Price, PriceTicks, Side, Size};
use serde::{Deserialize, Serialize};

/// Order lifecycle: `PendingNew -> Resting -> {Filled | Cancelled | Expired}`.
/// A pending order may also reach a terminal state directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Submitted, still travelling to the venue.
    PendingNew,
    /// Live on the book, passive.
    Resting,
    Filled,
    Cancelled,
    /// Left on the book when the market stream ended.
    Expired,
}

impl OrderStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::PendingNew | OrderStatus::Resting)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    pub price_ticks: PriceTicks,
    pub quantity: Size,
    pub quantity_remaining: Size,
    pub submit_time_ns: Nanos,
    /// Scheduled venue arrival (submit time + sampled order latency).
    pub arrival_time_ns: Nanos,
    /// Visible quantity still ahead of this order at its level.
    pub queue_ahead_quantity: Size,
    pub status: OrderStatus,
    /// A cancel reached the venue before the order did.
    pub cancel_requested: bool,
}
