//! Queue Position Model
//!
//! Risk-averse FIFO position of our own resting orders. We assume we joined
//! behind all visible quantity at our price and only move forward when trade
//! volume prints or the visible level shrinks below what we think is ahead.
//! Fills therefore come only from trade volume that has passed our position.

use crate::backtest::events::{OrderId, PriceTicks, Side, Size, QTY_EPSILON};
use crate::backtest::order::Order;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// A maker fill produced by trade volume reaching a resting order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueFill {
    pub order_id: OrderId,
    pub price_ticks: PriceTicks,
    pub quantity: Size,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub orders_enqueued: u64,
    pub trades_processed: u64,
    pub fills_generated: u64,
    pub volume_filled: f64,
    pub level_reductions: u64,
}

/// Per-side FIFO index of our resting orders, keyed by price level.
#[derive(Debug, Default)]
pub struct QueuePositionModel {
    bids: BTreeMap<PriceTicks, VecDeque<OrderId>>,
    asks: BTreeMap<PriceTicks, VecDeque<OrderId>>,
    locations: HashMap<OrderId, (Side, PriceTicks)>,
    pub stats: QueueStats,
}

impl QueuePositionModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<PriceTicks, VecDeque<OrderId>> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Register a newly resting order at the back of our own queue at its level.
    /// The caller sets `queue_ahead_quantity` from the visible book.
    pub fn enqueue(&mut self, order: &Order) {
        self.side_mut(order.side)
            .entry(order.price_ticks)
            .or_default()
            .push_back(order.order_id);
        self.locations
            .insert(order.order_id, (order.side, order.price_ticks));
        self.stats.orders_enqueued += 1;
    }

    /// Drop an order from the index (cancel, expiry, full fill).
    pub fn remove(&mut self, order_id: OrderId) -> bool {
        let Some((side, ticks)) = self.locations.remove(&order_id) else {
            return false;
        };
        let ladder = self.side_mut(side);
        if let Some(queue) = ladder.get_mut(&ticks) {
            queue.retain(|id| *id != order_id);
            if queue.is_empty() {
                ladder.remove(&ticks);
            }
        }
        true
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.locations.contains_key(&order_id)
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Our order ids on `side` at levels a trade at `price_ticks` reached, best first.
    fn reached_levels(&self, side: Side, price_ticks: PriceTicks) -> Vec<(PriceTicks, Vec<OrderId>)> {
        let collect = |(k, q): (&PriceTicks, &VecDeque<OrderId>)| (*k, q.iter().copied().collect());
        match side {
            // Resting asks: a buy print at p traded through every ask below p.
            Side::Sell => self.asks.range(..=price_ticks).map(collect).collect(),
            // Resting bids: a sell print at p traded through every bid above p.
            Side::Buy => self.bids.range(price_ticks..).rev().map(collect).collect(),
        }
    }

    /// Apply trade volume against resting orders on `resting_side`.
    ///
    /// Updates `queue_ahead_quantity` in `orders` and returns the fills. Fully
    /// filled orders are dropped from the index; the caller applies the fill
    /// quantities and status changes.
    pub fn on_trade(
        &mut self,
        orders: &mut HashMap<OrderId, Order>,
        resting_side: Side,
        price_ticks: PriceTicks,
        volume: Size,
    ) -> Vec<QueueFill> {
        self.stats.trades_processed += 1;
        let mut fills = Vec::new();
        if volume <= QTY_EPSILON {
            return fills;
        }

        let mut pool = volume;
        let mut filled_out = Vec::new();

        for (ticks, ids) in self.reached_levels(resting_side, price_ticks) {
            let traded_through = ticks != price_ticks;
            for id in ids {
                let Some(order) = orders.get_mut(&id) else {
                    continue;
                };
                let passed = if traded_through {
                    order.queue_ahead_quantity = 0.0;
                    volume
                } else {
                    let consumed = order.queue_ahead_quantity.min(volume);
                    order.queue_ahead_quantity -= consumed;
                    volume - consumed
                };

                if order.queue_ahead_quantity > QTY_EPSILON || pool <= QTY_EPSILON {
                    continue;
                }
                let fill = passed.min(pool).min(order.quantity_remaining);
                if fill <= QTY_EPSILON {
                    continue;
                }
                pool -= fill;
                if order.quantity_remaining - fill <= QTY_EPSILON {
                    filled_out.push(id);
                }
                fills.push(QueueFill {
                    order_id: id,
                    price_ticks: ticks,
                    quantity: fill,
                });
                self.stats.fills_generated += 1;
                self.stats.volume_filled += fill;
            }
        }

        for id in filled_out {
            self.remove(id);
        }
        fills
    }

    /// Visible level shrank to `new_quantity`: nobody can be further back than that.
    pub fn on_level_reduced(
        &mut self,
        orders: &mut HashMap<OrderId, Order>,
        side: Side,
        price_ticks: PriceTicks,
        new_quantity: Size,
    ) {
        let ladder = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        let Some(queue) = ladder.get(&price_ticks) else {
            return;
        };
        self.stats.level_reductions += 1;
        let floor = new_quantity.max(0.0);
        for id in queue {
            if let Some(order) = orders.get_mut(id) {
                order.queue_ahead_quantity = order.queue_ahead_quantity.min(floor);
            }
        }
    }

    /// Resting order ids in FIFO order, both sides (bids best first, then asks best first).
    pub fn resting_ids(&self) -> Vec<OrderId> {
        self.bids
            .values()
            .rev()
            .chain(self.asks.values())
            .flat_map(|q| q.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::events::{from_ticks, to_ticks};
    use crate::backtest::order::OrderStatus;

    fn resting(id: OrderId, side: Side, price: f64, qty: f64, ahead: f64) -> Order {
        Order {
            order_id: id,
            side,
            price,
            price_ticks: to_ticks(price),
            quantity: qty,
            quantity_remaining: qty,
            submit_time_ns: 0,
            arrival_time_ns: 0,
            queue_ahead_quantity: ahead,
            status: OrderStatus::Resting,
            cancel_requested: false,
        }
    }

    fn setup(list: Vec<Order>) -> (QueuePositionModel, HashMap<OrderId, Order>) {
        let mut model = QueuePositionModel::new();
        let mut orders = HashMap::new();
        for o in list {
            model.enqueue(&o);
            orders.insert(o.order_id, o);
        }
        (model, orders)
    }

    #[test]
    fn test_front_of_queue_fills_fully() {
        let (mut model, mut orders) = setup(vec![resting(1, Side::Sell, 100.0, 10.0, 0.0)]);
        let fills = model.on_trade(&mut orders, Side::Sell, to_ticks(100.0), 10.0);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].quantity, 10.0);
        assert_eq!(from_ticks(fills[0].price_ticks), 100.0);
        assert!(model.is_empty());
    }

    #[test]
    fn test_queue_ahead_consumed_before_fill() {
        let (mut model, mut orders) = setup(vec![resting(1, Side::Buy, 99.0, 5.0, 8.0)]);

        let fills = model.on_trade(&mut orders, Side::Buy, to_ticks(99.0), 6.0);
        assert!(fills.is_empty());
        assert_eq!(orders[&1].queue_ahead_quantity, 2.0);

        let fills = model.on_trade(&mut orders, Side::Buy, to_ticks(99.0), 3.0);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].quantity, 1.0);
        assert_eq!(orders[&1].queue_ahead_quantity, 0.0);
        assert!(model.contains(1));
    }

    #[test]
    fn test_trade_through_clears_queue_and_shares_pool() {
        let (mut model, mut orders) = setup(vec![
            resting(1, Side::Sell, 100.0, 4.0, 50.0),
            resting(2, Side::Sell, 100.0, 4.0, 50.0),
            resting(3, Side::Sell, 101.0, 4.0, 10.0),
        ]);
        // Buy print at 101 traded through 100
        let fills = model.on_trade(&mut orders, Side::Sell, to_ticks(101.0), 6.0);
        assert_eq!(fills.len(), 2);
        assert_eq!((fills[0].order_id, fills[0].quantity), (1, 4.0));
        assert_eq!((fills[1].order_id, fills[1].quantity), (2, 2.0));
        assert_eq!(orders[&2].queue_ahead_quantity, 0.0);
        // Order at the print price still had 10 ahead; only 6 traded there.
        assert_eq!(orders[&3].queue_ahead_quantity, 4.0);
        assert!(!model.contains(1));
        assert!(model.contains(2));
    }

    #[test]
    fn test_level_reduction_caps_queue_ahead() {
        let (mut model, mut orders) = setup(vec![resting(1, Side::Buy, 99.0, 1.0, 8.0)]);
        model.on_level_reduced(&mut orders, Side::Buy, to_ticks(99.0), 3.0);
        assert_eq!(orders[&1].queue_ahead_quantity, 3.0);
        // Growth never pushes us back
        model.on_level_reduced(&mut orders, Side::Buy, to_ticks(99.0), 20.0);
        assert_eq!(orders[&1].queue_ahead_quantity, 3.0);
    }

    #[test]
    fn test_trade_on_other_side_is_ignored() {
        let (mut model, mut orders) = setup(vec![resting(1, Side::Buy, 99.0, 1.0, 0.0)]);
        let fills = model.on_trade(&mut orders, Side::Sell, to_ticks(99.0), 5.0);
        assert!(fills.is_empty());
        assert_eq!(model.resting_ids(), vec![1]);
        assert!(model.remove(1));
        assert!(!model.remove(1));
    }
}
