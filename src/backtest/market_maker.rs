//! Two-Sided Market Maker
//!
//! Quotes a bid and an ask around mid with an inventory skew, keeps resting
//! quotes that are still on target, and requotes at most once per cancel
//! cadence. Submissions are throttled with the same sliding window the
//! exchange enforces, so the policy never trips the venue limit itself. With
//! a single slot left only the inventory-reducing side is quoted.

use crate::backtest::clock::{millis_to_nanos, Nanos};
use crate::backtest::events::{to_ticks, Price, Side};
use crate::backtest::rate_limit::RateLimiter;
use crate::backtest::strategy::{MarketView, OrderAction, Strategy, StrategyContext};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct MarketMakerStats {
    pub invocations: u64,
    pub quotes_sent: u64,
    pub cancels_sent: u64,
    pub requotes: u64,
    /// Requotes skipped because the order budget was exhausted.
    pub throttled: u64,
    /// Requotes deferred until the cancel cadence elapsed.
    pub deferred: u64,
}

pub struct TwoSidedMarketMaker {
    name: String,
    ctx: StrategyContext,
    limiter: RateLimiter,
    cadence_ns: Nanos,
    last_cancel_burst: Option<Nanos>,
    pub stats: MarketMakerStats,
}

impl TwoSidedMarketMaker {
    pub fn new(ctx: StrategyContext) -> Self {
        Self {
            name: "twosided_mm".to_string(),
            limiter: RateLimiter::per_minute(ctx.max_orders_per_minute),
            cadence_ns: millis_to_nanos(ctx.cancel_cadence_ms as f64),
            last_cancel_burst: None,
            ctx,
            stats: MarketMakerStats::default(),
        }
    }

    /// Target (bid, ask) for a given mid and inventory.
    pub fn target_quotes(&self, mid: Price, inventory: f64) -> (Price, Price) {
        let half = self.ctx.quote_width_bps / 2.0 / 10_000.0;
        let (mut half_bid, mut half_ask) = (half, half);

        let dev = inventory - self.ctx.inventory_target;
        if dev > self.ctx.imbalance_threshold {
            // Too long: lean into selling
            half_ask /= 2.0;
            half_bid *= 2.0;
        } else if dev < -self.ctx.imbalance_threshold {
            half_bid /= 2.0;
            half_ask *= 2.0;
        }

        (mid * (1.0 - half_bid), mid * (1.0 + half_ask))
    }

    fn cadence_elapsed(&self, now: Nanos) -> bool {
        match self.last_cancel_burst {
            None => true,
            Some(last) => now - last >= self.cadence_ns,
        }
    }
}

impl Strategy for TwoSidedMarketMaker {
    fn on_schedule(&mut self, view: &MarketView) -> Vec<OrderAction> {
        self.stats.invocations += 1;

        let (Some(bid), Some(ask)) = (view.best_bid, view.best_ask) else {
            return Vec::new();
        };
        let mid = (bid.price + ask.price) / 2.0;
        let (bid_px, ask_px) = self.target_quotes(mid, view.inventory);
        let (bid_ticks, ask_ticks) = (to_ticks(bid_px), to_ticks(ask_px));

        let has_open = !view.open_orders.is_empty();
        let on_target = view.open_on(Side::Buy).next().is_some()
            && view.open_on(Side::Sell).next().is_some()
            && view.open_orders.iter().all(|o| {
                let want = match o.side {
                    Side::Buy => bid_ticks,
                    Side::Sell => ask_ticks,
                };
                to_ticks(o.price) == want
            });
        if on_target {
            return Vec::new();
        }

        let now = view.timestamp;
        if has_open && !self.cadence_elapsed(now) {
            self.stats.deferred += 1;
            return Vec::new();
        }
        let budget = self.limiter.available(now);
        if budget == 0 {
            self.stats.throttled += 1;
            debug!(
                strategy = %self.name,
                now,
                in_window = self.limiter.in_window(),
                "quote budget exhausted"
            );
            return Vec::new();
        }

        let mut actions: Vec<OrderAction> = view
            .open_orders
            .iter()
            .map(|o| OrderAction::Cancel {
                order_id: o.order_id,
            })
            .collect();
        if has_open {
            self.stats.cancels_sent += actions.len() as u64;
            self.last_cancel_burst = Some(now);
        }

        // One slot left: quote only the side that works inventory back to target.
        let sides = if budget >= 2 {
            vec![(Side::Buy, bid_px), (Side::Sell, ask_px)]
        } else if view.inventory - self.ctx.inventory_target > 0.0 {
            vec![(Side::Sell, ask_px)]
        } else {
            vec![(Side::Buy, bid_px)]
        };
        for (side, price) in sides {
            if self.limiter.try_acquire(now).is_ok() {
                actions.push(OrderAction::Submit {
                    side,
                    price,
                    quantity: self.ctx.order_size,
                });
                self.stats.quotes_sent += 1;
            }
        }
        self.stats.requotes += 1;
        actions
    }

    fn name(&self) -> &str {
        &self.name
    }
}
