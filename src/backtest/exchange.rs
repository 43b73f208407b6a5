//! Exchange Simulator
//!
//! Event-driven single-instrument venue. Replays market data, delivers our
//! orders and cancels after sampled latency, matches them against the visible
//! book (taker) or the risk-averse queue model (maker), and wakes the strategy
//! on top-of-book changes and on its cancel cadence.
//!
//! ```text
//!   Idle --run()--> Running --feed exhausted--> Draining --> Closed
//! ```
//!
//! Ordering: the next event is the earliest of the feed head and the internal
//! queue head. On equal timestamps market data goes first, so nothing we do at
//! time `t` can see data from after `t`.

use crate::backtest::book::OrderBook;
use crate::backtest::clock::{format_nanos, millis_to_nanos, Nanos, SimClock, NANOS_PER_HOUR};
use crate::backtest::events::{
    from_ticks, to_ticks, BookEvent, BookEventKind, MarketEvent, OrderId, Price, PriceTicks, Side,
    Size, TradeEvent, QTY_EPSILON,
};
use crate::backtest::feed::MarketDataFeed;
use crate::backtest::fingerprint::fingerprint;
use crate::backtest::latency::{LatencyKind, LatencyModel, LatencyParams, LatencyStats};
use crate::backtest::ledger::{Fill, Ledger, LedgerEntry, LedgerStats, Liquidity};
use crate::backtest::order::{Order, OrderStatus};
use crate::backtest::queue::{EventQueue, SimEvent};
use crate::backtest::queue_model::QueuePositionModel;
use crate::backtest::rate_limit::RateLimiter;
use crate::backtest::strategy::{MarketView, OpenOrder, OrderAction, Strategy, WakeReason};
use crate::error::{InvalidEventError, SimError, SubmitError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Funding intervals are aligned to the Unix epoch.
pub const FUNDING_INTERVAL_NS: Nanos = 8 * NANOS_PER_HOUR;

/// Fee and funding schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    pub maker_bps: f64,
    pub taker_bps: f64,
    pub funding_bps_per_8h: f64,
    /// Perpetual/derivatives mode: funding accrues on open inventory.
    pub derivatives: bool,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            maker_bps: 0.0,
            taker_bps: 0.0,
            funding_bps_per_8h: 0.0,
            derivatives: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub fees: FeeSchedule,
    pub latency: LatencyParams,
    pub max_orders_per_minute: u32,
    /// Strategy cadence timer period; 0 disables the timer.
    pub cancel_cadence_ms: u64,
    /// Clock value before the first event (used for submits while Idle).
    pub start_time_ns: Nanos,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            latency: LatencyParams::default(),
            max_orders_per_minute: 60,
            cancel_cadence_ms: 1000,
            start_time_ns: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimState {
    Idle,
    Running,
    Draining,
    Closed,
}

impl SimState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimState::Idle => "Idle",
            SimState::Running => "Running",
            SimState::Draining => "Draining",
            SimState::Closed => "Closed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimStats {
    pub events_processed: u64,
    pub book_events: u64,
    pub trade_events: u64,
    pub internal_events: u64,
    pub invalid_events: u64,
    pub rate_limited: u64,
    pub invalid_orders: u64,
    pub orders_submitted: u64,
    pub orders_filled: u64,
    pub orders_cancelled: u64,
    pub orders_expired: u64,
    pub cancels_requested: u64,
    pub cancel_noops: u64,
    pub maker_fills: u64,
    pub taker_fills: u64,
    pub strategy_invocations: u64,
    pub discarded_wakeups: u64,
    pub funding_ticks: u64,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub strategy: String,
    pub fills: Vec<Fill>,
    pub entries: Vec<LedgerEntry>,
    pub stats: SimStats,
    pub ledger_stats: LedgerStats,
    pub latency_stats: LatencyStats,
    pub final_inventory: f64,
    pub recomputed_inventory: f64,
    /// Mid at close, else last trade/fill price.
    pub mark_price: Option<Price>,
    pub unrealized_pnl: f64,
    pub first_event_ns: Option<Nanos>,
    pub last_event_ns: Option<Nanos>,
    pub fingerprint: String,
}

impl SimulationResult {
    pub fn net_pnl(&self) -> f64 {
        self.ledger_stats.net_pnl()
    }

    /// Event-time range as RFC 3339, if any market data was processed.
    pub fn time_range(&self) -> Option<(String, String)> {
        match (self.first_event_ns, self.last_event_ns) {
            (Some(a), Some(b)) => Some((format_nanos(a), format_nanos(b))),
            _ => None,
        }
    }
}

pub struct ExchangeSimulator {
    config: SimConfig,
    state: SimState,
    clock: SimClock,
    book: OrderBook,
    queue: EventQueue,
    queue_model: QueuePositionModel,
    latency: LatencyModel,
    limiter: RateLimiter,
    ledger: Ledger,
    orders: HashMap<OrderId, Order>,
    next_order_id: OrderId,
    /// Feed ticks are delivered FIFO.
    last_tick_arrival: Nanos,
    cadence_ns: Nanos,
    /// Time of the live cadence timer; earlier queued timers are stale.
    cadence_deadline: Option<Nanos>,
    next_funding_ns: Option<Nanos>,
    last_trade_price: Option<Price>,
    first_event_ns: Option<Nanos>,
    last_event_ns: Option<Nanos>,
    strategy_name: String,
    stats: SimStats,
}

impl ExchangeSimulator {
    pub fn new(config: SimConfig) -> Self {
        Self {
            clock: SimClock::new(config.start_time_ns),
            latency: LatencyModel::new(config.latency),
            limiter: RateLimiter::per_minute(config.max_orders_per_minute),
            cadence_ns: millis_to_nanos(config.cancel_cadence_ms as f64),
            last_tick_arrival: config.start_time_ns,
            config,
            state: SimState::Idle,
            book: OrderBook::new(),
            queue: EventQueue::new(),
            queue_model: QueuePositionModel::new(),
            ledger: Ledger::new(),
            orders: HashMap::new(),
            next_order_id: 1,
            cadence_deadline: None,
            next_funding_ns: None,
            last_trade_price: None,
            first_event_ns: None,
            last_event_ns: None,
            strategy_name: String::new(),
            stats: SimStats::default(),
        }
    }

    pub fn state(&self) -> SimState {
        self.state
    }

    pub fn now(&self) -> Nanos {
        self.clock.now()
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn order(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    pub fn fills(&self) -> &[Fill] {
        self.ledger.fills()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    // =========================================================================
    // ORDER API
    // =========================================================================

    /// Send a limit order. It reaches the venue after the sampled order latency.
    pub fn submit(&mut self, side: Side, price: Price, quantity: Size) -> Result<OrderId, SubmitError> {
        if matches!(self.state, SimState::Draining | SimState::Closed) {
            return Err(SubmitError::NotAccepting {
                state: self.state.as_str(),
            });
        }
        if !price.is_finite() || price <= 0.0 {
            self.stats.invalid_orders += 1;
            return Err(SubmitError::InvalidOrder {
                reason: format!("price must be positive, got {}", price),
            });
        }
        if !quantity.is_finite() || quantity <= QTY_EPSILON {
            self.stats.invalid_orders += 1;
            return Err(SubmitError::InvalidOrder {
                reason: format!("quantity must be positive, got {}", quantity),
            });
        }

        let now = self.clock.now();
        if let Err(e) = self.limiter.try_acquire(now) {
            self.stats.rate_limited += 1;
            debug!(now, %side, price, quantity, "submission rate limited");
            return Err(e.into());
        }

        let order_id = self.next_order_id;
        self.next_order_id += 1;
        let arrival = now + self.latency.sample_ns(LatencyKind::Order);

        self.orders.insert(
            order_id,
            Order {
                order_id,
                side,
                price,
                price_ticks: to_ticks(price),
                quantity,
                quantity_remaining: quantity,
                submit_time_ns: now,
                arrival_time_ns: arrival,
                queue_ahead_quantity: 0.0,
                status: OrderStatus::PendingNew,
                cancel_requested: false,
            },
        );
        self.queue.push(arrival, SimEvent::OrderArrival { order_id });
        self.stats.orders_submitted += 1;
        debug!(order_id, %side, price, quantity, now, arrival, "order submitted");
        Ok(order_id)
    }

    /// Request cancellation. Resolved when the cancel reaches the venue;
    /// cancelling an unknown or finished order is a counted no-op.
    pub fn cancel(&mut self, order_id: OrderId) {
        if self.state == SimState::Closed {
            self.stats.cancel_noops += 1;
            return;
        }
        let arrival = self.clock.now() + self.latency.sample_ns(LatencyKind::Order);
        self.queue.push(arrival, SimEvent::CancelArrival { order_id });
        self.stats.cancels_requested += 1;
    }

    // =========================================================================
    // EVENT LOOP
    // =========================================================================

    /// Drive the simulator through the whole feed and close it.
    pub fn run(
        &mut self,
        feed: &mut dyn MarketDataFeed,
        strategy: &mut dyn Strategy,
    ) -> Result<SimulationResult, SimError> {
        if self.state != SimState::Idle {
            return Err(SimError::InvalidState {
                expected: SimState::Idle.as_str(),
                actual: self.state.as_str(),
            });
        }
        self.state = SimState::Running;
        self.strategy_name = strategy.name().to_string();
        info!(
            strategy = %self.strategy_name,
            feed = feed.name(),
            events = ?feed.remaining(),
            "simulation started"
        );

        loop {
            let internal_first = match (feed.peek_time(), self.queue.peek_time()) {
                (None, _) => break,
                (Some(market), Some(internal)) => internal < market,
                (Some(_), None) => false,
            };
            if internal_first {
                if let Some(ev) = self.queue.pop() {
                    self.handle_internal(ev.time, ev.event, Some(&mut *strategy));
                }
            } else if let Some(event) = feed.next_event() {
                self.handle_market(event);
            }
        }

        self.drain();
        self.state = SimState::Closed;

        let result = self.result();
        info!(
            strategy = %result.strategy,
            fills = result.fills.len(),
            net_pnl = result.net_pnl(),
            inventory = result.final_inventory,
            invalid_events = result.stats.invalid_events,
            fingerprint = %result.fingerprint,
            "simulation closed"
        );
        Ok(result)
    }

    /// Resolve in-flight arrivals, drop strategy wakeups, expire what still rests.
    fn drain(&mut self) {
        self.state = SimState::Draining;
        while let Some(ev) = self.queue.pop() {
            self.handle_internal(ev.time, ev.event, None);
        }

        let mut resting: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| o.status.is_open())
            .map(|o| o.order_id)
            .collect();
        resting.sort_unstable();
        for order_id in resting {
            self.queue_model.remove(order_id);
            if let Some(order) = self.orders.get_mut(&order_id) {
                order.status = OrderStatus::Expired;
                self.stats.orders_expired += 1;
                debug!(order_id, remaining = order.quantity_remaining, "order expired");
            }
        }
    }

    /// Move the clock, emitting funding entries for boundaries passed.
    fn advance(&mut self, time: Nanos) {
        if let Some(mut next) = self.next_funding_ns {
            while next <= time {
                let mark = self.mark_price().unwrap_or(0.0);
                self.clock.advance_to(next);
                let paid = self
                    .ledger
                    .post_funding(next, mark, self.config.fees.funding_bps_per_8h);
                self.stats.funding_ticks += 1;
                debug!(at = next, mark, paid, "funding accrued");
                next += FUNDING_INTERVAL_NS;
            }
            self.next_funding_ns = Some(next);
        }
        self.clock.advance_to(time);
    }

    fn mark_price(&self) -> Option<Price> {
        self.book
            .mid_price()
            .or(self.last_trade_price)
            .or(self.ledger.last_fill_price())
    }

    fn handle_market(&mut self, event: MarketEvent) {
        let ts = event.timestamp();
        if self.clock.is_started() && ts < self.clock.now() {
            self.reject_event(
                InvalidEventError::OutOfOrder {
                    timestamp: ts,
                    now: self.clock.now(),
                },
                ts,
            );
            return;
        }

        if self.first_event_ns.is_none() {
            self.first_event_ns = Some(ts);
            if self.config.fees.derivatives {
                self.next_funding_ns =
                    Some((ts.div_euclid(FUNDING_INTERVAL_NS) + 1) * FUNDING_INTERVAL_NS);
            }
            if self.cadence_ns > 0 {
                self.arm_cadence(ts);
            }
        }
        self.advance(ts);
        self.last_event_ns = Some(ts);
        self.stats.events_processed += 1;

        match event {
            MarketEvent::Book(e) => self.on_book_event(&e),
            MarketEvent::Trade(e) => self.on_trade_event(&e),
        }
    }

    fn reject_event(&mut self, err: InvalidEventError, ts: Nanos) {
        self.stats.invalid_events += 1;
        warn!(timestamp = ts, error = %err, "skipping invalid market event");
    }

    fn on_book_event(&mut self, e: &BookEvent) {
        self.stats.book_events += 1;
        let change = match self.book.apply(e) {
            Ok(change) => change,
            Err(err) => {
                self.reject_event(err, e.timestamp_ns);
                return;
            }
        };
        let ticks = to_ticks(e.price);

        if e.kind == BookEventKind::Trade {
            self.last_trade_price = Some(e.price);
            self.match_trade(e.side, ticks, e.quantity);
        }
        if change.reduced {
            self.queue_model
                .on_level_reduced(&mut self.orders, e.side, ticks, change.level_quantity);
        }
        if change.top_changed {
            self.schedule_tick();
        }
    }

    fn on_trade_event(&mut self, e: &TradeEvent) {
        self.stats.trade_events += 1;
        if !e.price.is_finite() || e.price <= 0.0 {
            self.reject_event(InvalidEventError::InvalidPrice { price: e.price }, e.timestamp_ns);
            return;
        }
        if !e.quantity.is_finite() || e.quantity <= 0.0 {
            self.reject_event(
                InvalidEventError::InvalidQuantity {
                    quantity: e.quantity,
                },
                e.timestamp_ns,
            );
            return;
        }
        self.last_trade_price = Some(e.price);
        self.match_trade(e.aggressor_side.opposite(), to_ticks(e.price), e.quantity);
    }

    /// Public trade volume against our resting orders on `resting_side`.
    fn match_trade(&mut self, resting_side: Side, ticks: PriceTicks, volume: Size) {
        let fills = self
            .queue_model
            .on_trade(&mut self.orders, resting_side, ticks, volume);
        for fill in fills {
            self.apply_fill(fill.order_id, from_ticks(fill.price_ticks), fill.quantity, Liquidity::Maker);
        }
    }

    fn apply_fill(&mut self, order_id: OrderId, price: Price, quantity: Size, liquidity: Liquidity) {
        let now = self.clock.now();
        let Some(order) = self.orders.get_mut(&order_id) else {
            return;
        };
        let bps = match liquidity {
            Liquidity::Maker => self.config.fees.maker_bps,
            Liquidity::Taker => self.config.fees.taker_bps,
        };
        let fill_id = self
            .ledger
            .post_fill(order_id, now, order.side, price, quantity, liquidity, bps);

        order.quantity_remaining -= quantity;
        if order.quantity_remaining <= QTY_EPSILON {
            order.quantity_remaining = 0.0;
            order.status = OrderStatus::Filled;
            self.stats.orders_filled += 1;
        }
        match liquidity {
            Liquidity::Maker => self.stats.maker_fills += 1,
            Liquidity::Taker => self.stats.taker_fills += 1,
        }
        debug!(
            fill_id,
            order_id,
            side = %order.side,
            price,
            quantity,
            liquidity = %liquidity,
            remaining = order.quantity_remaining,
            "fill"
        );
    }

    fn handle_internal(&mut self, time: Nanos, event: SimEvent, strategy: Option<&mut dyn Strategy>) {
        self.stats.internal_events += 1;
        match event {
            SimEvent::OrderArrival { order_id } => {
                self.advance(time);
                self.on_order_arrival(order_id);
            }
            SimEvent::CancelArrival { order_id } => {
                self.advance(time);
                self.on_cancel_arrival(order_id);
            }
            SimEvent::MarketTick => match strategy {
                Some(strategy) => {
                    self.advance(time);
                    self.invoke_strategy(strategy, WakeReason::Tick);
                }
                None => self.stats.discarded_wakeups += 1,
            },
            SimEvent::CadenceTimer => {
                if self.cadence_deadline != Some(time) {
                    // superseded by a later invocation
                    return;
                }
                match strategy {
                    Some(strategy) => {
                        self.advance(time);
                        self.invoke_strategy(strategy, WakeReason::Cadence);
                    }
                    None => self.stats.discarded_wakeups += 1,
                }
            }
        }
    }

    fn on_order_arrival(&mut self, order_id: OrderId) {
        let Some(order) = self.orders.get_mut(&order_id) else {
            return;
        };
        if order.status != OrderStatus::PendingNew {
            return;
        }
        if order.cancel_requested {
            order.status = OrderStatus::Cancelled;
            self.stats.orders_cancelled += 1;
            debug!(order_id, "order cancelled on arrival");
            return;
        }
        let (side, limit_ticks) = (order.side, order.price_ticks);
        let mut remaining = order.quantity_remaining;

        // Aggressive part: walk the visible opposite side up to our limit.
        let opposite = side.opposite();
        let top_before = self.book.top();
        for (ticks, visible) in self.book.crossable_levels(opposite, limit_ticks) {
            if remaining <= QTY_EPSILON {
                break;
            }
            let take = visible.min(remaining);
            let left = self.book.consume(opposite, ticks, take);
            self.queue_model
                .on_level_reduced(&mut self.orders, opposite, ticks, left);
            self.apply_fill(order_id, from_ticks(ticks), take, Liquidity::Taker);
            remaining -= take;
        }
        if self.book.top() != top_before {
            self.schedule_tick();
        }

        let Some(order) = self.orders.get_mut(&order_id) else {
            return;
        };
        if order.status == OrderStatus::Filled {
            return;
        }
        order.status = OrderStatus::Resting;
        order.queue_ahead_quantity = self.book.queue_ahead(side, limit_ticks);
        self.queue_model.enqueue(order);
        debug!(
            order_id,
            %side,
            price = order.price,
            remaining = order.quantity_remaining,
            queue_ahead = order.queue_ahead_quantity,
            "order resting"
        );
    }

    fn on_cancel_arrival(&mut self, order_id: OrderId) {
        let Some(order) = self.orders.get_mut(&order_id) else {
            self.stats.cancel_noops += 1;
            return;
        };
        match order.status {
            OrderStatus::Resting => {
                order.status = OrderStatus::Cancelled;
                self.queue_model.remove(order_id);
                self.stats.orders_cancelled += 1;
                debug!(order_id, remaining = order.quantity_remaining, "order cancelled");
            }
            OrderStatus::PendingNew => {
                order.cancel_requested = true;
            }
            _ => self.stats.cancel_noops += 1,
        }
    }

    /// A top-of-book change becomes visible to the strategy after feed latency.
    fn schedule_tick(&mut self) {
        if self.state != SimState::Running {
            return;
        }
        let arrival = (self.clock.now() + self.latency.sample_ns(LatencyKind::Feed))
            .max(self.last_tick_arrival);
        self.last_tick_arrival = arrival;
        self.queue.push(arrival, SimEvent::MarketTick);
    }

    fn arm_cadence(&mut self, from: Nanos) {
        let at = from + self.cadence_ns;
        self.cadence_deadline = Some(at);
        self.queue.push(at, SimEvent::CadenceTimer);
    }

    fn market_view(&self, reason: WakeReason) -> MarketView {
        let mut open_orders: Vec<OpenOrder> = self
            .orders
            .values()
            .filter(|o| o.status.is_open())
            .map(|o| OpenOrder {
                order_id: o.order_id,
                side: o.side,
                price: o.price,
                quantity_remaining: o.quantity_remaining,
                status: o.status,
            })
            .collect();
        open_orders.sort_unstable_by_key(|o| o.order_id);
        MarketView {
            timestamp: self.clock.now(),
            reason,
            best_bid: self.book.best_bid(),
            best_ask: self.book.best_ask(),
            inventory: self.ledger.inventory(),
            open_orders,
        }
    }

    fn invoke_strategy(&mut self, strategy: &mut dyn Strategy, reason: WakeReason) {
        let view = self.market_view(reason);
        let actions = strategy.on_schedule(&view);
        self.stats.strategy_invocations += 1;

        for action in actions {
            match action {
                OrderAction::Submit {
                    side,
                    price,
                    quantity,
                } => {
                    if let Err(err) = self.submit(side, price, quantity) {
                        debug!(strategy = strategy.name(), error = %err, "strategy order refused");
                    }
                }
                OrderAction::Cancel { order_id } => self.cancel(order_id),
            }
        }

        if self.cadence_ns > 0 {
            self.arm_cadence(view.timestamp);
        }
    }

    /// Snapshot of the outputs so far.
    pub fn result(&self) -> SimulationResult {
        let fills = self.ledger.fills().to_vec();
        let entries = self.ledger.entries().to_vec();
        let mark_price = self.mark_price();
        SimulationResult {
            strategy: self.strategy_name.clone(),
            fingerprint: fingerprint(&fills, &entries),
            fills,
            entries,
            stats: self.stats.clone(),
            ledger_stats: self.ledger.stats.clone(),
            latency_stats: self.latency.stats.clone(),
            final_inventory: self.ledger.inventory(),
            recomputed_inventory: self.ledger.recompute_inventory(),
            unrealized_pnl: mark_price.map_or(0.0, |m| self.ledger.unrealized_pnl(m)),
            mark_price,
            first_event_ns: self.first_event_ns,
            last_event_ns: self.last_event_ns,
        }
    }
}
