//! Backtesting Core
//!
//! Deterministic event-driven LOB exchange simulator for market-making research.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐
//! │ Book stream  │   │ Trade stream │
//! └──────┬───────┘   └──────┬───────┘
//!        └────────┬─────────┘
//!                 ▼
//!          ┌─────────────┐
//!          │ MergedFeed  │  stable merge, book first on ties
//!          └──────┬──────┘
//!                 ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                  ExchangeSimulator                      │
//! │  SimClock · OrderBook · QueuePositionModel · Ledger     │
//! │  EventQueue<(time, priority, seq)> · LatencyModel       │
//! └──────────────┬──────────────────────────▲───────────────┘
//!                │ MarketView               │ OrderAction
//!                ▼                          │
//!          ┌─────────────────────────────────┴┐
//!          │        Strategy (trait)          │
//!          └──────────────────────────────────┘
//! ```
//!
//! # Determinism Guarantees
//!
//! - **Clock**: Never calls system time; all time from `SimClock`
//! - **EventQueue**: `(time, priority, seq)` ordering, market data first on ties
//! - **RNG**: one seeded `ChaCha8Rng` per simulator
//! - **Output**: fills and ledger entries hashed into a run fingerprint

pub mod book;
pub mod clock;
pub mod events;
pub mod exchange;
pub mod feed;
pub mod fingerprint;
pub mod latency;
pub mod ledger;
pub mod market_maker;
pub mod order;
pub mod queue;
pub mod queue_model;
pub mod rate_limit;
pub mod strategy;
pub mod strategy_factory;


// Re-exports for convenience
pub use book::{BookChange, OrderBook};
pub use clock::{Nanos, SimClock, NANOS_PER_MILLI, NANOS_PER_SEC};
pub use events::{
    BookEvent, BookEventKind, Level, MarketEvent, OrderId, Price, PriceTicks, Side, Size,
    TradeEvent,
};
pub use exchange::{
    ExchangeSimulator, FeeSchedule, SimConfig, SimState, SimStats, SimulationResult,
};
pub use feed::{MarketDataFeed, MergedFeed, VecFeed};
pub use fingerprint::fingerprint;
pub use latency::{delay, LatencyKind, LatencyModel, LatencyParams, LatencyStats};
pub use ledger::{EntryKind, Fill, Ledger, LedgerEntry, LedgerStats, Liquidity};
pub use market_maker::TwoSidedMarketMaker;
pub use order::{Order, OrderStatus};
pub use queue::{EventPriority, EventQueue, SimEvent};
pub use queue_model::{QueueFill, QueuePositionModel};
pub use rate_limit::RateLimiter;
pub use strategy::{MarketView, OpenOrder, OrderAction, Strategy, StrategyContext, WakeReason};
pub use strategy_factory::{available_strategies, make_strategy};
