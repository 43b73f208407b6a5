//! Event Model
//!
//! Canonical market data records replayed by the simulator.
//! All timestamps are event-time nanoseconds; ordering ties keep input order.

use crate::backtest::clock::Nanos;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for simulator orders. Assigned sequentially from 1.
pub type OrderId = u64;

/// Price in quote currency.
pub type Price = f64;

/// Quantity in base units.
pub type Size = f64;

/// Fixed-point price key used for ladder lookups.
pub type PriceTicks = i64;

/// Fixed-point scale for `PriceTicks` (8 decimal places).
pub const PRICE_SCALE: f64 = 100_000_000.0;

/// Remaining quantities at or below this are treated as zero.
pub const QTY_EPSILON: f64 = 1e-12;

#[inline]
pub fn to_ticks(price: Price) -> PriceTicks {
    (price * PRICE_SCALE).round() as PriceTicks
}

#[inline]
pub fn from_ticks(ticks: PriceTicks) -> Price {
    ticks as f64 / PRICE_SCALE
}

/// Order / book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[inline]
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    #[inline]
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    /// Parse the spellings found in exchange dumps (`bid`, `B`, `ask`, `sell`, ...).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "buy" | "bid" | "b" | "bids" => Some(Side::Buy),
            "sell" | "ask" | "a" | "s" | "asks" | "offer" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of an L2 book record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookEventKind {
    /// Quantity joins the level (level created if absent).
    Add,
    /// Level quantity replaced.
    Modify,
    /// Level removed.
    Delete,
    /// Visible quantity consumed by a trade at this level.
    Trade,
}

impl BookEventKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "add" | "new" | "insert" => Some(Self::Add),
            "modify" | "update" | "change" => Some(Self::Modify),
            "delete" | "remove" | "cancel" => Some(Self::Delete),
            "trade" | "fill" | "execute" => Some(Self::Trade),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Modify => "modify",
            Self::Delete => "delete",
            Self::Trade => "trade",
        }
    }
}

impl fmt::Display for BookEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One L2 book delta. For `Trade` records `side` is the book side that was hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookEvent {
    pub timestamp_ns: Nanos,
    pub side: Side,
    pub price: Price,
    pub quantity: Size,
    pub kind: BookEventKind,
}

/// Public trade print from the optional trade stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub timestamp_ns: Nanos,
    pub price: Price,
    pub quantity: Size,
    /// Side that crossed the spread; resting liquidity on the other side was consumed.
    pub aggressor_side: Side,
}

/// A market data record from either input stream.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Book(BookEvent),
    Trade(TradeEvent),
}

impl MarketEvent {
    #[inline]
    pub fn timestamp(&self) -> Nanos {
        match self {
            MarketEvent::Book(e) => e.timestamp_ns,
            MarketEvent::Trade(e) => e.timestamp_ns,
        }
    }
}

/// Price level as exposed to strategies and reports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: Price,
    pub quantity: Size,
}

impl Level {
    #[inline]
    pub fn new(price: Price, quantity: Size) -> Self {
        Self { price, quantity }
    }
}
