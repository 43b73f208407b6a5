//! Market Data Feed
//!
//! Trait definition for data sources that replay historical market data,
//! plus the stable two-stream merge of book deltas and trade prints.

use crate::backtest::clock::Nanos;
use crate::backtest::events::{BookEvent, MarketEvent, TradeEvent};
use std::collections::VecDeque;

/// Trait for market data sources that provide replay capability.
pub trait MarketDataFeed: Send {
    /// Get the next event from the feed.
    fn next_event(&mut self) -> Option<MarketEvent>;

    /// Peek at the timestamp of the next event without consuming.
    fn peek_time(&self) -> Option<Nanos>;

    /// Number of events remaining (if known).
    fn remaining(&self) -> Option<usize> {
        None
    }

    /// Feed identifier for logging/diagnostics.
    fn name(&self) -> &str {
        "unknown"
    }
}

/// A feed backed by an in-memory vector of events, replayed in the given order.
///
/// No sorting is applied here: ordering problems in the input must reach the
/// simulator so they can be counted.
pub struct VecFeed {
    events: VecDeque<MarketEvent>,
    name: String,
}

impl VecFeed {
    pub fn new(name: impl Into<String>, events: Vec<MarketEvent>) -> Self {
        Self {
            events: events.into(),
            name: name.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl MarketDataFeed for VecFeed {
    fn next_event(&mut self) -> Option<MarketEvent> {
        self.events.pop_front()
    }

    fn peek_time(&self) -> Option<Nanos> {
        self.events.front().map(MarketEvent::timestamp)
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.events.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Merges a book stream and a trade stream by timestamp.
///
/// Both inputs are expected sorted. On equal timestamps the book record is
/// emitted first; within a stream input order is kept.
pub struct MergedFeed {
    book: VecDeque<BookEvent>,
    trades: VecDeque<TradeEvent>,
    name: String,
}

impl MergedFeed {
    pub fn new(book: Vec<BookEvent>, trades: Vec<TradeEvent>) -> Self {
        Self {
            book: book.into(),
            trades: trades.into(),
            name: "merged".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl MarketDataFeed for MergedFeed {
    fn next_event(&mut self) -> Option<MarketEvent> {
        let take_book = match (self.book.front(), self.trades.front()) {
            (Some(b), Some(t)) => b.timestamp_ns <= t.timestamp_ns,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return None,
        };
        if take_book {
            self.book.pop_front().map(MarketEvent::Book)
        } else {
            self.trades.pop_front().map(MarketEvent::Trade)
        }
    }

    fn peek_time(&self) -> Option<Nanos> {
        let b = self.book.front().map(|e| e.timestamp_ns);
        let t = self.trades.front().map(|e| e.timestamp_ns);
        match (b, t) {
            (Some(b), Some(t)) => Some(b.min(t)),
            (b, t) => b.or(t),
        }
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.book.len() + self.trades.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
