//! Event Queue
//!
//! Min-heap of simulator-internal events (order/cancel arrivals, strategy wakeups).
//! Guarantees deterministic ordering for reproducible backtests.

use crate::backtest::clock::Nanos;
use crate::backtest::events::OrderId;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Internal event priority. Lower value = processed first when timestamps match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EventPriority {
    OrderArrival = 0,
    CancelArrival = 1,
    MarketTick = 2,
    CadenceTimer = 3,
}

/// Events scheduled by the simulator itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    /// A submitted order reaches the venue.
    OrderArrival { order_id: OrderId },
    /// A cancel request reaches the venue.
    CancelArrival { order_id: OrderId },
    /// Top-of-book change becomes visible to the strategy.
    MarketTick,
    /// Periodic strategy wakeup.
    CadenceTimer,
}

impl SimEvent {
    #[inline]
    pub fn priority(&self) -> EventPriority {
        match self {
            SimEvent::OrderArrival { .. } => EventPriority::OrderArrival,
            SimEvent::CancelArrival { .. } => EventPriority::CancelArrival,
            SimEvent::MarketTick => EventPriority::MarketTick,
            SimEvent::CadenceTimer => EventPriority::CadenceTimer,
        }
    }
}

/// Event with its scheduled time and insertion sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampedEvent {
    pub time: Nanos,
    pub seq: u64,
    pub event: SimEvent,
}

impl PartialOrd for TimestampedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimestampedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.event.priority().cmp(&other.event.priority()))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Deterministic event queue.
///
/// # Ordering Guarantees
/// Events are ordered by:
/// 1. Timestamp (nanoseconds, ascending)
/// 2. Event priority (order arrival > cancel arrival > market tick > cadence)
/// 3. Sequence number (insertion order)
pub struct EventQueue {
    heap: BinaryHeap<Reverse<TimestampedEvent>>,
    next_seq: u64,
    total_inserted: u64,
    total_popped: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            total_inserted: 0,
            total_popped: 0,
        }
    }

    #[inline]
    pub fn push(&mut self, time: Nanos, event: SimEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(TimestampedEvent { time, seq, event }));
        self.total_inserted += 1;
    }

    #[inline]
    pub fn pop(&mut self) -> Option<TimestampedEvent> {
        let result = self.heap.pop().map(|r| r.0);
        if result.is_some() {
            self.total_popped += 1;
        }
        result
    }

    #[inline]
    pub fn peek(&self) -> Option<&TimestampedEvent> {
        self.heap.peek().map(|r| &r.0)
    }

    #[inline]
    pub fn peek_time(&self) -> Option<Nanos> {
        self.heap.peek().map(|r| r.0.time)
    }

    /// Whether any pending event satisfies `pred`.
    pub fn any(&self, pred: impl Fn(&SimEvent) -> bool) -> bool {
        self.heap.iter().any(|r| pred(&r.0.event))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Diagnostics: total events inserted.
    #[inline]
    pub fn total_inserted(&self) -> u64 {
        self.total_inserted
    }

    /// Diagnostics: total events popped.
    #[inline]
    pub fn total_popped(&self) -> u64 {
        self.total_popped
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_ordering() {
        let mut queue = EventQueue::new();

        queue.push(2000, SimEvent::MarketTick);
        queue.push(1000, SimEvent::CadenceTimer);
        queue.push(1000, SimEvent::OrderArrival { order_id: 7 });

        let e1 = queue.pop().unwrap();
        let e2 = queue.pop().unwrap();
        let e3 = queue.pop().unwrap();

        assert_eq!(e1.time, 1000);
        assert_eq!(e2.time, 1000);
        assert_eq!(e3.time, 2000);

        // Same timestamp: arrivals before timers
        assert_eq!(e1.event, SimEvent::OrderArrival { order_id: 7 });
        assert_eq!(e2.event, SimEvent::CadenceTimer);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_sequence_stability() {
        let mut queue = EventQueue::new();
        for id in 1..=10 {
            queue.push(1000, SimEvent::CancelArrival { order_id: id });
        }
        for id in 1..=10 {
            let event = queue.pop().unwrap();
            assert_eq!(event.event, SimEvent::CancelArrival { order_id: id });
        }
        assert_eq!(queue.total_inserted(), 10);
        assert_eq!(queue.total_popped(), 10);
    }

    #[test]
    fn test_order_arrival_beats_cancel_at_same_time() {
        let mut queue = EventQueue::new();
        queue.push(500, SimEvent::CancelArrival { order_id: 1 });
        queue.push(500, SimEvent::OrderArrival { order_id: 1 });

        assert_eq!(queue.peek_time(), Some(500));
        assert_eq!(
            queue.pop().unwrap().event,
            SimEvent::OrderArrival { order_id: 1 }
        );
        assert!(queue.any(|e| matches!(e, SimEvent::CancelArrival { .. })));
    }
}
