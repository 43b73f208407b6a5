//! Sliding-window order rate limiter (event time).

use crate::backtest::clock::{Nanos, NANOS_PER_MINUTE};
use crate::error::RateLimitExceeded;
use std::collections::VecDeque;

/// Rate limiter with sliding window.
///
/// An acquisition at `t` counts against every window `[now - window, now]`
/// that contains `t`; there are no fixed buckets.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    window_ns: Nanos,
    max_events: u32,
    /// Timestamps of accepted events still inside the window.
    events: VecDeque<Nanos>,
    total_events: u64,
    dropped_events: u64,
}

impl RateLimiter {
    pub fn new(max_events: u32, window_ns: Nanos) -> Self {
        Self {
            window_ns,
            max_events,
            events: VecDeque::with_capacity(max_events as usize + 1),
            total_events: 0,
            dropped_events: 0,
        }
    }

    /// `max_per_minute` submissions over a trailing 60 s window.
    pub fn per_minute(max_per_minute: u32) -> Self {
        Self::new(max_per_minute, NANOS_PER_MINUTE)
    }

    fn expire(&mut self, now: Nanos) {
        let cutoff = now - self.window_ns;
        while let Some(&front) = self.events.front() {
            if front < cutoff {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    /// Try to consume a slot at `now`.
    pub fn try_acquire(&mut self, now: Nanos) -> Result<(), RateLimitExceeded> {
        self.expire(now);
        self.total_events += 1;

        if self.events.len() >= self.max_events as usize {
            self.dropped_events += 1;
            Err(RateLimitExceeded {
                limit: self.max_events,
                window_ns: self.window_ns,
            })
        } else {
            self.events.push_back(now);
            Ok(())
        }
    }

    /// Slots still free at `now`, without consuming any.
    pub fn available(&mut self, now: Nanos) -> u32 {
        self.expire(now);
        self.max_events.saturating_sub(self.events.len() as u32)
    }

    /// Number of accepted events inside the window ending at the last call.
    pub fn in_window(&self) -> usize {
        self.events.len()
    }

    pub fn limit(&self) -> u32 {
        self.max_events
    }

    /// Events dropped due to rate limiting.
    pub fn dropped(&self) -> u64 {
        self.dropped_events
    }

    pub fn total(&self) -> u64 {
        self.total_events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::clock::NANOS_PER_SEC;

    #[test]
    fn test_sliding_window_not_bucketed() {
        let mut limiter = RateLimiter::per_minute(2);
        assert!(limiter.try_acquire(0).is_ok());
        assert!(limiter.try_acquire(59 * NANOS_PER_SEC).is_ok());
        // A bucketed limiter would reset at 60 s; the sliding one still sees t=0.
        let err = limiter.try_acquire(60 * NANOS_PER_SEC).unwrap_err();
        assert_eq!(err.limit, 2);
        assert_eq!(err.window_ns, NANOS_PER_MINUTE);
        // t=0 leaves the window strictly after 60 s
        assert!(limiter.try_acquire(60 * NANOS_PER_SEC + 1).is_ok());
        assert_eq!(limiter.dropped(), 1);
        assert_eq!(limiter.total(), 4);
    }

    #[test]
    fn test_no_window_exceeds_limit() {
        let mut limiter = RateLimiter::per_minute(5);
        let mut accepted = Vec::new();
        for i in 0..500 {
            let now = i * 700 * 1_000_000; // every 0.7 s
            if limiter.try_acquire(now).is_ok() {
                accepted.push(now);
            }
        }
        for (i, &start) in accepted.iter().enumerate() {
            let in_window = accepted[i..]
                .iter()
                .take_while(|&&t| t <= start + NANOS_PER_MINUTE)
                .count();
            assert!(in_window <= 5);
        }
    }

    #[test]
    fn test_available_does_not_consume() {
        let mut limiter = RateLimiter::per_minute(3);
        assert_eq!(limiter.available(0), 3);
        limiter.try_acquire(0).unwrap();
        assert_eq!(limiter.available(1), 2);
        assert_eq!(limiter.in_window(), 1);
        assert_eq!(limiter.limit(), 3);
    }
}
