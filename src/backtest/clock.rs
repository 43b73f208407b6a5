//! Simulation Clock
//!
//! Monotonic event-time clock with nanosecond resolution.
//! The simulator never reads wall-clock time; every timestamp comes from here.

use std::fmt;

/// Nanoseconds since Unix epoch (1970-01-01 00:00:00 UTC).
pub type Nanos = i64;

pub const NANOS_PER_MILLI: i64 = 1_000_000;
pub const NANOS_PER_SEC: i64 = 1_000_000_000;
pub const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SEC;
pub const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;

/// Monotonic simulation clock.
///
/// `advance_to()` only moves forward; moving backward is a bug in the caller
/// (the event loop filters out-of-order input before it reaches the clock).
#[derive(Debug, Clone)]
pub struct SimClock {
    current: Nanos,
    started: bool,
}

impl SimClock {
    #[inline]
    pub fn new(start_time: Nanos) -> Self {
        Self {
            current: start_time,
            started: false,
        }
    }

    /// Current simulation time in nanoseconds.
    #[inline]
    pub fn now(&self) -> Nanos {
        self.current
    }

    /// Whether the clock has been advanced at least once.
    #[inline]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Advance clock to a new time. The first call may set any time.
    #[inline]
    pub fn advance_to(&mut self, new_time: Nanos) {
        debug_assert!(
            !self.started || new_time >= self.current,
            "SimClock: cannot go backward from {} to {}",
            self.current,
            new_time
        );
        self.current = if self.started {
            new_time.max(self.current)
        } else {
            new_time
        };
        self.started = true;
    }

    #[inline]
    pub fn elapsed_since(&self, past: Nanos) -> Nanos {
        (self.current - past).max(0)
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Display for SimClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.current / NANOS_PER_SEC;
        let nanos = self.current % NANOS_PER_SEC;
        write!(f, "{}.{:09}s", secs, nanos)
    }
}

/// Convert a millisecond duration (possibly fractional) to nanoseconds.
#[inline]
pub fn millis_to_nanos(ms: f64) -> Nanos {
    (ms * NANOS_PER_MILLI as f64).round() as Nanos
}

/// Convert seconds (possibly fractional) to nanoseconds.
#[inline]
pub fn secs_to_nanos(secs: f64) -> Nanos {
    (secs * NANOS_PER_SEC as f64).round() as Nanos
}

/// Helper to convert Nanos to chrono DateTime. `None` when out of chrono's range.
#[inline]
pub fn nanos_to_datetime(nanos: Nanos) -> Option<chrono::DateTime<chrono::Utc>> {
    use chrono::TimeZone;
    let secs = nanos.div_euclid(NANOS_PER_SEC);
    let nsecs = nanos.rem_euclid(NANOS_PER_SEC) as u32;
    chrono::Utc.timestamp_opt(secs, nsecs).single()
}

/// Render Nanos as RFC 3339, falling back to the raw integer.
pub fn format_nanos(nanos: Nanos) -> String {
    nanos_to_datetime(nanos)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true))
        .unwrap_or_else(|| nanos.to_string())
}
