//! Latency Model
//!
//! Nominal delay plus clamped Gaussian jitter for market data and order traffic.
//! Deterministic replay via a seeded per-run RNG.

use crate::backtest::clock::{Nanos, NANOS_PER_SEC};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// One latency draw in seconds: `base_ms/1000 + max(0, N(0, jitter_ms/1000))`.
///
/// With `jitter_ms <= 0` the RNG is not touched. Otherwise exactly one normal
/// sample is consumed.
pub fn delay<R: Rng + ?Sized>(base_ms: f64, jitter_ms: f64, rng: &mut R) -> f64 {
    let base = base_ms / 1000.0;
    if !(jitter_ms > 0.0) {
        return base;
    }
    let jitter = match Normal::new(0.0, jitter_ms / 1000.0) {
        Ok(dist) => dist.sample(rng).max(0.0),
        Err(_) => 0.0,
    };
    base + jitter
}

/// Which nominal delay applies to a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LatencyKind {
    /// Exchange to strategy (book updates).
    Feed,
    /// Strategy to exchange (submits and cancels).
    Order,
}

/// Latency parameters in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyParams {
    pub feed_latency_ms: f64,
    pub order_latency_ms: f64,
    pub jitter_ms: f64,
    pub seed: u64,
}

impl Default for LatencyParams {
    fn default() -> Self {
        Self {
            feed_latency_ms: 0.0,
            order_latency_ms: 0.0,
            jitter_ms: 0.0,
            seed: 42,
        }
    }
}

impl LatencyParams {
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Latency statistics for diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    pub feed_samples: u64,
    pub feed_sum_ns: i64,
    pub feed_max_ns: i64,
    pub order_samples: u64,
    pub order_sum_ns: i64,
    pub order_max_ns: i64,
}

impl LatencyStats {
    pub fn avg_feed_ns(&self) -> f64 {
        if self.feed_samples == 0 {
            0.0
        } else {
            self.feed_sum_ns as f64 / self.feed_samples as f64
        }
    }

    pub fn avg_order_ns(&self) -> f64 {
        if self.order_samples == 0 {
            0.0
        } else {
            self.order_sum_ns as f64 / self.order_samples as f64
        }
    }
}

/// Seeded latency sampler owned by one simulator.
pub struct LatencyModel {
    params: LatencyParams,
    rng: ChaCha8Rng,
    pub stats: LatencyStats,
}

impl LatencyModel {
    pub fn new(params: LatencyParams) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(params.seed),
            params,
            stats: LatencyStats::default(),
        }
    }

    pub fn params(&self) -> &LatencyParams {
        &self.params
    }

    /// Sample a delay in nanoseconds and record it.
    pub fn sample_ns(&mut self, kind: LatencyKind) -> Nanos {
        let base_ms = match kind {
            LatencyKind::Feed => self.params.feed_latency_ms,
            LatencyKind::Order => self.params.order_latency_ms,
        };
        let secs = delay(base_ms, self.params.jitter_ms, &mut self.rng);
        let ns = (secs * NANOS_PER_SEC as f64).round() as Nanos;
        match kind {
            LatencyKind::Feed => {
                self.stats.feed_samples += 1;
                self.stats.feed_sum_ns += ns;
                self.stats.feed_max_ns = self.stats.feed_max_ns.max(ns);
            }
            LatencyKind::Order => {
                self.stats.order_samples += 1;
                self.stats.order_sum_ns += ns;
                self.stats.order_max_ns = self.stats.order_max_ns.max(ns);
            }
        }
        ns
    }
}
