//! Error types shared across the simulator, loaders and orchestrator.

use crate::backtest::clock::Nanos;
use crate::backtest::events::{Price, Side, Size};
use std::fmt;
use std::path::PathBuf;

/// Invalid configuration. Fatal before any run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid config `{}`: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestionErrorKind {
    Io(String),
    Parse(String),
    OutOfOrder { previous: Nanos, timestamp: Nanos },
}

/// Market data file could not be read. Fatal for the run.
#[derive(Debug, Clone, PartialEq)]
pub struct DataIngestionError {
    pub path: PathBuf,
    /// 1-based data record number, when the failure is tied to one record.
    pub record: Option<u64>,
    pub kind: IngestionErrorKind,
}

impl DataIngestionError {
    pub fn io(path: impl Into<PathBuf>, err: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            record: None,
            kind: IngestionErrorKind::Io(err.to_string()),
        }
    }

    pub fn parse(path: impl Into<PathBuf>, record: u64, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            record: Some(record),
            kind: IngestionErrorKind::Parse(message.into()),
        }
    }
}

impl fmt::Display for DataIngestionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        if let Some(record) = self.record {
            write!(f, " record {}", record)?;
        }
        match &self.kind {
            IngestionErrorKind::Io(msg) => write!(f, ": io error: {}", msg),
            IngestionErrorKind::Parse(msg) => write!(f, ": parse error: {}", msg),
            IngestionErrorKind::OutOfOrder {
                previous,
                timestamp,
            } => write!(
                f,
                ": timestamp {} precedes previous record at {}",
                timestamp, previous
            ),
        }
    }
}

impl std::error::Error for DataIngestionError {}

/// A market event the simulator could not apply. Skipped and counted.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidEventError {
    /// modify/delete on a level that does not exist
    UnknownLevel { side: Side, price: Price },
    InvalidPrice { price: Price },
    InvalidQuantity { quantity: Size },
    /// Event timestamp earlier than the simulation clock
    OutOfOrder { timestamp: Nanos, now: Nanos },
}

impl fmt::Display for InvalidEventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownLevel { side, price } => {
                write!(f, "unknown {} level at {}", side, price)
            }
            Self::InvalidPrice { price } => write!(f, "invalid price: {}", price),
            Self::InvalidQuantity { quantity } => write!(f, "invalid quantity: {}", quantity),
            Self::OutOfOrder { timestamp, now } => {
                write!(f, "event at {} is before clock {}", timestamp, now)
            }
        }
    }
}

impl std::error::Error for InvalidEventError {}

/// Submission refused by the sliding-window order limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitExceeded {
    pub limit: u32,
    pub window_ns: Nanos,
}

impl fmt::Display for RateLimitExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rate limit exceeded: {} orders per {}s",
            self.limit,
            self.window_ns / 1_000_000_000
        )
    }
}

impl std::error::Error for RateLimitExceeded {}

/// Why `submit` refused an order.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitError {
    RateLimited(RateLimitExceeded),
    InvalidOrder { reason: String },
    NotAccepting { state: &'static str },
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited(e) => write!(f, "{}", e),
            Self::InvalidOrder { reason } => write!(f, "invalid order: {}", reason),
            Self::NotAccepting { state } => {
                write!(f, "simulator not accepting orders in state {}", state)
            }
        }
    }
}

impl std::error::Error for SubmitError {}

impl From<RateLimitExceeded> for SubmitError {
    fn from(e: RateLimitExceeded) -> Self {
        Self::RateLimited(e)
    }
}

/// Misuse of the simulator state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState { expected, actual } => write!(
                f,
                "invalid simulator state: expected {}, found {}",
                expected, actual
            ),
        }
    }
}

impl std::error::Error for SimError {}

/// One failed run inside a sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct RunFailure {
    pub label: String,
    /// Rendered parameter assignment, e.g. `quote_width_bps=5, order_size=0.01`.
    pub params: String,
    pub error: String,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.label, self.params, self.error)
    }
}

/// At least one sweep run failed. Completed runs' outputs remain valid.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestrationError {
    pub failures: Vec<RunFailure>,
}

impl fmt::Display for OrchestrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sweep run(s) failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for OrchestrationError {}
