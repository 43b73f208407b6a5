//! Scalper Backtest Library
//!
//! Event-driven limit order book exchange simulator with a risk-averse queue
//! model, plus config loading, market data ingestion, run reports and
//! parameter sweeps. Used by the `scalper` binary and the integration tests.

pub mod backtest;
pub mod config;
pub mod data_loader;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod sweep;

pub use config::AppConfig;
pub use error::{ConfigError, DataIngestionError, OrchestrationError};
pub use orchestrator::{run_single, sweep_grid, sweep_random, RunOutcome, SweepReport};
