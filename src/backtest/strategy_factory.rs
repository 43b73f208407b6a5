//! Strategy Factory
//!
//! Maps strategy names to Strategy implementations for the backtest runner.
//!
//! # Supported Strategies
//!
//! - `twosided_mm` - Two-sided market making around mid with inventory skew

use crate::backtest::market_maker::TwoSidedMarketMaker;
use crate::backtest::strategy::{Strategy, StrategyContext};
use std::collections::BTreeMap;

/// Registry of available strategies with their descriptions.
pub fn available_strategies() -> BTreeMap<&'static str, &'static str> {
    let mut map = BTreeMap::new();
    map.insert(
        "twosided_mm",
        "Two-sided market making around mid with inventory skew",
    );
    map
}

/// Create a strategy by name (case-insensitive).
///
/// # Returns
/// * `Ok(Box<dyn Strategy>)` on success
/// * `Err(String)` with available strategy names on failure
pub fn make_strategy(name: &str, ctx: &StrategyContext) -> Result<Box<dyn Strategy>, String> {
    match name.to_lowercase().as_str() {
        "twosided_mm" | "twosided-mm" | "market_maker" | "mm" => {
            Ok(Box::new(TwoSidedMarketMaker::new(ctx.clone())))
        }
        _ => {
            let available: Vec<_> = available_strategies().keys().copied().collect();
            Err(format!(
                "Unknown strategy: '{}'. Available strategies: {}",
                name,
                available.join(", ")
            ))
        }
    }
}
