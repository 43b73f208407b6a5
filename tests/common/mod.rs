//! Shared fixtures for integration tests.

#![allow(dead_code)]

use scalper_backtest::config::AppConfig;
use std::fs;
use std::path::{Path, PathBuf};

/// Two-level book with mid 100, then a sell print through the bid and a buy
/// print through the ask.
pub const LOB_CSV: &str = "ts,side,price,quantity,event\n\
1000,bid,99.0,5,add\n\
2000,ask,101.0,5,add\n\
5000,bid,99.0,4,modify\n";

pub const TRADES_CSV: &str = "timestamp,price,size,aggressor_side\n\
3000,99.9,2,sell\n\
4000,100.1,2,buy\n";

pub const LOB_JSONL: &str = "{\"ts\":1000,\"side\":\"bid\",\"price\":99.0,\"quantity\":5,\"event\":\"add\"}\n\
{\"ts\":2000,\"side\":\"ask\",\"price\":101.0,\"quantity\":5,\"event\":\"add\"}\n\
{\"ts\":5000,\"side\":\"bid\",\"price\":99.0,\"quantity\":4,\"event\":\"modify\"}\n";

pub const TRADES_JSONL: &str = "{\"timestamp\":3000,\"price\":99.9,\"size\":2,\"aggressor_side\":\"sell\"}\n\
{\"timestamp\":4000,\"price\":100.1,\"size\":2,\"aggressor_side\":\"buy\"}\n";

pub fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

/// Config TOML for the CSV fixture with extra sections appended.
pub fn config_text(dir: &Path, extra: &str) -> String {
    let lob = write(dir, "lob.csv", LOB_CSV);
    let trades = write(dir, "trades.csv", TRADES_CSV);
    format!(
        r#"
[data]
lob_path = "{}"
trades_path = "{}"

[strategy.params]
order_size = 1.0

[backtest]
output_dir = "{}"
{}
"#,
        lob.display(),
        trades.display(),
        dir.join("out").display(),
        extra
    )
}

pub fn config(dir: &Path, extra: &str) -> AppConfig {
    AppConfig::from_toml_str(&config_text(dir, extra)).unwrap()
}
