//! Integration tests for single runs
//!
//! Drive `run_single` and the `scalper` binary end to end on temporary
//! directories.

mod common;

use common::{config, config_text, write, LOB_JSONL, TRADES_JSONL};
use scalper_backtest::backtest::ledger::Liquidity;
use scalper_backtest::config::AppConfig;
use scalper_backtest::error::{DataIngestionError, IngestionErrorKind};
use scalper_backtest::orchestrator::run_single;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

#[test]
fn test_run_single_fills_both_quotes() {
    let dir = TempDir::new().unwrap();
    let outcome = run_single(&config(dir.path(), "")).unwrap();
    let result = &outcome.result;

    assert_eq!(result.fills.len(), 2);
    assert!(result.fills.iter().all(|f| f.liquidity == Liquidity::Maker));
    assert_eq!(result.final_inventory, 0.0);
    assert_eq!(result.final_inventory, result.recomputed_inventory);
    assert!(result.ledger_stats.realized_pnl > 0.0);
    assert_eq!(result.fingerprint.len(), 64);
}

#[test]
fn test_run_writes_all_outputs() {
    let dir = TempDir::new().unwrap();
    let outcome = run_single(&config(dir.path(), "")).unwrap();
    let artifacts = &outcome.artifacts;
    let out = dir.path().join("out");

    assert_eq!(artifacts.trades.as_deref(), Some(out.join("trades.csv").as_path()));
    assert_eq!(artifacts.pnl.as_deref(), Some(out.join("pnl.csv").as_path()));

    let trades = fs::read_to_string(out.join("trades.csv")).unwrap();
    assert_eq!(trades.lines().count(), 3);
    assert!(trades.starts_with("fill_id,order_id,timestamp_ns,side,price,quantity,liquidity"));

    let pnl = fs::read_to_string(out.join("pnl.csv")).unwrap();
    assert_eq!(pnl.lines().count(), 3);

    let report = fs::read_to_string(out.join("report.md")).unwrap();
    assert!(report.starts_with("# Backtest Report"));
    assert!(report.contains("BTCUSDT"));
    assert!(report.contains("trades.csv"));
    assert!(report.contains(&outcome.result.fingerprint));
    assert!(report.contains("1970-01-01T00:00:00.000001"));

    let snapshot = AppConfig::load(out.join("config.toml")).unwrap();
    assert_eq!(snapshot.strategy.params.order_size, 1.0);

    let leftovers: Vec<_> = fs::read_dir(&out)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map_or(false, |x| x == "tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_disabled_exports_still_write_config() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), "");
    cfg.backtest.export_trades = false;
    cfg.backtest.export_pnl = false;
    cfg.backtest.export_report = false;
    let outcome = run_single(&cfg).unwrap();

    let out = dir.path().join("out");
    assert!(outcome.artifacts.trades.is_none());
    assert!(!out.join("trades.csv").exists());
    assert!(!out.join("report.md").exists());
    assert!(out.join("config.toml").exists());
}

#[test]
fn test_jsonl_matches_csv() {
    let dir = TempDir::new().unwrap();
    let csv_outcome = run_single(&config(dir.path(), "")).unwrap();

    let json_dir = TempDir::new().unwrap();
    let mut cfg = config(json_dir.path(), "");
    cfg.data.format = "jsonl".to_string();
    cfg.data.lob_path = write(json_dir.path(), "lob.jsonl", LOB_JSONL);
    cfg.data.trades_path = Some(write(json_dir.path(), "trades.jsonl", TRADES_JSONL));
    let json_outcome = run_single(&cfg).unwrap();

    assert_eq!(csv_outcome.result.fills, json_outcome.result.fills);
    assert_eq!(csv_outcome.result.fingerprint, json_outcome.result.fingerprint);
}

#[test]
fn test_time_filter_drops_late_trade() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), "");
    cfg.data.end_ts_ns = Some(3500);
    let outcome = run_single(&cfg).unwrap();
    assert_eq!(outcome.result.fills.len(), 1);
    assert_eq!(outcome.result.final_inventory, 1.0);
}

#[test]
fn test_repeated_runs_are_identical() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), "");
    cfg.latency.order_latency_ms = 0.0005;
    cfg.latency.jitter_ms = 0.0002;

    let a = run_single(&cfg).unwrap();
    let b = run_single(&cfg).unwrap();
    assert_eq!(a.result.fills, b.result.fills);
    assert_eq!(a.result.entries, b.result.entries);
    assert_eq!(a.result.fingerprint, b.result.fingerprint);
}

#[test]
fn test_out_of_order_file_rejected() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), "");
    cfg.data.lob_path = write(
        dir.path(),
        "bad.csv",
        "ts,side,price,quantity,event\n2000,bid,99,1,add\n1000,ask,101,1,add\n",
    );
    let err = run_single(&cfg).unwrap_err();
    let ingestion = err.downcast_ref::<DataIngestionError>().unwrap();
    assert_eq!(ingestion.record, Some(2));
    assert!(matches!(ingestion.kind, IngestionErrorKind::OutOfOrder { .. }));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn test_cli_run_and_exit_codes() {
    let bin = env!("CARGO_BIN_EXE_scalper");
    let dir = TempDir::new().unwrap();

    let good = write(dir.path(), "good.toml", &config_text(dir.path(), ""));
    let output = Command::new(bin)
        .args(["run", "--config"])
        .arg(&good)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("trades: "));
    assert!(stdout.contains("pnl: "));
    assert!(stdout.contains("report: "));

    let bad_format = config_text(dir.path(), "").replace(
        "[strategy.params]",
        "format = \"parquet\"\n\n[strategy.params]",
    );
    let bad = write(dir.path(), "bad.toml", &bad_format);
    let output = Command::new(bin)
        .args(["run", "--config"])
        .arg(&bad)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));

    let missing_data = config_text(dir.path(), "").replace("lob.csv", "missing.csv");
    let missing = write(dir.path(), "missing.toml", &missing_data);
    let output = Command::new(bin)
        .args(["run", "--config"])
        .arg(&missing)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}
