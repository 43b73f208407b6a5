//! Run outputs
//!
//! Trades and PnL CSVs, a markdown summary and the effective config snapshot.
//! Every file of a run is staged under a temporary name first and renamed into
//! place only once all of them are written.

use crate::backtest::exchange::SimulationResult;
use crate::backtest::ledger::{Fill, LedgerEntry};
use crate::config::AppConfig;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const TRADES_FILE: &str = "trades.csv";
pub const PNL_FILE: &str = "pnl.csv";
pub const REPORT_FILE: &str = "report.md";
pub const CONFIG_FILE: &str = "config.toml";

/// Paths of the files written for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunArtifacts {
    pub output_dir: PathBuf,
    pub trades: Option<PathBuf>,
    pub pnl: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub config: PathBuf,
}

/// Write `content` to the temporary sibling of `path` and return that sibling.
fn stage_output(path: &Path, content: &[u8]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }

    let temp_path = path.with_extension("tmp");
    let file = File::create(&temp_path)
        .with_context(|| format!("creating temp file {}", temp_path.display()))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(content)
        .with_context(|| format!("writing {}", temp_path.display()))?;
    writer
        .flush()
        .with_context(|| format!("flushing {}", temp_path.display()))?;
    Ok(temp_path)
}

/// Outputs staged under temporary names, renamed into place together.
#[derive(Debug, Default)]
struct StagedOutputs {
    staged: Vec<(PathBuf, PathBuf)>,
}

impl StagedOutputs {
    fn stage(&mut self, path: &Path, content: &[u8]) -> Result<()> {
        let temp_path = stage_output(path, content)?;
        self.staged.push((temp_path, path.to_path_buf()));
        Ok(())
    }

    fn commit(mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        for (i, (temp_path, path)) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(temp_path, path) {
                // Roll back what is already in place so no partial set remains.
                for (_, done) in &staged[..i] {
                    let _ = fs::remove_file(done);
                }
                for (pending, _) in &staged[i..] {
                    let _ = fs::remove_file(pending);
                }
                return Err(e).with_context(|| format!("renaming {} into place", path.display()));
            }
        }
        Ok(())
    }
}

impl Drop for StagedOutputs {
    fn drop(&mut self) {
        for (temp_path, _) in &self.staged {
            let _ = fs::remove_file(temp_path);
        }
    }
}

pub fn trades_csv(fills: &[Fill]) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record([
        "fill_id",
        "order_id",
        "timestamp_ns",
        "side",
        "price",
        "quantity",
        "liquidity",
        "fee_bps",
        "fee_paid",
    ])?;
    for fill in fills {
        wtr.write_record([
            fill.fill_id.to_string(),
            fill.order_id.to_string(),
            fill.timestamp_ns.to_string(),
            fill.side.as_str().to_string(),
            fill.price.to_string(),
            fill.quantity.to_string(),
            fill.liquidity.as_str().to_string(),
            fill.fee_bps_applied.to_string(),
            fill.fee_paid.to_string(),
        ])?;
    }
    Ok(wtr.into_inner().map_err(|e| e.into_error())?)
}

/// One row per ledger entry with a running net PnL.
pub fn pnl_csv(entries: &[LedgerEntry]) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record([
        "entry_id",
        "timestamp_ns",
        "kind",
        "realized_pnl_delta",
        "fee_paid",
        "funding_paid",
        "inventory_after",
        "cumulative_pnl",
    ])?;
    let mut cumulative = 0.0;
    for entry in entries {
        cumulative += entry.net_pnl();
        wtr.write_record([
            entry.entry_id.to_string(),
            entry.timestamp_ns.to_string(),
            entry.kind.as_str().to_string(),
            entry.realized_pnl_delta.to_string(),
            entry.fee_paid.to_string(),
            entry.funding_paid.to_string(),
            entry.inventory_after.to_string(),
            cumulative.to_string(),
        ])?;
    }
    Ok(wtr.into_inner().map_err(|e| e.into_error())?)
}

pub fn render_report(
    config: &AppConfig,
    result: &SimulationResult,
    artifacts: &RunArtifacts,
) -> String {
    let file_name = |p: &Option<PathBuf>| {
        p.as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "(not written)".to_string())
    };
    let ls = &result.ledger_stats;
    let st = &result.stats;

    let mut out = String::new();
    out.push_str("# Backtest Report\n\n");
    out.push_str(&format!("- Symbol: {}\n", config.data.symbol));
    out.push_str(&format!("- Strategy: {}\n", result.strategy));
    out.push_str(&format!("- Trades: {}\n", file_name(&artifacts.trades)));
    out.push_str(&format!("- PnL: {}\n\n", file_name(&artifacts.pnl)));

    out.push_str("## Summary\n\n");
    out.push_str("| Metric | Value |\n");
    out.push_str("|---|---|\n");
    out.push_str(&format!("| Fills | {} |\n", ls.fills));
    out.push_str(&format!("| Maker fills | {} |\n", ls.maker_fills));
    out.push_str(&format!("| Taker fills | {} |\n", ls.taker_fills));
    out.push_str(&format!("| Volume | {} |\n", ls.volume()));
    out.push_str(&format!("| Notional | {:.6} |\n", ls.notional));
    out.push_str(&format!("| Fees paid | {:.6} |\n", ls.fees_paid));
    out.push_str(&format!("| Funding paid | {:.6} |\n", ls.funding_paid));
    out.push_str(&format!("| Realized PnL | {:.6} |\n", ls.realized_pnl));
    out.push_str(&format!("| Net PnL | {:.6} |\n", result.net_pnl()));
    out.push_str(&format!("| Final inventory | {} |\n", result.final_inventory));
    match result.mark_price {
        Some(mark) => out.push_str(&format!("| Mark price | {} |\n", mark)),
        None => out.push_str("| Mark price | n/a |\n"),
    }
    out.push_str(&format!("| Unrealized PnL | {:.6} |\n", result.unrealized_pnl));
    out.push_str(&format!("| Skipped invalid events | {} |\n", st.invalid_events));
    out.push_str(&format!("| Rate-limited submissions | {} |\n", st.rate_limited));
    out.push_str(&format!("| Orders submitted | {} |\n", st.orders_submitted));
    out.push_str(&format!("| Orders expired | {} |\n", st.orders_expired));
    out.push_str(&format!("| Events processed | {} |\n\n", st.events_processed));
    match result.time_range() {
        Some((start, end)) => {
            out.push_str(&format!("Event time range: {} to {}\n\n", start, end))
        }
        None => out.push_str("Event time range: no market data\n\n"),
    }
    out.push_str(&format!("Fingerprint: `{}`\n", result.fingerprint));
    out
}

/// Write every enabled output for a finished run into `config.backtest.output_dir`.
///
/// CSVs are skipped when disabled or empty; `config.toml` is always written.
/// Either every file lands or none does.
pub fn write_run_outputs(config: &AppConfig, result: &SimulationResult) -> Result<RunArtifacts> {
    let dir = config.backtest.output_dir.clone();
    let mut artifacts = RunArtifacts {
        config: dir.join(CONFIG_FILE),
        output_dir: dir.clone(),
        ..RunArtifacts::default()
    };

    let mut outputs = StagedOutputs::default();
    if config.backtest.export_trades && !result.fills.is_empty() {
        let path = dir.join(TRADES_FILE);
        outputs.stage(&path, &trades_csv(&result.fills)?)?;
        artifacts.trades = Some(path);
    }
    if config.backtest.export_pnl && !result.entries.is_empty() {
        let path = dir.join(PNL_FILE);
        outputs.stage(&path, &pnl_csv(&result.entries)?)?;
        artifacts.pnl = Some(path);
    }
    if config.backtest.export_report {
        let path = dir.join(REPORT_FILE);
        artifacts.report = Some(path.clone());
        let report = render_report(config, result, &artifacts);
        outputs.stage(&path, report.as_bytes())?;
    }
    outputs.stage(&artifacts.config, config.to_toml()?.as_bytes())?;
    outputs.commit()?;

    debug!(
        output_dir = %dir.display(),
        trades = artifacts.trades.is_some(),
        pnl = artifacts.pnl.is_some(),
        "Run outputs written"
    );
    Ok(artifacts)
}
