//! Scalper Backtest CLI
//!
//! # Usage
//!
//! ```bash
//! scalper run --config configs/sample.toml
//! scalper sweep-grid --config configs/sample.toml
//! scalper sweep-random --config configs/sample.toml --n-samples 50
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 2: Configuration error
//! - 3: Data, runtime or sweep error

use clap::{Parser, Subcommand};
use scalper_backtest::config::AppConfig;
use scalper_backtest::error::ConfigError;
use scalper_backtest::orchestrator::{run_single, sweep_grid, sweep_random, SweepReport};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "scalper")]
#[command(about = "Event-driven LOB backtester for market-making strategies")]
#[command(version)]
struct Cli {
    /// Log filter (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single backtest
    Run {
        /// TOML config path
        #[arg(long, short)]
        config: PathBuf,
    },

    /// Run every combination of sweep.param_grid
    SweepGrid {
        /// TOML config path
        #[arg(long, short)]
        config: PathBuf,
    },

    /// Run seeded random draws from sweep.param_grid
    SweepRandom {
        /// TOML config path
        #[arg(long, short)]
        config: PathBuf,

        /// Number of samples (default: sweep.n_samples, else 20)
        #[arg(long)]
        n_samples: Option<usize>,
    },
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_sweep(report: &SweepReport, mode: &str) -> anyhow::Result<()> {
    println!("Completed {} {} runs", report.completed.len(), mode);
    if report.skipped > 0 {
        println!("Skipped {} runs", report.skipped);
    }
    report.ensure_success()?;
    Ok(())
}

fn execute(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run { config } => {
            let config = AppConfig::load(&config)?;
            let outcome = run_single(&config)?;
            let show = |p: &Option<PathBuf>| {
                p.as_deref()
                    .map(Path::display)
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "(not written)".to_string())
            };
            println!("trades: {}", show(&outcome.artifacts.trades));
            println!("pnl: {}", show(&outcome.artifacts.pnl));
            println!("report: {}", show(&outcome.artifacts.report));
        }
        Commands::SweepGrid { config } => {
            let config = AppConfig::load(&config)?;
            let report = sweep_grid(&config)?;
            print_sweep(&report, "grid")?;
        }
        Commands::SweepRandom { config, n_samples } => {
            let config = AppConfig::load(&config)?;
            let report = sweep_random(&config, n_samples)?;
            print_sweep(&report, "random")?;
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    if let Err(e) = execute(cli.command) {
        eprintln!("error: {:#}", e);
        let code = if e.downcast_ref::<ConfigError>().is_some() {
            2
        } else {
            3
        };
        std::process::exit(code);
    }
}
