//! Run orchestration
//!
//! Single runs and parallel parameter sweeps. Each run owns its simulator,
//! latency RNG and output directory; sweeps share only the loaded market data.

use crate::backtest::exchange::{ExchangeSimulator, SimulationResult};
use crate::backtest::feed::MergedFeed;
use crate::backtest::strategy::StrategyContext;
use crate::backtest::strategy_factory::make_strategy;
use crate::config::{AppConfig, SweepConfig, SweepMode, DEFAULT_RANDOM_SAMPLES};
use crate::data_loader::{load_market_data, MarketData};
use crate::error::{ConfigError, OrchestrationError, RunFailure};
use crate::report::{write_run_outputs, RunArtifacts};
use crate::sweep::{grid_points, random_points, SweepPoint};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// A completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Sweep label, or `run` for a single run.
    pub label: String,
    pub params: StrategyContext,
    pub result: SimulationResult,
    pub artifacts: RunArtifacts,
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Completed runs in plan order.
    pub completed: Vec<RunOutcome>,
    pub failed: Vec<RunFailure>,
    /// Runs never started because an earlier run failed.
    pub skipped: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len() + self.skipped
    }

    pub fn ensure_success(&self) -> Result<(), OrchestrationError> {
        if self.failed.is_empty() {
            Ok(())
        } else {
            Err(OrchestrationError {
                failures: self.failed.clone(),
            })
        }
    }
}

enum PointOutcome {
    Completed(Box<RunOutcome>),
    Failed(RunFailure),
    Skipped,
}

fn execute(config: &AppConfig, data: &MarketData, label: &str) -> Result<RunOutcome> {
    let mut strategy = make_strategy(&config.strategy.name, &config.strategy.params)
        .map_err(|e| ConfigError::new("strategy.name", e))?;
    let mut feed = MergedFeed::new(data.book.clone(), data.trades.clone())
        .with_name(config.data.symbol.clone());
    let mut sim = ExchangeSimulator::new(config.sim_config());
    let result = sim.run(&mut feed, strategy.as_mut())?;
    let artifacts = write_run_outputs(config, &result)
        .with_context(|| format!("writing outputs for {}", label))?;

    info!(
        run = label,
        fills = result.ledger_stats.fills,
        net_pnl = result.net_pnl(),
        final_inventory = result.final_inventory,
        fingerprint = %result.fingerprint,
        "Run completed"
    );
    Ok(RunOutcome {
        label: label.to_string(),
        params: config.strategy.params.clone(),
        result,
        artifacts,
    })
}

/// Validate, load data, simulate and write outputs for one configuration.
pub fn run_single(config: &AppConfig) -> Result<RunOutcome> {
    config.validate()?;
    let started = Instant::now();
    let data = load_market_data(&config.data)?;
    let outcome = execute(config, &data, "run")?;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        output_dir = %outcome.artifacts.output_dir.display(),
        "Backtest finished"
    );
    Ok(outcome)
}

fn sweep_section(config: &AppConfig, requested: SweepMode) -> Result<&SweepConfig, ConfigError> {
    let sweep = config
        .sweep
        .as_ref()
        .ok_or_else(|| ConfigError::new("sweep", "sweep requested but [sweep] section is missing"))?;
    match sweep.mode {
        Some(mode) if mode != requested => Err(ConfigError::new(
            "sweep.mode",
            format!(
                "config declares a {} sweep but a {} sweep was requested",
                mode.as_str(),
                requested.as_str()
            ),
        )),
        _ => Ok(sweep),
    }
}

/// Run every combination of `sweep.param_grid`. Rejects configs with
/// `sweep.mode = "random"`.
pub fn sweep_grid(config: &AppConfig) -> Result<SweepReport> {
    config.validate()?;
    let sweep = sweep_section(config, SweepMode::Grid)?;
    let points = grid_points(&config.strategy.params, &sweep.param_grid)?;
    run_points(config, sweep, points, "grid")
}

/// Run `n_samples` seeded random draws from `sweep.param_grid`.
///
/// `n_samples` overrides `sweep.n_samples`, which itself defaults to 20.
pub fn sweep_random(config: &AppConfig, n_samples: Option<usize>) -> Result<SweepReport> {
    config.validate()?;
    let sweep = sweep_section(config, SweepMode::Random)?;
    let n = n_samples
        .or(sweep.n_samples)
        .unwrap_or(DEFAULT_RANDOM_SAMPLES);
    let points = random_points(
        &config.strategy.params,
        &sweep.param_grid,
        n,
        config.backtest.seed,
    )?;
    run_points(config, sweep, points, "random")
}

fn run_points(
    config: &AppConfig,
    sweep: &SweepConfig,
    points: Vec<SweepPoint>,
    mode: &str,
) -> Result<SweepReport> {
    let data = load_market_data(&config.data)?;
    let workers = sweep
        .max_workers
        .unwrap_or_else(rayon::current_num_threads)
        .max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("Failed to create rayon thread pool")?;

    info!(
        mode,
        runs = points.len(),
        workers,
        "Starting sweep"
    );
    let started = Instant::now();
    let base_dir = config.backtest.output_dir.clone();
    let abort = AtomicBool::new(false);

    let outcomes: Vec<PointOutcome> = pool.install(|| {
        points
            .par_iter()
            .map(|point| {
                if sweep.abort_on_first_failure && abort.load(Ordering::SeqCst) {
                    return PointOutcome::Skipped;
                }
                let run_config = config.for_run(point.params.clone(), base_dir.join(&point.label));
                match execute(&run_config, &data, &point.label) {
                    Ok(outcome) => PointOutcome::Completed(Box::new(outcome)),
                    Err(e) => {
                        abort.store(true, Ordering::SeqCst);
                        let failure = RunFailure {
                            label: point.label.clone(),
                            params: point.describe(),
                            error: format!("{:#}", e),
                        };
                        warn!(
                            run = %failure.label,
                            params = %failure.params,
                            error = %failure.error,
                            "Sweep run failed"
                        );
                        PointOutcome::Failed(failure)
                    }
                }
            })
            .collect()
    });

    let mut report = SweepReport::default();
    for outcome in outcomes {
        match outcome {
            PointOutcome::Completed(run) => report.completed.push(*run),
            PointOutcome::Failed(failure) => report.failed.push(failure),
            PointOutcome::Skipped => report.skipped += 1,
        }
    }

    info!(
        mode,
        completed = report.completed.len(),
        failed = report.failed.len(),
        skipped = report.skipped,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Sweep finished"
    );
    Ok(report)
}
