//! Run configuration
//!
//! TOML schema for a backtest run (and optional parameter sweep), with serde
//! defaults per section and explicit validation.

use crate::backtest::exchange::{FeeSchedule, SimConfig};
use crate::backtest::latency::LatencyParams;
use crate::backtest::strategy::StrategyContext;
use crate::backtest::strategy_factory::make_strategy;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Market data file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Csv,
    Jsonl,
}

impl DataFormat {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "jsonl" | "ndjson" | "json" => Ok(Self::Jsonl),
            other => Err(ConfigError::new(
                "data.format",
                format!("unsupported data format: {}", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    pub lob_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trades_path: Option<PathBuf>,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Inclusive lower bound on event timestamps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_ts_ns: Option<i64>,
    /// Inclusive upper bound on event timestamps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_ts_ns: Option<i64>,
}

fn default_format() -> String {
    "csv".to_string()
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

impl DataConfig {
    pub fn data_format(&self) -> Result<DataFormat, ConfigError> {
        DataFormat::parse(&self.format)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_strategy_name")]
    pub name: String,
    #[serde(default)]
    pub params: StrategyContext,
}

fn default_strategy_name() -> String {
    "twosided_mm".to_string()
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: default_strategy_name(),
            params: StrategyContext::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Seed for sweep sampling.
    pub seed: u64,
    pub output_dir: PathBuf,
    pub export_trades: bool,
    pub export_pnl: bool,
    pub export_report: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            output_dir: PathBuf::from("outputs"),
            export_trades: true,
            export_pnl: true,
            export_report: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepMode {
    Grid,
    Random,
}

impl SweepMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepMode::Grid => "grid",
            SweepMode::Random => "random",
        }
    }
}

/// One sweep value. Integers and floats are kept apart so labels render as written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
}

impl ParamValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            ParamValue::Int(i) => i as f64,
            ParamValue::Float(f) => f,
        }
    }

    /// Whole-number value, if there is one.
    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            ParamValue::Int(i) => Some(i),
            ParamValue::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
            ParamValue::Float(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Sweep kind this config is written for; when set it must match the
    /// requested sweep.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<SweepMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_samples: Option<usize>,
    /// Skip not-yet-started runs after the first failure.
    #[serde(default)]
    pub abort_on_first_failure: bool,
    /// Bound on parallel runs (defaults to all cores).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    /// Keys are `StrategyContext` field names.
    #[serde(default)]
    pub param_grid: BTreeMap<String, Vec<ParamValue>>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            mode: None,
            n_samples: None,
            abort_on_first_failure: false,
            max_workers: None,
            param_grid: BTreeMap::new(),
        }
    }
}

pub const DEFAULT_RANDOM_SAMPLES: usize = 20;

/// Top-level run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub data: DataConfig,
    #[serde(default)]
    pub fees: FeeSchedule,
    #[serde(default)]
    pub latency: LatencyParams,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep: Option<SweepConfig>,
}

fn non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::new(
            field,
            format!("must be a finite non-negative number, got {}", value),
        ));
    }
    Ok(())
}

/// Range rules shared by the base parameters and every sweep value.
pub fn validate_strategy_params(params: &StrategyContext) -> Result<(), ConfigError> {
    if !params.inventory_target.is_finite() {
        return Err(ConfigError::new(
            "strategy.params.inventory_target",
            "must be finite",
        ));
    }
    non_negative("strategy.params.quote_width_bps", params.quote_width_bps)?;
    non_negative(
        "strategy.params.imbalance_threshold",
        params.imbalance_threshold,
    )?;
    if params.max_orders_per_minute == 0 {
        return Err(ConfigError::new(
            "strategy.params.max_orders_per_minute",
            "must be at least 1",
        ));
    }
    if !params.order_size.is_finite() || params.order_size <= 0.0 {
        return Err(ConfigError::new(
            "strategy.params.order_size",
            format!("must be positive, got {}", params.order_size),
        ));
    }
    Ok(())
}

impl AppConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::new("config", format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&contents)?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::new("config", e.message()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.data.data_format()?;
        if self.data.lob_path.as_os_str().is_empty() {
            return Err(ConfigError::new("data.lob_path", "must not be empty"));
        }
        if let (Some(start), Some(end)) = (self.data.start_ts_ns, self.data.end_ts_ns) {
            if start > end {
                return Err(ConfigError::new(
                    "data.start_ts_ns",
                    format!("start {} is after end {}", start, end),
                ));
            }
        }

        non_negative("fees.maker_bps", self.fees.maker_bps)?;
        non_negative("fees.taker_bps", self.fees.taker_bps)?;
        if !self.fees.funding_bps_per_8h.is_finite() {
            return Err(ConfigError::new("fees.funding_bps_per_8h", "must be finite"));
        }

        non_negative("latency.feed_latency_ms", self.latency.feed_latency_ms)?;
        non_negative("latency.order_latency_ms", self.latency.order_latency_ms)?;
        non_negative("latency.jitter_ms", self.latency.jitter_ms)?;

        make_strategy(&self.strategy.name, &self.strategy.params)
            .map_err(|e| ConfigError::new("strategy.name", e))?;
        validate_strategy_params(&self.strategy.params)?;

        if let Some(sweep) = &self.sweep {
            self.validate_sweep(sweep)?;
        }
        Ok(())
    }

    fn validate_sweep(&self, sweep: &SweepConfig) -> Result<(), ConfigError> {
        if sweep.param_grid.is_empty() {
            return Err(ConfigError::new(
                "sweep.param_grid",
                "sweep requires at least one parameter",
            ));
        }
        if sweep.n_samples == Some(0) {
            return Err(ConfigError::new("sweep.n_samples", "must be at least 1"));
        }
        if sweep.max_workers == Some(0) {
            return Err(ConfigError::new("sweep.max_workers", "must be at least 1"));
        }
        for (key, values) in &sweep.param_grid {
            if values.is_empty() {
                return Err(ConfigError::new(
                    format!("sweep.param_grid.{}", key),
                    "value list is empty",
                ));
            }
            for value in values {
                let mut candidate = self.strategy.params.clone();
                crate::sweep::apply_param(&mut candidate, key, *value)?;
                validate_strategy_params(&candidate).map_err(|e| {
                    ConfigError::new(format!("sweep.param_grid.{}", key), e.message)
                })?;
            }
        }
        Ok(())
    }

    /// Simulator settings for this run.
    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            fees: self.fees,
            latency: self.latency,
            max_orders_per_minute: self.strategy.params.max_orders_per_minute,
            cancel_cadence_ms: self.strategy.params.cancel_cadence_ms,
            start_time_ns: self.data.start_ts_ns.unwrap_or(0),
        }
    }

    /// Copy of this config for one sweep run.
    pub fn for_run(&self, params: StrategyContext, output_dir: PathBuf) -> Self {
        let mut config = self.clone();
        config.strategy.params = params;
        config.backtest.output_dir = output_dir;
        config.sweep = None;
        config
    }

    /// Effective configuration as TOML, written next to every run's outputs.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[data]
lob_path = "data/lob.csv"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.data.format, "csv");
        assert_eq!(config.data.symbol, "BTCUSDT");
        assert_eq!(config.latency.seed, 42);
        assert_eq!(config.backtest.seed, 42);
        assert_eq!(config.backtest.output_dir, PathBuf::from("outputs"));
        assert_eq!(config.strategy.name, "twosided_mm");
        assert_eq!(config.strategy.params, StrategyContext::default());
        assert!(config.sweep.is_none());
    }

    #[test]
    fn test_full_config_parses() {
        let text = r#"
[data]
lob_path = "lob.csv"
trades_path = "trades.csv"
format = "jsonl"
start_ts_ns = 10
end_ts_ns = 20

[fees]
maker_bps = 0.0
taker_bps = 4.0
derivatives = true
funding_bps_per_8h = 1.0

[latency]
order_latency_ms = 2.5
jitter_ms = 0.5
seed = 7

[strategy]
name = "twosided_mm"
[strategy.params]
quote_width_bps = 8.0
cancel_cadence_ms = 250

[backtest]
output_dir = "out"
export_pnl = false

[sweep]
mode = "random"
n_samples = 5
max_workers = 2
[sweep.param_grid]
quote_width_bps = [5, 7.5, 10]
max_orders_per_minute = [30, 60]
"#;
        let config = AppConfig::from_toml_str(text).unwrap();
        assert_eq!(config.data.data_format().unwrap(), DataFormat::Jsonl);
        assert_eq!(config.data.end_ts_ns, Some(20));
        assert_eq!(config.latency.order_latency_ms, 2.5);
        assert_eq!(config.strategy.params.cancel_cadence_ms, 250);
        assert_eq!(config.strategy.params.order_size, 0.001);
        assert!(!config.backtest.export_pnl);

        let sweep = config.sweep.as_ref().unwrap();
        assert_eq!(sweep.mode, Some(SweepMode::Random));
        assert_eq!(
            sweep.param_grid["quote_width_bps"],
            vec![
                ParamValue::Int(5),
                ParamValue::Float(7.5),
                ParamValue::Int(10)
            ]
        );
        assert_eq!(config.sim_config().start_time_ns, 10);
    }

    #[test]
    fn test_missing_lob_path_is_config_error() {
        let err = AppConfig::from_toml_str("[data]\nsymbol = \"X\"\n").unwrap_err();
        assert!(err.message.contains("lob_path"));
    }

    #[test]
    fn test_validation_errors_name_field() {
        let cases = [
            ("format = \"parquet\"", "data.format"),
            ("start_ts_ns = 5\nend_ts_ns = 1", "data.start_ts_ns"),
        ];
        for (extra, field) in cases {
            let text = format!("[data]\nlob_path = \"x.csv\"\n{}\n", extra);
            let err = AppConfig::from_toml_str(&text).unwrap_err();
            assert_eq!(err.field, field);
        }

        let text = format!("{}\n[fees]\ntaker_bps = -1.0\n", MINIMAL);
        assert_eq!(
            AppConfig::from_toml_str(&text).unwrap_err().field,
            "fees.taker_bps"
        );

        let text = format!("{}\n[strategy]\nname = \"momentum\"\n", MINIMAL);
        assert_eq!(
            AppConfig::from_toml_str(&text).unwrap_err().field,
            "strategy.name"
        );

        let text = format!("{}\n[strategy.params]\norder_size = 0.0\n", MINIMAL);
        assert_eq!(
            AppConfig::from_toml_str(&text).unwrap_err().field,
            "strategy.params.order_size"
        );
    }

    #[test]
    fn test_sweep_validation() {
        let unknown = format!("{}\n[sweep.param_grid]\nspread = [1, 2]\n", MINIMAL);
        let err = AppConfig::from_toml_str(&unknown).unwrap_err();
        assert_eq!(err.field, "sweep.param_grid.spread");

        let fractional = format!(
            "{}\n[sweep.param_grid]\ncancel_cadence_ms = [100, 2.5]\n",
            MINIMAL
        );
        let err = AppConfig::from_toml_str(&fractional).unwrap_err();
        assert_eq!(err.field, "sweep.param_grid.cancel_cadence_ms");

        let empty = format!("{}\n[sweep]\nmode = \"grid\"\n", MINIMAL);
        let err = AppConfig::from_toml_str(&empty).unwrap_err();
        assert_eq!(err.field, "sweep.param_grid");

        let bad_value = format!("{}\n[sweep.param_grid]\norder_size = [0.1, 0]\n", MINIMAL);
        let err = AppConfig::from_toml_str(&bad_value).unwrap_err();
        assert_eq!(err.field, "sweep.param_grid.order_size");
    }

    #[test]
    fn test_snapshot_round_trips() {
        let text = format!(
            "{}\n[sweep.param_grid]\nquote_width_bps = [5, 7.5]\n",
            MINIMAL
        );
        let config = AppConfig::from_toml_str(&text).unwrap();
        let snapshot = config.to_toml().unwrap();
        let reparsed = AppConfig::from_toml_str(&snapshot).unwrap();
        assert_eq!(reparsed, config);
    }
}
