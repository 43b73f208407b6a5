//! Sweep planning
//!
//! Expands `sweep.param_grid` into concrete strategy parameter sets: the full
//! cartesian product for grid sweeps, or seeded uniform draws for random
//! sweeps. All planning happens before any run starts.

use crate::backtest::strategy::StrategyContext;
use crate::config::ParamValue;
use crate::error::ConfigError;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashSet};

/// One planned run of a sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPoint {
    /// Position in plan order.
    pub index: usize,
    /// Output directory name under the sweep's base directory.
    pub label: String,
    /// Key/value pairs in sorted key order.
    pub assignment: Vec<(String, ParamValue)>,
    pub params: StrategyContext,
}

impl SweepPoint {
    /// `key=value` pairs, for logs and failure reports.
    pub fn describe(&self) -> String {
        self.assignment
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn param_field(key: &str) -> String {
    format!("sweep.param_grid.{}", key)
}

fn integer_value<T: TryFrom<i64>>(key: &str, value: ParamValue) -> Result<T, ConfigError> {
    let whole = value.as_integer().ok_or_else(|| {
        ConfigError::new(
            param_field(key),
            format!("expects an integer, got {}", value),
        )
    })?;
    T::try_from(whole).map_err(|_| {
        ConfigError::new(
            param_field(key),
            format!("value {} is out of range", whole),
        )
    })
}

/// Set one named field of `ctx`.
pub fn apply_param(
    ctx: &mut StrategyContext,
    key: &str,
    value: ParamValue,
) -> Result<(), ConfigError> {
    match key {
        "inventory_target" => ctx.inventory_target = value.as_f64(),
        "quote_width_bps" => ctx.quote_width_bps = value.as_f64(),
        "imbalance_threshold" => ctx.imbalance_threshold = value.as_f64(),
        "order_size" => ctx.order_size = value.as_f64(),
        "cancel_cadence_ms" => ctx.cancel_cadence_ms = integer_value(key, value)?,
        "max_orders_per_minute" => ctx.max_orders_per_minute = integer_value(key, value)?,
        _ => {
            return Err(ConfigError::new(
                param_field(key),
                format!(
                    "unknown strategy parameter; expected one of: {}",
                    StrategyContext::FIELDS.join(", ")
                ),
            ))
        }
    }
    Ok(())
}

fn build_point(
    index: usize,
    label: String,
    base: &StrategyContext,
    assignment: Vec<(String, ParamValue)>,
) -> Result<SweepPoint, ConfigError> {
    let mut params = base.clone();
    for (key, value) in &assignment {
        apply_param(&mut params, key, *value)?;
    }
    Ok(SweepPoint {
        index,
        label,
        assignment,
        params,
    })
}

/// `grid_<k1>-<v1>_<k2>-<v2>...`
pub fn grid_label(assignment: &[(String, ParamValue)]) -> String {
    let mut label = String::from("grid");
    for (key, value) in assignment {
        label.push('_');
        label.push_str(key);
        label.push('-');
        label.push_str(&value.to_string());
    }
    label
}

pub fn random_label(index: usize) -> String {
    format!("random_{:04}", index)
}

fn require_values(grid: &BTreeMap<String, Vec<ParamValue>>) -> Result<(), ConfigError> {
    if grid.is_empty() {
        return Err(ConfigError::new(
            "sweep.param_grid",
            "sweep requires at least one parameter",
        ));
    }
    for (key, values) in grid {
        if values.is_empty() {
            return Err(ConfigError::new(param_field(key), "value list is empty"));
        }
    }
    Ok(())
}

/// Cartesian product of all value lists, keys in sorted order and the last
/// key varying fastest.
pub fn grid_points(
    base: &StrategyContext,
    grid: &BTreeMap<String, Vec<ParamValue>>,
) -> Result<Vec<SweepPoint>, ConfigError> {
    require_values(grid)?;

    let mut combos: Vec<Vec<(String, ParamValue)>> = vec![Vec::new()];
    for (key, values) in grid {
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in values {
                let mut extended = combo.clone();
                extended.push((key.clone(), *value));
                next.push(extended);
            }
        }
        combos = next;
    }

    let mut seen = HashSet::new();
    let mut points = Vec::with_capacity(combos.len());
    for (index, assignment) in combos.into_iter().enumerate() {
        let label = grid_label(&assignment);
        if !seen.insert(label.clone()) {
            return Err(ConfigError::new(
                "sweep.param_grid",
                format!("parameter combinations collide on output directory `{}`", label),
            ));
        }
        points.push(build_point(index, label, base, assignment)?);
    }
    Ok(points)
}

/// `n_samples` draws; per sample, one uniform index per key in sorted order
/// from a single RNG seeded with `seed`.
pub fn random_points(
    base: &StrategyContext,
    grid: &BTreeMap<String, Vec<ParamValue>>,
    n_samples: usize,
    seed: u64,
) -> Result<Vec<SweepPoint>, ConfigError> {
    require_values(grid)?;
    if n_samples == 0 {
        return Err(ConfigError::new("sweep.n_samples", "must be at least 1"));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(n_samples);
    for index in 0..n_samples {
        let assignment: Vec<(String, ParamValue)> = grid
            .iter()
            .map(|(key, values)| (key.clone(), values[rng.gen_range(0..values.len())]))
            .collect();
        points.push(build_point(index, random_label(index), base, assignment)?);
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(entries: &[(&str, Vec<ParamValue>)]) -> BTreeMap<String, Vec<ParamValue>> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_grid_product_in_sorted_key_order() {
        let g = grid(&[
            ("quote_width_bps", vec![ParamValue::Int(5), ParamValue::Int(10)]),
            (
                "cancel_cadence_ms",
                vec![ParamValue::Int(100), ParamValue::Int(200), ParamValue::Int(300)],
            ),
        ]);
        let points = grid_points(&StrategyContext::default(), &g).unwrap();
        assert_eq!(points.len(), 6);
        assert_eq!(points[0].label, "grid_cancel_cadence_ms-100_quote_width_bps-5");
        assert_eq!(points[1].label, "grid_cancel_cadence_ms-100_quote_width_bps-10");
        assert_eq!(points[5].label, "grid_cancel_cadence_ms-300_quote_width_bps-10");
        assert_eq!(points[5].params.cancel_cadence_ms, 300);
        assert_eq!(points[5].params.quote_width_bps, 10.0);
        assert_eq!(points[5].params.order_size, 0.001);
        assert_eq!(points[2].describe(), "cancel_cadence_ms=200, quote_width_bps=5");
    }

    #[test]
    fn test_float_labels_render_as_written() {
        let g = grid(&[("order_size", vec![ParamValue::Float(0.5), ParamValue::Float(1.25)])]);
        let points = grid_points(&StrategyContext::default(), &g).unwrap();
        assert_eq!(points[0].label, "grid_order_size-0.5");
        assert_eq!(points[1].label, "grid_order_size-1.25");
    }

    #[test]
    fn test_label_collision_is_config_error() {
        let g = grid(&[("quote_width_bps", vec![ParamValue::Int(5), ParamValue::Float(5.0)])]);
        let err = grid_points(&StrategyContext::default(), &g).unwrap_err();
        assert_eq!(err.field, "sweep.param_grid");
        assert!(err.message.contains("grid_quote_width_bps-5"));
    }

    #[test]
    fn test_unknown_and_fractional_keys_rejected() {
        let mut ctx = StrategyContext::default();
        let err = apply_param(&mut ctx, "spread", ParamValue::Int(1)).unwrap_err();
        assert_eq!(err.field, "sweep.param_grid.spread");

        let err = apply_param(&mut ctx, "cancel_cadence_ms", ParamValue::Float(2.5)).unwrap_err();
        assert!(err.message.contains("integer"));

        let err = apply_param(&mut ctx, "max_orders_per_minute", ParamValue::Int(-1)).unwrap_err();
        assert!(err.message.contains("out of range"));

        apply_param(&mut ctx, "max_orders_per_minute", ParamValue::Float(30.0)).unwrap();
        assert_eq!(ctx.max_orders_per_minute, 30);
    }

    #[test]
    fn test_random_sampling_is_seeded() {
        let g = grid(&[
            (
                "quote_width_bps",
                vec![ParamValue::Int(1), ParamValue::Int(2), ParamValue::Int(3)],
            ),
            ("order_size", vec![ParamValue::Float(0.1), ParamValue::Float(0.2)]),
        ]);
        let base = StrategyContext::default();
        let a = random_points(&base, &g, 5, 42).unwrap();
        let b = random_points(&base, &g, 5, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        assert_eq!(a[0].label, "random_0000");
        assert_eq!(a[4].label, "random_0004");
        for point in &a {
            assert!([1.0, 2.0, 3.0].contains(&point.params.quote_width_bps));
            assert!([0.1, 0.2].contains(&point.params.order_size));
        }
    }

    #[test]
    fn test_empty_grid_rejected() {
        let base = StrategyContext::default();
        assert!(grid_points(&base, &BTreeMap::new()).is_err());
        let g = grid(&[("order_size", vec![])]);
        assert_eq!(
            random_points(&base, &g, 3, 1).unwrap_err().field,
            "sweep.param_grid.order_size"
        );
    }
}
