//! Stop-loss placement and take-profit ladders

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::market::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StopLossMode {
    /// Entry -/+ ATR x multiplier
    #[default]
    AtrMultiple,
    /// Beyond the protecting swing by a buffer
    Structure,
    /// Fixed percentage from entry
    FixedPercent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    pub mode: StopLossMode,
    pub atr_multiplier: f64,
    pub structure_buffer_atr: f64,
    pub fixed_pct: f64,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            mode: StopLossMode::AtrMultiple,
            atr_multiplier: 1.5,
            structure_buffer_atr: 0.2,
            fixed_pct: 2.0,
        }
    }
}

/// Stop price for an entry.
///
/// Structure mode falls back to ATR mode when no usable level is given, and
/// ATR mode falls back to fixed percent when ATR is unusable.
pub fn compute_stop(
    direction: Direction,
    entry: f64,
    atr: Option<f64>,
    structure_level: Option<f64>,
    config: &StopConfig,
) -> Result<f64> {
    if !direction.is_directional() {
        return Err(Error::InvalidInput("stop requires a trade direction".into()));
    }
    if !(entry > 0.0 && entry.is_finite()) {
        return Err(Error::InvalidInput(format!("invalid entry price {}", entry)));
    }
    let sign = direction.sign();
    let atr = atr.filter(|a| *a > 0.0 && a.is_finite());

    let fixed = || entry * (1.0 - sign * config.fixed_pct / 100.0);
    let by_atr = || match atr {
        Some(a) => entry - sign * a * config.atr_multiplier,
        None => fixed(),
    };

    let stop = match config.mode {
        StopLossMode::FixedPercent => fixed(),
        StopLossMode::AtrMultiple => by_atr(),
        StopLossMode::Structure => {
            // level must sit on the protective side of entry
            match structure_level.filter(|l| (entry - l) * sign > 0.0) {
                Some(level) => level - sign * atr.unwrap_or(0.0) * config.structure_buffer_atr,
                None => by_atr(),
            }
        }
    };

    if (entry - stop) * sign <= 0.0 || stop <= 0.0 {
        return Err(Error::InvalidInput(format!(
            "stop {:.6} is not protective for a {} entry at {:.6}",
            stop, direction, entry
        )));
    }
    Ok(stop)
}

/// Take-profit rung as configured
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TakeProfitSpec {
    pub r_multiple: f64,
    /// Percent of the initial quantity to close
    pub close_pct: f64,
}

impl TakeProfitSpec {
    pub fn new(r_multiple: f64, close_pct: f64) -> Self {
        Self { r_multiple, close_pct }
    }

    /// 1R / 30%, 2R / 40%, 3R / 30%
    pub fn default_ladder() -> Vec<TakeProfitSpec> {
        vec![
            TakeProfitSpec::new(1.0, 30.0),
            TakeProfitSpec::new(2.0, 40.0),
            TakeProfitSpec::new(3.0, 30.0),
        ]
    }
}

/// Priced take-profit rung on a live position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TakeProfitLevel {
    pub r_multiple: f64,
    pub close_pct: f64,
    pub price: f64,
    pub filled: bool,
}

pub fn total_close_pct(specs: &[TakeProfitSpec]) -> f64 {
    specs.iter().map(|s| s.close_pct).sum()
}

/// Price a ladder against the entry/stop distance. Close percentages must
/// sum to at most 100.
pub fn build_take_profits(
    direction: Direction,
    entry: f64,
    stop: f64,
    specs: &[TakeProfitSpec],
) -> Result<Vec<TakeProfitLevel>> {
    let total = total_close_pct(specs);
    if total > 100.0 + 1e-9 {
        return Err(Error::InvalidInput(format!(
            "take-profit close percentages sum to {:.1}%",
            total
        )));
    }
    if specs.iter().any(|s| s.close_pct < 0.0 || s.r_multiple <= 0.0) {
        return Err(Error::InvalidInput("take-profit rungs must be positive".into()));
    }
    let risk = (entry - stop).abs();
    if risk <= 0.0 || !direction.is_directional() {
        return Err(Error::InvalidInput("take-profits need a non-zero risk distance".into()));
    }

    let sign = direction.sign();
    let mut levels: Vec<TakeProfitLevel> = specs
        .iter()
        .map(|s| TakeProfitLevel {
            r_multiple: s.r_multiple,
            close_pct: s.close_pct,
            price: entry + sign * s.r_multiple * risk,
            filled: false,
        })
        .collect();
    levels.sort_by(|a, b| a.r_multiple.partial_cmp(&b.r_multiple).unwrap_or(std::cmp::Ordering::Equal));
    Ok(levels)
}
