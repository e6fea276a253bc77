//! Leg-relative Fibonacci retracement geometry

use serde::{Deserialize, Serialize};

use super::zone::{Zone, ZoneKind};
use crate::error::{Error, Result};
use crate::market::Direction;

/// Retracement and extension ratios, measured from the leg termination
pub const FIB_RATIOS: [f64; 12] = [
    0.0, 0.236, 0.382, 0.5, 0.618, 0.65, 0.705, 0.786, 0.886, 1.0, 1.272, 1.618,
];

pub const GOLDEN_POCKET: (f64, f64) = (0.618, 0.65);

/// OTE ("optimal trade entry") band variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OteMode {
    /// .618 - .786
    #[default]
    Standard,
    /// .5 - .886
    Extended,
    /// .705 - .786
    Tight,
}

impl OteMode {
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            OteMode::Standard => (0.618, 0.786),
            OteMode::Extended => (0.5, 0.886),
            OteMode::Tight => (0.705, 0.786),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FibLevel {
    pub ratio: f64,
    pub price: f64,
}

/// Zones derived from one leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibonacciZones {
    pub direction: Direction,
    /// Leg origin (P1)
    pub origin: f64,
    /// Leg termination (P0)
    pub termination: f64,
    pub levels: Vec<FibLevel>,
    pub ote: Zone,
    pub golden_pocket: Zone,
}

impl FibonacciZones {
    /// Price at an arbitrary ratio of this leg
    pub fn level(&self, ratio: f64) -> f64 {
        fib_level(self.origin, self.termination, ratio)
    }

    /// Retracement depth of `price` as a ratio of the leg (0 at termination)
    pub fn retracement_of(&self, price: f64) -> f64 {
        let span = self.origin - self.termination;
        if span == 0.0 {
            0.0
        } else {
            (price - self.termination) / span
        }
    }
}

/// `P0 + (P1 - P0) x ratio`, where P0 is the termination point
pub fn fib_level(origin: f64, termination: f64, ratio: f64) -> f64 {
    termination + (origin - termination) * ratio
}

/// Compute retracement levels, OTE and Golden Pocket for leg A -> B
pub fn calculate_zones(leg_a: f64, leg_b: f64, mode: OteMode) -> Result<FibonacciZones> {
    if !(leg_a.is_finite() && leg_b.is_finite()) || leg_a == leg_b {
        return Err(Error::InvalidInput(format!(
            "degenerate leg {} -> {}",
            leg_a, leg_b
        )));
    }

    let direction = if leg_b > leg_a {
        Direction::Bullish
    } else {
        Direction::Bearish
    };

    let levels = FIB_RATIOS
        .iter()
        .map(|&ratio| FibLevel {
            ratio,
            price: fib_level(leg_a, leg_b, ratio),
        })
        .collect();

    let (ote_lo, ote_hi) = mode.bounds();
    let ote = Zone::new(
        ZoneKind::Ote,
        fib_level(leg_a, leg_b, ote_lo),
        fib_level(leg_a, leg_b, ote_hi),
        direction,
    );
    let golden_pocket = Zone::new(
        ZoneKind::GoldenPocket,
        fib_level(leg_a, leg_b, GOLDEN_POCKET.0),
        fib_level(leg_a, leg_b, GOLDEN_POCKET.1),
        direction,
    );

    Ok(FibonacciZones {
        direction,
        origin: leg_a,
        termination: leg_b,
        levels,
        ote,
        golden_pocket,
    })
}
