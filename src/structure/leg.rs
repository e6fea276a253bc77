//! Impulse legs between consecutive swings

use serde::{Deserialize, Serialize};

use super::swings::SwingPoint;
use crate::market::Direction;

/// A swing-to-swing leg. `b` is the termination point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub a: SwingPoint,
    pub b: SwingPoint,
    pub direction: Direction,
    pub impulse_magnitude: f64,
}

impl Leg {
    pub fn from_swings(a: SwingPoint, b: SwingPoint) -> Self {
        let direction = if b.price > a.price {
            Direction::Bullish
        } else if b.price < a.price {
            Direction::Bearish
        } else {
            Direction::Neutral
        };
        Self {
            a,
            b,
            direction,
            impulse_magnitude: (b.price - a.price).abs(),
        }
    }

    /// Impulse in ATR units (0 when ATR is unusable)
    pub fn impulse_atr(&self, atr: f64) -> f64 {
        if atr > 0.0 {
            self.impulse_magnitude / atr
        } else {
            0.0
        }
    }
}

/// Most recent leg whose impulse is at least `min_impulse_atr x ATR`.
///
/// A newer qualifying leg supersedes older ones; a newer non-qualifying leg
/// does not.
pub fn active_leg(swings: &[SwingPoint], atr: f64, min_impulse_atr: f64) -> Option<Leg> {
    if atr <= 0.0 {
        return None;
    }
    swings
        .windows(2)
        .rev()
        .map(|w| Leg::from_swings(w[0], w[1]))
        .find(|leg| leg.direction.is_directional() && leg.impulse_magnitude >= min_impulse_atr * atr)
}
