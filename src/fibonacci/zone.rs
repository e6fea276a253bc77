//! Price zones and forward-only mitigation.
//!
//! A zone is an immutable snapshot. Mitigation progresses through
//! `Zone::apply`, which returns the next snapshot and never lowers the status.

use serde::{Deserialize, Serialize};

use crate::market::{Candle, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Ote,
    GoldenPocket,
    Premium,
    Discount,
    Equilibrium,
    OrderBlock,
    FairValueGap,
}

/// Mitigation status. Ordered so that `max` is the forward transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mitigation {
    #[default]
    Fresh,
    Tested,
    Mitigated,
}

impl Mitigation {
    /// Forward-only transition
    pub fn escalate(self, observed: Mitigation) -> Mitigation {
        self.max(observed)
    }

    pub fn is_usable(&self) -> bool {
        !matches!(self, Mitigation::Mitigated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub kind: ZoneKind,
    pub top: f64,
    pub bottom: f64,
    /// Bullish zones are demand (invalidated below), bearish are supply
    pub direction: Direction,
    pub mitigation: Mitigation,
}

impl Zone {
    /// Build a fresh zone from two bounds in any order
    pub fn new(kind: ZoneKind, a: f64, b: f64, direction: Direction) -> Self {
        Self {
            kind,
            top: a.max(b),
            bottom: a.min(b),
            direction,
            mitigation: Mitigation::Fresh,
        }
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    pub fn midpoint(&self) -> f64 {
        (self.top + self.bottom) / 2.0
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.bottom && price <= self.top
    }

    /// Distance from price to the nearest edge (0 inside)
    pub fn distance(&self, price: f64) -> f64 {
        if price > self.top {
            price - self.top
        } else if price < self.bottom {
            self.bottom - price
        } else {
            0.0
        }
    }

    /// Next snapshot after observing `candle`
    pub fn apply(&self, candle: &Candle, buffer: f64) -> Zone {
        let check = check_mitigation(self, candle, buffer);
        Zone {
            mitigation: check.status,
            ..*self
        }
    }

    /// Fold `apply` over a run of candles
    pub fn track<'a, I>(&self, candles: I, buffer: f64) -> Zone
    where
        I: IntoIterator<Item = &'a Candle>,
    {
        candles
            .into_iter()
            .fold(*self, |zone, candle| zone.apply(candle, buffer))
    }
}

/// Outcome of testing one candle against a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MitigationCheck {
    /// Wick intersected the zone
    pub touched: bool,
    /// Close passed the invalidating edge by more than the buffer
    pub closed_through: bool,
    /// Escalated status (never below the zone's current status)
    pub status: Mitigation,
}

/// Test a candle against a zone. Stateless; the caller keeps the result.
pub fn check_mitigation(zone: &Zone, candle: &Candle, buffer: f64) -> MitigationCheck {
    let touched = candle.low <= zone.top && candle.high >= zone.bottom;

    let below = candle.close < zone.bottom - buffer;
    let above = candle.close > zone.top + buffer;
    let closed_through = match zone.direction {
        Direction::Bullish => below,
        Direction::Bearish => above,
        Direction::Neutral => touched && (below || above),
    };

    let observed = if closed_through {
        Mitigation::Mitigated
    } else if touched {
        Mitigation::Tested
    } else {
        Mitigation::Fresh
    };

    MitigationCheck {
        touched,
        closed_through,
        status: zone.mitigation.escalate(observed),
    }
}
