//! Premium / Discount / Equilibrium from a rolling dealing range.
//!
//! This frame is independent of the active leg: it is the high/low of the
//! last `lookback` bars, split into percentage bands.

use serde::{Deserialize, Serialize};

use super::zone::{Zone, ZoneKind};
use crate::market::indicators::range_extremes;
use crate::market::{Candle, Direction};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    /// Bars in the dealing range
    pub lookback: usize,
    /// Upper edge of discount, percent of range from the low
    pub discount_max_pct: f64,
    /// Lower edge of premium, percent of range from the low
    pub premium_min_pct: f64,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            lookback: 50,
            discount_max_pct: 45.0,
            premium_min_pct: 55.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceLocation {
    Premium,
    Equilibrium,
    Discount,
}

impl PriceLocation {
    /// Whether this location favours entries in `direction`
    pub fn favours(&self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (PriceLocation::Discount, Direction::Bullish)
                | (PriceLocation::Premium, Direction::Bearish)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeZones {
    pub high: f64,
    pub low: f64,
    pub premium: Zone,
    pub equilibrium: Zone,
    pub discount: Zone,
}

impl RangeZones {
    /// Position of `price` in the range, 0.0 at the low and 1.0 at the high.
    /// A zero-width range is treated as sitting at the middle.
    pub fn position(&self, price: f64) -> f64 {
        let span = self.high - self.low;
        if span <= 0.0 {
            return 0.5;
        }
        ((price - self.low) / span).clamp(0.0, 1.0)
    }

    pub fn location(&self, price: f64) -> PriceLocation {
        if self.high - self.low <= 0.0 {
            return PriceLocation::Equilibrium;
        }
        if price >= self.premium.bottom {
            PriceLocation::Premium
        } else if price <= self.discount.top {
            PriceLocation::Discount
        } else {
            PriceLocation::Equilibrium
        }
    }
}

/// Build the bands over the last `lookback` candles. `None` on empty input.
pub fn range_zones(candles: &[Candle], config: &RangeConfig) -> Option<RangeZones> {
    let start = candles.len().saturating_sub(config.lookback.max(1));
    let (high, low) = range_extremes(candles, start, candles.len())?;
    let span = high - low;
    let discount_top = low + span * config.discount_max_pct / 100.0;
    let premium_bottom = low + span * config.premium_min_pct / 100.0;

    Some(RangeZones {
        high,
        low,
        premium: Zone::new(ZoneKind::Premium, premium_bottom, high, Direction::Bearish),
        equilibrium: Zone::new(
            ZoneKind::Equilibrium,
            discount_top,
            premium_bottom,
            Direction::Neutral,
        ),
        discount: Zone::new(ZoneKind::Discount, low, discount_top, Direction::Bullish),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::fixtures::{candle, flat};

    fn ranging() -> Vec<Candle> {
        vec![
            candle(0, 150.0, 200.0, 140.0, 160.0, 1.0),
            candle(1, 160.0, 170.0, 100.0, 120.0, 1.0),
            candle(2, 120.0, 150.0, 110.0, 140.0, 1.0),
        ]
    }

    #[test]
    fn test_bands() {
        let zones = range_zones(&ranging(), &RangeConfig::default()).unwrap();
        assert_eq!(zones.high, 200.0);
        assert_eq!(zones.low, 100.0);
        assert!((zones.discount.top - 145.0).abs() < 1e-9);
        assert!((zones.premium.bottom - 155.0).abs() < 1e-9);
        assert_eq!(zones.location(120.0), PriceLocation::Discount);
        assert_eq!(zones.location(150.0), PriceLocation::Equilibrium);
        assert_eq!(zones.location(190.0), PriceLocation::Premium);
        assert!((zones.position(125.0) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_lookback_limits_window() {
        let config = RangeConfig {
            lookback: 1,
            ..RangeConfig::default()
        };
        let zones = range_zones(&ranging(), &config).unwrap();
        assert_eq!(zones.high, 150.0);
        assert_eq!(zones.low, 110.0);
    }

    #[test]
    fn test_degenerate_range_is_neutral() {
        let zones = range_zones(&flat(10, 50.0), &RangeConfig::default()).unwrap();
        assert_eq!(zones.position(50.0), 0.5);
        assert_eq!(zones.location(50.0), PriceLocation::Equilibrium);
        assert!(range_zones(&[], &RangeConfig::default()).is_none());
    }

    #[test]
    fn test_location_favours() {
        assert!(PriceLocation::Discount.favours(Direction::Bullish));
        assert!(!PriceLocation::Discount.favours(Direction::Bearish));
        assert!(PriceLocation::Premium.favours(Direction::Bearish));
    }
}
