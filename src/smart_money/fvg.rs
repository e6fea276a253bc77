//! Three-candle fair value gaps

use serde::{Deserialize, Serialize};

use crate::fibonacci::{Zone, ZoneKind};
use crate::market::{Candle, Direction};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FvgConfig {
    /// Minimum gap size in ATR units
    pub min_gap_atr: f64,
}

impl Default for FvgConfig {
    fn default() -> Self {
        Self { min_gap_atr: 0.1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FairValueGap {
    pub zone: Zone,
    pub midline: f64,
    pub size: f64,
    /// Index of the middle (displacement) candle
    pub index: usize,
}

impl FairValueGap {
    pub fn direction(&self) -> Direction {
        self.zone.direction
    }

    pub fn is_usable(&self) -> bool {
        self.zone.mitigation.is_usable()
    }
}

/// Scan every 3-candle window. `atr` must be index-aligned with `candles`.
pub fn detect_fvgs(candles: &[Candle], atr: &[f64], config: &FvgConfig, mitigation_buffer_atr: f64) -> Vec<FairValueGap> {
    if candles.len() < 3 || atr.len() != candles.len() {
        return Vec::new();
    }

    let mut gaps = Vec::new();
    for i in 2..candles.len() {
        let (first, third) = (&candles[i - 2], &candles[i]);
        let min_gap = (config.min_gap_atr * atr[i]).max(0.0);

        let found = if third.low - first.high > min_gap {
            Some((first.high, third.low, Direction::Bullish))
        } else if first.low - third.high > min_gap {
            Some((third.high, first.low, Direction::Bearish))
        } else {
            None
        };

        if let Some((bottom, top, direction)) = found {
            let buffer = (mitigation_buffer_atr * atr[i]).max(0.0);
            let zone = Zone::new(ZoneKind::FairValueGap, top, bottom, direction)
                .track(candles.get(i + 1..).unwrap_or(&[]), buffer);
            gaps.push(FairValueGap {
                zone,
                midline: zone.midpoint(),
                size: zone.height(),
                index: i - 1,
            });
        }
    }
    gaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fibonacci::Mitigation;
    use crate::market::fixtures::candle;

    #[test]
    fn test_bullish_gap() {
        let candles = vec![
            candle(0, 100.0, 102.0, 99.0, 101.0, 1.0),
            candle(1, 101.0, 110.0, 101.0, 109.0, 1.0),
            candle(2, 109.0, 112.0, 105.0, 111.0, 1.0),
        ];
        let gaps = detect_fvgs(&candles, &[2.0; 3], &FvgConfig::default(), 0.1);
        assert_eq!(gaps.len(), 1);
        let gap = &gaps[0];
        assert_eq!(gap.direction(), Direction::Bullish);
        assert_eq!(gap.zone.bottom, 102.0);
        assert_eq!(gap.zone.top, 105.0);
        assert_eq!(gap.midline, 103.5);
        assert_eq!(gap.size, 3.0);
        assert_eq!(gap.index, 1);
        assert_eq!(gap.zone.mitigation, Mitigation::Fresh);
    }

    #[test]
    fn test_bearish_gap_filled() {
        let candles = vec![
            candle(0, 110.0, 111.0, 108.0, 109.0, 1.0),
            candle(1, 109.0, 109.0, 100.0, 101.0, 1.0),
            candle(2, 101.0, 104.0, 99.0, 100.0, 1.0),
            candle(3, 100.0, 110.0, 99.5, 109.5, 1.0),
        ];
        let gaps = detect_fvgs(&candles, &[2.0; 4], &FvgConfig::default(), 0.1);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].direction(), Direction::Bearish);
        assert_eq!(gaps[0].zone.top, 108.0);
        assert_eq!(gaps[0].zone.bottom, 104.0);
        assert_eq!(gaps[0].zone.mitigation, Mitigation::Mitigated);
    }

    #[test]
    fn test_gap_below_minimum_ignored() {
        let candles = vec![
            candle(0, 100.0, 102.0, 99.0, 101.0, 1.0),
            candle(1, 101.0, 103.0, 101.0, 102.5, 1.0),
            candle(2, 102.5, 104.0, 102.1, 103.0, 1.0),
        ];
        let config = FvgConfig { min_gap_atr: 0.5 };
        assert!(detect_fvgs(&candles, &[1.0; 3], &config, 0.1).is_empty());
    }
}
