//! Displacement: short bursts of outsized range on heavy volume

use serde::{Deserialize, Serialize};

use crate::market::indicators::{range_extremes, safe_ratio};
use crate::market::{average_volume, Candle, Direction};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplacementConfig {
    pub window: usize,
    pub min_atr_multiplier: f64,
    pub volume_multiplier: f64,
    pub volume_lookback: usize,
}

impl Default for DisplacementConfig {
    fn default() -> Self {
        Self {
            window: 3,
            min_atr_multiplier: 2.0,
            volume_multiplier: 1.5,
            volume_lookback: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Displacement {
    pub start_index: usize,
    pub end_index: usize,
    pub direction: Direction,
    pub range_atr: f64,
    pub volume_ratio: f64,
    /// 0-100 blend of range and volume
    pub strength: f64,
}

/// Non-overlapping scan. ATR and baseline volume are taken from before the
/// window so the burst does not inflate its own reference.
pub fn detect_displacements(candles: &[Candle], atr: &[f64], config: &DisplacementConfig) -> Vec<Displacement> {
    let window = config.window.max(1);
    if candles.len() <= window || atr.len() != candles.len() {
        return Vec::new();
    }

    let mut found = Vec::new();
    let mut start = 1;
    while start + window <= candles.len() {
        let end = start + window - 1;
        let reference_atr = atr[start - 1];
        let baseline = average_volume(candles, start, config.volume_lookback);

        let Some((high, low)) = range_extremes(candles, start, end + 1) else {
            break;
        };
        let range_atr = safe_ratio(high - low, reference_atr);
        let window_volume = average_volume(candles, end + 1, window);
        let volume_ratio = safe_ratio(window_volume, baseline);

        if range_atr >= config.min_atr_multiplier && volume_ratio >= config.volume_multiplier {
            let net = candles[end].close - candles[start].open;
            let direction = if net > 0.0 {
                Direction::Bullish
            } else if net < 0.0 {
                Direction::Bearish
            } else {
                Direction::Neutral
            };
            found.push(Displacement {
                start_index: start,
                end_index: end,
                direction,
                range_atr,
                volume_ratio,
                strength: strength(range_atr, volume_ratio, config),
            });
            start = end + 1;
        } else {
            start += 1;
        }
    }
    found
}

/// 60% range, 40% volume; each side saturates at twice its threshold
fn strength(range_atr: f64, volume_ratio: f64, config: &DisplacementConfig) -> f64 {
    let range_part = safe_ratio(range_atr, 2.0 * config.min_atr_multiplier).clamp(0.0, 1.0);
    let volume_part = safe_ratio(volume_ratio, 2.0 * config.volume_multiplier).clamp(0.0, 1.0);
    (100.0 * (0.6 * range_part + 0.4 * volume_part)).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::fixtures::candle;

    fn quiet_then_burst() -> Vec<Candle> {
        let mut candles: Vec<Candle> = (0..20)
            .map(|i| candle(i, 100.0, 100.5, 99.5, 100.0, 100.0))
            .collect();
        candles.push(candle(20, 100.0, 102.5, 99.8, 102.0, 300.0));
        candles.push(candle(21, 102.0, 105.0, 101.8, 104.5, 300.0));
        candles.push(candle(22, 104.5, 107.0, 104.0, 106.5, 300.0));
        candles
    }

    #[test]
    fn test_detects_bullish_burst() {
        let candles = quiet_then_burst();
        let atr = vec![1.0; candles.len()];
        let found = detect_displacements(&candles, &atr, &DisplacementConfig::default());
        assert_eq!(found.len(), 1);
        let d = &found[0];
        assert_eq!(d.direction, Direction::Bullish);
        // earliest qualifying window wins; it already straddles the burst
        assert_eq!(d.start_index, 18);
        assert_eq!(d.end_index, 20);
        assert!(d.range_atr >= 2.0);
        assert!(d.volume_ratio >= 1.5);
        assert!(d.strength > 0.0 && d.strength <= 100.0);
    }

    #[test]
    fn test_quiet_series_has_none() {
        let candles: Vec<Candle> = (0..30)
            .map(|i| candle(i, 100.0, 100.5, 99.5, 100.0, 100.0))
            .collect();
        let atr = vec![1.0; candles.len()];
        assert!(detect_displacements(&candles, &atr, &DisplacementConfig::default()).is_empty());
    }

    #[test]
    fn test_strength_saturates() {
        let config = DisplacementConfig::default();
        assert_eq!(strength(10.0, 10.0, &config), 100.0);
        assert!((strength(2.0, 1.5, &config) - 50.0).abs() < 1e-9);
    }
}
