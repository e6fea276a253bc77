//! Swing detection
//!
//! A swing is confirmed once price reverses from the running extreme by a
//! volatility-relative distance (`ATR x swing_rev_atr`). Two passes run over the
//! same candles: a tight "protected" pass and a wider "cycle" pass whose
//! threshold and spacing are multiplied.

use serde::{Deserialize, Serialize};

use crate::market::{atr_series, Candle};

/// Swing detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwingConfig {
    /// ATR lookback used for the reversal threshold
    pub atr_period: usize,
    /// Reversal distance in ATR units required to confirm a swing
    pub swing_rev_atr: f64,
    /// Bars that must elapse between two confirmations
    pub min_bars_between_swings: usize,
    /// Cycle pass threshold multiplier
    pub cycle_threshold_multiplier: f64,
    /// Cycle pass spacing multiplier
    pub cycle_spacing_multiplier: f64,
}

impl Default for SwingConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            swing_rev_atr: 1.0,
            min_bars_between_swings: 3,
            cycle_threshold_multiplier: 2.0,
            cycle_spacing_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingKind {
    High,
    Low,
}

impl SwingKind {
    fn opposite(&self) -> Self {
        match self {
            SwingKind::High => SwingKind::Low,
            SwingKind::Low => SwingKind::High,
        }
    }
}

/// A confirmed swing. Never mutated once emitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub price: f64,
    /// Bar index of the extreme
    pub index: usize,
    /// Open time of the extreme bar
    pub timestamp: i64,
    pub kind: SwingKind,
    pub is_cycle: bool,
    /// Bar on which the reversal confirmed this swing (`>= index`)
    pub confirmed_index: usize,
}

/// Protected and cycle swing series for one candle set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwingSeries {
    pub protected: Vec<SwingPoint>,
    pub cycle: Vec<SwingPoint>,
}

impl SwingSeries {
    pub fn is_empty(&self) -> bool {
        self.protected.is_empty()
    }

    pub fn last_high(&self) -> Option<&SwingPoint> {
        self.protected.iter().rev().find(|s| s.kind == SwingKind::High)
    }

    pub fn last_low(&self) -> Option<&SwingPoint> {
        self.protected.iter().rev().find(|s| s.kind == SwingKind::Low)
    }
}

/// Swing prices of one kind, in order
pub fn prices_of(swings: &[SwingPoint], kind: SwingKind) -> Vec<f64> {
    swings
        .iter()
        .filter(|s| s.kind == kind)
        .map(|s| s.price)
        .collect()
}

/// Detect protected and cycle swings
pub fn detect_swings(candles: &[Candle], config: &SwingConfig) -> SwingSeries {
    let atr = atr_series(candles, config.atr_period);

    let protected = zigzag_pass(
        candles,
        &atr,
        config.swing_rev_atr,
        config.min_bars_between_swings,
        false,
    );

    let cycle_spacing =
        (config.min_bars_between_swings as f64 * config.cycle_spacing_multiplier).round() as usize;
    let cycle = zigzag_pass(
        candles,
        &atr,
        config.swing_rev_atr * config.cycle_threshold_multiplier,
        cycle_spacing,
        true,
    );

    SwingSeries { protected, cycle }
}

/// Running-extreme state for one pass
struct Extreme {
    price: f64,
    index: usize,
}

fn zigzag_pass(
    candles: &[Candle],
    atr: &[f64],
    rev_atr: f64,
    min_bars: usize,
    is_cycle: bool,
) -> Vec<SwingPoint> {
    let mut swings = Vec::new();
    if candles.len() < 2 {
        return swings;
    }

    let mut seeking: Option<SwingKind> = None;
    let mut high = Extreme {
        price: candles[0].high,
        index: 0,
    };
    let mut low = Extreme {
        price: candles[0].low,
        index: 0,
    };
    let mut last_confirm: Option<usize> = None;

    for (i, c) in candles.iter().enumerate().skip(1) {
        let threshold = atr.get(i).copied().unwrap_or(0.0) * rev_atr;
        let spaced = last_confirm.map_or(true, |last| i >= last + min_bars);

        let confirmed = match seeking {
            None => {
                if c.high > high.price {
                    high = Extreme { price: c.high, index: i };
                }
                if c.low < low.price {
                    low = Extreme { price: c.low, index: i };
                }
                if threshold <= 0.0 {
                    None
                } else {
                    let down_rev = high.index < i && high.price - c.low >= threshold;
                    let up_rev = low.index < i && c.high - low.price >= threshold;
                    // The more recent extreme is the one price is reversing from
                    match (down_rev, up_rev) {
                        (true, true) if low.index > high.index => Some(SwingKind::Low),
                        (true, _) => Some(SwingKind::High),
                        (false, true) => Some(SwingKind::Low),
                        (false, false) => None,
                    }
                }
            }
            Some(SwingKind::High) => {
                if c.high > high.price {
                    high = Extreme { price: c.high, index: i };
                    None
                } else if threshold > 0.0 && spaced && high.price - c.low >= threshold {
                    Some(SwingKind::High)
                } else {
                    None
                }
            }
            Some(SwingKind::Low) => {
                if c.low < low.price {
                    low = Extreme { price: c.low, index: i };
                    None
                } else if threshold > 0.0 && spaced && c.high - low.price >= threshold {
                    Some(SwingKind::Low)
                } else {
                    None
                }
            }
        };

        if let Some(kind) = confirmed {
            let extreme = match kind {
                SwingKind::High => &high,
                SwingKind::Low => &low,
            };
            swings.push(SwingPoint {
                price: extreme.price,
                index: extreme.index,
                timestamp: candles[extreme.index].open_time,
                kind,
                is_cycle,
                confirmed_index: i,
            });
            last_confirm = Some(i);

            // Start tracking the opposite extreme from the confirmation bar
            seeking = Some(kind.opposite());
            match kind {
                SwingKind::High => low = Extreme { price: c.low, index: i },
                SwingKind::Low => high = Extreme { price: c.high, index: i },
            }
        }
    }

    swings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::fixtures::{flat, trending_up, zigzag};

    #[test]
    fn test_zigzag_swings_land_on_pivots() {
        let candles = zigzag(&[100.0, 120.0, 110.0, 130.0, 115.0], 8, 0.3, 100.0);
        let series = detect_swings(&candles, &SwingConfig::default());

        let highs = prices_of(&series.protected, SwingKind::High);
        let lows = prices_of(&series.protected, SwingKind::Low);
        assert!(highs.iter().any(|h| (h - 120.3).abs() < 1e-9));
        assert!(highs.iter().any(|h| (h - 130.3).abs() < 1e-9));
        assert!(lows.iter().any(|l| (l - 109.7).abs() < 1e-9));
    }

    #[test]
    fn test_indices_strictly_increase_and_no_lookahead() {
        let candles = trending_up(30);
        let series = detect_swings(&candles, &SwingConfig::default());
        assert!(series.protected.len() > 10);

        for pass in [&series.protected, &series.cycle] {
            for w in pass.windows(2) {
                assert!(w[1].index > w[0].index);
                assert!(w[1].confirmed_index > w[0].confirmed_index);
            }
            for s in pass.iter() {
                assert!(s.index <= s.confirmed_index);
            }
        }
    }

    #[test]
    fn test_swings_alternate() {
        let candles = trending_up(20);
        let series = detect_swings(&candles, &SwingConfig::default());
        for w in series.protected.windows(2) {
            assert_ne!(w[0].kind, w[1].kind);
        }
    }

    #[test]
    fn test_cycle_pass_is_sparser() {
        // Small wiggles inside large legs: only the large legs are cycle swings
        let pivots = [
            100.0, 130.0, 127.0, 131.0, 100.0, 103.0, 98.0, 130.0, 126.0, 132.0,
        ];
        let candles = zigzag(&pivots, 6, 0.2, 100.0);
        let series = detect_swings(&candles, &SwingConfig::default());
        assert!(series.cycle.len() <= series.protected.len());
        assert!(series.cycle.iter().all(|s| s.is_cycle));
        assert!(series.protected.iter().all(|s| !s.is_cycle));
    }

    #[test]
    fn test_flat_series_has_no_swings() {
        let series = detect_swings(&flat(60, 50.0), &SwingConfig::default());
        assert!(series.is_empty());
        assert!(series.cycle.is_empty());
    }

    #[test]
    fn test_spacing_respected() {
        let config = SwingConfig {
            min_bars_between_swings: 5,
            ..Default::default()
        };
        let candles = trending_up(20);
        let series = detect_swings(&candles, &config);
        for w in series.protected.windows(2) {
            assert!(w[1].confirmed_index >= w[0].confirmed_index + 5);
        }
    }
}
