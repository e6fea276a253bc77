//! Deterministic pattern predicates.
//!
//! Candlestick shapes over the trailing bars and XABCD harmonics over the
//! trailing swings. Matches feed the momentum bucket as confirmation only.

pub mod candles;
pub mod harmonics;

use serde::{Deserialize, Serialize};

use crate::market::{Candle, Direction};
use crate::structure::SwingPoint;

pub use candles::CandlePattern;
pub use harmonics::{HarmonicPattern, HarmonicRatios, XabcdRatios};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Trailing bars checked for candlestick patterns
    pub recent_bars: usize,
    /// Allowed deviation outside each harmonic ratio band
    pub harmonic_tolerance: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            recent_bars: 3,
            harmonic_tolerance: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "family", content = "name", rename_all = "snake_case")]
pub enum PatternKind {
    Candle(CandlePattern),
    Harmonic(HarmonicPattern),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern: PatternKind,
    pub direction: Direction,
    /// Bar the pattern completes on
    pub index: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PatternScanner {
    config: PatternConfig,
}

impl PatternScanner {
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    pub fn scan(&self, candles: &[Candle], swings: &[SwingPoint]) -> Vec<PatternMatch> {
        let mut matches = Vec::new();

        let first = candles.len().saturating_sub(self.config.recent_bars);
        for end in first..candles.len() {
            let window = &candles[..=end];
            for pattern in CandlePattern::ALL {
                if pattern.matches(window) {
                    matches.push(PatternMatch {
                        pattern: PatternKind::Candle(pattern),
                        direction: pattern.direction(),
                        index: end,
                    });
                }
            }
        }

        if let Some(xabcd) = XabcdRatios::from_swings(swings) {
            for pattern in HarmonicPattern::ALL {
                if let Some(direction) = pattern.matches(swings, self.config.harmonic_tolerance) {
                    matches.push(PatternMatch {
                        pattern: PatternKind::Harmonic(pattern),
                        direction,
                        index: xabcd.d_index,
                    });
                }
            }
        }

        matches
    }
}

/// Net directional vote of the matches: +1 per bullish, -1 per bearish
pub fn net_bias(matches: &[PatternMatch]) -> i32 {
    matches
        .iter()
        .map(|m| match m.direction {
            Direction::Bullish => 1,
            Direction::Bearish => -1,
            Direction::Neutral => 0,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::fixtures::candle;

    #[test]
    fn test_scan_recent_bars_only() {
        let candles = vec![
            // engulfing far back, outside the window
            candle(0, 105.0, 106.0, 101.0, 102.0, 1.0),
            candle(1, 101.5, 108.0, 101.0, 107.0, 1.0),
            candle(2, 107.0, 109.0, 106.0, 108.0, 1.0),
            candle(3, 108.0, 110.0, 107.5, 109.0, 1.0),
            candle(4, 109.0, 109.2, 103.0, 109.1, 1.0),
        ];
        let matches = PatternScanner::default().scan(&candles, &[]);
        assert!(matches
            .iter()
            .all(|m| m.pattern != PatternKind::Candle(CandlePattern::BullishEngulfing)));
        assert!(matches.iter().any(|m| m.index == 4
            && m.pattern == PatternKind::Candle(CandlePattern::Doji)));
    }

    #[test]
    fn test_net_bias() {
        let m = |direction| PatternMatch {
            pattern: PatternKind::Candle(CandlePattern::Hammer),
            direction,
            index: 0,
        };
        assert_eq!(net_bias(&[m(Direction::Bullish), m(Direction::Bullish), m(Direction::Bearish)]), 1);
        assert_eq!(net_bias(&[]), 0);
    }
}
