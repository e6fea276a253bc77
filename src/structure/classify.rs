//! Market structure classification and structure breaks (BOS / CHoCH)

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::swings::{prices_of, SwingKind, SwingPoint};
use crate::market::{Candle, Direction};

/// Structure classification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    /// Moves smaller than this many ATR count as equal swings
    pub min_move_atr: f64,
    /// Percentage tolerance under which two swings count as equal
    pub equal_tolerance_pct: f64,
    /// Close must clear the swing by this many ATR to register a break
    pub break_buffer_atr: f64,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            min_move_atr: 0.25,
            equal_tolerance_pct: 0.05,
            break_buffer_atr: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HighType {
    #[serde(rename = "HH")]
    HigherHigh,
    #[serde(rename = "LH")]
    LowerHigh,
    #[default]
    #[serde(rename = "EH")]
    EqualHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LowType {
    #[serde(rename = "HL")]
    HigherLow,
    #[serde(rename = "LL")]
    LowerLow,
    #[default]
    #[serde(rename = "EL")]
    EqualLow,
}

/// Trend plus latest high/low labels. Recomputed on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StructureState {
    pub trend: Direction,
    pub high_type: HighType,
    pub low_type: LowType,
    /// False until at least one swing exists
    pub is_valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    /// Break of structure: continuation of the existing bias
    Bos,
    /// Change of character: break against the bias, flips it
    Choch,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructureBreak {
    pub kind: BreakKind,
    pub direction: Direction,
    /// Swing price that was broken
    pub level: f64,
    /// Bar whose close broke the level
    pub index: usize,
    /// Bar index of the broken swing
    pub swing_index: usize,
}

/// Result of a break scan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BreakScan {
    pub breaks: Vec<StructureBreak>,
    /// Bias after the last break
    pub bias: Direction,
}

impl BreakScan {
    pub fn last(&self) -> Option<&StructureBreak> {
        self.breaks.last()
    }
}

/// Sign of a swing-to-swing move: 1 up, -1 down, 0 equal
fn compare(prev: f64, curr: f64, atr: f64, config: &StructureConfig) -> i8 {
    let diff = curr - prev;
    let tolerance = (prev.abs() * config.equal_tolerance_pct / 100.0).max(atr * config.min_move_atr);
    if diff.abs() <= tolerance {
        0
    } else if diff > 0.0 {
        1
    } else {
        -1
    }
}

/// Latest label and latest decisive (non-equal) comparison for one side
fn side_labels(prices: &[f64], atr: f64, config: &StructureConfig) -> (i8, Option<i8>) {
    let mut latest = 0;
    let mut decisive = None;
    for w in prices.windows(2) {
        latest = compare(w[0], w[1], atr, config);
        if latest != 0 {
            decisive = Some(latest);
        }
    }
    (latest, decisive)
}

/// Classify trend from the swing series.
///
/// Labels come from the last two highs and last two lows. An equal label does
/// not move the trend: the trend uses each side's latest decisive label.
pub fn classify_structure(swings: &[SwingPoint], atr: f64, config: &StructureConfig) -> StructureState {
    if swings.is_empty() {
        return StructureState::default();
    }

    let highs = prices_of(swings, SwingKind::High);
    let lows = prices_of(swings, SwingKind::Low);

    let (high_latest, high_decisive) = side_labels(&highs, atr, config);
    let (low_latest, low_decisive) = side_labels(&lows, atr, config);

    let high_type = match high_latest {
        1 => HighType::HigherHigh,
        -1 => HighType::LowerHigh,
        _ => HighType::EqualHigh,
    };
    let low_type = match low_latest {
        1 => LowType::HigherLow,
        -1 => LowType::LowerLow,
        _ => LowType::EqualLow,
    };

    let trend = match (high_decisive, low_decisive) {
        (Some(1), Some(1)) => Direction::Bullish,
        (Some(-1), Some(-1)) => Direction::Bearish,
        _ => Direction::Neutral,
    };

    StructureState {
        trend,
        high_type,
        low_type,
        is_valid: true,
    }
}

/// Scan closes for breaks of the most recent confirmed swings.
///
/// Only swings confirmed strictly before a bar are eligible on that bar, and
/// each swing level can be broken once.
pub fn detect_structure_breaks(
    candles: &[Candle],
    swings: &[SwingPoint],
    atr: &[f64],
    initial_bias: Direction,
    config: &StructureConfig,
) -> BreakScan {
    let mut scan = BreakScan {
        breaks: Vec::new(),
        bias: initial_bias,
    };
    if swings.is_empty() || candles.len() < 2 {
        return scan;
    }

    let mut next_swing = 0;
    let mut active_high: Option<SwingPoint> = None;
    let mut active_low: Option<SwingPoint> = None;

    for i in 1..candles.len() {
        while next_swing < swings.len() && swings[next_swing].confirmed_index < i {
            let s = swings[next_swing];
            match s.kind {
                SwingKind::High => active_high = Some(s),
                SwingKind::Low => active_low = Some(s),
            }
            next_swing += 1;
        }

        let buffer = atr.get(i).copied().unwrap_or(0.0) * config.break_buffer_atr;
        let close = candles[i].close;
        let prev_close = candles[i - 1].close;

        if let Some(high) = active_high {
            let level = high.price + buffer;
            if close > level && prev_close <= level {
                push_break(&mut scan, Direction::Bullish, &high, i);
                active_high = None;
            }
        }

        if let Some(low) = active_low {
            let level = low.price - buffer;
            if close < level && prev_close >= level {
                push_break(&mut scan, Direction::Bearish, &low, i);
                active_low = None;
            }
        }
    }

    scan
}

fn push_break(scan: &mut BreakScan, direction: Direction, swing: &SwingPoint, index: usize) {
    let kind = if scan.bias == direction {
        BreakKind::Bos
    } else {
        BreakKind::Choch
    };
    debug!(
        "{:?} {} at bar {} through swing {:.4} (bar {})",
        kind, direction, index, swing.price, swing.index
    );
    scan.breaks.push(StructureBreak {
        kind,
        direction,
        level: swing.price,
        index,
        swing_index: swing.index,
    });
    scan.bias = direction;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::atr_series;
    use crate::market::fixtures::{candle, trending_down, trending_up, zigzag};
    use crate::structure::swings::{detect_swings, SwingConfig};

    fn swing(price: f64, index: usize, kind: SwingKind) -> SwingPoint {
        SwingPoint {
            price,
            index,
            timestamp: index as i64,
            kind,
            is_cycle: false,
            confirmed_index: index + 1,
        }
    }

    #[test]
    fn test_no_swings_is_invalid() {
        let state = classify_structure(&[], 1.0, &StructureConfig::default());
        assert!(!state.is_valid);
        assert_eq!(state.trend, Direction::Neutral);
    }

    #[test]
    fn test_bullish_structure() {
        let swings = vec![
            swing(100.0, 0, SwingKind::Low),
            swing(120.0, 5, SwingKind::High),
            swing(110.0, 10, SwingKind::Low),
            swing(130.0, 15, SwingKind::High),
        ];
        let state = classify_structure(&swings, 1.0, &StructureConfig::default());
        assert_eq!(state.high_type, HighType::HigherHigh);
        assert_eq!(state.low_type, LowType::HigherLow);
        assert_eq!(state.trend, Direction::Bullish);
    }

    #[test]
    fn test_bearish_structure() {
        let swings = vec![
            swing(130.0, 0, SwingKind::High),
            swing(110.0, 5, SwingKind::Low),
            swing(120.0, 10, SwingKind::High),
            swing(100.0, 15, SwingKind::Low),
        ];
        let state = classify_structure(&swings, 1.0, &StructureConfig::default());
        assert_eq!(state.high_type, HighType::LowerHigh);
        assert_eq!(state.low_type, LowType::LowerLow);
        assert_eq!(state.trend, Direction::Bearish);
    }

    #[test]
    fn test_equal_high_does_not_alter_trend() {
        let swings = vec![
            swing(100.0, 0, SwingKind::Low),
            swing(120.0, 5, SwingKind::High),
            swing(110.0, 10, SwingKind::Low),
            swing(130.0, 15, SwingKind::High),
            swing(115.0, 20, SwingKind::Low),
            swing(130.01, 25, SwingKind::High),
        ];
        let state = classify_structure(&swings, 1.0, &StructureConfig::default());
        assert_eq!(state.high_type, HighType::EqualHigh);
        assert_eq!(state.trend, Direction::Bullish);
    }

    #[test]
    fn test_mixed_labels_are_neutral() {
        let swings = vec![
            swing(100.0, 0, SwingKind::Low),
            swing(120.0, 5, SwingKind::High),
            swing(95.0, 10, SwingKind::Low),
            swing(130.0, 15, SwingKind::High),
        ];
        let state = classify_structure(&swings, 1.0, &StructureConfig::default());
        assert_eq!(state.trend, Direction::Neutral);
    }

    #[test]
    fn test_classification_idempotent() {
        let candles = trending_up(20);
        let series = detect_swings(&candles, &SwingConfig::default());
        let config = StructureConfig::default();
        let a = classify_structure(&series.protected, 2.0, &config);
        let b = classify_structure(&series.protected, 2.0, &config);
        assert_eq!(a, b);
        assert_eq!(a.trend, Direction::Bullish);
    }

    #[test]
    fn test_downtrend_classified_bearish() {
        let candles = trending_down(20);
        let series = detect_swings(&candles, &SwingConfig::default());
        let state = classify_structure(&series.protected, 2.0, &StructureConfig::default());
        assert_eq!(state.trend, Direction::Bearish);
    }

    #[test]
    fn test_breaks_in_uptrend_are_bos_after_first() {
        let candles = trending_up(20);
        let series = detect_swings(&candles, &SwingConfig::default());
        let atr = atr_series(&candles, 14);
        let scan = detect_structure_breaks(
            &candles,
            &series.protected,
            &atr,
            Direction::Neutral,
            &StructureConfig::default(),
        );

        assert!(!scan.breaks.is_empty());
        assert_eq!(scan.breaks[0].kind, BreakKind::Choch);
        assert!(scan.breaks[1..]
            .iter()
            .filter(|b| b.direction == Direction::Bullish)
            .all(|b| b.kind == BreakKind::Bos));
        assert_eq!(scan.bias, Direction::Bullish);
    }

    #[test]
    fn test_break_never_precedes_confirmation() {
        let candles = trending_up(20);
        let series = detect_swings(&candles, &SwingConfig::default());
        let atr = atr_series(&candles, 14);
        let scan = detect_structure_breaks(
            &candles,
            &series.protected,
            &atr,
            Direction::Neutral,
            &StructureConfig::default(),
        );
        for b in &scan.breaks {
            let swing = series
                .protected
                .iter()
                .find(|s| s.index == b.swing_index)
                .unwrap();
            assert!(b.index > swing.confirmed_index);
        }
    }

    #[test]
    fn test_confirming_bar_cannot_break_its_swing() {
        let candles = vec![
            candle(0, 100.0, 101.0, 99.0, 100.0, 100.0),
            candle(1, 100.0, 105.0, 100.0, 104.0, 100.0),
            candle(2, 104.0, 104.5, 100.5, 101.0, 100.0),
            candle(3, 101.0, 106.5, 100.8, 106.0, 100.0),
            candle(4, 106.0, 107.5, 105.5, 107.0, 100.0),
        ];
        let atr = vec![0.0; candles.len()];
        let high = SwingPoint {
            confirmed_index: 3,
            ..swing(105.0, 1, SwingKind::High)
        };

        // bar 3 confirms the high and closes above it; bar 4 is already above
        let scan = detect_structure_breaks(&candles, &[high], &atr, Direction::Neutral, &StructureConfig::default());
        assert!(scan.breaks.is_empty());

        let earlier = SwingPoint {
            confirmed_index: 2,
            ..high
        };
        let scan = detect_structure_breaks(&candles, &[earlier], &atr, Direction::Neutral, &StructureConfig::default());
        assert_eq!(scan.breaks.len(), 1);
        assert_eq!(scan.breaks[0].index, 3);
        assert_eq!(scan.breaks[0].direction, Direction::Bullish);
        assert_eq!(scan.breaks[0].kind, BreakKind::Choch);
    }

    #[test]
    fn test_reversal_produces_choch() {
        // Up legs then a collapse through the last higher low
        let candles = zigzag(&[100.0, 120.0, 110.0, 130.0, 118.0, 125.0, 90.0], 8, 0.3, 100.0);
        let series = detect_swings(&candles, &SwingConfig::default());
        let atr = atr_series(&candles, 14);
        let scan = detect_structure_breaks(
            &candles,
            &series.protected,
            &atr,
            Direction::Bullish,
            &StructureConfig::default(),
        );

        let last = scan.last().unwrap();
        assert_eq!(last.direction, Direction::Bearish);
        assert_eq!(last.kind, BreakKind::Choch);
        assert_eq!(scan.bias, Direction::Bearish);
    }

    #[test]
    fn test_no_swings_no_breaks() {
        let candles = trending_up(3);
        let scan = detect_structure_breaks(&candles, &[], &[], Direction::Bullish, &StructureConfig::default());
        assert!(scan.breaks.is_empty());
        assert_eq!(scan.bias, Direction::Bullish);
    }
}
