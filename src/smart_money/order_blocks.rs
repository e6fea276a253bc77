//! Scored order blocks.
//!
//! A block is the highest-volume opposite-coloured candle from a confirmed
//! pivot forward through the search window. It is scored on how it was
//! created, how price followed through and where it sits in the recent range.

use serde::{Deserialize, Serialize};

use crate::fibonacci::{Mitigation, Zone, ZoneKind};
use crate::market::indicators::{range_extremes, safe_ratio};
use crate::market::{average_volume, Candle, Direction};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderBlockConfig {
    /// Bars on each side of a pivot
    pub pivot_length: usize,
    /// Bars after the pivot searched for the institutional candle
    pub search_window: usize,
    /// Block height is clipped to this many ATRs
    pub max_span_atr: f64,
    pub creation_weight: f64,
    pub follow_through_weight: f64,
    pub location_weight: f64,
    pub follow_through_bars: usize,
    pub location_lookback: usize,
    pub volume_lookback: usize,
}

impl Default for OrderBlockConfig {
    fn default() -> Self {
        Self {
            pivot_length: 5,
            search_window: 5,
            max_span_atr: 2.0,
            creation_weight: 0.50,
            follow_through_weight: 0.35,
            location_weight: 0.15,
            follow_through_bars: 5,
            location_lookback: 50,
            volume_lookback: 20,
        }
    }
}

impl OrderBlockConfig {
    pub fn weight_sum(&self) -> f64 {
        self.creation_weight + self.follow_through_weight + self.location_weight
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObTier {
    Balanced,
    High,
    Strong,
}

impl ObTier {
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            ObTier::Strong
        } else if score >= 55.0 {
            ObTier::High
        } else {
            ObTier::Balanced
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBlock {
    pub zone: Zone,
    pub tier: ObTier,
    pub score: f64,
    pub creation_score: f64,
    pub follow_through_score: f64,
    pub location_score: f64,
    /// Index of the institutional candle
    pub index: usize,
    pub pivot_index: usize,
}

impl OrderBlock {
    pub fn direction(&self) -> Direction {
        self.zone.direction
    }

    pub fn is_usable(&self) -> bool {
        self.zone.mitigation.is_usable()
    }
}

/// Pivot lows produce bullish blocks, pivot highs bearish ones.
/// `atr` must be index-aligned with `candles`.
pub fn detect_order_blocks(
    candles: &[Candle],
    atr: &[f64],
    config: &OrderBlockConfig,
    mitigation_buffer_atr: f64,
) -> Vec<OrderBlock> {
    let len = candles.len();
    let l = config.pivot_length.max(1);
    if len < 2 * l + 1 || atr.len() != len {
        return Vec::new();
    }

    let mut blocks: Vec<OrderBlock> = Vec::new();
    for p in l..len - l {
        for direction in [Direction::Bullish, Direction::Bearish] {
            if !is_pivot(candles, p, l, direction) {
                continue;
            }
            let Some(index) = institutional_candle(candles, p, config.search_window, direction) else {
                continue;
            };
            if blocks.iter().any(|b| b.index == index && b.direction() == direction) {
                continue;
            }
            blocks.push(build_block(candles, atr, config, index, p, direction, mitigation_buffer_atr));
        }
    }
    blocks
}

fn is_pivot(candles: &[Candle], p: usize, l: usize, direction: Direction) -> bool {
    let window = &candles[p - l..=p + l];
    match direction {
        Direction::Bullish => {
            let low = candles[p].low;
            window
                .iter()
                .enumerate()
                .all(|(k, c)| k == l || c.low > low)
        }
        Direction::Bearish => {
            let high = candles[p].high;
            window
                .iter()
                .enumerate()
                .all(|(k, c)| k == l || c.high < high)
        }
        Direction::Neutral => false,
    }
}

/// Highest-volume opposite-coloured candle in `[p, p + window]`
fn institutional_candle(candles: &[Candle], p: usize, window: usize, direction: Direction) -> Option<usize> {
    let end = (p + window).min(candles.len() - 1);
    (p..=end)
        .filter(|&i| match direction {
            Direction::Bullish => candles[i].is_bearish(),
            Direction::Bearish => candles[i].is_bullish(),
            Direction::Neutral => false,
        })
        .max_by(|&a, &b| {
            candles[a]
                .volume
                .partial_cmp(&candles[b].volume)
                .unwrap_or(std::cmp::Ordering::Equal)
                // earlier candle wins ties
                .then(b.cmp(&a))
        })
}

fn build_block(
    candles: &[Candle],
    atr: &[f64],
    config: &OrderBlockConfig,
    index: usize,
    pivot_index: usize,
    direction: Direction,
    mitigation_buffer_atr: f64,
) -> OrderBlock {
    let c = &candles[index];
    let atr_at = atr[index];
    let max_span = config.max_span_atr * atr_at;

    let (mut top, mut bottom) = (c.high, c.low);
    if max_span > 0.0 && top - bottom > max_span {
        match direction {
            Direction::Bearish => bottom = top - max_span,
            _ => top = bottom + max_span,
        }
    }
    let zone = Zone::new(ZoneKind::OrderBlock, top, bottom, direction);

    let creation_score = creation_score(candles, index, atr_at, config.volume_lookback);
    let follow_through_score = follow_through_score(candles, &zone, index, atr_at, config.follow_through_bars);
    let location_score = location_score(candles, &zone, index, config.location_lookback);

    let weight_sum = config.weight_sum();
    let score = if weight_sum > 0.0 {
        (config.creation_weight * creation_score
            + config.follow_through_weight * follow_through_score
            + config.location_weight * location_score)
            / weight_sum
    } else {
        0.0
    }
    .clamp(0.0, 100.0);

    let buffer = (mitigation_buffer_atr * atr_at).max(0.0);
    let zone = track_after_departure(zone, candles, index.max(pivot_index), buffer);

    OrderBlock {
        zone,
        tier: ObTier::from_score(score),
        score,
        creation_score,
        follow_through_score,
        location_score,
        index,
        pivot_index,
    }
}

/// Volume (log-scaled, saturating at 3x average), body share and range vs 2 ATR
fn creation_score(candles: &[Candle], index: usize, atr: f64, volume_lookback: usize) -> f64 {
    let c = &candles[index];
    let avg = average_volume(candles, index, volume_lookback);
    let volume_ratio = safe_ratio(c.volume, avg);
    let volume_score = ((1.0 + volume_ratio).ln() / 4f64.ln()).clamp(0.0, 1.0);
    let body_score = c.body_ratio().clamp(0.0, 1.0);
    let range_score = safe_ratio(c.range(), 2.0 * atr).clamp(0.0, 1.0);
    100.0 * (0.5 * volume_score + 0.25 * body_score + 0.25 * range_score)
}

/// Best extension beyond the block over the next bars, saturating at 2 ATR
fn follow_through_score(candles: &[Candle], zone: &Zone, index: usize, atr: f64, bars: usize) -> f64 {
    let end = (index + 1 + bars).min(candles.len());
    let after = candles.get(index + 1..end).unwrap_or(&[]);
    let extension = match zone.direction {
        Direction::Bullish => after.iter().map(|c| c.high - zone.top).fold(0.0, f64::max),
        Direction::Bearish => after.iter().map(|c| zone.bottom - c.low).fold(0.0, f64::max),
        Direction::Neutral => 0.0,
    };
    100.0 * safe_ratio(extension, 2.0 * atr).clamp(0.0, 1.0)
}

/// Bullish blocks score higher low in the range, bearish higher up
fn location_score(candles: &[Candle], zone: &Zone, index: usize, lookback: usize) -> f64 {
    let start = (index + 1).saturating_sub(lookback);
    let Some((high, low)) = range_extremes(candles, start, index + 1) else {
        return 50.0;
    };
    let span = high - low;
    if span <= 0.0 {
        return 50.0;
    }
    let pos = ((zone.midpoint() - low) / span).clamp(0.0, 1.0);
    match zone.direction {
        Direction::Bullish => 100.0 * (1.0 - pos),
        Direction::Bearish => 100.0 * pos,
        Direction::Neutral => 50.0,
    }
}

/// Touches only count once price has left the block. Before that, only a
/// close through the invalidating edge mitigates it.
fn track_after_departure(zone: Zone, candles: &[Candle], from: usize, buffer: f64) -> Zone {
    let after = candles.get(from + 1..).unwrap_or(&[]);
    let departed = after.iter().position(|c| match zone.direction {
        Direction::Bullish => c.low > zone.top,
        Direction::Bearish => c.high < zone.bottom,
        Direction::Neutral => true,
    });

    let (before, rest) = match departed {
        Some(k) => after.split_at(k + 1),
        None => (after, &[][..]),
    };

    let invalidated = before.iter().any(|c| match zone.direction {
        Direction::Bullish => c.close < zone.bottom - buffer,
        Direction::Bearish => c.close > zone.top + buffer,
        Direction::Neutral => false,
    });
    let zone = if invalidated {
        Zone {
            mitigation: zone.mitigation.escalate(Mitigation::Mitigated),
            ..zone
        }
    } else {
        zone
    };
    zone.track(rest, buffer)
}
