//! Multi-timeframe trend alignment

use serde::{Deserialize, Serialize};

use crate::market::{Direction, Timeframe};

/// Trend labels across timeframes and the vote they produce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MtfAlignment {
    /// (timeframe, trend) sorted fine to coarse
    pub labels: Vec<(Timeframe, Direction)>,
    /// Majority direction, ties broken by the finest directional timeframe
    pub direction: Direction,
}

impl MtfAlignment {
    pub fn from_labels(mut labels: Vec<(Timeframe, Direction)>) -> Self {
        labels.sort_by_key(|(tf, _)| *tf);
        labels.dedup_by_key(|(tf, _)| *tf);

        let bullish = labels.iter().filter(|(_, d)| *d == Direction::Bullish).count();
        let bearish = labels.iter().filter(|(_, d)| *d == Direction::Bearish).count();

        let direction = if bullish > bearish {
            Direction::Bullish
        } else if bearish > bullish {
            Direction::Bearish
        } else {
            labels
                .iter()
                .map(|(_, d)| *d)
                .find(Direction::is_directional)
                .unwrap_or(Direction::Neutral)
        };

        Self { labels, direction }
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Fraction of timeframes whose trend equals `direction`
    pub fn agreement(&self, direction: Direction) -> f64 {
        if self.labels.is_empty() || !direction.is_directional() {
            return 0.0;
        }
        let agreeing = self.labels.iter().filter(|(_, d)| *d == direction).count();
        agreeing as f64 / self.labels.len() as f64
    }

    pub fn trend_of(&self, timeframe: Timeframe) -> Option<Direction> {
        self.labels
            .iter()
            .find(|(tf, _)| *tf == timeframe)
            .map(|(_, d)| *d)
    }
}
