//! Smart-Money Zone Detector
//!
//! Order blocks, fair value gaps and displacement, all derived from one
//! candle set and one ATR series.

pub mod displacement;
pub mod fvg;
pub mod order_blocks;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::fibonacci::Zone;
use crate::market::{atr_series, Candle, Direction};

pub use displacement::{detect_displacements, Displacement, DisplacementConfig};
pub use fvg::{detect_fvgs, FairValueGap, FvgConfig};
pub use order_blocks::{detect_order_blocks, ObTier, OrderBlock, OrderBlockConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartMoneyConfig {
    pub atr_period: usize,
    pub mitigation_buffer_atr: f64,
    pub order_blocks: OrderBlockConfig,
    pub fvg: FvgConfig,
    pub displacement: DisplacementConfig,
}

impl Default for SmartMoneyConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            mitigation_buffer_atr: 0.1,
            order_blocks: OrderBlockConfig::default(),
            fvg: FvgConfig::default(),
            displacement: DisplacementConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmcAnalysis {
    pub order_blocks: Vec<OrderBlock>,
    pub fvgs: Vec<FairValueGap>,
    pub displacements: Vec<Displacement>,
    pub atr: f64,
}

impl SmcAnalysis {
    /// Unmitigated blocks in `direction`, strongest first
    pub fn active_order_blocks(&self, direction: Direction) -> Vec<&OrderBlock> {
        let mut blocks: Vec<&OrderBlock> = self
            .order_blocks
            .iter()
            .filter(|b| b.is_usable() && b.direction() == direction)
            .collect();
        blocks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        blocks
    }

    pub fn active_fvgs(&self, direction: Direction) -> Vec<&FairValueGap> {
        self.fvgs
            .iter()
            .filter(|g| g.is_usable() && g.direction() == direction)
            .collect()
    }

    /// Usable zones of `direction` that contain `price`
    pub fn zones_containing(&self, price: f64, direction: Direction) -> Vec<Zone> {
        self.active_order_blocks(direction)
            .into_iter()
            .map(|b| b.zone)
            .chain(self.active_fvgs(direction).into_iter().map(|g| g.zone))
            .filter(|z| z.contains(price))
            .collect()
    }

    pub fn latest_displacement(&self) -> Option<&Displacement> {
        self.displacements.iter().max_by_key(|d| d.end_index)
    }

    /// Every tracked zone, for session persistence
    pub fn zones(&self) -> impl Iterator<Item = Zone> + '_ {
        self.order_blocks
            .iter()
            .map(|b| b.zone)
            .chain(self.fvgs.iter().map(|g| g.zone))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SmartMoneyDetector {
    config: SmartMoneyConfig,
}

impl SmartMoneyDetector {
    pub fn new(config: SmartMoneyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SmartMoneyConfig {
        &self.config
    }

    pub fn analyze(&self, candles: &[Candle]) -> Result<SmcAnalysis> {
        let required = self.config.atr_period + 2;
        if candles.len() < required {
            return Err(Error::InsufficientData {
                required,
                available: candles.len(),
            });
        }

        let atr = atr_series(candles, self.config.atr_period);
        let buffer = self.config.mitigation_buffer_atr;

        let analysis = SmcAnalysis {
            order_blocks: detect_order_blocks(candles, &atr, &self.config.order_blocks, buffer),
            fvgs: detect_fvgs(candles, &atr, &self.config.fvg, buffer),
            displacements: detect_displacements(candles, &atr, &self.config.displacement),
            atr: atr.last().copied().unwrap_or(0.0),
        };

        debug!(
            "SMC: {} order blocks, {} FVGs, {} displacements",
            analysis.order_blocks.len(),
            analysis.fvgs.len(),
            analysis.displacements.len()
        );
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::fixtures::{trending_up, zigzag};

    #[test]
    fn test_analyze_trend() {
        let candles = trending_up(20);
        let analysis = SmartMoneyDetector::default().analyze(&candles).unwrap();
        assert!(analysis.atr > 0.0);
        for ob in &analysis.order_blocks {
            assert!(ob.zone.top >= ob.zone.bottom);
            assert!((0.0..=100.0).contains(&ob.score));
        }
    }

    #[test]
    fn test_insufficient_data() {
        let candles = zigzag(&[100.0, 110.0], 5, 0.5, 1.0);
        let err = SmartMoneyDetector::default().analyze(&candles).unwrap_err();
        assert!(err.is_insufficient_data());
    }

    #[test]
    fn test_zones_containing_filters_direction() {
        use crate::fibonacci::{Zone, ZoneKind};
        let gap = FairValueGap {
            zone: Zone::new(ZoneKind::FairValueGap, 100.0, 105.0, Direction::Bullish),
            midline: 102.5,
            size: 5.0,
            index: 3,
        };
        let analysis = SmcAnalysis {
            fvgs: vec![gap],
            ..SmcAnalysis::default()
        };
        assert_eq!(analysis.zones_containing(102.0, Direction::Bullish).len(), 1);
        assert!(analysis.zones_containing(102.0, Direction::Bearish).is_empty());
        assert!(analysis.zones_containing(110.0, Direction::Bullish).is_empty());
    }
}
