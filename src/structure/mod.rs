//! Swing & Structure Detector
//!
//! - `swings` - protected and cycle swing confirmation
//! - `classify` - HH/HL/LH/LL labelling and BOS/CHoCH breaks
//! - `leg` - active impulse leg for Fibonacci geometry

pub mod classify;
pub mod leg;
pub mod swings;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::market::{atr_series, Candle, Direction};

pub use classify::{
    classify_structure, detect_structure_breaks, BreakKind, BreakScan, HighType, LowType,
    StructureBreak, StructureConfig, StructureState,
};
pub use leg::{active_leg, Leg};
pub use swings::{detect_swings, SwingConfig, SwingKind, SwingPoint, SwingSeries};

/// Combined configuration for the structure stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureAnalyzerConfig {
    pub swings: SwingConfig,
    pub structure: StructureConfig,
    /// Minimum leg impulse in ATR units for an active leg
    pub min_impulse_atr: f64,
}

impl Default for StructureAnalyzerConfig {
    fn default() -> Self {
        Self {
            swings: SwingConfig::default(),
            structure: StructureConfig::default(),
            min_impulse_atr: 2.0,
        }
    }
}

/// Everything the structure stage produces for one candle set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureAnalysis {
    pub swings: SwingSeries,
    /// Classification of the protected swings
    pub state: StructureState,
    /// Classification of the cycle swings
    pub cycle_state: StructureState,
    pub breaks: BreakScan,
    pub leg: Option<Leg>,
    /// Latest ATR
    pub atr: f64,
}

impl StructureAnalysis {
    pub fn trend(&self) -> Direction {
        self.state.trend
    }

    pub fn last_break(&self) -> Option<&StructureBreak> {
        self.breaks.last()
    }
}

/// Runs swing detection, classification, break scan and leg selection
#[derive(Debug, Clone)]
pub struct StructureAnalyzer {
    config: StructureAnalyzerConfig,
}

impl StructureAnalyzer {
    pub fn new(config: StructureAnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StructureAnalyzerConfig {
        &self.config
    }

    /// Analyze one candle set
    pub fn analyze(&self, candles: &[Candle]) -> Result<StructureAnalysis> {
        let required = self.config.swings.atr_period + 2;
        if candles.len() < required {
            return Err(Error::InsufficientData {
                required,
                available: candles.len(),
            });
        }

        let atr = atr_series(candles, self.config.swings.atr_period);
        let latest_atr = atr.last().copied().unwrap_or(0.0);

        let swings = detect_swings(candles, &self.config.swings);
        let state = classify_structure(&swings.protected, latest_atr, &self.config.structure);
        let cycle_state = classify_structure(&swings.cycle, latest_atr, &self.config.structure);
        let breaks = detect_structure_breaks(
            candles,
            &swings.protected,
            &atr,
            Direction::Neutral,
            &self.config.structure,
        );
        let leg = active_leg(&swings.protected, latest_atr, self.config.min_impulse_atr);

        debug!(
            "Structure: {} swings, trend={}, bias={}, leg={:?}",
            swings.protected.len(),
            state.trend,
            breaks.bias,
            leg.map(|l| l.direction)
        );

        Ok(StructureAnalysis {
            swings,
            state,
            cycle_state,
            breaks,
            leg,
            atr: latest_atr,
        })
    }
}

impl Default for StructureAnalyzer {
    fn default() -> Self {
        Self::new(StructureAnalyzerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::fixtures::trending_up;

    #[test]
    fn test_analyze_uptrend() {
        let analysis = StructureAnalyzer::default().analyze(&trending_up(24)).unwrap();
        assert!(analysis.state.is_valid);
        assert_eq!(analysis.trend(), Direction::Bullish);
        assert!(analysis.atr > 0.0);
        assert!(analysis.last_break().is_some());
    }

    #[test]
    fn test_short_series_is_insufficient() {
        let err = StructureAnalyzer::default().analyze(&trending_up(1)).unwrap_err();
        assert!(err.is_insufficient_data());
    }
}
