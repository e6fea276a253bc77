//! Fibonacci Zone Calculator
//!
//! Two deliberately separate reference frames:
//! - `levels` - retracements of the active leg (OTE, Golden Pocket)
//! - `range` - Premium / Discount / Equilibrium of the rolling dealing range
//!
//! `zone` holds the shared `Zone` type and its mitigation transition.

pub mod levels;
pub mod range;
pub mod zone;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::market::Candle;
use crate::structure::Leg;

pub use levels::{calculate_zones, fib_level, FibLevel, FibonacciZones, OteMode, FIB_RATIOS};
pub use range::{range_zones, PriceLocation, RangeConfig, RangeZones};
pub use zone::{check_mitigation, Mitigation, MitigationCheck, Zone, ZoneKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FibonacciConfig {
    pub ote_mode: OteMode,
    pub range: RangeConfig,
    /// Close-through buffer in ATR units
    pub mitigation_buffer_atr: f64,
}

impl Default for FibonacciConfig {
    fn default() -> Self {
        Self {
            ote_mode: OteMode::Standard,
            range: RangeConfig::default(),
            mitigation_buffer_atr: 0.1,
        }
    }
}

/// Fibonacci context at the latest candle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibonacciAnalysis {
    /// Leg geometry, with OTE/Golden Pocket mitigation tracked since leg end
    pub zones: Option<FibonacciZones>,
    pub range: Option<RangeZones>,
    pub price: f64,
    pub in_ote: bool,
    pub in_golden_pocket: bool,
    pub location: Option<PriceLocation>,
}

impl FibonacciAnalysis {
    pub fn retracement(&self) -> Option<f64> {
        self.zones.as_ref().map(|z| z.retracement_of(self.price))
    }
}

/// Stateless per call; cross-call escalation lives in the session arena
#[derive(Debug, Clone, Default)]
pub struct FibonacciCalculator {
    config: FibonacciConfig,
}

impl FibonacciCalculator {
    pub fn new(config: FibonacciConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FibonacciConfig {
        &self.config
    }

    pub fn mitigation_buffer(&self, atr: f64) -> f64 {
        (atr * self.config.mitigation_buffer_atr).max(0.0)
    }

    pub fn analyze(&self, candles: &[Candle], leg: Option<&Leg>, atr: f64) -> FibonacciAnalysis {
        let price = candles.last().map(|c| c.close).unwrap_or(0.0);
        let buffer = self.mitigation_buffer(atr);

        let zones = leg.and_then(|leg| {
            match calculate_zones(leg.a.price, leg.b.price, self.config.ote_mode) {
                Ok(mut zones) => {
                    let after = candles.get(leg.b.index + 1..).unwrap_or(&[]);
                    zones.ote = zones.ote.track(after, buffer);
                    zones.golden_pocket = zones.golden_pocket.track(after, buffer);
                    Some(zones)
                }
                Err(e) => {
                    debug!("Skipping fib zones: {}", e);
                    None
                }
            }
        });

        let range = range_zones(candles, &self.config.range);
        let location = range.as_ref().map(|r| r.location(price));

        let in_ote = zones
            .as_ref()
            .map(|z| z.ote.mitigation.is_usable() && z.ote.contains(price))
            .unwrap_or(false);
        let in_golden_pocket = zones
            .as_ref()
            .map(|z| z.golden_pocket.mitigation.is_usable() && z.golden_pocket.contains(price))
            .unwrap_or(false);

        FibonacciAnalysis {
            zones,
            range,
            price,
            in_ote,
            in_golden_pocket,
            location,
        }
    }
}
