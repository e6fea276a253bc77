//! Confluence Aggregator
//!
//! Sums independently capped buckets into a 0-100 score:
//!
//! | Bucket             | Default cap |
//! |--------------------|-------------|
//! | MTF alignment      | 20          |
//! | Structure          | 15          |
//! | Smart money        | 20          |
//! | Volume             | 10          |
//! | Momentum           | 10          |
//! | Support/resistance | 10          |
//! | Fibonacci          | 10          |
//! | Session timing     | 5           |
//!
//! Each bucket is a `ConfluenceFactor` trait object and can be replaced.

pub mod factors;
pub mod mtf;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::fibonacci::FibonacciAnalysis;
use crate::market::{Candle, Direction, Timeframe};
use crate::patterns::PatternMatch;
use crate::smart_money::SmcAnalysis;
use crate::structure::StructureAnalysis;

pub use factors::{
    FibonacciFactor, MomentumFactor, MtfFactor, SessionFactor, SmartMoneyFactor,
    StructureFactor, SupportResistanceFactor, VolumeFactor,
};
pub use mtf::MtfAlignment;

/// Scoring bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    MtfAlignment,
    Structure,
    SmartMoney,
    Volume,
    Momentum,
    SupportResistance,
    Fibonacci,
    Session,
}

/// Maximum points per bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketCaps {
    pub mtf_alignment: f64,
    pub structure: f64,
    pub smart_money: f64,
    pub volume: f64,
    pub momentum: f64,
    pub support_resistance: f64,
    pub fibonacci: f64,
    pub session: f64,
}

impl Default for BucketCaps {
    fn default() -> Self {
        Self {
            mtf_alignment: 20.0,
            structure: 15.0,
            smart_money: 20.0,
            volume: 10.0,
            momentum: 10.0,
            support_resistance: 10.0,
            fibonacci: 10.0,
            session: 5.0,
        }
    }
}

impl BucketCaps {
    pub fn cap(&self, kind: FactorKind) -> f64 {
        match kind {
            FactorKind::MtfAlignment => self.mtf_alignment,
            FactorKind::Structure => self.structure,
            FactorKind::SmartMoney => self.smart_money,
            FactorKind::Volume => self.volume,
            FactorKind::Momentum => self.momentum,
            FactorKind::SupportResistance => self.support_resistance,
            FactorKind::Fibonacci => self.fibonacci,
            FactorKind::Session => self.session,
        }
    }

    pub fn total(&self) -> f64 {
        self.mtf_alignment
            + self.structure
            + self.smart_money
            + self.volume
            + self.momentum
            + self.support_resistance
            + self.fibonacci
            + self.session
    }
}

/// Score thresholds for each tier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub a_plus: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            a_plus: 80.0,
            a: 65.0,
            b: 50.0,
            c: 35.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfluenceConfig {
    pub caps: BucketCaps,
    pub tiers: TierThresholds,
    pub volume_lookback: usize,
    pub rsi_period: usize,
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            caps: BucketCaps::default(),
            tiers: TierThresholds::default(),
            volume_lookback: 20,
            rsi_period: 14,
        }
    }
}

/// Setup quality grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SignalTier {
    #[serde(rename = "NO_TRADE")]
    NoTrade,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A+")]
    APlus,
}

impl SignalTier {
    pub fn from_score(score: f64, thresholds: &TierThresholds) -> Self {
        if score >= thresholds.a_plus {
            SignalTier::APlus
        } else if score >= thresholds.a {
            SignalTier::A
        } else if score >= thresholds.b {
            SignalTier::B
        } else if score >= thresholds.c {
            SignalTier::C
        } else {
            SignalTier::NoTrade
        }
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            SignalTier::APlus => "Exceptional confluence - full size",
            SignalTier::A => "Strong confluence - standard size",
            SignalTier::B => "Acceptable confluence - reduced size",
            SignalTier::C => "Marginal confluence - watch only",
            SignalTier::NoTrade => "Insufficient confluence - no trade",
        }
    }
}

impl fmt::Display for SignalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalTier::APlus => "A+",
            SignalTier::A => "A",
            SignalTier::B => "B",
            SignalTier::C => "C",
            SignalTier::NoTrade => "NO_TRADE",
        };
        f.write_str(s)
    }
}

/// Everything a factor may read. Absent inputs are `None`/empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfluenceInput<'a> {
    pub candles: &'a [Candle],
    pub timeframe: Option<Timeframe>,
    pub structure: Option<&'a StructureAnalysis>,
    pub smc: Option<&'a SmcAnalysis>,
    pub fibonacci: Option<&'a FibonacciAnalysis>,
    pub patterns: &'a [PatternMatch],
    pub mtf: Option<&'a MtfAlignment>,
}

impl ConfluenceInput<'_> {
    pub fn price(&self) -> Option<f64> {
        self.candles.last().map(|c| c.close)
    }

    /// MTF majority when available, otherwise the primary structure trend
    pub fn direction(&self) -> Direction {
        match self.mtf {
            Some(mtf) if !mtf.is_empty() => mtf.direction,
            _ => self
                .structure
                .map(|s| s.trend())
                .unwrap_or(Direction::Neutral),
        }
    }
}

/// Raw factor output: strength in [0, 1] plus a note
#[derive(Debug, Clone, PartialEq)]
pub struct FactorEvaluation {
    pub strength: f64,
    pub detail: String,
}

impl FactorEvaluation {
    pub fn new(strength: f64, detail: impl Into<String>) -> Self {
        let strength = if strength.is_finite() {
            strength.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            strength,
            detail: detail.into(),
        }
    }

    pub fn missing(reason: &str) -> Self {
        Self::new(0.0, reason)
    }
}

/// One scoring bucket
pub trait ConfluenceFactor: Send + Sync {
    fn kind(&self) -> FactorKind;

    fn evaluate(&self, input: &ConfluenceInput<'_>, direction: Direction) -> FactorEvaluation;
}

/// Scored bucket in the final result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorScore {
    pub kind: FactorKind,
    pub score: f64,
    pub cap: f64,
    pub detail: String,
}

/// Fresh per call, never mutated afterwards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceResult {
    /// 0-100
    pub score: f64,
    pub tier: SignalTier,
    pub direction: Direction,
    pub factors: Vec<FactorScore>,
}

impl ConfluenceResult {
    pub fn factor(&self, kind: FactorKind) -> Option<&FactorScore> {
        self.factors.iter().find(|f| f.kind == kind)
    }

    pub fn is_tradeable(&self) -> bool {
        self.direction.is_directional() && self.tier >= SignalTier::B
    }
}

/// The built-in bucket set
pub fn builtin_factors(config: &ConfluenceConfig) -> Vec<Box<dyn ConfluenceFactor>> {
    vec![
        Box::new(MtfFactor),
        Box::new(StructureFactor),
        Box::new(SmartMoneyFactor),
        Box::new(VolumeFactor {
            lookback: config.volume_lookback.max(1),
        }),
        Box::new(MomentumFactor {
            rsi_period: config.rsi_period.max(1),
        }),
        Box::new(SupportResistanceFactor::default()),
        Box::new(FibonacciFactor),
        Box::new(SessionFactor),
    ]
}

pub struct ConfluenceAggregator {
    config: ConfluenceConfig,
    factors: Vec<Box<dyn ConfluenceFactor>>,
}

impl ConfluenceAggregator {
    /// Aggregator with the built-in factors
    pub fn new(config: ConfluenceConfig) -> Result<Self> {
        let factors = builtin_factors(&config);
        Self::with_factors(config, factors)
    }

    /// Aggregator with a custom factor set. Refuses caps summing above 100.
    pub fn with_factors(config: ConfluenceConfig, factors: Vec<Box<dyn ConfluenceFactor>>) -> Result<Self> {
        let total = config.caps.total();
        if total > 100.0 + 1e-9 {
            return Err(Error::Config(format!(
                "confluence bucket caps sum to {:.1} (max 100)",
                total
            )));
        }
        Ok(Self { config, factors })
    }

    pub fn config(&self) -> &ConfluenceConfig {
        &self.config
    }

    pub fn aggregate(&self, input: &ConfluenceInput<'_>) -> ConfluenceResult {
        let direction = input.direction();

        let factors: Vec<FactorScore> = self
            .factors
            .iter()
            .map(|factor| {
                let kind = factor.kind();
                let cap = self.config.caps.cap(kind).max(0.0);
                let eval = factor.evaluate(input, direction);
                FactorScore {
                    kind,
                    score: eval.strength * cap,
                    cap,
                    detail: eval.detail,
                }
            })
            .collect();

        let score = factors.iter().map(|f| f.score).sum::<f64>().clamp(0.0, 100.0);
        let tier = SignalTier::from_score(score, &self.config.tiers);

        ConfluenceResult {
            score,
            tier,
            direction,
            factors,
        }
    }
}

impl fmt::Debug for ConfluenceAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfluenceAggregator")
            .field("config", &self.config)
            .field("factors", &self.factors.iter().map(|x| x.kind()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::fixtures::trending_up;
    use crate::structure::StructureAnalyzer;

    struct Full(FactorKind);

    impl ConfluenceFactor for Full {
        fn kind(&self) -> FactorKind {
            self.0
        }

        fn evaluate(&self, _input: &ConfluenceInput<'_>, _direction: Direction) -> FactorEvaluation {
            FactorEvaluation::new(5.0, "saturated")
        }
    }

    #[test]
    fn test_caps_over_100_rejected() {
        let mut config = ConfluenceConfig::default();
        config.caps.session = 10.0;
        assert!(ConfluenceAggregator::new(config).is_err());
        assert!(ConfluenceAggregator::new(ConfluenceConfig::default()).is_ok());
    }

    #[test]
    fn test_saturated_factors_cap_at_bucket() {
        let factors: Vec<Box<dyn ConfluenceFactor>> = vec![
            Box::new(Full(FactorKind::Structure)),
            Box::new(Full(FactorKind::Session)),
        ];
        let agg = ConfluenceAggregator::with_factors(ConfluenceConfig::default(), factors).unwrap();
        let result = agg.aggregate(&ConfluenceInput::default());
        assert_eq!(result.score, 20.0);
        assert_eq!(result.factor(FactorKind::Structure).unwrap().score, 15.0);
        assert_eq!(result.tier, SignalTier::NoTrade);
        assert_eq!(result.direction, Direction::Neutral);
    }

    #[test]
    fn test_empty_input_scores_zero() {
        let agg = ConfluenceAggregator::new(ConfluenceConfig::default()).unwrap();
        let result = agg.aggregate(&ConfluenceInput::default());
        assert_eq!(result.score, 0.0);
        assert_eq!(result.factors.len(), 8);
        assert!(!result.is_tradeable());
    }

    #[test]
    fn test_direction_falls_back_to_structure() {
        let candles = trending_up(24);
        let structure = StructureAnalyzer::default().analyze(&candles).unwrap();
        let agg = ConfluenceAggregator::new(ConfluenceConfig::default()).unwrap();
        let result = agg.aggregate(&ConfluenceInput {
            candles: &candles,
            structure: Some(&structure),
            ..ConfluenceInput::default()
        });
        assert_eq!(result.direction, Direction::Bullish);
        assert!((0.0..=100.0).contains(&result.score));
        assert!(result.factor(FactorKind::Structure).unwrap().score > 0.0);
    }

    #[test]
    fn test_tier_thresholds() {
        let t = TierThresholds::default();
        assert_eq!(SignalTier::from_score(80.0, &t), SignalTier::APlus);
        assert_eq!(SignalTier::from_score(79.9, &t), SignalTier::A);
        assert_eq!(SignalTier::from_score(50.0, &t), SignalTier::B);
        assert_eq!(SignalTier::from_score(35.0, &t), SignalTier::C);
        assert_eq!(SignalTier::from_score(34.9, &t), SignalTier::NoTrade);
        assert_eq!(SignalTier::APlus.to_string(), "A+");
    }
}
