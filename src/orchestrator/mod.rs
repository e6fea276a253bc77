//! Analysis Orchestrator
//!
//! Runs one pipeline per call:
//! Idle -> StructureAnalyzed -> ZonesComputed -> Scored -> SignalGenerated -> EntryPlanned -> Done
//!
//! Each stage has a minimum candle count. Falling short ends the call with a
//! `NoSignalReason` instead of an error. A failing sub-engine is logged and
//! its bucket scores zero.

pub mod entry_plan;
pub mod session;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::confluence::{ConfluenceAggregator, ConfluenceConfig, ConfluenceInput, ConfluenceResult, MtfAlignment, SignalTier};
use crate::error::Result;
use crate::fibonacci::{FibonacciAnalysis, FibonacciCalculator, FibonacciConfig};
use crate::market::{Candle, Direction, Timeframe};
use crate::patterns::{PatternConfig, PatternMatch, PatternScanner};
use crate::risk::{RiskConfig, TradeRequest};
use crate::smart_money::{SmartMoneyConfig, SmartMoneyDetector, SmcAnalysis};
use crate::structure::{StructureAnalysis, StructureAnalyzer, StructureAnalyzerConfig};

pub use entry_plan::{EntryConfig, EntryLeg, EntryPlan, EntryPlanner, EntrySource};
pub use session::{SessionArena, SessionKey, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    StructureAnalyzed,
    ZonesComputed,
    Scored,
    SignalGenerated,
    EntryPlanned,
    Done,
}

/// Why a call ended without a signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum NoSignalReason {
    /// Not enough candles to enter `stage`
    InsufficientData { stage: PipelineStage, required: usize, available: usize },
    /// Aggregated direction is neutral
    NoDirection,
    /// Score or tier below the signal threshold
    BelowThreshold { score: f64, tier: SignalTier, threshold: f64 },
    /// Signal found but no valid plan could be built
    NoEntryPlan { detail: String },
}

impl fmt::Display for NoSignalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoSignalReason::InsufficientData {
                stage,
                required,
                available,
            } => write!(f, "insufficient data for {:?}: {}/{} candles", stage, available, required),
            NoSignalReason::NoDirection => write!(f, "no directional bias"),
            NoSignalReason::BelowThreshold { score, tier, threshold } => {
                write!(f, "score {:.1} ({}) below threshold {:.1}", score, tier, threshold)
            }
            NoSignalReason::NoEntryPlan { detail } => write!(f, "no entry plan: {}", detail),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub min_structure_candles: usize,
    pub min_zone_candles: usize,
    pub min_signal_candles: usize,
    /// Minimum confluence score for a signal
    pub signal_threshold: f64,
    /// Bounded audit history length
    pub audit_capacity: usize,
    pub entry: EntryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_structure_candles: 50,
            min_zone_candles: 100,
            min_signal_candles: 200,
            signal_threshold: 50.0,
            audit_capacity: 500,
            entry: EntryConfig::default(),
        }
    }
}

/// Configuration for every analysis engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub structure: StructureAnalyzerConfig,
    pub fibonacci: FibonacciConfig,
    pub smart_money: SmartMoneyConfig,
    pub patterns: PatternConfig,
    pub confluence: ConfluenceConfig,
    pub orchestrator: OrchestratorConfig,
}

/// Injected sub-engines
pub struct Engines {
    pub structure: StructureAnalyzer,
    pub fibonacci: FibonacciCalculator,
    pub smart_money: SmartMoneyDetector,
    pub patterns: PatternScanner,
    pub confluence: ConfluenceAggregator,
    pub entry: EntryPlanner,
}

impl Engines {
    pub fn from_config(analysis: &AnalysisConfig, risk: &RiskConfig) -> Result<Self> {
        Ok(Self {
            structure: StructureAnalyzer::new(analysis.structure.clone()),
            fibonacci: FibonacciCalculator::new(analysis.fibonacci.clone()),
            smart_money: SmartMoneyDetector::new(analysis.smart_money.clone()),
            patterns: PatternScanner::new(analysis.patterns.clone()),
            confluence: ConfluenceAggregator::new(analysis.confluence.clone())?,
            entry: EntryPlanner::new(
                analysis.orchestrator.entry.clone(),
                risk.stops.clone(),
                risk.take_profits.clone(),
            ),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub direction: Direction,
    pub score: f64,
    pub tier: SignalTier,
    pub price: f64,
    pub atr: f64,
    pub plan: EntryPlan,
}

impl TradeSignal {
    /// Request for the risk manager, confidence taken from the score
    pub fn to_trade_request(&self) -> TradeRequest {
        TradeRequest {
            symbol: self.symbol.clone(),
            direction: self.direction,
            entry: self.plan.average_entry,
            stop_loss: self.plan.stop_loss,
            confidence: (self.score / 100.0).clamp(0.0, 1.0),
            atr: (self.atr > 0.0).then_some(self.atr),
            sector: None,
            correlation_group: None,
        }
    }
}

/// Everything one call produced, including partial analyses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub analyzed_at: DateTime<Utc>,
    /// Last stage completed before Done
    pub stage: PipelineStage,
    pub candles: usize,
    pub structure: Option<StructureAnalysis>,
    pub fibonacci: Option<FibonacciAnalysis>,
    pub smc: Option<SmcAnalysis>,
    pub patterns: Vec<PatternMatch>,
    pub mtf: Option<MtfAlignment>,
    pub confluence: Option<ConfluenceResult>,
    pub signal: Option<TradeSignal>,
    pub no_signal: Option<NoSignalReason>,
}

impl AnalysisOutcome {
    fn new(symbol: &str, timeframe: Timeframe, candles: usize, now: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            analyzed_at: now,
            stage: PipelineStage::Idle,
            candles,
            structure: None,
            fibonacci: None,
            smc: None,
            patterns: Vec::new(),
            mtf: None,
            confluence: None,
            signal: None,
            no_signal: None,
        }
    }

    pub fn has_signal(&self) -> bool {
        self.signal.is_some()
    }

    fn stop(mut self, reason: NoSignalReason) -> Self {
        debug!("{} {}: no signal ({})", self.symbol, self.timeframe, reason);
        self.no_signal = Some(reason);
        self
    }
}

/// Compact record kept in the audit history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub stage: PipelineStage,
    pub score: Option<f64>,
    pub tier: Option<SignalTier>,
    pub direction: Direction,
    pub signal: bool,
    pub reason: Option<NoSignalReason>,
}

impl From<&AnalysisOutcome> for AuditEntry {
    fn from(outcome: &AnalysisOutcome) -> Self {
        Self {
            at: outcome.analyzed_at,
            symbol: outcome.symbol.clone(),
            timeframe: outcome.timeframe,
            stage: outcome.stage,
            score: outcome.confluence.as_ref().map(|c| c.score),
            tier: outcome.confluence.as_ref().map(|c| c.tier),
            direction: outcome
                .confluence
                .as_ref()
                .map(|c| c.direction)
                .unwrap_or(Direction::Neutral),
            signal: outcome.has_signal(),
            reason: outcome.no_signal.clone(),
        }
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    engines: Engines,
    sessions: SessionArena,
    audit: Mutex<VecDeque<AuditEntry>>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, engines: Engines) -> Self {
        Self {
            config,
            engines,
            sessions: SessionArena::new(),
            audit: Mutex::new(VecDeque::new()),
        }
    }

    pub fn from_config(analysis: &AnalysisConfig, risk: &RiskConfig) -> Result<Self> {
        Ok(Self::new(
            analysis.orchestrator.clone(),
            Engines::from_config(analysis, risk)?,
        ))
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionArena {
        &self.sessions
    }

    /// Analyze one candle set on its own
    pub fn analyze(&self, symbol: &str, timeframe: Timeframe, candles: &[Candle]) -> AnalysisOutcome {
        self.run(symbol, timeframe, candles, Vec::new())
    }

    /// Analyze the primary set with trend labels from higher timeframes
    pub fn analyze_multi_timeframe(
        &self,
        symbol: &str,
        primary: (Timeframe, &[Candle]),
        higher: &[(Timeframe, &[Candle])],
    ) -> AnalysisOutcome {
        let labels = higher
            .iter()
            .filter_map(|(tf, candles)| match self.engines.structure.analyze(candles) {
                Ok(structure) => Some((*tf, structure.trend())),
                Err(e) => {
                    warn!("{} {}: higher timeframe skipped: {}", symbol, tf, e);
                    None
                }
            })
            .collect();
        self.run(symbol, primary.0, primary.1, labels)
    }

    fn run(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
        higher_labels: Vec<(Timeframe, Direction)>,
    ) -> AnalysisOutcome {
        let outcome = self.pipeline(symbol, timeframe, candles, higher_labels, Utc::now());
        self.record(&outcome);
        outcome
    }

    fn insufficient(&self, stage: PipelineStage, required: usize, available: usize) -> Option<NoSignalReason> {
        (available < required).then_some(NoSignalReason::InsufficientData {
            stage,
            required,
            available,
        })
    }

    fn pipeline(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
        higher_labels: Vec<(Timeframe, Direction)>,
        now: DateTime<Utc>,
    ) -> AnalysisOutcome {
        let n = candles.len();
        let mut out = AnalysisOutcome::new(symbol, timeframe, n, now);

        // structure
        if let Some(reason) = self.insufficient(PipelineStage::StructureAnalyzed, self.config.min_structure_candles, n) {
            return out.stop(reason);
        }
        out.structure = match self.engines.structure.analyze(candles) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("{} {}: structure analysis failed: {}", symbol, timeframe, e);
                None
            }
        };
        out.stage = PipelineStage::StructureAnalyzed;

        // zones
        if let Some(reason) = self.insufficient(PipelineStage::ZonesComputed, self.config.min_zone_candles, n) {
            return out.stop(reason);
        }
        let atr = out.structure.as_ref().map(|s| s.atr).unwrap_or(0.0);
        let leg = out.structure.as_ref().and_then(|s| s.leg.as_ref());
        let mut fibonacci = self.engines.fibonacci.analyze(candles, leg, atr);
        let mut smc = match self.engines.smart_money.analyze(candles) {
            Ok(smc) => Some(smc),
            Err(e) => {
                warn!("{} {}: smart-money detection failed: {}", symbol, timeframe, e);
                None
            }
        };
        self.reconcile_zones(symbol, timeframe, &mut fibonacci, smc.as_mut(), now);
        out.patterns = out
            .structure
            .as_ref()
            .map(|s| self.engines.patterns.scan(candles, &s.swings.protected))
            .unwrap_or_default();
        out.fibonacci = Some(fibonacci);
        out.smc = smc;
        out.stage = PipelineStage::ZonesComputed;

        // score
        if let Some(reason) = self.insufficient(PipelineStage::Scored, self.config.min_signal_candles, n) {
            return out.stop(reason);
        }
        out.mtf = (!higher_labels.is_empty()).then(|| {
            let mut labels = higher_labels;
            if let Some(s) = &out.structure {
                labels.push((timeframe, s.trend()));
            }
            MtfAlignment::from_labels(labels)
        });
        let result = self.engines.confluence.aggregate(&ConfluenceInput {
            candles,
            timeframe: Some(timeframe),
            structure: out.structure.as_ref(),
            smc: out.smc.as_ref(),
            fibonacci: out.fibonacci.as_ref(),
            patterns: &out.patterns,
            mtf: out.mtf.as_ref(),
        });
        out.stage = PipelineStage::Scored;
        out.confluence = Some(result.clone());

        // signal
        if !result.direction.is_directional() {
            return out.stop(NoSignalReason::NoDirection);
        }
        if result.score < self.config.signal_threshold || !result.is_tradeable() {
            return out.stop(NoSignalReason::BelowThreshold {
                score: result.score,
                tier: result.tier,
                threshold: self.config.signal_threshold,
            });
        }
        out.stage = PipelineStage::SignalGenerated;

        // entry plan
        let price = candles.last().map(|c| c.close).unwrap_or(0.0);
        let plan = self.engines.entry.plan(
            result.direction,
            price,
            (atr > 0.0).then_some(atr),
            out.structure.as_ref(),
            out.smc.as_ref(),
            out.fibonacci.as_ref(),
        );
        let plan = match plan {
            Ok(plan) => plan,
            Err(e) => {
                warn!("{} {}: entry planning failed: {}", symbol, timeframe, e);
                return out.stop(NoSignalReason::NoEntryPlan { detail: e.to_string() });
            }
        };
        out.stage = PipelineStage::EntryPlanned;

        info!(
            "{} {}: {} signal, score {:.1} ({})",
            symbol, timeframe, result.direction, result.score, result.tier
        );
        out.signal = Some(TradeSignal {
            symbol: symbol.to_string(),
            timeframe,
            direction: result.direction,
            score: result.score,
            tier: result.tier,
            price,
            atr,
            plan,
        });
        out
    }

    /// Carry forward mitigation from earlier calls
    fn reconcile_zones(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        fibonacci: &mut FibonacciAnalysis,
        smc: Option<&mut SmcAnalysis>,
        now: DateTime<Utc>,
    ) {
        let mut zones = Vec::new();
        if let Some(fz) = fibonacci.zones.as_mut() {
            zones.push(&mut fz.ote);
            zones.push(&mut fz.golden_pocket);
        }
        if let Some(smc) = smc {
            zones.extend(smc.order_blocks.iter_mut().map(|b| &mut b.zone));
            zones.extend(smc.fvgs.iter_mut().map(|g| &mut g.zone));
        }
        self.sessions.reconcile(symbol, timeframe, zones, now);

        if let Some(fz) = fibonacci.zones.as_ref() {
            fibonacci.in_ote &= fz.ote.mitigation.is_usable();
            fibonacci.in_golden_pocket &= fz.golden_pocket.mitigation.is_usable();
        }
    }

    fn record(&self, outcome: &AnalysisOutcome) {
        let mut audit = self.audit.lock().unwrap_or_else(|e| e.into_inner());
        audit.push_back(AuditEntry::from(outcome));
        while audit.len() > self.config.audit_capacity {
            audit.pop_front();
        }
    }

    /// Audit history, oldest first
    pub fn audit_log(&self) -> Vec<AuditEntry> {
        let audit = self.audit.lock().unwrap_or_else(|e| e.into_inner());
        audit.iter().cloned().collect()
    }
}
