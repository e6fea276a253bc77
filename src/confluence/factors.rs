//! Built-in confluence factors, one per bucket.
//!
//! Every factor returns a strength in [0, 1]; the aggregator scales it by the
//! bucket cap. Missing inputs yield 0.

use chrono::Timelike;

use super::{ConfluenceFactor, ConfluenceInput, FactorEvaluation, FactorKind};
use crate::market::indicators::safe_ratio;
use crate::market::{average_volume, macd, rsi, Direction};
use crate::patterns::net_bias;
use crate::structure::{BreakKind, SwingKind};

/// Share of timeframes trending with the trade direction
#[derive(Debug, Default)]
pub struct MtfFactor;

impl ConfluenceFactor for MtfFactor {
    fn kind(&self) -> FactorKind {
        FactorKind::MtfAlignment
    }

    fn evaluate(&self, input: &ConfluenceInput<'_>, direction: Direction) -> FactorEvaluation {
        let Some(mtf) = input.mtf.filter(|m| !m.is_empty()) else {
            return FactorEvaluation::missing("no higher-timeframe data");
        };
        let agreement = mtf.agreement(direction);
        FactorEvaluation::new(
            agreement,
            format!("{:.0}% of {} timeframes {}", agreement * 100.0, mtf.labels.len(), direction),
        )
    }
}

/// Trend label plus the latest break in the trade direction
#[derive(Debug, Default)]
pub struct StructureFactor;

impl ConfluenceFactor for StructureFactor {
    fn kind(&self) -> FactorKind {
        FactorKind::Structure
    }

    fn evaluate(&self, input: &ConfluenceInput<'_>, direction: Direction) -> FactorEvaluation {
        let Some(structure) = input.structure else {
            return FactorEvaluation::missing("no structure");
        };
        if !structure.state.is_valid {
            return FactorEvaluation::missing("structure not established");
        }

        let mut strength = 0.0;
        let mut notes = Vec::new();
        if structure.trend() == direction {
            strength += 0.5;
            notes.push(format!("trend {}", direction));
        }
        if let Some(brk) = structure.last_break().filter(|b| b.direction == direction) {
            strength += match brk.kind {
                BreakKind::Bos => 0.5,
                BreakKind::Choch => 0.35,
            };
            notes.push(format!("{:?} at {:.4}", brk.kind, brk.level));
        }
        FactorEvaluation::new(strength, notes.join(", "))
    }
}

/// Price inside an active order block or FVG, helped by recent displacement
#[derive(Debug, Default)]
pub struct SmartMoneyFactor;

impl ConfluenceFactor for SmartMoneyFactor {
    fn kind(&self) -> FactorKind {
        FactorKind::SmartMoney
    }

    fn evaluate(&self, input: &ConfluenceInput<'_>, direction: Direction) -> FactorEvaluation {
        let (Some(smc), Some(price)) = (input.smc, input.price()) else {
            return FactorEvaluation::missing("no smart-money data");
        };

        let mut notes = Vec::new();
        let block = smc
            .active_order_blocks(direction)
            .into_iter()
            .find(|b| b.zone.contains(price));
        let block_part = block.map(|b| 0.5 * b.score / 100.0).unwrap_or(0.0);
        if let Some(b) = block {
            notes.push(format!("in {:?} OB ({:.0})", b.tier, b.score));
        }

        let in_fvg = smc.active_fvgs(direction).iter().any(|g| g.zone.contains(price));
        let fvg_part = if in_fvg {
            notes.push("in FVG".to_string());
            0.25
        } else {
            0.0
        };

        let recent = input.candles.len().saturating_sub(10);
        let displacement_part = smc
            .latest_displacement()
            .filter(|d| d.direction == direction && d.end_index >= recent)
            .map(|d| {
                notes.push(format!("displacement {:.0}", d.strength));
                0.25 * d.strength / 100.0
            })
            .unwrap_or(0.0);

        FactorEvaluation::new(block_part + fvg_part + displacement_part, notes.join(", "))
    }
}

/// Participation on the latest bar relative to its average
#[derive(Debug)]
pub struct VolumeFactor {
    pub lookback: usize,
}

impl Default for VolumeFactor {
    fn default() -> Self {
        Self { lookback: 20 }
    }
}

impl ConfluenceFactor for VolumeFactor {
    fn kind(&self) -> FactorKind {
        FactorKind::Volume
    }

    fn evaluate(&self, input: &ConfluenceInput<'_>, direction: Direction) -> FactorEvaluation {
        let Some(last) = input.candles.last() else {
            return FactorEvaluation::missing("no candles");
        };
        let avg = average_volume(input.candles, input.candles.len() - 1, self.lookback);
        let relative = safe_ratio(last.volume, avg);
        let base = ((relative - 0.8) / 1.2).clamp(0.0, 1.0);
        let strength = if last.direction() == direction { base } else { base * 0.5 };
        FactorEvaluation::new(strength, format!("volume {:.2}x average", relative))
    }
}

/// RSI regime, MACD histogram sign and pattern confirmation
#[derive(Debug)]
pub struct MomentumFactor {
    pub rsi_period: usize,
}

impl Default for MomentumFactor {
    fn default() -> Self {
        Self { rsi_period: 14 }
    }
}

impl ConfluenceFactor for MomentumFactor {
    fn kind(&self) -> FactorKind {
        FactorKind::Momentum
    }

    fn evaluate(&self, input: &ConfluenceInput<'_>, direction: Direction) -> FactorEvaluation {
        if input.candles.len() <= self.rsi_period || !direction.is_directional() {
            return FactorEvaluation::missing("not enough bars for momentum");
        }
        let closes: Vec<f64> = input.candles.iter().map(|c| c.close).collect();
        let rsi = rsi(&closes, self.rsi_period);
        let hist = macd(&closes, 12, 26, 9).histogram;

        let rsi_part = match direction {
            Direction::Bullish if (40.0..=70.0).contains(&rsi) => 0.4,
            Direction::Bullish if rsi < 30.0 => 0.3,
            Direction::Bearish if (30.0..=60.0).contains(&rsi) => 0.4,
            Direction::Bearish if rsi > 70.0 => 0.3,
            _ => 0.0,
        };
        let macd_part = if hist * direction.sign() > 0.0 { 0.4 } else { 0.0 };
        let bias = net_bias(input.patterns);
        let pattern_part = if f64::from(bias) * direction.sign() > 0.0 { 0.2 } else { 0.0 };

        FactorEvaluation::new(
            rsi_part + macd_part + pattern_part,
            format!("RSI {:.1}, MACD hist {:.4}, pattern bias {}", rsi, hist, bias),
        )
    }
}

/// Proximity to the protecting swing (support for longs, resistance for shorts)
#[derive(Debug)]
pub struct SupportResistanceFactor {
    /// Distance in ATRs at which the score reaches 0
    pub reach_atr: f64,
}

impl Default for SupportResistanceFactor {
    fn default() -> Self {
        Self { reach_atr: 1.5 }
    }
}

impl ConfluenceFactor for SupportResistanceFactor {
    fn kind(&self) -> FactorKind {
        FactorKind::SupportResistance
    }

    fn evaluate(&self, input: &ConfluenceInput<'_>, direction: Direction) -> FactorEvaluation {
        let (Some(structure), Some(price)) = (input.structure, input.price()) else {
            return FactorEvaluation::missing("no swings");
        };
        let reach = self.reach_atr * structure.atr;
        if reach <= 0.0 {
            return FactorEvaluation::missing("ATR unavailable");
        }

        let swings = &structure.swings.protected;
        let level = match direction {
            Direction::Bullish => swings
                .iter()
                .filter(|s| s.kind == SwingKind::Low && s.price <= price)
                .map(|s| s.price)
                .fold(None, |best: Option<f64>, p| Some(best.map_or(p, |b| b.max(p)))),
            Direction::Bearish => swings
                .iter()
                .filter(|s| s.kind == SwingKind::High && s.price >= price)
                .map(|s| s.price)
                .fold(None, |best: Option<f64>, p| Some(best.map_or(p, |b| b.min(p)))),
            Direction::Neutral => None,
        };

        match level {
            Some(level) => {
                let distance = (price - level).abs();
                FactorEvaluation::new(
                    1.0 - distance / reach,
                    format!("level {:.4} at {:.2} ATR", level, safe_ratio(distance, structure.atr)),
                )
            }
            None => FactorEvaluation::missing("no protecting swing"),
        }
    }
}

/// OTE / Golden Pocket of a same-direction leg, plus premium/discount location
#[derive(Debug, Default)]
pub struct FibonacciFactor;

impl ConfluenceFactor for FibonacciFactor {
    fn kind(&self) -> FactorKind {
        FactorKind::Fibonacci
    }

    fn evaluate(&self, input: &ConfluenceInput<'_>, direction: Direction) -> FactorEvaluation {
        let Some(fib) = input.fibonacci else {
            return FactorEvaluation::missing("no fibonacci context");
        };

        let mut strength = 0.0;
        let mut notes = Vec::new();
        let leg_aligned = fib.zones.as_ref().is_some_and(|z| z.direction == direction);
        if leg_aligned && fib.in_ote {
            strength += 0.6;
            notes.push("in OTE".to_string());
        }
        if leg_aligned && fib.in_golden_pocket {
            strength += 0.2;
            notes.push("in golden pocket".to_string());
        }
        if let Some(location) = fib.location.filter(|l| l.favours(direction)) {
            strength += 0.2;
            notes.push(format!("{:?}", location).to_lowercase());
        }
        FactorEvaluation::new(strength, notes.join(", "))
    }
}

/// Session of the latest bar, UTC: London 07-16, New York 12-21, Asia 00-07
#[derive(Debug, Default)]
pub struct SessionFactor;

impl ConfluenceFactor for SessionFactor {
    fn kind(&self) -> FactorKind {
        FactorKind::Session
    }

    fn evaluate(&self, input: &ConfluenceInput<'_>, _direction: Direction) -> FactorEvaluation {
        if !input.timeframe.is_some_and(|tf| tf.is_intraday()) {
            return FactorEvaluation::missing("session timing needs intraday bars");
        }
        let Some(time) = input.candles.last().and_then(|c| c.datetime()) else {
            return FactorEvaluation::missing("no timestamp");
        };

        let hour = time.hour();
        let london = (7..16).contains(&hour);
        let new_york = (12..21).contains(&hour);
        let (strength, session) = match (london, new_york) {
            (true, true) => (1.0, "london/new york overlap"),
            (true, false) => (0.6, "london"),
            (false, true) => (0.6, "new york"),
            _ if hour < 7 => (0.2, "asia"),
            _ => (0.0, "off-session"),
        };
        FactorEvaluation::new(strength, session.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confluence::MtfAlignment;
    use crate::market::fixtures::{candle, trending_up};
    use crate::market::Timeframe;
    use crate::structure::StructureAnalyzer;

    #[test]
    fn test_session_buckets() {
        // START_MS is midnight UTC; bar i is hour i
        let candles: Vec<_> = (0..24).map(|i| candle(i, 1.0, 1.0, 1.0, 1.0, 1.0)).collect();
        let at = |hour: usize| {
            let input = ConfluenceInput {
                candles: &candles[..=hour],
                timeframe: Some(Timeframe::H1),
                ..ConfluenceInput::default()
            };
            SessionFactor.evaluate(&input, Direction::Bullish).strength
        };
        assert_eq!(at(13), 1.0);
        assert_eq!(at(9), 0.6);
        assert_eq!(at(18), 0.6);
        assert_eq!(at(3), 0.2);
        assert_eq!(at(22), 0.0);

        let daily = ConfluenceInput {
            candles: &candles,
            timeframe: Some(Timeframe::D1),
            ..ConfluenceInput::default()
        };
        assert_eq!(SessionFactor.evaluate(&daily, Direction::Bullish).strength, 0.0);
    }

    #[test]
    fn test_mtf_factor() {
        let mtf = MtfAlignment::from_labels(vec![
            (Timeframe::H1, Direction::Bullish),
            (Timeframe::H4, Direction::Bullish),
            (Timeframe::D1, Direction::Bearish),
            (Timeframe::W1, Direction::Bullish),
        ]);
        let input = ConfluenceInput {
            mtf: Some(&mtf),
            ..ConfluenceInput::default()
        };
        assert!((MtfFactor.evaluate(&input, Direction::Bullish).strength - 0.75).abs() < 1e-9);
        assert_eq!(MtfFactor.evaluate(&ConfluenceInput::default(), Direction::Bullish).strength, 0.0);
    }

    #[test]
    fn test_structure_factor_uptrend() {
        let candles = trending_up(24);
        let structure = StructureAnalyzer::default().analyze(&candles).unwrap();
        let input = ConfluenceInput {
            candles: &candles,
            structure: Some(&structure),
            ..ConfluenceInput::default()
        };
        let bullish = StructureFactor.evaluate(&input, Direction::Bullish);
        let bearish = StructureFactor.evaluate(&input, Direction::Bearish);
        assert!(bullish.strength >= 0.5);
        assert!(bearish.strength < bullish.strength);
    }

    #[test]
    fn test_missing_inputs_score_zero() {
        let input = ConfluenceInput::default();
        for factor in crate::confluence::builtin_factors(&Default::default()) {
            let eval = factor.evaluate(&input, Direction::Bullish);
            assert_eq!(eval.strength, 0.0, "{:?}", factor.kind());
        }
    }
}
