//! Entry planning for a generated signal

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::{Error, Result};
use crate::fibonacci::{FibonacciAnalysis, Zone};
use crate::market::Direction;
use crate::risk::{build_take_profits, compute_stop, StopConfig, TakeProfitLevel, TakeProfitSpec};
use crate::smart_money::SmcAnalysis;
use crate::structure::{StructureAnalysis, SwingKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryConfig {
    /// Share filled at market; the rest rests at the best pullback zone
    pub market_allocation_pct: f64,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            market_allocation_pct: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    Market,
    OrderBlock,
    Ote,
    GoldenPocket,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryLeg {
    pub source: EntrySource,
    pub price: f64,
    /// Percent of the total position
    pub allocation_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPlan {
    pub direction: Direction,
    pub entries: Vec<EntryLeg>,
    pub average_entry: f64,
    pub stop_loss: f64,
    pub take_profits: Vec<TakeProfitLevel>,
}

impl EntryPlan {
    pub fn risk_per_unit(&self) -> f64 {
        (self.average_entry - self.stop_loss).abs()
    }

    /// Close-weighted R of the take-profit ladder
    pub fn reward_risk(&self) -> f64 {
        let total: f64 = self.take_profits.iter().map(|t| t.close_pct).sum();
        if total <= 0.0 {
            return 0.0;
        }
        self.take_profits
            .iter()
            .map(|t| t.r_multiple * t.close_pct)
            .sum::<f64>()
            / total
    }
}

impl fmt::Display for EntryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Entry Plan ({}):", self.direction)?;
        for leg in &self.entries {
            writeln!(f, "  {:?} @ {:.4} ({:.0}%)", leg.source, leg.price, leg.allocation_pct)?;
        }
        writeln!(f, "  Average entry: {:.4}", self.average_entry)?;
        writeln!(f, "  Stop: {:.4} (risk {:.4}/unit)", self.stop_loss, self.risk_per_unit())?;
        for (i, tp) in self.take_profits.iter().enumerate() {
            writeln!(
                f,
                "  TP{}: {:.4} ({:.1}R, close {:.0}%)",
                i + 1,
                tp.price,
                tp.r_multiple,
                tp.close_pct
            )?;
        }
        write!(f, "  Reward/risk: {:.2}R", self.reward_risk())
    }
}

/// Zone the limit leg rests in, with its protective edge
struct PullbackZone {
    source: EntrySource,
    price: f64,
    invalidation: f64,
}

#[derive(Debug, Clone)]
pub struct EntryPlanner {
    config: EntryConfig,
    stops: StopConfig,
    take_profits: Vec<TakeProfitSpec>,
}

impl EntryPlanner {
    pub fn new(config: EntryConfig, stops: StopConfig, take_profits: Vec<TakeProfitSpec>) -> Self {
        Self {
            config,
            stops,
            take_profits,
        }
    }

    fn pullback_zone(
        &self,
        direction: Direction,
        price: f64,
        smc: Option<&SmcAnalysis>,
        fibonacci: Option<&FibonacciAnalysis>,
    ) -> Option<PullbackZone> {
        let sign = direction.sign();
        // proximal edge for blocks, midpoint for fib bands
        let candidate = |source: EntrySource, zone: &Zone, price_in_zone: f64| {
            let invalidation = if sign > 0.0 { zone.bottom } else { zone.top };
            PullbackZone {
                source,
                price: price_in_zone,
                invalidation,
            }
        };
        let better_than_market = |p: &PullbackZone| (price - p.price) * sign > 0.0;

        let from_blocks = smc.and_then(|smc| {
            smc.active_order_blocks(direction)
                .into_iter()
                .map(|b| {
                    let proximal = if sign > 0.0 { b.zone.top } else { b.zone.bottom };
                    candidate(EntrySource::OrderBlock, &b.zone, proximal)
                })
                .find(better_than_market)
        });

        let from_fib = || {
            let zones = fibonacci?.zones.as_ref()?;
            if zones.direction != direction {
                return None;
            }
            [
                (EntrySource::GoldenPocket, &zones.golden_pocket),
                (EntrySource::Ote, &zones.ote),
            ]
            .into_iter()
            .filter(|(_, z)| z.mitigation.is_usable())
            .map(|(source, z)| candidate(source, z, z.midpoint()))
            .find(better_than_market)
        };

        from_blocks.or_else(from_fib)
    }

    /// Protecting swing for structure stops: latest swing on the far side
    fn structure_level(direction: Direction, price: f64, structure: Option<&StructureAnalysis>) -> Option<f64> {
        let kind = if direction == Direction::Bullish {
            SwingKind::Low
        } else {
            SwingKind::High
        };
        structure?
            .swings
            .protected
            .iter()
            .rev()
            .find(|s| s.kind == kind && (price - s.price) * direction.sign() > 0.0)
            .map(|s| s.price)
    }

    pub fn plan(
        &self,
        direction: Direction,
        price: f64,
        atr: Option<f64>,
        structure: Option<&StructureAnalysis>,
        smc: Option<&SmcAnalysis>,
        fibonacci: Option<&FibonacciAnalysis>,
    ) -> Result<EntryPlan> {
        if !direction.is_directional() {
            return Err(Error::InvalidInput("entry plan requires a direction".into()));
        }
        if !(price > 0.0 && price.is_finite()) {
            return Err(Error::InvalidInput(format!("invalid market price {}", price)));
        }

        let market_pct = self.config.market_allocation_pct.clamp(0.0, 100.0);
        let zone = self.pullback_zone(direction, price, smc, fibonacci);

        let entries = match &zone {
            Some(z) if market_pct < 100.0 => vec![
                EntryLeg {
                    source: EntrySource::Market,
                    price,
                    allocation_pct: market_pct,
                },
                EntryLeg {
                    source: z.source,
                    price: z.price,
                    allocation_pct: 100.0 - market_pct,
                },
            ],
            _ => vec![EntryLeg {
                source: EntrySource::Market,
                price,
                allocation_pct: 100.0,
            }],
        };
        let entries: Vec<EntryLeg> = entries.into_iter().filter(|e| e.allocation_pct > 0.0).collect();

        let total: f64 = entries.iter().map(|e| e.allocation_pct).sum();
        let average_entry = entries.iter().map(|e| e.price * e.allocation_pct).sum::<f64>() / total;

        // stop protects the deepest fill
        let sign = direction.sign();
        let deepest = entries
            .iter()
            .map(|e| e.price)
            .fold(price, |acc, p| if (acc - p) * sign > 0.0 { p } else { acc });
        let level = zone
            .as_ref()
            .filter(|z| z.source == EntrySource::OrderBlock)
            .map(|z| z.invalidation)
            .or_else(|| Self::structure_level(direction, deepest, structure));
        let stop_loss = compute_stop(direction, deepest, atr, level, &self.stops)?;

        let take_profits = build_take_profits(direction, average_entry, stop_loss, &self.take_profits)?;

        let plan = EntryPlan {
            direction,
            entries,
            average_entry,
            stop_loss,
            take_profits,
        };
        debug!(
            "Planned {} entry avg {:.4}, stop {:.4}, {} legs",
            direction,
            plan.average_entry,
            plan.stop_loss,
            plan.entries.len()
        );
        Ok(plan)
    }
}

impl Default for EntryPlanner {
    fn default() -> Self {
        Self::new(
            EntryConfig::default(),
            StopConfig::default(),
            TakeProfitSpec::default_ladder(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fibonacci::{calculate_zones, OteMode, ZoneKind};
    use crate::smart_money::{ObTier, OrderBlock};

    fn bullish_fib(price: f64) -> FibonacciAnalysis {
        FibonacciAnalysis {
            zones: Some(calculate_zones(100.0, 200.0, OteMode::Standard).unwrap()),
            range: None,
            price,
            in_ote: false,
            in_golden_pocket: false,
            location: None,
        }
    }

    fn block(bottom: f64, top: f64) -> SmcAnalysis {
        SmcAnalysis {
            order_blocks: vec![OrderBlock {
                zone: Zone::new(ZoneKind::OrderBlock, bottom, top, Direction::Bullish),
                tier: ObTier::Strong,
                score: 80.0,
                creation_score: 80.0,
                follow_through_score: 80.0,
                location_score: 80.0,
                index: 12,
                pivot_index: 10,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_market_only_without_zone() {
        let plan = EntryPlanner::default()
            .plan(Direction::Bullish, 100.0, Some(2.0), None, None, None)
            .unwrap();
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].allocation_pct, 100.0);
        assert!((plan.stop_loss - 97.0).abs() < 1e-9);
        assert_eq!(plan.take_profits.len(), 3);
        assert!((plan.take_profits[0].price - 103.0).abs() < 1e-9);
    }

    #[test]
    fn test_split_entry_into_golden_pocket() {
        // price 160 sits above the golden pocket [135.0, 138.2]
        let fib = bullish_fib(160.0);
        let plan = EntryPlanner::default()
            .plan(Direction::Bullish, 160.0, Some(2.0), None, None, Some(&fib))
            .unwrap();
        assert_eq!(plan.entries.len(), 2);
        let limit = plan.entries[1];
        assert_eq!(limit.source, EntrySource::GoldenPocket);
        assert!((limit.price - 136.6).abs() < 1e-9);
        assert!((plan.average_entry - (160.0 + 136.6) / 2.0).abs() < 1e-9);
        // stop below the deepest fill
        assert!((plan.stop_loss - (136.6 - 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_order_block_preferred_and_structure_stop() {
        let smc = block(101.0, 106.0);
        let planner = EntryPlanner::new(
            EntryConfig::default(),
            StopConfig {
                mode: crate::risk::StopLossMode::Structure,
                ..StopConfig::default()
            },
            TakeProfitSpec::default_ladder(),
        );
        let plan = planner
            .plan(Direction::Bullish, 110.0, Some(1.0), None, Some(&smc), Some(&bullish_fib(110.0)))
            .unwrap();
        assert_eq!(plan.entries[1].source, EntrySource::OrderBlock);
        assert_eq!(plan.entries[1].price, 106.0);
        // block bottom 101 minus 0.2 ATR
        assert!((plan.stop_loss - 100.8).abs() < 1e-9);
        assert!(plan.reward_risk() > 1.9 && plan.reward_risk() < 2.1);
    }

    #[test]
    fn test_zone_above_price_is_skipped_for_longs() {
        let smc = block(120.0, 125.0);
        let plan = EntryPlanner::default()
            .plan(Direction::Bullish, 110.0, Some(1.0), None, Some(&smc), None)
            .unwrap();
        assert_eq!(plan.entries.len(), 1);
    }

    #[test]
    fn test_neutral_direction_rejected() {
        assert!(EntryPlanner::default()
            .plan(Direction::Neutral, 100.0, None, None, None, None)
            .is_err());
    }
}
