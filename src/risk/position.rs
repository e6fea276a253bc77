//! Position lifecycle.
//!
//! Price updates go through `step`, which returns the next position snapshot
//! and the events it produced. Priority on each update:
//! 1. stop hit closes the remainder
//! 2. breakeven moves the stop to entry + buffer (only if that tightens it)
//! 3. trailing stop ratchets in the favourable direction only
//! 4. take-profit rungs close their share, each at most once

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stops::TakeProfitLevel;
use crate::market::Direction;

const QTY_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Partial,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakevenConfig {
    pub enabled: bool,
    /// Profit in R that activates breakeven
    pub activation_r: f64,
    /// Stop placed this far past entry, percent of entry
    pub buffer_pct: f64,
}

impl Default for BreakevenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            activation_r: 1.0,
            buffer_pct: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailingConfig {
    pub enabled: bool,
    /// Profit in R that arms the trail
    pub activation_r: f64,
    /// Trail distance in ATRs when ATR is known
    pub distance_atr: f64,
    /// Trail distance as percent of the best price otherwise
    pub distance_pct: f64,
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            activation_r: 1.5,
            distance_atr: 2.0,
            distance_pct: 1.5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionRules {
    pub breakeven: BreakevenConfig,
    pub trailing: TrailingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub direction: Direction,
    pub entry: f64,
    pub stop_loss: f64,
    pub initial_stop: f64,
    pub quantity: f64,
    pub initial_quantity: f64,
    pub take_profit_levels: Vec<TakeProfitLevel>,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    pub realized_pnl: f64,
    /// Best price seen in the trade direction
    pub best_price: f64,
    pub breakeven_active: bool,
    pub trailing_active: bool,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub correlation_group: Option<String>,
}

impl Position {
    pub fn open(
        symbol: &str,
        direction: Direction,
        entry: f64,
        stop_loss: f64,
        quantity: f64,
        take_profit_levels: Vec<TakeProfitLevel>,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            direction,
            entry,
            stop_loss,
            initial_stop: stop_loss,
            quantity,
            initial_quantity: quantity,
            take_profit_levels,
            status: PositionStatus::Open,
            opened_at,
            realized_pnl: 0.0,
            best_price: entry,
            breakeven_active: false,
            trailing_active: false,
            sector: None,
            correlation_group: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == PositionStatus::Closed
    }

    /// Per-unit distance between entry and the initial stop
    pub fn risk_per_unit(&self) -> f64 {
        (self.entry - self.initial_stop).abs()
    }

    /// Money at risk when the position was opened
    pub fn initial_risk(&self) -> f64 {
        self.risk_per_unit() * self.initial_quantity
    }

    /// Open notional at entry
    pub fn notional(&self) -> f64 {
        self.entry * self.quantity
    }

    /// Unrealized profit in R at `price`
    pub fn r_multiple(&self, price: f64) -> f64 {
        let risk = self.risk_per_unit();
        if risk <= 0.0 {
            return 0.0;
        }
        (price - self.entry) * self.direction.sign() / risk
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        (price - self.entry) * self.direction.sign() * self.quantity
    }

    fn stop_hit(&self, price: f64) -> bool {
        match self.direction {
            Direction::Bullish => price <= self.stop_loss,
            Direction::Bearish => price >= self.stop_loss,
            Direction::Neutral => false,
        }
    }

    /// Whether `candidate` is tighter (more protective) than the current stop
    fn improves_stop(&self, candidate: f64) -> bool {
        (candidate - self.stop_loss) * self.direction.sign() > 0.0
    }

    fn close_quantity(&mut self, quantity: f64, price: f64) -> f64 {
        let qty = quantity.min(self.quantity).max(0.0);
        let pnl = (price - self.entry) * self.direction.sign() * qty;
        self.quantity -= qty;
        self.realized_pnl += pnl;
        if self.quantity <= QTY_EPSILON {
            self.quantity = 0.0;
            self.status = PositionStatus::Closed;
        } else {
            self.status = PositionStatus::Partial;
        }
        pnl
    }

    /// Close the remainder manually
    pub fn close_all(&self, price: f64) -> StepOutcome {
        let mut next = self.clone();
        let quantity = next.quantity;
        let pnl = next.close_quantity(quantity, price);
        StepOutcome {
            position: next,
            events: vec![PositionEvent::Closed {
                reason: ExitReason::Manual,
                price,
                quantity,
                pnl,
            }],
        }
    }
}

/// Audit record of a lifecycle transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum PositionEvent {
    Closed { reason: ExitReason, price: f64, quantity: f64, pnl: f64 },
    BreakevenActivated { old_stop: f64, new_stop: f64 },
    TrailingStopMoved { old_stop: f64, new_stop: f64 },
    TakeProfitHit { level: usize, price: f64, quantity: f64, pnl: f64 },
}

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub position: Position,
    pub events: Vec<PositionEvent>,
}

impl StepOutcome {
    /// PnL realized by this step
    pub fn realized(&self) -> f64 {
        self.events
            .iter()
            .map(|e| match e {
                PositionEvent::Closed { pnl, .. } | PositionEvent::TakeProfitHit { pnl, .. } => *pnl,
                _ => 0.0,
            })
            .sum()
    }
}

/// Apply one price update. `atr` sizes the trailing distance when known.
pub fn step(position: &Position, price: f64, atr: Option<f64>, rules: &PositionRules) -> StepOutcome {
    let mut next = position.clone();
    let mut events = Vec::new();

    if next.is_closed() || !price.is_finite() || !next.direction.is_directional() {
        return StepOutcome { position: next, events };
    }

    let sign = next.direction.sign();
    if (price - next.best_price) * sign > 0.0 {
        next.best_price = price;
    }

    // 1. stop
    if next.stop_hit(price) {
        let quantity = next.quantity;
        let pnl = next.close_quantity(quantity, price);
        events.push(PositionEvent::Closed {
            reason: ExitReason::StopLoss,
            price,
            quantity,
            pnl,
        });
        return StepOutcome { position: next, events };
    }

    let r = next.r_multiple(price);

    // 2. breakeven
    if rules.breakeven.enabled && !next.breakeven_active && r >= rules.breakeven.activation_r {
        next.breakeven_active = true;
        let candidate = next.entry * (1.0 + sign * rules.breakeven.buffer_pct / 100.0);
        if next.improves_stop(candidate) {
            events.push(PositionEvent::BreakevenActivated {
                old_stop: next.stop_loss,
                new_stop: candidate,
            });
            next.stop_loss = candidate;
        }
    }

    // 3. trailing
    if rules.trailing.enabled && (next.trailing_active || r >= rules.trailing.activation_r) {
        next.trailing_active = true;
        let distance = match atr.filter(|a| *a > 0.0) {
            Some(a) => a * rules.trailing.distance_atr,
            None => next.best_price * rules.trailing.distance_pct / 100.0,
        };
        let candidate = next.best_price - sign * distance;
        if next.improves_stop(candidate) {
            events.push(PositionEvent::TrailingStopMoved {
                old_stop: next.stop_loss,
                new_stop: candidate,
            });
            next.stop_loss = candidate;
        }
    }

    // 4. take-profits
    for i in 0..next.take_profit_levels.len() {
        let level = next.take_profit_levels[i];
        if level.filled || (price - level.price) * sign < 0.0 {
            continue;
        }
        next.take_profit_levels[i].filled = true;
        let quantity = (next.initial_quantity * level.close_pct / 100.0).min(next.quantity);
        let pnl = next.close_quantity(quantity, price);
        events.push(PositionEvent::TakeProfitHit {
            level: i,
            price,
            quantity,
            pnl,
        });
        if next.is_closed() {
            break;
        }
    }

    StepOutcome { position: next, events }
}

/// Archived position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub id: String,
    pub symbol: String,
    pub direction: Direction,
    pub entry: f64,
    pub exit: f64,
    pub quantity: f64,
    pub pnl: f64,
    /// PnL over initial risk
    pub r_multiple: f64,
    /// PnL over entry notional
    pub return_pct: f64,
    pub exit_reason: ExitReason,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

impl ClosedTrade {
    pub fn from_position(position: &Position, exit: f64, exit_reason: ExitReason, closed_at: DateTime<Utc>) -> Self {
        let initial_risk = position.initial_risk();
        let notional = position.entry * position.initial_quantity;
        Self {
            id: position.id.clone(),
            symbol: position.symbol.clone(),
            direction: position.direction,
            entry: position.entry,
            exit,
            quantity: position.initial_quantity,
            pnl: position.realized_pnl,
            r_multiple: if initial_risk > 0.0 { position.realized_pnl / initial_risk } else { 0.0 },
            return_pct: if notional > 0.0 { position.realized_pnl / notional * 100.0 } else { 0.0 },
            exit_reason,
            opened_at: position.opened_at,
            closed_at,
        }
    }

    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}
