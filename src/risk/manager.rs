//! Risk Manager
//!
//! Process-lifetime ledger: capital, open positions, closed trades, drawdown
//! state and daily/weekly risk counters. Gates new trades, sizes them and
//! applies price updates through the position transition.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

use super::drawdown::{DrawdownConfig, DrawdownState, DrawdownZone};
use super::ledger::LedgerSnapshot;
use super::performance::PerformanceStats;
use super::position::{step, ClosedTrade, ExitReason, Position, PositionEvent, PositionRules, StepOutcome};
use super::sizing::{PositionSizer, SizeExplanation, SizingConfig, SizingContext};
use super::stops::{build_take_profits, StopConfig, TakeProfitSpec};
use super::RiskRejection;
use crate::error::{Error, Result};
use crate::market::Direction;

/// Configuration for risk management
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub initial_capital: f64,
    pub sizing: SizingConfig,
    /// Maximum concurrent open positions
    pub max_open_positions: usize,
    /// Max notional per sector, fraction of capital
    pub max_sector_exposure: f64,
    /// Max notional per correlation group, fraction of capital
    pub max_correlated_exposure: f64,
    /// Risk that may be committed per UTC day, percent of capital
    pub daily_risk_budget_pct: f64,
    /// Risk that may be committed per ISO week, percent of capital
    pub weekly_risk_budget_pct: f64,
    pub drawdown: DrawdownConfig,
    pub stops: StopConfig,
    pub rules: PositionRules,
    pub take_profits: Vec<TakeProfitSpec>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            sizing: SizingConfig::default(),
            max_open_positions: 5,
            max_sector_exposure: 0.40,
            max_correlated_exposure: 0.30,
            daily_risk_budget_pct: 3.0,
            weekly_risk_budget_pct: 6.0,
            drawdown: DrawdownConfig::default(),
            stops: StopConfig::default(),
            rules: PositionRules::default(),
            take_profits: TakeProfitSpec::default_ladder(),
        }
    }
}

/// A trade the caller wants to open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub symbol: String,
    pub direction: Direction,
    pub entry: f64,
    pub stop_loss: f64,
    /// Setup confidence in [0, 1]
    pub confidence: f64,
    pub atr: Option<f64>,
    pub sector: Option<String>,
    pub correlation_group: Option<String>,
}

impl TradeRequest {
    pub fn new(symbol: &str, direction: Direction, entry: f64, stop_loss: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            direction,
            entry,
            stop_loss,
            confidence: 0.5,
            atr: None,
            sector: None,
            correlation_group: None,
        }
    }

    fn validate(&self) -> std::result::Result<(), RiskRejection> {
        let invalid = |reason: &str| {
            Err(RiskRejection::InvalidSize {
                reason: reason.to_string(),
            })
        };
        if !self.direction.is_directional() {
            return invalid("trade has no direction");
        }
        if !(self.entry > 0.0 && self.entry.is_finite() && self.stop_loss.is_finite()) {
            return invalid("entry and stop must be positive prices");
        }
        if (self.entry - self.stop_loss) * self.direction.sign() <= 0.0 {
            return invalid("stop is not on the protective side of entry");
        }
        Ok(())
    }
}

/// Risk committed and PnL realized in the current UTC day and ISO week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodCounters {
    pub day: NaiveDate,
    pub iso_year: i32,
    pub iso_week: u32,
    pub daily_risk_used: f64,
    pub weekly_risk_used: f64,
    pub daily_pnl: f64,
    pub weekly_pnl: f64,
}

impl PeriodCounters {
    pub fn new(now: DateTime<Utc>) -> Self {
        let day = now.date_naive();
        let week = day.iso_week();
        Self {
            day,
            iso_year: week.year(),
            iso_week: week.week(),
            daily_risk_used: 0.0,
            weekly_risk_used: 0.0,
            daily_pnl: 0.0,
            weekly_pnl: 0.0,
        }
    }

    /// Counters as seen at `now`, with rolled-over periods zeroed
    pub fn rolled(&self, now: DateTime<Utc>) -> Self {
        let day = now.date_naive();
        let week = day.iso_week();
        let mut next = self.clone();
        if day != self.day {
            next.day = day;
            next.daily_risk_used = 0.0;
            next.daily_pnl = 0.0;
        }
        if (week.year(), week.week()) != (self.iso_year, self.iso_week) {
            next.iso_year = week.year();
            next.iso_week = week.week();
            next.weekly_risk_used = 0.0;
            next.weekly_pnl = 0.0;
        }
        next
    }

    pub fn roll(&mut self, now: DateTime<Utc>) {
        let next = self.rolled(now);
        if next.day != self.day {
            info!(
                "Daily reset: previous day PnL {:.2}, risk used {:.2}",
                self.daily_pnl, self.daily_risk_used
            );
        }
        *self = next;
    }

    pub fn record_risk(&mut self, amount: f64) {
        self.daily_risk_used += amount;
        self.weekly_risk_used += amount;
    }

    pub fn record_pnl(&mut self, pnl: f64) {
        self.daily_pnl += pnl;
        self.weekly_pnl += pnl;
    }
}

/// Current ledger state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskStatus {
    pub capital: f64,
    pub peak_equity: f64,
    pub drawdown: f64,
    pub zone: DrawdownZone,
    pub paused_until: Option<DateTime<Utc>>,
    pub open_positions: usize,
    pub max_open_positions: usize,
    pub total_exposure: f64,
    /// Money lost if every open stop is hit
    pub open_risk: f64,
    pub daily_risk_used: f64,
    pub daily_risk_budget: f64,
    pub weekly_risk_used: f64,
    pub weekly_risk_budget: f64,
    pub daily_pnl: f64,
    pub weekly_pnl: f64,
    pub can_open_new: bool,
    pub reason_if_blocked: Option<String>,
    pub performance: PerformanceStats,
}

impl fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Risk Status:")?;
        writeln!(f, "  Capital: {:.2} (peak {:.2})", self.capital, self.peak_equity)?;
        writeln!(f, "  Drawdown: {:.2}% [{:?}]", self.drawdown * 100.0, self.zone)?;
        if let Some(until) = self.paused_until {
            writeln!(f, "  Paused until: {}", until)?;
        }
        writeln!(
            f,
            "  Positions: {}/{} (exposure {:.2}, open risk {:.2})",
            self.open_positions, self.max_open_positions, self.total_exposure, self.open_risk
        )?;
        writeln!(
            f,
            "  Daily risk: {:.2}/{:.2}  Weekly risk: {:.2}/{:.2}",
            self.daily_risk_used, self.daily_risk_budget, self.weekly_risk_used, self.weekly_risk_budget
        )?;
        writeln!(f, "  PnL today: {:.2}  this week: {:.2}", self.daily_pnl, self.weekly_pnl)?;
        match &self.reason_if_blocked {
            Some(reason) => writeln!(f, "  New trades: blocked ({})", reason)?,
            None => writeln!(f, "  New trades: allowed")?,
        }
        write!(f, "{}", self.performance)
    }
}

/// Risk Manager
#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
    sizer: PositionSizer,
    /// Realized equity
    capital: f64,
    positions: HashMap<String, Position>,
    closed_trades: Vec<ClosedTrade>,
    drawdown: DrawdownState,
    counters: PeriodCounters,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        let capital = config.initial_capital;
        Self {
            sizer: PositionSizer::new(config.sizing.clone()),
            capital,
            positions: HashMap::new(),
            closed_trades: Vec::new(),
            drawdown: DrawdownState::new(capital),
            counters: PeriodCounters::new(Utc::now()),
            config,
        }
    }

    /// Rebuild the ledger from a snapshot
    pub fn restore(config: RiskConfig, snapshot: LedgerSnapshot) -> Self {
        let positions = snapshot
            .positions
            .into_iter()
            .filter(|p| !p.is_closed())
            .map(|p| (p.id.clone(), p))
            .collect();
        Self {
            sizer: PositionSizer::new(config.sizing.clone()),
            capital: snapshot.capital,
            positions,
            closed_trades: snapshot.closed_trades,
            drawdown: snapshot.drawdown,
            counters: snapshot.counters,
            config,
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> LedgerSnapshot {
        let mut positions: Vec<Position> = self.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then_with(|| a.id.cmp(&b.id)));
        LedgerSnapshot {
            version: LedgerSnapshot::VERSION,
            saved_at: now,
            capital: self.capital,
            positions,
            closed_trades: self.closed_trades.clone(),
            drawdown: self.drawdown.clone(),
            counters: self.counters.clone(),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn capital(&self) -> f64 {
        self.capital
    }

    pub fn drawdown(&self) -> &DrawdownState {
        &self.drawdown
    }

    pub fn counters(&self) -> &PeriodCounters {
        &self.counters
    }

    pub fn position(&self, id: &str) -> Option<&Position> {
        self.positions.get(id)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed_trades
    }

    pub fn performance(&self) -> PerformanceStats {
        PerformanceStats::from_trades(&self.closed_trades)
    }

    pub fn daily_budget(&self) -> f64 {
        self.capital.max(0.0) * self.config.daily_risk_budget_pct / 100.0
    }

    pub fn weekly_budget(&self) -> f64 {
        self.capital.max(0.0) * self.config.weekly_risk_budget_pct / 100.0
    }

    /// Risk still available under both the daily and weekly budgets
    pub fn risk_budget_remaining(&self, now: DateTime<Utc>) -> f64 {
        let counters = self.counters.rolled(now);
        let daily = self.daily_budget() - counters.daily_risk_used;
        let weekly = self.weekly_budget() - counters.weekly_risk_used;
        daily.min(weekly).max(0.0)
    }

    fn exposure_where(&self, pred: impl Fn(&Position) -> bool) -> f64 {
        self.positions.values().filter(|p| pred(*p)).map(|p| p.notional()).sum()
    }

    /// Checks that do not depend on the trade itself
    fn gate(&self, now: DateTime<Utc>) -> std::result::Result<(), RiskRejection> {
        if self.drawdown.is_paused(now) {
            return Err(RiskRejection::DrawdownPause {
                resume_in_secs: self.drawdown.resume_in_secs(now),
            });
        }

        let counters = self.counters.rolled(now);
        let daily_budget = self.daily_budget();
        if counters.daily_risk_used >= daily_budget {
            return Err(RiskRejection::RiskBudgetExceeded {
                period: "daily".into(),
                used: counters.daily_risk_used,
                budget: daily_budget,
            });
        }
        let weekly_budget = self.weekly_budget();
        if counters.weekly_risk_used >= weekly_budget {
            return Err(RiskRejection::RiskBudgetExceeded {
                period: "weekly".into(),
                used: counters.weekly_risk_used,
                budget: weekly_budget,
            });
        }

        if self.positions.len() >= self.config.max_open_positions {
            return Err(RiskRejection::MaxPositions {
                current: self.positions.len(),
                max: self.config.max_open_positions,
            });
        }
        Ok(())
    }

    /// Check whether `request` may be opened and how large it would be
    pub fn can_open_trade(
        &self,
        request: &TradeRequest,
        now: DateTime<Utc>,
    ) -> std::result::Result<SizeExplanation, RiskRejection> {
        self.gate(now)?;

        if self.positions.values().any(|p| p.symbol == request.symbol) {
            return Err(RiskRejection::SymbolAlreadyOpen {
                symbol: request.symbol.clone(),
            });
        }

        request.validate()?;
        let sizing = self.sizer.explain_size(&SizingContext {
            equity: self.capital,
            entry: request.entry,
            stop: request.stop_loss,
            confidence: request.confidence,
            atr: request.atr,
            drawdown_multiplier: self.drawdown.size_multiplier(now, &self.config.drawdown),
            risk_budget_remaining: self.risk_budget_remaining(now),
            history: &self.closed_trades,
        });
        if !sizing.is_tradeable() {
            return Err(RiskRejection::InvalidSize {
                reason: "computed quantity is zero".into(),
            });
        }

        if let Some(sector) = &request.sector {
            let existing = self.exposure_where(|p| p.sector.as_ref() == Some(sector));
            let exposure = (existing + sizing.notional) / self.capital;
            if exposure > self.config.max_sector_exposure {
                return Err(RiskRejection::SectorExposure {
                    sector: sector.clone(),
                    exposure,
                    max: self.config.max_sector_exposure,
                });
            }
        }

        if let Some(group) = &request.correlation_group {
            let existing = self.exposure_where(|p| p.correlation_group.as_ref() == Some(group));
            let exposure = (existing + sizing.notional) / self.capital;
            if exposure > self.config.max_correlated_exposure {
                return Err(RiskRejection::CorrelatedExposure {
                    group: group.clone(),
                    exposure,
                    max: self.config.max_correlated_exposure,
                });
            }
        }

        Ok(sizing)
    }

    /// Gate, size and register a new position
    pub fn open_position(&mut self, request: &TradeRequest, now: DateTime<Utc>) -> Result<Position> {
        self.counters.roll(now);

        let sizing = self.can_open_trade(request, now).map_err(|rejection| {
            warn!("Trade on {} rejected: {}", request.symbol, rejection);
            Error::RiskRejected(rejection)
        })?;
        debug!("{}", sizing);

        let take_profits = build_take_profits(
            request.direction,
            request.entry,
            request.stop_loss,
            &self.config.take_profits,
        )?;

        let mut position = Position::open(
            &request.symbol,
            request.direction,
            request.entry,
            request.stop_loss,
            sizing.quantity,
            take_profits,
            now,
        );
        position.sector = request.sector.clone();
        position.correlation_group = request.correlation_group.clone();

        self.counters.record_risk(position.initial_risk());
        info!(
            "Opened {} {} qty {:.6} @ {:.4} stop {:.4} (risk {:.2})",
            position.direction,
            position.symbol,
            position.quantity,
            position.entry,
            position.stop_loss,
            position.initial_risk()
        );

        self.positions.insert(position.id.clone(), position.clone());
        Ok(position)
    }

    /// Apply a mark price to one position
    pub fn update_price(
        &mut self,
        id: &str,
        price: f64,
        atr: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<StepOutcome> {
        let position = self
            .positions
            .get(id)
            .ok_or_else(|| Error::PositionNotFound(id.to_string()))?;
        let outcome = step(position, price, atr, &self.config.rules);
        self.apply_outcome(&outcome, price, now);
        Ok(outcome)
    }

    /// Apply a mark price to every open position on `symbol`
    pub fn update_symbol(&mut self, symbol: &str, price: f64, atr: Option<f64>, now: DateTime<Utc>) -> Vec<StepOutcome> {
        let ids: Vec<String> = self
            .positions
            .values()
            .filter(|p| p.symbol == symbol)
            .map(|p| p.id.clone())
            .collect();
        ids.iter()
            .filter_map(|id| self.update_price(id, price, atr, now).ok())
            .collect()
    }

    /// Close the remainder of a position at `price`
    pub fn close_position(&mut self, id: &str, price: f64, now: DateTime<Utc>) -> Result<ClosedTrade> {
        let position = self
            .positions
            .get(id)
            .ok_or_else(|| Error::PositionNotFound(id.to_string()))?;
        let outcome = position.close_all(price);
        self.apply_outcome(&outcome, price, now)
            .ok_or_else(|| Error::Internal(format!("position {} did not close", id)))
    }

    /// Book realized PnL and recompute drawdown
    pub fn record_pnl(&mut self, pnl: f64, now: DateTime<Utc>) {
        self.capital += pnl;
        self.counters.roll(now);
        self.counters.record_pnl(pnl);
        self.drawdown = self.drawdown.recompute(self.capital, now, &self.config.drawdown);
    }

    fn apply_outcome(&mut self, outcome: &StepOutcome, price: f64, now: DateTime<Utc>) -> Option<ClosedTrade> {
        let position = &outcome.position;
        for event in &outcome.events {
            match event {
                PositionEvent::Closed { reason, pnl, .. } => {
                    info!("{} closed ({:?}) @ {:.4}, PnL {:.2}", position.symbol, reason, price, pnl)
                }
                PositionEvent::TakeProfitHit { level, quantity, pnl, .. } => info!(
                    "{} TP{} hit @ {:.4}: closed {:.6}, PnL {:.2}",
                    position.symbol,
                    level + 1,
                    price,
                    quantity,
                    pnl
                ),
                PositionEvent::BreakevenActivated { new_stop, .. } => {
                    info!("{} breakeven: stop -> {:.4}", position.symbol, new_stop)
                }
                PositionEvent::TrailingStopMoved { new_stop, .. } => {
                    debug!("{} trailing stop -> {:.4}", position.symbol, new_stop)
                }
            }
        }

        let realized = outcome.realized();
        if realized != 0.0 {
            self.record_pnl(realized, now);
        }

        if !position.is_closed() {
            self.positions.insert(position.id.clone(), position.clone());
            return None;
        }

        let reason = outcome
            .events
            .iter()
            .rev()
            .find_map(|e| match e {
                PositionEvent::Closed { reason, .. } => Some(*reason),
                PositionEvent::TakeProfitHit { .. } => Some(ExitReason::TakeProfit),
                _ => None,
            })
            .unwrap_or(ExitReason::Manual);

        self.positions.remove(&position.id);
        let trade = ClosedTrade::from_position(position, price, reason, now);
        info!(
            "Archived {} trade: PnL {:.2} ({:.2}R)",
            trade.symbol, trade.pnl, trade.r_multiple
        );
        self.closed_trades.push(trade.clone());
        Some(trade)
    }

    pub fn status(&self, now: DateTime<Utc>) -> RiskStatus {
        let counters = self.counters.rolled(now);
        let gate = self.gate(now);
        let open_risk = self
            .positions
            .values()
            .map(|p| ((p.entry - p.stop_loss) * p.direction.sign()).max(0.0) * p.quantity)
            .sum();

        RiskStatus {
            capital: self.capital,
            peak_equity: self.drawdown.peak_equity,
            drawdown: self.drawdown.drawdown,
            zone: self.drawdown.zone,
            paused_until: self.drawdown.paused_until.filter(|u| *u > now),
            open_positions: self.positions.len(),
            max_open_positions: self.config.max_open_positions,
            total_exposure: self.exposure_where(|_| true),
            open_risk,
            daily_risk_used: counters.daily_risk_used,
            daily_risk_budget: self.daily_budget(),
            weekly_risk_used: counters.weekly_risk_used,
            weekly_risk_budget: self.weekly_budget(),
            daily_pnl: counters.daily_pnl,
            weekly_pnl: counters.weekly_pnl,
            can_open_new: gate.is_ok(),
            reason_if_blocked: gate.err().map(|r| r.description()),
            performance: self.performance(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    // entry 100, stop 90: 1% of 10k risks 100 => 10 units, 1000 notional
    fn make_request(symbol: &str) -> TradeRequest {
        TradeRequest::new(symbol, Direction::Bullish, 100.0, 90.0)
    }

    fn manager(config: RiskConfig) -> RiskManager {
        RiskManager::new(config)
    }

    #[test]
    fn test_open_position_sizes_and_records_risk() {
        let now = Utc::now();
        let mut m = manager(RiskConfig::default());
        let p = m.open_position(&make_request("BTCUSDT"), now).unwrap();
        assert!((p.quantity - 10.0).abs() < 1e-9);
        assert_eq!(p.take_profit_levels.len(), 3);
        assert!((m.counters().daily_risk_used - 100.0).abs() < 1e-9);
        assert!(p.notional() <= m.capital() * m.config().sizing.max_single_asset_exposure + 1e-9);
    }

    #[test]
    fn test_max_positions_block() {
        let now = Utc::now();
        let mut m = manager(RiskConfig {
            max_open_positions: 1,
            ..Default::default()
        });
        m.open_position(&make_request("BTCUSDT"), now).unwrap();
        let result = m.can_open_trade(&make_request("ETHUSDT"), now);
        assert!(matches!(result, Err(RiskRejection::MaxPositions { current: 1, max: 1 })));
    }

    #[test]
    fn test_symbol_already_open() {
        let now = Utc::now();
        let mut m = manager(RiskConfig::default());
        m.open_position(&make_request("BTCUSDT"), now).unwrap();
        let err = m.open_position(&make_request("BTCUSDT"), now).unwrap_err();
        assert!(err.is_risk_rejection());
        assert!(matches!(
            m.can_open_trade(&make_request("BTCUSDT"), now),
            Err(RiskRejection::SymbolAlreadyOpen { .. })
        ));
    }

    #[test]
    fn test_daily_budget_exhausted() {
        let now = Utc::now();
        let mut m = manager(RiskConfig {
            daily_risk_budget_pct: 1.0,
            ..Default::default()
        });
        m.open_position(&make_request("BTCUSDT"), now).unwrap();
        let result = m.can_open_trade(&make_request("ETHUSDT"), now);
        match result {
            Err(RiskRejection::RiskBudgetExceeded { period, .. }) => assert_eq!(period, "daily"),
            other => panic!("expected budget rejection, got {:?}", other),
        }
        // a new day frees the daily budget
        let tomorrow = now + Duration::days(1);
        assert!(m.can_open_trade(&make_request("ETHUSDT"), tomorrow).is_ok());
    }

    #[test]
    fn test_sector_and_correlated_exposure() {
        let now = Utc::now();
        let mut m = manager(RiskConfig {
            max_sector_exposure: 0.15,
            max_correlated_exposure: 0.15,
            ..Default::default()
        });
        let mut first = make_request("SOLUSDT");
        first.sector = Some("l1".into());
        first.correlation_group = Some("alts".into());
        m.open_position(&first, now).unwrap();

        let mut second = make_request("AVAXUSDT");
        second.sector = Some("l1".into());
        assert!(matches!(
            m.can_open_trade(&second, now),
            Err(RiskRejection::SectorExposure { .. })
        ));

        let mut third = make_request("DOGEUSDT");
        third.correlation_group = Some("alts".into());
        assert!(matches!(
            m.can_open_trade(&third, now),
            Err(RiskRejection::CorrelatedExposure { .. })
        ));
    }

    #[test]
    fn test_invalid_request() {
        let now = Utc::now();
        let m = manager(RiskConfig::default());
        let bad = TradeRequest::new("BTCUSDT", Direction::Bullish, 100.0, 105.0);
        assert!(matches!(
            m.can_open_trade(&bad, now),
            Err(RiskRejection::InvalidSize { .. })
        ));
    }

    #[test]
    fn test_stop_hit_archives_and_updates_drawdown() {
        let now = Utc::now();
        let mut m = manager(RiskConfig::default());
        let p = m.open_position(&make_request("BTCUSDT"), now).unwrap();
        let outcome = m.update_price(&p.id, 89.0, None, now).unwrap();
        assert!(outcome.position.is_closed());
        assert!(m.position(&p.id).is_none());
        assert_eq!(m.closed_trades().len(), 1);
        assert!((m.capital() - 9_890.0).abs() < 1e-9);
        assert!((m.drawdown().drawdown - 0.011).abs() < 1e-9);
        assert_eq!(m.closed_trades()[0].exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn test_manual_close_and_unknown_id() {
        let now = Utc::now();
        let mut m = manager(RiskConfig::default());
        let p = m.open_position(&make_request("BTCUSDT"), now).unwrap();
        let trade = m.close_position(&p.id, 102.0, now).unwrap();
        assert!((trade.pnl - 20.0).abs() < 1e-9);
        assert_eq!(trade.exit_reason, ExitReason::Manual);
        assert!(matches!(
            m.close_position("missing", 1.0, now),
            Err(Error::PositionNotFound(_))
        ));
    }

    #[test]
    fn test_pause_blocks_until_cooldown_expires() {
        let now = Utc::now();
        let mut m = manager(RiskConfig::default());
        m.record_pnl(-2_000.0, now);
        assert_eq!(m.drawdown().zone, DrawdownZone::Pause);
        assert!(matches!(
            m.can_open_trade(&make_request("BTCUSDT"), now),
            Err(RiskRejection::DrawdownPause { .. })
        ));

        let later = now + Duration::hours(25);
        let sizing = m.can_open_trade(&make_request("BTCUSDT"), later).unwrap();
        assert_eq!(sizing.drawdown_multiplier, 0.25);
    }

    #[test]
    fn test_period_counters_rollover() {
        // Wednesday
        let wed = Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();
        let mut c = PeriodCounters::new(wed);
        c.record_risk(50.0);
        c.record_pnl(-10.0);

        let thu = c.rolled(wed + Duration::days(1));
        assert_eq!(thu.daily_risk_used, 0.0);
        assert_eq!(thu.weekly_risk_used, 50.0);
        assert_eq!(thu.weekly_pnl, -10.0);

        let next_week = c.rolled(wed + Duration::days(6));
        assert_eq!(next_week.weekly_risk_used, 0.0);
        assert_eq!(next_week.daily_pnl, 0.0);
    }

    #[test]
    fn test_status() {
        let now = Utc::now();
        let mut m = manager(RiskConfig::default());
        m.open_position(&make_request("BTCUSDT"), now).unwrap();
        let status = m.status(now);
        assert_eq!(status.open_positions, 1);
        assert!((status.total_exposure - 1_000.0).abs() < 1e-9);
        assert!((status.open_risk - 100.0).abs() < 1e-9);
        assert!(status.can_open_new);
        assert!(status.to_string().contains("Risk Status:"));
    }
}
