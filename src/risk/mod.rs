//! Risk & Position Sizing Manager
//!
//! - `sizing` - fixed fraction, fractional Kelly, Optimal-F, adaptive blend
//! - `drawdown` - peak tracking and green/yellow/red/pause zones
//! - `stops` - stop-loss modes and take-profit ladders
//! - `position` - the position lifecycle transition (`step`)
//! - `performance` - closed-trade statistics
//! - `manager` - the stateful gate and ledger
//! - `ledger` - snapshot persistence and the shared `RiskDesk` handle

pub mod drawdown;
pub mod ledger;
pub mod manager;
pub mod performance;
pub mod position;
pub mod sizing;
pub mod stops;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use drawdown::{DrawdownConfig, DrawdownState, DrawdownZone};
pub use ledger::{load_snapshot, save_snapshot, LedgerSnapshot, RiskDesk};
pub use manager::{PeriodCounters, RiskConfig, RiskManager, RiskStatus, TradeRequest};
pub use performance::PerformanceStats;
pub use position::{
    step, BreakevenConfig, ClosedTrade, ExitReason, Position, PositionEvent, PositionRules,
    PositionStatus, StepOutcome, TrailingConfig,
};
pub use sizing::{kelly_fraction, optimal_f, PositionSizer, SizeExplanation, SizingConfig, SizingContext, SizingMethod};
pub use stops::{build_take_profits, compute_stop, StopConfig, StopLossMode, TakeProfitLevel, TakeProfitSpec};

/// Reasons a new trade is refused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "code")]
pub enum RiskRejection {
    /// Daily or weekly risk budget already used up
    RiskBudgetExceeded { period: String, used: f64, budget: f64 },
    /// Maximum number of concurrent positions reached
    MaxPositions { current: usize, max: usize },
    /// Drawdown pause cooldown still running
    DrawdownPause { resume_in_secs: i64 },
    /// Sector notional would exceed its cap
    SectorExposure { sector: String, exposure: f64, max: f64 },
    /// Correlation-group notional would exceed its cap
    CorrelatedExposure { group: String, exposure: f64, max: f64 },
    /// Symbol already has an open position
    SymbolAlreadyOpen { symbol: String },
    /// Sizing produced nothing to trade
    InvalidSize { reason: String },
}

impl RiskRejection {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RiskRejection::RiskBudgetExceeded { .. } => "risk_budget_exceeded",
            RiskRejection::MaxPositions { .. } => "max_positions",
            RiskRejection::DrawdownPause { .. } => "drawdown_pause",
            RiskRejection::SectorExposure { .. } => "sector_exposure",
            RiskRejection::CorrelatedExposure { .. } => "correlated_exposure",
            RiskRejection::SymbolAlreadyOpen { .. } => "symbol_already_open",
            RiskRejection::InvalidSize { .. } => "invalid_size",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> String {
        match self {
            RiskRejection::RiskBudgetExceeded { period, used, budget } => {
                format!("{} risk budget used: {:.2}/{:.2}", period, used, budget)
            }
            RiskRejection::MaxPositions { current, max } => {
                format!("Max positions reached: {}/{}", current, max)
            }
            RiskRejection::DrawdownPause { resume_in_secs } => {
                format!("Drawdown pause (resume in {}s)", resume_in_secs)
            }
            RiskRejection::SectorExposure { sector, exposure, max } => {
                format!("Sector {} exposure {:.2} exceeds {:.2}", sector, exposure, max)
            }
            RiskRejection::CorrelatedExposure { group, exposure, max } => {
                format!("Correlated group {} exposure {:.2} exceeds {:.2}", group, exposure, max)
            }
            RiskRejection::SymbolAlreadyOpen { symbol } => {
                format!("{} already has an open position", symbol)
            }
            RiskRejection::InvalidSize { reason } => format!("Invalid size: {}", reason),
        }
    }
}

impl fmt::Display for RiskRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code(), self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_codes() {
        let r = RiskRejection::MaxPositions { current: 3, max: 3 };
        assert_eq!(r.code(), "max_positions");
        assert_eq!(r.to_string(), "[max_positions] Max positions reached: 3/3");
        assert_eq!(
            RiskRejection::InvalidSize { reason: "zero".into() }.code(),
            "invalid_size"
        );
    }

    #[test]
    fn test_rejection_serializes_with_code() {
        let json = serde_json::to_string(&RiskRejection::SymbolAlreadyOpen {
            symbol: "BTCUSDT".into(),
        })
        .unwrap();
        assert!(json.contains("\"code\":\"symbol_already_open\""));
    }
}
