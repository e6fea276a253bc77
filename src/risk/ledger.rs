//! Ledger persistence
//!
//! The ledger is saved as one JSON snapshot after every state change and
//! loaded at startup. `RiskDesk` serializes all ledger operations behind a
//! single async mutex so check-then-commit is atomic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::drawdown::DrawdownState;
use super::manager::{PeriodCounters, RiskConfig, RiskManager, RiskStatus, TradeRequest};
use super::position::{ClosedTrade, Position, StepOutcome};
use super::sizing::SizeExplanation;
use super::RiskRejection;
use crate::error::{Error, Result};

/// Serialized ledger state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub capital: f64,
    pub positions: Vec<Position>,
    pub closed_trades: Vec<ClosedTrade>,
    pub drawdown: DrawdownState,
    pub counters: PeriodCounters,
}

impl LedgerSnapshot {
    pub const VERSION: u32 = 1;
}

/// Load a snapshot. A missing file is `Ok(None)`.
pub async fn load_snapshot(path: &Path) -> Result<Option<LedgerSnapshot>> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Persistence(format!("{}: {}", path.display(), e))),
    };

    let snapshot: LedgerSnapshot =
        serde_json::from_str(&data).map_err(|e| Error::Persistence(format!("{}: {}", path.display(), e)))?;

    if snapshot.version > LedgerSnapshot::VERSION {
        return Err(Error::Persistence(format!(
            "snapshot version {} is newer than supported {}",
            snapshot.version,
            LedgerSnapshot::VERSION
        )));
    }

    info!(
        "Loaded ledger from {} ({} open positions, {} closed trades)",
        path.display(),
        snapshot.positions.len(),
        snapshot.closed_trades.len()
    );
    Ok(Some(snapshot))
}

/// Save a snapshot, creating parent directories as needed
pub async fn save_snapshot(path: &Path, snapshot: &LedgerSnapshot) -> Result<()> {
    let data = serde_json::to_string_pretty(snapshot).map_err(|e| Error::Persistence(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
    }

    tokio::fs::write(path, data)
        .await
        .map_err(|e| Error::Persistence(format!("{}: {}", path.display(), e)))?;

    debug!("Saved ledger to {}", path.display());
    Ok(())
}

/// Shared handle to the risk manager
#[derive(Clone)]
pub struct RiskDesk {
    manager: Arc<Mutex<RiskManager>>,
    path: Option<PathBuf>,
}

impl RiskDesk {
    /// Open the desk, restoring the ledger from `path` when a snapshot exists
    pub async fn open(config: RiskConfig, path: Option<PathBuf>) -> Result<Self> {
        let manager = match &path {
            Some(p) => match load_snapshot(p).await? {
                Some(snapshot) => RiskManager::restore(config, snapshot),
                None => RiskManager::new(config),
            },
            None => RiskManager::new(config),
        };
        Ok(Self {
            manager: Arc::new(Mutex::new(manager)),
            path,
        })
    }

    /// Desk without persistence
    pub fn in_memory(config: RiskConfig) -> Self {
        Self {
            manager: Arc::new(Mutex::new(RiskManager::new(config))),
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Save while the caller still holds the lock. Failures are logged only.
    async fn persist(&self, manager: &RiskManager) {
        if let Some(path) = &self.path {
            if let Err(e) = save_snapshot(path, &manager.snapshot(Utc::now())).await {
                warn!("Ledger snapshot failed: {}", e);
            }
        }
    }

    /// Dry-run of the gate and sizing, nothing is committed
    pub async fn preview(&self, request: &TradeRequest) -> std::result::Result<SizeExplanation, RiskRejection> {
        self.manager.lock().await.can_open_trade(request, Utc::now())
    }

    /// Gate, size and open a trade
    pub async fn open_trade(&self, request: &TradeRequest) -> Result<Position> {
        let mut manager = self.manager.lock().await;
        let position = manager.open_position(request, Utc::now())?;
        self.persist(&manager).await;
        Ok(position)
    }

    pub async fn update_price(&self, id: &str, price: f64, atr: Option<f64>) -> Result<StepOutcome> {
        let mut manager = self.manager.lock().await;
        let outcome = manager.update_price(id, price, atr, Utc::now())?;
        if !outcome.events.is_empty() {
            self.persist(&manager).await;
        }
        Ok(outcome)
    }

    pub async fn update_symbol(&self, symbol: &str, price: f64, atr: Option<f64>) -> Vec<StepOutcome> {
        let mut manager = self.manager.lock().await;
        let outcomes = manager.update_symbol(symbol, price, atr, Utc::now());
        if outcomes.iter().any(|o| !o.events.is_empty()) {
            self.persist(&manager).await;
        }
        outcomes
    }

    pub async fn close(&self, id: &str, price: f64) -> Result<ClosedTrade> {
        let mut manager = self.manager.lock().await;
        let trade = manager.close_position(id, price, Utc::now())?;
        self.persist(&manager).await;
        Ok(trade)
    }

    pub async fn status(&self) -> RiskStatus {
        self.manager.lock().await.status(Utc::now())
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.manager.lock().await.snapshot(Utc::now())
    }

    /// Save the current ledger, surfacing errors
    pub async fn flush(&self) -> Result<()> {
        let manager = self.manager.lock().await;
        match &self.path {
            Some(path) => save_snapshot(path, &manager.snapshot(Utc::now())).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Direction;
    use tempfile::TempDir;

    fn request(symbol: &str) -> TradeRequest {
        TradeRequest::new(symbol, Direction::Bullish, 100.0, 90.0)
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_none() {
        let dir = TempDir::new().unwrap();
        let loaded = load_snapshot(&dir.path().join("ledger.json")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_preserves_ledger() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("ledger.json");
        let now = Utc::now();

        let mut manager = RiskManager::new(RiskConfig::default());
        let kept = manager.open_position(&request("BTCUSDT"), now).unwrap();
        let closed = manager.open_position(&request("ETHUSDT"), now).unwrap();
        manager.close_position(&closed.id, 95.0, now).unwrap();

        let snapshot = manager.snapshot(now);
        save_snapshot(&path, &snapshot).await.unwrap();
        let loaded = load_snapshot(&path).await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);

        let restored = RiskManager::restore(RiskConfig::default(), loaded);
        assert_eq!(restored.capital(), manager.capital());
        assert_eq!(restored.position(&kept.id), manager.position(&kept.id));
        assert_eq!(restored.closed_trades(), manager.closed_trades());
        assert_eq!(restored.drawdown(), manager.drawdown());
        assert_eq!(restored.counters(), manager.counters());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        assert!(matches!(load_snapshot(&path).await, Err(Error::Persistence(_))));
    }

    #[tokio::test]
    async fn test_desk_saves_after_each_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");

        let desk = RiskDesk::open(RiskConfig::default(), Some(path.clone())).await.unwrap();
        let position = desk.open_trade(&request("BTCUSDT")).await.unwrap();
        let saved = load_snapshot(&path).await.unwrap().unwrap();
        assert_eq!(saved.positions.len(), 1);

        desk.update_price(&position.id, 80.0, None).await.unwrap();
        let saved = load_snapshot(&path).await.unwrap().unwrap();
        assert!(saved.positions.is_empty());
        assert_eq!(saved.closed_trades.len(), 1);

        // a second desk resumes from disk
        let reopened = RiskDesk::open(RiskConfig::default(), Some(path)).await.unwrap();
        let status = reopened.status().await;
        assert!((status.capital - 9_800.0).abs() < 1e-9);
        assert_eq!(status.performance.total_trades, 1);
    }

    #[tokio::test]
    async fn test_desk_rejection_leaves_ledger_unchanged() {
        let desk = RiskDesk::in_memory(RiskConfig {
            max_open_positions: 1,
            ..Default::default()
        });
        assert!(desk.preview(&request("BTCUSDT")).await.is_ok());
        desk.open_trade(&request("BTCUSDT")).await.unwrap();
        assert!(matches!(
            desk.preview(&request("ETHUSDT")).await,
            Err(RiskRejection::MaxPositions { .. })
        ));
        let err = desk.open_trade(&request("ETHUSDT")).await.unwrap_err();
        assert!(err.is_risk_rejection());
        assert_eq!(desk.status().await.open_positions, 1);
    }

    #[test]
    fn test_concurrent_opens_respect_position_limit() {
        tokio_test::block_on(async {
            let desk = RiskDesk::in_memory(RiskConfig {
                max_open_positions: 2,
                daily_risk_budget_pct: 100.0,
                weekly_risk_budget_pct: 100.0,
                ..Default::default()
            });
            let symbols = ["A", "B", "C", "D"];
            let results = futures::future::join_all(symbols.iter().map(|s| {
                let desk = desk.clone();
                let req = request(s);
                async move { desk.open_trade(&req).await }
            }))
            .await;
            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
        });
    }
}
