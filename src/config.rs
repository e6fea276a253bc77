//! Configuration management
//!
//! Sources, later ones winning: built-in defaults, an optional TOML file,
//! then `CONFLUENCE__SECTION__KEY` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data::DataConfig;
use crate::market::Timeframe;
use crate::orchestrator::AnalysisConfig;
use crate::risk::RiskConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub watchlist: WatchlistConfig,
    pub data: DataConfig,
    pub ledger: LedgerConfig,
    pub analysis: AnalysisConfig,
    pub risk: RiskConfig,
}

/// Symbols and timeframes the `scan` command walks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchlistConfig {
    pub symbols: Vec<String>,
    /// Timeframe signals are generated on
    pub timeframe: Timeframe,
    /// Trend context, each coarser than `timeframe`
    pub higher_timeframes: Vec<Timeframe>,
    /// Every symbol must match
    pub symbol_pattern: String,
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            timeframe: Timeframe::H1,
            higher_timeframes: vec![Timeframe::H4, Timeframe::D1],
            symbol_pattern: default_symbol_pattern(),
        }
    }
}

fn default_symbol_pattern() -> String {
    "^[A-Z0-9]{2,20}$".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Persist the ledger snapshot after every change
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("state/ledger.json"),
        }
    }
}

impl LedgerConfig {
    /// Snapshot path, `None` when persistence is off
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.enabled.then(|| self.path.clone())
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            .set_default("watchlist.timeframe", Timeframe::H1.as_str())?
            .set_default("watchlist.symbol_pattern", default_symbol_pattern())?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix CONFLUENCE__)
            .add_source(
                config::Environment::with_prefix("CONFLUENCE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("watchlist.symbols")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Watchlist
        let pattern = regex::Regex::new(&self.watchlist.symbol_pattern)
            .with_context(|| format!("Invalid symbol_pattern regex: {}", self.watchlist.symbol_pattern))?;
        for symbol in &self.watchlist.symbols {
            if !pattern.is_match(symbol) {
                anyhow::bail!(
                    "Symbol {} does not match {}",
                    symbol,
                    self.watchlist.symbol_pattern
                );
            }
        }
        if let Some(tf) = self
            .watchlist
            .higher_timeframes
            .iter()
            .find(|tf| **tf <= self.watchlist.timeframe)
        {
            anyhow::bail!(
                "Higher timeframe {} is not above the signal timeframe {}",
                tf,
                self.watchlist.timeframe
            );
        }

        if self.data.concurrency == 0 {
            anyhow::bail!("data.concurrency must be at least 1");
        }

        // Confluence buckets
        let confluence = &self.analysis.confluence;
        let caps = &confluence.caps;
        let cap_values = [
            caps.mtf_alignment,
            caps.structure,
            caps.smart_money,
            caps.volume,
            caps.momentum,
            caps.support_resistance,
            caps.fibonacci,
            caps.session,
        ];
        if cap_values.iter().any(|c| !c.is_finite() || *c < 0.0) {
            anyhow::bail!("Bucket caps must be non-negative");
        }
        if caps.total() > 100.0 + 1e-9 {
            anyhow::bail!("Bucket caps sum to {:.1}, cannot exceed 100", caps.total());
        }
        let tiers = &confluence.tiers;
        if !(tiers.a_plus >= tiers.a && tiers.a >= tiers.b && tiers.b >= tiers.c) {
            anyhow::bail!("Tier thresholds must be ordered a_plus >= a >= b >= c");
        }

        // Order block score weights
        let ob = &self.analysis.smart_money.order_blocks;
        if ob.creation_weight <= 0.0 || ob.follow_through_weight <= 0.0 || ob.location_weight <= 0.0 {
            anyhow::bail!("Order block weights must be positive");
        }

        let orchestrator = &self.analysis.orchestrator;
        if !(orchestrator.min_structure_candles <= orchestrator.min_zone_candles
            && orchestrator.min_zone_candles <= orchestrator.min_signal_candles)
        {
            anyhow::bail!("Stage candle minimums must be ordered structure <= zones <= signal");
        }
        if !(0.0..=100.0).contains(&orchestrator.entry.market_allocation_pct) {
            anyhow::bail!("market_allocation_pct must be between 0 and 100");
        }
        if self.data.limit < orchestrator.min_signal_candles {
            tracing::warn!(
                "data.limit {} is below min_signal_candles {} - no signals will be generated",
                self.data.limit,
                orchestrator.min_signal_candles
            );
        }

        // Risk
        let risk = &self.risk;
        if risk.initial_capital <= 0.0 {
            anyhow::bail!("initial_capital must be positive");
        }
        if risk.sizing.risk_per_trade_pct <= 0.0 || risk.sizing.risk_per_trade_pct > 100.0 {
            anyhow::bail!("risk_per_trade_pct must be between 0 and 100");
        }
        if risk.max_open_positions == 0 {
            anyhow::bail!("max_open_positions must be at least 1");
        }

        let mut close_total = 0.0;
        for tp in &risk.take_profits {
            if tp.r_multiple <= 0.0 {
                anyhow::bail!("Take-profit r_multiple must be positive, got {}", tp.r_multiple);
            }
            if tp.close_pct < 0.0 {
                anyhow::bail!("Take-profit close_pct cannot be negative");
            }
            close_total += tp.close_pct;
        }
        if close_total > 100.0 + 1e-9 {
            anyhow::bail!("Take-profit close percentages sum to {:.1}, cannot exceed 100", close_total);
        }

        let dd = &risk.drawdown;
        let ordered = 0.0 < dd.yellow_threshold
            && dd.yellow_threshold < dd.red_threshold
            && dd.red_threshold < dd.pause_threshold
            && dd.pause_threshold <= 1.0;
        if !ordered {
            anyhow::bail!(
                "Drawdown thresholds must satisfy 0 < yellow ({}) < red ({}) < pause ({}) <= 1",
                dd.yellow_threshold,
                dd.red_threshold,
                dd.pause_threshold
            );
        }

        Ok(())
    }

    /// Human-readable configuration summary
    pub fn summary(&self) -> String {
        let higher: Vec<&str> = self
            .watchlist
            .higher_timeframes
            .iter()
            .map(|tf| tf.as_str())
            .collect();
        let ladder: Vec<String> = self
            .risk
            .take_profits
            .iter()
            .map(|tp| format!("{:.1}R/{:.0}%", tp.r_multiple, tp.close_pct))
            .collect();
        let ledger = match self.ledger.snapshot_path() {
            Some(path) => path.display().to_string(),
            None => "disabled".to_string(),
        };

        format!(
            r#"Configuration:
  Watchlist:
    symbols: {}
    timeframe: {}
    higher_timeframes: {}
  Data:
    dir: {}
    limit: {}
    concurrency: {}
  Ledger: {}
  Analysis:
    swing_rev_atr: {:.2}
    ote_mode: {:?}
    bucket_caps_total: {:.1}
    tiers: A+ {:.0} / A {:.0} / B {:.0} / C {:.0}
    signal_threshold: {:.1}
    stage_minimums: {} / {} / {}
  Risk:
    initial_capital: {:.2}
    sizing: {:?} ({:.2}% per trade)
    max_open_positions: {}
    daily/weekly budget: {:.1}% / {:.1}%
    max_sector_exposure: {:.0}%
    max_correlated_exposure: {:.0}%
    drawdown zones: {:.0}% / {:.0}% / {:.0}%
    stop_mode: {:?}
    take_profits: {}"#,
            self.watchlist.symbols.join(", "),
            self.watchlist.timeframe,
            higher.join(", "),
            self.data.dir.display(),
            self.data.limit,
            self.data.concurrency,
            ledger,
            self.analysis.structure.swings.swing_rev_atr,
            self.analysis.fibonacci.ote_mode,
            self.analysis.confluence.caps.total(),
            self.analysis.confluence.tiers.a_plus,
            self.analysis.confluence.tiers.a,
            self.analysis.confluence.tiers.b,
            self.analysis.confluence.tiers.c,
            self.analysis.orchestrator.signal_threshold,
            self.analysis.orchestrator.min_structure_candles,
            self.analysis.orchestrator.min_zone_candles,
            self.analysis.orchestrator.min_signal_candles,
            self.risk.initial_capital,
            self.risk.sizing.method,
            self.risk.sizing.risk_per_trade_pct,
            self.risk.max_open_positions,
            self.risk.daily_risk_budget_pct,
            self.risk.weekly_risk_budget_pct,
            self.risk.max_sector_exposure * 100.0,
            self.risk.max_correlated_exposure * 100.0,
            self.risk.drawdown.yellow_threshold * 100.0,
            self.risk.drawdown.red_threshold * 100.0,
            self.risk.drawdown.pause_threshold * 100.0,
            self.risk.stops.mode,
            ladder.join(", "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::TakeProfitSpec;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.watchlist.timeframe, Timeframe::H1);
        assert_eq!(config.analysis.confluence.caps.total(), 100.0);
        assert_eq!(config.ledger.snapshot_path(), Some(PathBuf::from("state/ledger.json")));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.watchlist.symbols, WatchlistConfig::default().symbols);
        assert_eq!(config.risk.max_open_positions, 5);
    }

    #[test]
    fn test_load_toml_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("confluence.toml");
        std::fs::write(
            &path,
            r#"
[watchlist]
symbols = ["SOLUSDT"]
timeframe = "4h"
higher_timeframes = ["1d"]

[analysis.orchestrator]
signal_threshold = 65.0

[risk]
initial_capital = 25000.0
max_open_positions = 3

[risk.drawdown]
yellow_threshold = 0.04
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.watchlist.symbols, vec!["SOLUSDT".to_string()]);
        assert_eq!(config.watchlist.timeframe, Timeframe::H4);
        assert_eq!(config.analysis.orchestrator.signal_threshold, 65.0);
        assert_eq!(config.risk.initial_capital, 25_000.0);
        assert_eq!(config.risk.max_open_positions, 3);
        assert_eq!(config.risk.drawdown.yellow_threshold, 0.04);
        // untouched keys keep their defaults
        assert_eq!(config.risk.drawdown.red_threshold, 0.10);
        assert_eq!(config.data.concurrency, 4);
    }

    #[test]
    fn test_rejects_caps_above_100() {
        let mut config = Config::default();
        config.analysis.confluence.caps.session = 30.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Bucket caps"));
    }

    #[test]
    fn test_rejects_take_profit_overallocation() {
        let mut config = Config::default();
        config.risk.take_profits = vec![TakeProfitSpec::new(1.0, 60.0), TakeProfitSpec::new(2.0, 60.0)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unordered_drawdown_thresholds() {
        let mut config = Config::default();
        config.risk.drawdown.red_threshold = 0.20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_positive_ob_weight() {
        let mut config = Config::default();
        config.analysis.smart_money.order_blocks.location_weight = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_symbol_pattern() {
        let mut config = Config::default();
        config.watchlist.symbols.push("btc-usdt".to_string());
        assert!(config.validate().is_err());

        config.watchlist.symbols.pop();
        config.watchlist.symbol_pattern = "[unclosed".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("symbol_pattern"));
    }

    #[test]
    fn test_higher_timeframe_must_be_coarser() {
        let mut config = Config::default();
        config.watchlist.higher_timeframes = vec![Timeframe::M15];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_lists_sections() {
        let summary = Config::default().summary();
        assert!(summary.starts_with("Configuration:"));
        assert!(summary.contains("BTCUSDT, ETHUSDT"));
        assert!(summary.contains("1.0R/30%, 2.0R/40%, 3.0R/30%"));
    }
}
