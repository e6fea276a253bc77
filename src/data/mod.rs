//! Candle data boundary
//!
//! The analysis core only consumes candle slices. Where they come from is
//! behind `CandleSource`; `JsonFileSource` is the bundled implementation.

pub mod json_file;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::market::{Candle, Timeframe};

pub use json_file::JsonFileSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding `{SYMBOL}_{tf}.json` files
    pub dir: PathBuf,
    /// Most recent candles kept per series
    pub limit: usize,
    /// Concurrent fetches
    pub concurrency: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            limit: 500,
            concurrency: 4,
        }
    }
}

#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Source name for logging
    fn name(&self) -> &'static str;

    /// Most recent `limit` candles, time-ascending
    async fn fetch(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>>;
}

/// Reject series the analysis cannot trust
pub fn validate_series(candles: &[Candle]) -> Result<()> {
    for (i, c) in candles.iter().enumerate() {
        let prices = [c.open, c.high, c.low, c.close];
        if prices.iter().any(|p| !p.is_finite() || *p < 0.0) || !c.volume.is_finite() || c.volume < 0.0 {
            return Err(Error::Data(format!("candle {} has invalid values", i)));
        }
        if c.high < c.low || c.high < c.open.max(c.close) || c.low > c.open.min(c.close) {
            return Err(Error::Data(format!("candle {} has inconsistent OHLC", i)));
        }
        if i > 0 && c.open_time <= candles[i - 1].open_time {
            return Err(Error::Data(format!("candle {} is out of time order", i)));
        }
    }
    Ok(())
}

/// Result of one fetch in a batch
#[derive(Debug)]
pub struct FetchResult {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candles: Result<Vec<Candle>>,
}

/// Fetch every (symbol, timeframe) pair with at most `concurrency` in flight.
/// Results arrive in completion order.
pub async fn fetch_many(
    source: Arc<dyn CandleSource>,
    requests: Vec<(String, Timeframe)>,
    limit: usize,
    concurrency: usize,
) -> Vec<FetchResult> {
    let total = requests.len();
    let results: Vec<FetchResult> = stream::iter(requests)
        .map(|(symbol, timeframe)| {
            let source = Arc::clone(&source);
            async move {
                let candles = source.fetch(&symbol, timeframe, limit).await;
                if let Err(e) = &candles {
                    warn!("{}: fetch {} {} failed: {}", source.name(), symbol, timeframe, e);
                }
                FetchResult {
                    symbol,
                    timeframe,
                    candles,
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    debug!(
        "Fetched {}/{} series",
        results.iter().filter(|r| r.candles.is_ok()).count(),
        total
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::fixtures::trending_up;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts concurrent fetches
    struct SlowSource {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl CandleSource for SlowSource {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn fetch(&self, symbol: &str, _timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if symbol == "BAD" {
                return Err(Error::Data("no such symbol".into()));
            }
            let candles = trending_up(4);
            Ok(candles[candles.len().saturating_sub(limit)..].to_vec())
        }
    }

    #[tokio::test]
    async fn test_fetch_many_bounds_concurrency() {
        let source = Arc::new(SlowSource {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let requests = ["A", "B", "C", "D", "E", "BAD"]
            .iter()
            .map(|s| (s.to_string(), Timeframe::H1))
            .collect();

        let results = fetch_many(source.clone(), requests, 10, 2).await;
        assert_eq!(results.len(), 6);
        assert_eq!(results.iter().filter(|r| r.candles.is_err()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.candles.as_ref().ok())
            .all(|c| c.len() == 10));
        assert!(source.peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_validate_series() {
        let mut candles = trending_up(2);
        assert!(validate_series(&candles).is_ok());

        candles[3].open_time = candles[2].open_time;
        assert!(matches!(validate_series(&candles), Err(Error::Data(_))));

        let mut candles = trending_up(2);
        candles[1].high = candles[1].low - 1.0;
        assert!(validate_series(&candles).is_err());
    }
}
