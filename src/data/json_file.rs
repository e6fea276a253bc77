//! Candles from JSON files on disk

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{validate_series, CandleSource};
use crate::error::{Error, Result};
use crate::market::{Candle, Timeframe};

/// Either a candle object or an exchange-style `[time, o, h, l, c, v]` row
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCandle {
    Object(Candle),
    Row(i64, f64, f64, f64, f64, f64),
}

impl From<RawCandle> for Candle {
    fn from(raw: RawCandle) -> Self {
        match raw {
            RawCandle::Object(c) => c,
            RawCandle::Row(t, o, h, l, c, v) => Candle::new(t, o, h, l, c, v),
        }
    }
}

/// Reads `{dir}/{SYMBOL}_{tf}.json`
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    dir: PathBuf,
}

impl JsonFileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", symbol.to_uppercase(), timeframe))
    }

    /// Parse a candle file body
    pub fn parse(data: &str) -> Result<Vec<Candle>> {
        let raw: Vec<RawCandle> =
            serde_json::from_str(data).map_err(|e| Error::Data(format!("invalid candle JSON: {}", e)))?;
        let candles: Vec<Candle> = raw.into_iter().map(Candle::from).collect();
        validate_series(&candles)?;
        Ok(candles)
    }
}

#[async_trait]
impl CandleSource for JsonFileSource {
    fn name(&self) -> &'static str {
        "json_file"
    }

    async fn fetch(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        let path = self.path_for(symbol, timeframe);
        let data = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::Data(format!("{}: {}", path.display(), e)))?;

        let mut candles = Self::parse(&data)?;
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        debug!("Loaded {} candles from {}", candles.len(), path.display());
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::fixtures::trending_up;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_symbol_timeframe_file() {
        let dir = TempDir::new().unwrap();
        let candles = trending_up(10);
        std::fs::write(
            dir.path().join("BTCUSDT_4h.json"),
            serde_json::to_string(&candles).unwrap(),
        )
        .unwrap();

        let source = JsonFileSource::new(dir.path());
        let loaded = source.fetch("btcusdt", Timeframe::H4, 1_000).await.unwrap();
        assert_eq!(loaded.len(), candles.len());
        assert!((loaded[5].close - candles[5].close).abs() < 1e-9);

        let tail = source.fetch("BTCUSDT", Timeframe::H4, 20).await.unwrap();
        assert_eq!(tail.len(), 20);
        assert_eq!(tail.last().map(|c| c.open_time), candles.last().map(|c| c.open_time));
    }

    #[tokio::test]
    async fn test_missing_file_is_data_error() {
        let dir = TempDir::new().unwrap();
        let err = JsonFileSource::new(dir.path())
            .fetch("ETHUSDT", Timeframe::H1, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Data(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_parses_array_rows() {
        let data = r#"[
            [1704067200000, 100.0, 101.0, 99.0, 100.5, 10.0],
            {"openTime": 1704070800000, "open": 100.5, "high": 102.0, "low": 100.0, "close": 101.5, "volume": 12.0}
        ]"#;
        let candles = JsonFileSource::parse(data).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].close, 101.5);
    }
}
