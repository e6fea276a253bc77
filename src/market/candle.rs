//! Candle, timeframe and direction primitives

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// One OHLCV bar. Series are expected time-ascending.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time in milliseconds since the Unix epoch
    #[serde(alias = "openTime")]
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(open_time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// High minus low
    pub fn range(&self) -> f64 {
        (self.high - self.low).max(0.0)
    }

    /// Absolute body size
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn upper_wick(&self) -> f64 {
        (self.high - self.open.max(self.close)).max(0.0)
    }

    pub fn lower_wick(&self) -> f64 {
        (self.open.min(self.close) - self.low).max(0.0)
    }

    /// Body as a fraction of range (0 for a zero-range bar)
    pub fn body_ratio(&self) -> f64 {
        let range = self.range();
        if range > 0.0 {
            self.body() / range
        } else {
            0.0
        }
    }

    /// Direction implied by the candle color
    pub fn direction(&self) -> Direction {
        if self.is_bullish() {
            Direction::Bullish
        } else if self.is_bearish() {
            Direction::Bearish
        } else {
            Direction::Neutral
        }
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.open_time)
    }
}

/// Directional bias used across every analysis stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl Direction {
    /// +1 for bullish, -1 for bearish, 0 for neutral
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Bearish => -1.0,
            Direction::Neutral => 0.0,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Direction::Bullish => Direction::Bearish,
            Direction::Bearish => Direction::Bullish,
            Direction::Neutral => Direction::Neutral,
        }
    }

    pub fn is_directional(&self) -> bool {
        !matches!(self, Direction::Neutral)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Bullish => write!(f, "bullish"),
            Direction::Bearish => write!(f, "bearish"),
            Direction::Neutral => write!(f, "neutral"),
        }
    }
}

/// Candle timeframe. Variants are declared fine to coarse so `Ord` follows granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
}

impl Timeframe {
    pub fn minutes(&self) -> u32 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
            Timeframe::W1 => 10080,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
        }
    }

    /// Session timing only carries information below the daily bar
    pub fn is_intraday(&self) -> bool {
        *self < Timeframe::D1
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" | "60m" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" | "d" => Ok(Timeframe::D1),
            "1w" | "w" => Ok(Timeframe::W1),
            other => Err(Error::InvalidInput(format!("unknown timeframe '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candle_geometry() {
        let c = Candle::new(0, 10.0, 12.0, 9.0, 11.0, 100.0);
        assert_eq!(c.range(), 3.0);
        assert_eq!(c.body(), 1.0);
        assert!(c.is_bullish());
        assert_eq!(c.upper_wick(), 1.0);
        assert_eq!(c.lower_wick(), 1.0);
        assert!((c.body_ratio() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_range_body_ratio() {
        let c = Candle::new(0, 10.0, 10.0, 10.0, 10.0, 0.0);
        assert_eq!(c.body_ratio(), 0.0);
        assert_eq!(c.direction(), Direction::Neutral);
    }

    #[test]
    fn test_timeframe_parse_and_order() {
        assert_eq!("4h".parse::<Timeframe>().unwrap(), Timeframe::H4);
        assert_eq!("1D".parse::<Timeframe>().unwrap(), Timeframe::D1);
        assert!("7x".parse::<Timeframe>().is_err());
        assert!(Timeframe::M15 < Timeframe::H1);
        assert!(Timeframe::H4.is_intraday());
        assert!(!Timeframe::D1.is_intraday());
    }

    #[test]
    fn test_candle_json_alias() {
        let json = r#"{"openTime":1,"open":1.0,"high":2.0,"low":0.5,"close":1.5,"volume":10.0}"#;
        let c: Candle = serde_json::from_str(json).unwrap();
        assert_eq!(c.open_time, 1);
        assert_eq!(c.close, 1.5);
    }
}
