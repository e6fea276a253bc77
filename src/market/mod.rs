//! Market primitives: candles, timeframes, direction and indicators

pub mod candle;
pub mod indicators;

#[cfg(test)]
pub(crate) mod fixtures;

pub use candle::{Candle, Direction, Timeframe};
pub use indicators::{atr, atr_series, average_volume, ema, macd, rsi, Macd};
