//! Pure indicator computations over candle series.
//!
//! No I/O, no side effects. Every function is guarded against short input and
//! zero divisors: insufficient data yields an empty series or a neutral value,
//! never NaN or infinity.

use super::candle::Candle;

/// True range of `candle` given the previous close (if any)
pub fn true_range(prev_close: Option<f64>, candle: &Candle) -> f64 {
    let hl = candle.range();
    match prev_close {
        Some(pc) => hl.max((candle.high - pc).abs()).max((candle.low - pc).abs()),
        None => hl,
    }
}

/// Average True Range with Wilder smoothing.
///
/// The returned series has one value per candle. Until `period` bars exist the
/// value is the plain mean of the true ranges seen so far.
pub fn atr_series(candles: &[Candle], period: usize) -> Vec<f64> {
    if candles.is_empty() || period == 0 {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(candles.len());
    let mut running_sum = 0.0;
    let mut prev_atr = 0.0;

    for (i, candle) in candles.iter().enumerate() {
        let prev_close = if i > 0 { Some(candles[i - 1].close) } else { None };
        let tr = true_range(prev_close, candle);

        let value = if i < period {
            running_sum += tr;
            running_sum / (i + 1) as f64
        } else {
            (prev_atr * (period as f64 - 1.0) + tr) / period as f64
        };

        prev_atr = value;
        out.push(value);
    }

    out
}

/// Latest ATR value (0.0 when empty)
pub fn atr(candles: &[Candle], period: usize) -> f64 {
    atr_series(candles, period).last().copied().unwrap_or(0.0)
}

/// Exponential Moving Average.
///
/// Multiplier `k = 2 / (period + 1)`, seeded with the SMA of the first
/// `period` values. Returns an empty `Vec` on insufficient data.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    if values.len() < period || period == 0 {
        return Vec::new();
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut result = Vec::with_capacity(values.len() - period + 1);
    result.push(seed);
    for &v in &values[period..] {
        let prev = result[result.len() - 1];
        result.push(v * k + prev * (1.0 - k));
    }
    result
}

/// Relative Strength Index with Wilder smoothing. Returns 50 on insufficient data.
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() < period + 1 {
        return 50.0;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let p = period as f64;

    let mut avg_gain = changes[..period].iter().map(|c| c.max(0.0)).sum::<f64>() / p;
    let mut avg_loss = changes[..period].iter().map(|c| (-c).max(0.0)).sum::<f64>() / p;

    for &c in &changes[period..] {
        avg_gain = (avg_gain * (p - 1.0) + c.max(0.0)) / p;
        avg_loss = (avg_loss * (p - 1.0) + (-c).max(0.0)) / p;
    }

    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }

    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// MACD result
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Moving Average Convergence Divergence. Zeroed on insufficient data.
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    if fast == 0 || fast >= slow || closes.len() < slow + signal {
        return Macd::default();
    }

    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);
    if slow_ema.is_empty() {
        return Macd::default();
    }

    // fast_ema starts `slow - fast` values earlier than slow_ema
    let offset = slow - fast;
    let line: Vec<f64> = (0..slow_ema.len())
        .map(|i| fast_ema[i + offset] - slow_ema[i])
        .collect();

    let signal_ema = ema(&line, signal);
    match (line.last(), signal_ema.last()) {
        (Some(&l), Some(&s)) => Macd {
            line: l,
            signal: s,
            histogram: l - s,
        },
        _ => Macd::default(),
    }
}

/// Mean volume of the `lookback` bars ending just before `end` (exclusive).
/// Falls back to whatever history exists; 0.0 when there is none.
pub fn average_volume(candles: &[Candle], end: usize, lookback: usize) -> f64 {
    let end = end.min(candles.len());
    let start = end.saturating_sub(lookback);
    let window = &candles[start..end];
    if window.is_empty() {
        return 0.0;
    }
    window.iter().map(|c| c.volume).sum::<f64>() / window.len() as f64
}

/// Highest high and lowest low of `candles[start..end]`
pub fn range_extremes(candles: &[Candle], start: usize, end: usize) -> Option<(f64, f64)> {
    let end = end.min(candles.len());
    if start >= end {
        return None;
    }
    let window = &candles[start..end];
    let high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    Some((high, low))
}

/// `num / den`, or 0.0 when the denominator is not a usable positive number
pub fn safe_ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 && den.is_finite() && num.is_finite() {
        num / den
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(n: usize, range: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle::new(i as i64, 100.0, 100.0 + range / 2.0, 100.0 - range / 2.0, 100.0, 10.0))
            .collect()
    }

    #[test]
    fn test_atr_constant_range() {
        let candles = flat(30, 2.0);
        let series = atr_series(&candles, 14);
        assert_eq!(series.len(), 30);
        assert!(series.iter().all(|v| (v - 2.0).abs() < 1e-9));
    }

    #[test]
    fn test_true_range_uses_gap() {
        let c = Candle::new(0, 110.0, 112.0, 109.0, 111.0, 1.0);
        assert_eq!(true_range(Some(100.0), &c), 12.0);
        assert_eq!(true_range(None, &c), 3.0);
    }

    #[test]
    fn test_empty_inputs_are_neutral() {
        assert!(atr_series(&[], 14).is_empty());
        assert_eq!(atr(&[], 14), 0.0);
        assert!(ema(&[1.0, 2.0], 5).is_empty());
        assert_eq!(rsi(&[1.0, 2.0], 14), 50.0);
        assert_eq!(macd(&[1.0; 10], 12, 26, 9), Macd::default());
        assert_eq!(average_volume(&[], 0, 20), 0.0);
    }

    #[test]
    fn test_ema_seed_and_step() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        let out = ema(&values, 3);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 2.0).abs() < 1e-9);
        // k = 0.5 -> 4 * 0.5 + 2 * 0.5
        assert!((out[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (0..30).map(|i| i as f64).collect();
        assert_eq!(rsi(&rising, 14), 100.0);
        let falling: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        assert!(rsi(&falling, 14) < 1.0);
    }

    #[test]
    fn test_macd_positive_in_uptrend() {
        let rising: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64).powf(1.3)).collect();
        let m = macd(&rising, 12, 26, 9);
        assert!(m.line > 0.0);
    }

    #[test]
    fn test_safe_ratio_guards() {
        assert_eq!(safe_ratio(1.0, 0.0), 0.0);
        assert_eq!(safe_ratio(1.0, f64::NAN), 0.0);
        assert_eq!(safe_ratio(3.0, 2.0), 1.5);
    }
}
