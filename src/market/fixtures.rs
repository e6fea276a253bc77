//! Deterministic candle series for unit tests

use super::candle::Candle;

pub const HOUR_MS: i64 = 3_600_000;

/// 2024-01-01T00:00:00Z
pub const START_MS: i64 = 1_704_067_200_000;

pub fn candle(i: usize, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
    Candle::new(START_MS + i as i64 * HOUR_MS, open, high, low, close, volume)
}

/// Piecewise-linear series through `pivots`, `bars_per_leg` bars per leg.
///
/// Each bar opens at the previous close and carries a wick of `wick` on both
/// sides, so swing extremes land exactly on the pivot prices +/- wick.
pub fn zigzag(pivots: &[f64], bars_per_leg: usize, wick: f64, volume: f64) -> Vec<Candle> {
    let mut out = Vec::new();
    let mut prev_close = pivots[0];
    for leg in pivots.windows(2) {
        let (from, to) = (leg[0], leg[1]);
        for step in 1..=bars_per_leg {
            let close = from + (to - from) * step as f64 / bars_per_leg as f64;
            let open = prev_close;
            let i = out.len();
            out.push(candle(
                i,
                open,
                open.max(close) + wick,
                open.min(close) - wick,
                close,
                volume,
            ));
            prev_close = close;
        }
    }
    out
}

/// Steady uptrend with shallow pullbacks, long enough for the full pipeline
pub fn trending_up(legs: usize) -> Vec<Candle> {
    let mut pivots = vec![100.0];
    let mut price = 100.0;
    for i in 0..legs {
        price += if i % 2 == 0 { 12.0 } else { -5.0 };
        pivots.push(price);
    }
    zigzag(&pivots, 8, 0.3, 1_000.0)
}

/// Steady downtrend, mirror of `trending_up`
pub fn trending_down(legs: usize) -> Vec<Candle> {
    let mut pivots = vec![400.0];
    let mut price = 400.0;
    for i in 0..legs {
        price += if i % 2 == 0 { -12.0 } else { 5.0 };
        pivots.push(price);
    }
    zigzag(&pivots, 8, 0.3, 1_000.0)
}

/// Flat series with identical bars
pub fn flat(n: usize, price: f64) -> Vec<Candle> {
    (0..n).map(|i| candle(i, price, price, price, price, 0.0)).collect()
}
