//! Candlestick predicates over short windows

use serde::{Deserialize, Serialize};

use crate::market::{Candle, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandlePattern {
    BullishEngulfing,
    BearishEngulfing,
    Hammer,
    ShootingStar,
    Doji,
    InsideBar,
    MorningStar,
    EveningStar,
}

impl CandlePattern {
    pub const ALL: [CandlePattern; 8] = [
        CandlePattern::BullishEngulfing,
        CandlePattern::BearishEngulfing,
        CandlePattern::Hammer,
        CandlePattern::ShootingStar,
        CandlePattern::Doji,
        CandlePattern::InsideBar,
        CandlePattern::MorningStar,
        CandlePattern::EveningStar,
    ];

    /// Number of candles the predicate reads
    pub fn window_len(&self) -> usize {
        match self {
            CandlePattern::Hammer | CandlePattern::ShootingStar | CandlePattern::Doji => 1,
            CandlePattern::BullishEngulfing
            | CandlePattern::BearishEngulfing
            | CandlePattern::InsideBar => 2,
            CandlePattern::MorningStar | CandlePattern::EveningStar => 3,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            CandlePattern::BullishEngulfing | CandlePattern::Hammer | CandlePattern::MorningStar => {
                Direction::Bullish
            }
            CandlePattern::BearishEngulfing
            | CandlePattern::ShootingStar
            | CandlePattern::EveningStar => Direction::Bearish,
            CandlePattern::Doji | CandlePattern::InsideBar => Direction::Neutral,
        }
    }

    /// Test the pattern against the trailing candles of `window`
    pub fn matches(&self, window: &[Candle]) -> bool {
        let n = self.window_len();
        if window.len() < n {
            return false;
        }
        let w = &window[window.len() - n..];
        match self {
            CandlePattern::BullishEngulfing => {
                let (prev, curr) = (&w[0], &w[1]);
                prev.is_bearish()
                    && curr.is_bullish()
                    && curr.open <= prev.close
                    && curr.close >= prev.open
                    && curr.body() > prev.body()
            }
            CandlePattern::BearishEngulfing => {
                let (prev, curr) = (&w[0], &w[1]);
                prev.is_bullish()
                    && curr.is_bearish()
                    && curr.open >= prev.close
                    && curr.close <= prev.open
                    && curr.body() > prev.body()
            }
            CandlePattern::Hammer => {
                let c = &w[0];
                c.range() > 0.0
                    && c.lower_wick() >= 2.0 * c.body()
                    && c.upper_wick() <= 0.25 * c.range()
                    && c.body() > 0.0
            }
            CandlePattern::ShootingStar => {
                let c = &w[0];
                c.range() > 0.0
                    && c.upper_wick() >= 2.0 * c.body()
                    && c.lower_wick() <= 0.25 * c.range()
                    && c.body() > 0.0
            }
            CandlePattern::Doji => {
                let c = &w[0];
                c.range() > 0.0 && c.body() <= 0.1 * c.range()
            }
            CandlePattern::InsideBar => {
                let (prev, curr) = (&w[0], &w[1]);
                curr.high < prev.high && curr.low > prev.low
            }
            CandlePattern::MorningStar => {
                let (first, star, last) = (&w[0], &w[1], &w[2]);
                first.is_bearish()
                    && first.body_ratio() >= 0.5
                    && star.body() <= 0.3 * first.body()
                    && last.is_bullish()
                    && last.close > (first.open + first.close) / 2.0
            }
            CandlePattern::EveningStar => {
                let (first, star, last) = (&w[0], &w[1], &w[2]);
                first.is_bullish()
                    && first.body_ratio() >= 0.5
                    && star.body() <= 0.3 * first.body()
                    && last.is_bearish()
                    && last.close < (first.open + first.close) / 2.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::fixtures::candle;

    #[test]
    fn test_engulfing() {
        let w = vec![
            candle(0, 105.0, 106.0, 101.0, 102.0, 1.0),
            candle(1, 101.5, 108.0, 101.0, 107.0, 1.0),
        ];
        assert!(CandlePattern::BullishEngulfing.matches(&w));
        assert!(!CandlePattern::BearishEngulfing.matches(&w));
    }

    #[test]
    fn test_hammer_and_star() {
        let hammer = [candle(0, 100.0, 101.2, 94.0, 101.0, 1.0)];
        assert!(CandlePattern::Hammer.matches(&hammer));
        assert!(!CandlePattern::ShootingStar.matches(&hammer));

        let star = [candle(0, 101.0, 107.0, 99.8, 100.0, 1.0)];
        assert!(CandlePattern::ShootingStar.matches(&star));
    }

    #[test]
    fn test_doji_and_inside_bar() {
        let w = vec![
            candle(0, 100.0, 110.0, 90.0, 105.0, 1.0),
            candle(1, 100.0, 104.0, 96.0, 100.2, 1.0),
        ];
        assert!(CandlePattern::Doji.matches(&w));
        assert!(CandlePattern::InsideBar.matches(&w));
        assert_eq!(CandlePattern::InsideBar.direction(), Direction::Neutral);
    }

    #[test]
    fn test_morning_star() {
        let w = vec![
            candle(0, 110.0, 110.5, 100.0, 101.0, 1.0),
            candle(1, 100.5, 101.5, 99.0, 100.8, 1.0),
            candle(2, 101.0, 108.0, 100.5, 107.0, 1.0),
        ];
        assert!(CandlePattern::MorningStar.matches(&w));
        assert!(!CandlePattern::EveningStar.matches(&w));
    }

    #[test]
    fn test_short_window_never_matches() {
        let w = [candle(0, 100.0, 101.0, 99.0, 100.5, 1.0)];
        assert!(!CandlePattern::MorningStar.matches(&w));
        assert!(!CandlePattern::BullishEngulfing.matches(&[]));
    }
}
