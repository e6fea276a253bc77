//! Closed-trade statistics

use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::ClosedTrade;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    /// Positive magnitude
    pub avg_loss: f64,
    pub avg_win_loss_ratio: f64,
    pub profit_factor: f64,
    /// Mean PnL per trade
    pub expectancy: f64,
    /// Mean / std of per-trade returns, not annualised
    pub sharpe: f64,
    pub total_pnl: f64,
    /// Most negative single-trade PnL (0 with no losers)
    pub largest_loss: f64,
}

impl PerformanceStats {
    pub fn from_trades(trades: &[ClosedTrade]) -> Self {
        if trades.is_empty() {
            return Self::default();
        }

        let n = trades.len() as f64;
        let wins: Vec<f64> = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).collect();
        let losses: Vec<f64> = trades.iter().filter(|t| t.pnl < 0.0).map(|t| t.pnl).collect();

        let gross_win: f64 = wins.iter().sum();
        let gross_loss: f64 = -losses.iter().sum::<f64>();
        let avg_win = if wins.is_empty() { 0.0 } else { gross_win / wins.len() as f64 };
        let avg_loss = if losses.is_empty() { 0.0 } else { gross_loss / losses.len() as f64 };
        let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();

        let returns: Vec<f64> = trades.iter().map(|t| t.return_pct).collect();
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();

        Self {
            total_trades: trades.len(),
            wins: wins.len(),
            losses: losses.len(),
            win_rate: wins.len() as f64 / n,
            avg_win,
            avg_loss,
            avg_win_loss_ratio: if avg_loss > 0.0 { avg_win / avg_loss } else { 0.0 },
            profit_factor: if gross_loss > 0.0 { gross_win / gross_loss } else { 0.0 },
            expectancy: total_pnl / n,
            sharpe: if std > 0.0 { mean / std } else { 0.0 },
            total_pnl,
            largest_loss: losses.iter().copied().fold(0.0, f64::min),
        }
    }

    /// Win rate of the most recent `n` trades (0.5 with no history)
    pub fn recent_win_rate(trades: &[ClosedTrade], n: usize) -> f64 {
        let recent = &trades[trades.len().saturating_sub(n)..];
        if recent.is_empty() {
            return 0.5;
        }
        recent.iter().filter(|t| t.is_win()).count() as f64 / recent.len() as f64
    }
}

impl fmt::Display for PerformanceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Performance ({} trades):", self.total_trades)?;
        writeln!(f, "  Win rate: {:.1}% ({}W / {}L)", self.win_rate * 100.0, self.wins, self.losses)?;
        writeln!(f, "  Avg win/loss: {:.2} / {:.2} ({:.2}x)", self.avg_win, self.avg_loss, self.avg_win_loss_ratio)?;
        writeln!(f, "  Profit factor: {:.2}", self.profit_factor)?;
        writeln!(f, "  Expectancy: {:.2}", self.expectancy)?;
        writeln!(f, "  Sharpe (per trade): {:.2}", self.sharpe)?;
        write!(f, "  Total PnL: {:.2}", self.total_pnl)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::market::Direction;
    use crate::risk::position::ExitReason;
    use chrono::Utc;

    pub(crate) fn trade(pnl: f64) -> ClosedTrade {
        ClosedTrade {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: "ETHUSDT".into(),
            direction: Direction::Bullish,
            entry: 100.0,
            exit: 100.0 + pnl / 10.0,
            quantity: 10.0,
            pnl,
            r_multiple: pnl / 50.0,
            return_pct: pnl / 1000.0 * 100.0,
            exit_reason: if pnl > 0.0 { ExitReason::TakeProfit } else { ExitReason::StopLoss },
            opened_at: Utc::now(),
            closed_at: Utc::now(),
        }
    }

    #[test]
    fn test_stats() {
        let trades = vec![trade(100.0), trade(-50.0), trade(200.0), trade(-50.0)];
        let stats = PerformanceStats::from_trades(&trades);
        assert_eq!(stats.total_trades, 4);
        assert_eq!(stats.win_rate, 0.5);
        assert_eq!(stats.avg_win, 150.0);
        assert_eq!(stats.avg_loss, 50.0);
        assert_eq!(stats.avg_win_loss_ratio, 3.0);
        assert_eq!(stats.profit_factor, 3.0);
        assert_eq!(stats.expectancy, 50.0);
        assert_eq!(stats.largest_loss, -50.0);
        assert!(stats.sharpe > 0.0);
    }

    #[test]
    fn test_empty_and_all_wins() {
        assert_eq!(PerformanceStats::from_trades(&[]), PerformanceStats::default());
        let stats = PerformanceStats::from_trades(&[trade(10.0), trade(10.0)]);
        assert_eq!(stats.profit_factor, 0.0);
        assert_eq!(stats.sharpe, 0.0);
        assert_eq!(stats.largest_loss, 0.0);
    }

    #[test]
    fn test_recent_win_rate() {
        let trades = vec![trade(-1.0), trade(-1.0), trade(1.0), trade(1.0)];
        assert_eq!(PerformanceStats::recent_win_rate(&trades, 2), 1.0);
        assert_eq!(PerformanceStats::recent_win_rate(&[], 5), 0.5);
    }
}
