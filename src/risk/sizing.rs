//! Position Sizing
//!
//! Picks the fraction of equity to risk on a trade, then applies the
//! drawdown, volatility and confidence multipliers. The quantity follows
//! from the stop distance and is clamped by single-asset exposure.

use serde::{Deserialize, Serialize};

use super::performance::PerformanceStats;
use super::position::ClosedTrade;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SizingMethod {
    #[default]
    FixedFraction,
    Kelly,
    OptimalF,
    Adaptive,
}

/// Position sizing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub method: SizingMethod,
    /// Percent of equity risked per trade under fixed fraction
    pub risk_per_trade_pct: f64,
    /// Scale applied to raw Kelly / Optimal-F
    pub fractional_multiplier: f64,
    /// Upper bound on the risked fraction
    pub max_risk_fraction: f64,
    /// History needed before Kelly / Optimal-F / adaptive use it
    pub min_trades: usize,
    pub optimal_f_step: f64,
    /// Trades in the adaptive recent-win-rate window
    pub adaptive_window: usize,
    pub confidence_scaling: bool,
    /// ATR as percent of price that sizes at 1.0x
    pub target_atr_pct: f64,
    /// Max notional per position as a fraction of equity
    pub max_single_asset_exposure: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            method: SizingMethod::FixedFraction,
            risk_per_trade_pct: 1.0,
            fractional_multiplier: 0.25,
            max_risk_fraction: 0.10,
            min_trades: 20,
            optimal_f_step: 0.01,
            adaptive_window: 10,
            confidence_scaling: true,
            target_atr_pct: 2.0,
            max_single_asset_exposure: 0.20,
        }
    }
}

/// `W - (1 - W) / R`, scaled by `fraction` and capped at `cap`. Never negative.
pub fn kelly_fraction(win_rate: f64, avg_win_loss_ratio: f64, fraction: f64, cap: f64) -> f64 {
    if avg_win_loss_ratio <= 0.0 || !(0.0..=1.0).contains(&win_rate) {
        return 0.0;
    }
    let raw = win_rate - (1.0 - win_rate) / avg_win_loss_ratio;
    (raw * fraction).clamp(0.0, cap.max(0.0))
}

/// Vince's Optimal-F by grid search over `(0, 1]`.
///
/// HPR for each trade is `1 + f * (-pnl / largest_loss)`; the f maximising
/// the product (terminal wealth relative) wins. `None` without a losing trade.
pub fn optimal_f(pnls: &[f64], step: f64) -> Option<f64> {
    let largest_loss = pnls.iter().copied().fold(0.0, f64::min);
    if largest_loss >= 0.0 || step <= 0.0 {
        return None;
    }

    let steps = (1.0 / step).floor() as usize;
    let mut best: Option<(f64, f64)> = None;
    for k in 1..=steps {
        let f = k as f64 * step;
        // log-sum keeps long histories finite
        let mut log_twr = 0.0;
        let mut ruined = false;
        for &pnl in pnls {
            let hpr = 1.0 + f * (-pnl / largest_loss);
            if hpr <= 0.0 {
                ruined = true;
                break;
            }
            log_twr += hpr.ln();
        }
        if ruined {
            continue;
        }
        if best.map_or(true, |(_, b)| log_twr > b) {
            best = Some((f, log_twr));
        }
    }
    best.map(|(f, _)| f)
}

/// Inputs for one sizing decision
#[derive(Debug, Clone)]
pub struct SizingContext<'a> {
    pub equity: f64,
    pub entry: f64,
    pub stop: f64,
    /// Setup confidence in [0, 1]
    pub confidence: f64,
    pub atr: Option<f64>,
    pub drawdown_multiplier: f64,
    /// Remaining daily/weekly risk budget in money
    pub risk_budget_remaining: f64,
    pub history: &'a [ClosedTrade],
}

/// Explanation of how size was calculated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SizeExplanation {
    pub method: SizingMethod,
    pub base_risk_fraction: f64,
    pub drawdown_multiplier: f64,
    pub volatility_multiplier: f64,
    pub confidence_multiplier: f64,
    pub risk_amount: f64,
    pub quantity: f64,
    pub notional: f64,
    /// Set when the exposure cap cut the quantity
    pub exposure_capped: bool,
    /// Set when the remaining risk budget cut the risk amount
    pub budget_capped: bool,
}

impl SizeExplanation {
    pub fn is_tradeable(&self) -> bool {
        self.quantity > 0.0 && self.quantity.is_finite()
    }
}

impl std::fmt::Display for SizeExplanation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Position Size Calculation ({:?}):", self.method)?;
        writeln!(f, "  Base risk: {:.2}% of equity", self.base_risk_fraction * 100.0)?;
        writeln!(f, "  × Drawdown ({:.2}x)", self.drawdown_multiplier)?;
        writeln!(f, "  × Volatility ({:.2}x)", self.volatility_multiplier)?;
        writeln!(f, "  × Confidence ({:.2}x)", self.confidence_multiplier)?;
        if self.budget_capped {
            writeln!(f, "  Risk budget cap applied")?;
        }
        writeln!(f, "  Risk amount: {:.2}", self.risk_amount)?;
        if self.exposure_capped {
            writeln!(f, "  Exposure cap applied")?;
        }
        write!(f, "  = Quantity: {:.6} (notional {:.2})", self.quantity, self.notional)
    }
}

/// Position Sizer
#[derive(Debug, Clone, Default)]
pub struct PositionSizer {
    config: SizingConfig,
}

impl PositionSizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    fn fixed_fraction(&self) -> f64 {
        (self.config.risk_per_trade_pct / 100.0).clamp(0.0, self.config.max_risk_fraction.max(0.0))
    }

    /// Fraction of equity to risk before multipliers
    pub fn base_risk_fraction(&self, ctx: &SizingContext<'_>) -> f64 {
        let cfg = &self.config;
        let enough_history = ctx.history.len() >= cfg.min_trades;
        let cap = cfg.max_risk_fraction.max(0.0);

        match cfg.method {
            SizingMethod::FixedFraction => self.fixed_fraction(),
            SizingMethod::Kelly if enough_history => {
                let stats = PerformanceStats::from_trades(ctx.history);
                kelly_fraction(stats.win_rate, stats.avg_win_loss_ratio, cfg.fractional_multiplier, cap)
            }
            SizingMethod::OptimalF if enough_history => {
                let pnls: Vec<f64> = ctx.history.iter().map(|t| t.pnl).collect();
                match optimal_f(&pnls, cfg.optimal_f_step) {
                    Some(f) => (f * cfg.fractional_multiplier).clamp(0.0, cap),
                    None => self.fixed_fraction(),
                }
            }
            SizingMethod::Adaptive => {
                let base = self.fixed_fraction() * (0.5 + ctx.confidence.clamp(0.0, 1.0));
                let form = if enough_history {
                    let recent = PerformanceStats::recent_win_rate(ctx.history, cfg.adaptive_window);
                    (recent / 0.5).clamp(0.5, 1.5)
                } else {
                    1.0
                };
                (base * form).clamp(0.0, cap)
            }
            SizingMethod::Kelly | SizingMethod::OptimalF => self.fixed_fraction(),
        }
    }

    /// Smaller size in volatile markets, larger in quiet ones (0.5x - 1.5x)
    pub fn volatility_multiplier(&self, entry: f64, atr: Option<f64>) -> f64 {
        match atr.filter(|a| *a > 0.0) {
            Some(atr) if entry > 0.0 && self.config.target_atr_pct > 0.0 => {
                let atr_pct = atr / entry * 100.0;
                (self.config.target_atr_pct / atr_pct).clamp(0.5, 1.5)
            }
            _ => 1.0,
        }
    }

    /// Confidence 0..1 maps to 0.5x..1.5x. Adaptive already folds it in.
    pub fn confidence_multiplier(&self, confidence: f64) -> f64 {
        if self.config.confidence_scaling && self.config.method != SizingMethod::Adaptive {
            0.5 + confidence.clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    /// Get size breakdown
    pub fn explain_size(&self, ctx: &SizingContext<'_>) -> SizeExplanation {
        let base_risk_fraction = self.base_risk_fraction(ctx);
        let drawdown_multiplier = ctx.drawdown_multiplier.max(0.0);
        let volatility_multiplier = self.volatility_multiplier(ctx.entry, ctx.atr);
        let confidence_multiplier = self.confidence_multiplier(ctx.confidence);

        let mut risk_amount = ctx.equity.max(0.0)
            * base_risk_fraction
            * drawdown_multiplier
            * volatility_multiplier
            * confidence_multiplier;

        let budget = ctx.risk_budget_remaining.max(0.0);
        let budget_capped = risk_amount > budget;
        if budget_capped {
            risk_amount = budget;
        }

        let per_unit = (ctx.entry - ctx.stop).abs();
        let mut quantity = if per_unit > 0.0 && ctx.entry > 0.0 {
            risk_amount / per_unit
        } else {
            0.0
        };

        let max_notional = ctx.equity.max(0.0) * self.config.max_single_asset_exposure;
        let exposure_capped = quantity * ctx.entry > max_notional;
        if exposure_capped {
            quantity = if ctx.entry > 0.0 { max_notional / ctx.entry } else { 0.0 };
            risk_amount = quantity * per_unit;
        }

        SizeExplanation {
            method: self.config.method,
            base_risk_fraction,
            drawdown_multiplier,
            volatility_multiplier,
            confidence_multiplier,
            risk_amount,
            quantity,
            notional: quantity * ctx.entry,
            exposure_capped,
            budget_capped,
        }
    }
}
