//! XABCD harmonic ratio predicates over alternating swings

use serde::{Deserialize, Serialize};

use crate::market::Direction;
use crate::structure::{SwingKind, SwingPoint};

/// Inclusive ratio band
pub type Band = (f64, f64);

/// Ratio bands of one harmonic pattern
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicRatios {
    /// AB as a retracement of XA
    pub ab_xa: Band,
    /// BC as a retracement of AB
    pub bc_ab: Band,
    /// CD as an extension of BC
    pub cd_bc: Band,
    /// AD as a retracement of XA
    pub ad_xa: Band,
}

const GARTLEY: HarmonicRatios = HarmonicRatios {
    ab_xa: (0.618, 0.618),
    bc_ab: (0.382, 0.886),
    cd_bc: (1.272, 1.618),
    ad_xa: (0.786, 0.786),
};

const BAT: HarmonicRatios = HarmonicRatios {
    ab_xa: (0.382, 0.5),
    bc_ab: (0.382, 0.886),
    cd_bc: (1.618, 2.618),
    ad_xa: (0.886, 0.886),
};

const BUTTERFLY: HarmonicRatios = HarmonicRatios {
    ab_xa: (0.786, 0.786),
    bc_ab: (0.382, 0.886),
    cd_bc: (1.618, 2.24),
    ad_xa: (1.27, 1.618),
};

const CRAB: HarmonicRatios = HarmonicRatios {
    ab_xa: (0.382, 0.618),
    bc_ab: (0.382, 0.886),
    cd_bc: (2.24, 3.618),
    ad_xa: (1.618, 1.618),
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarmonicPattern {
    Gartley,
    Bat,
    Butterfly,
    Crab,
}

impl HarmonicPattern {
    pub const ALL: [HarmonicPattern; 4] = [
        HarmonicPattern::Gartley,
        HarmonicPattern::Bat,
        HarmonicPattern::Butterfly,
        HarmonicPattern::Crab,
    ];

    pub fn ratios(&self) -> HarmonicRatios {
        match self {
            HarmonicPattern::Gartley => GARTLEY,
            HarmonicPattern::Bat => BAT,
            HarmonicPattern::Butterfly => BUTTERFLY,
            HarmonicPattern::Crab => CRAB,
        }
    }

    /// Direction of the expected reversal at D, when the last five swings
    /// form this pattern within `tolerance`
    pub fn matches(&self, swings: &[SwingPoint], tolerance: f64) -> Option<Direction> {
        let xabcd = XabcdRatios::from_swings(swings)?;
        let bands = self.ratios();
        let within = |value: f64, (lo, hi): Band| value >= lo - tolerance && value <= hi + tolerance;

        (within(xabcd.ab_xa, bands.ab_xa)
            && within(xabcd.bc_ab, bands.bc_ab)
            && within(xabcd.cd_bc, bands.cd_bc)
            && within(xabcd.ad_xa, bands.ad_xa))
        .then_some(xabcd.direction)
    }
}

/// Measured ratios of the trailing five alternating swings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XabcdRatios {
    pub ab_xa: f64,
    pub bc_ab: f64,
    pub cd_bc: f64,
    pub ad_xa: f64,
    pub direction: Direction,
    pub d_index: usize,
}

impl XabcdRatios {
    pub fn from_swings(swings: &[SwingPoint]) -> Option<Self> {
        if swings.len() < 5 {
            return None;
        }
        let w = &swings[swings.len() - 5..];
        if w.windows(2).any(|p| p[0].kind == p[1].kind) {
            return None;
        }
        let (x, a, b, c, d) = (w[0].price, w[1].price, w[2].price, w[3].price, w[4].price);
        let xa = (a - x).abs();
        let ab = (b - a).abs();
        let bc = (c - b).abs();
        if xa <= 0.0 || ab <= 0.0 || bc <= 0.0 {
            return None;
        }
        let direction = match w[4].kind {
            SwingKind::Low => Direction::Bullish,
            SwingKind::High => Direction::Bearish,
        };
        Some(Self {
            ab_xa: ab / xa,
            bc_ab: bc / ab,
            cd_bc: (d - c).abs() / bc,
            ad_xa: (a - d).abs() / xa,
            direction,
            d_index: w[4].index,
        })
    }
}
