//! Drawdown tracking and zone classification

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawdownConfig {
    /// Drawdown fraction entering each zone
    pub yellow_threshold: f64,
    pub red_threshold: f64,
    pub pause_threshold: f64,
    pub yellow_multiplier: f64,
    pub red_multiplier: f64,
    pub pause_cooldown_hours: i64,
}

impl Default for DrawdownConfig {
    fn default() -> Self {
        Self {
            yellow_threshold: 0.05,
            red_threshold: 0.10,
            pause_threshold: 0.15,
            yellow_multiplier: 0.5,
            red_multiplier: 0.25,
            pause_cooldown_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DrawdownZone {
    #[default]
    Green,
    Yellow,
    Red,
    Pause,
}

impl DrawdownZone {
    pub fn classify(drawdown: f64, config: &DrawdownConfig) -> Self {
        if drawdown >= config.pause_threshold {
            DrawdownZone::Pause
        } else if drawdown >= config.red_threshold {
            DrawdownZone::Red
        } else if drawdown >= config.yellow_threshold {
            DrawdownZone::Yellow
        } else {
            DrawdownZone::Green
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownState {
    pub peak_equity: f64,
    pub current_equity: f64,
    /// (peak - current) / peak
    pub drawdown: f64,
    pub zone: DrawdownZone,
    pub paused_until: Option<DateTime<Utc>>,
}

impl DrawdownState {
    pub fn new(equity: f64) -> Self {
        Self {
            peak_equity: equity,
            current_equity: equity,
            drawdown: 0.0,
            zone: DrawdownZone::Green,
            paused_until: None,
        }
    }

    /// Next state after equity changes. Peak never decreases; entering the
    /// pause zone starts the cooldown.
    pub fn recompute(&self, equity: f64, now: DateTime<Utc>, config: &DrawdownConfig) -> DrawdownState {
        let peak_equity = self.peak_equity.max(equity);
        let drawdown = if peak_equity > 0.0 {
            ((peak_equity - equity) / peak_equity).max(0.0)
        } else {
            0.0
        };
        let zone = DrawdownZone::classify(drawdown, config);

        let paused_until = match (self.zone, zone) {
            (prev, DrawdownZone::Pause) if prev != DrawdownZone::Pause => {
                let until = now + Duration::hours(config.pause_cooldown_hours);
                warn!(
                    "Drawdown {:.1}% entered pause zone, trading paused until {}",
                    drawdown * 100.0,
                    until
                );
                Some(until)
            }
            (_, DrawdownZone::Pause) => self.paused_until,
            _ => None,
        };

        if zone != self.zone {
            info!("Drawdown zone {:?} -> {:?} ({:.1}%)", self.zone, zone, drawdown * 100.0);
        }

        DrawdownState {
            peak_equity,
            current_equity: equity,
            drawdown,
            zone,
            paused_until,
        }
    }

    /// Pause cooldown still running at `now`
    pub fn is_paused(&self, now: DateTime<Utc>) -> bool {
        self.paused_until.is_some_and(|until| now < until)
    }

    pub fn resume_in_secs(&self, now: DateTime<Utc>) -> i64 {
        self.paused_until
            .map(|until| (until - now).num_seconds().max(0))
            .unwrap_or(0)
    }

    /// Size multiplier for the zone. An expired pause sizes like red.
    pub fn size_multiplier(&self, now: DateTime<Utc>, config: &DrawdownConfig) -> f64 {
        match self.zone {
            DrawdownZone::Green => 1.0,
            DrawdownZone::Yellow => config.yellow_multiplier,
            DrawdownZone::Red => config.red_multiplier,
            DrawdownZone::Pause if self.is_paused(now) => 0.0,
            DrawdownZone::Pause => config.red_multiplier,
        }
    }
}
