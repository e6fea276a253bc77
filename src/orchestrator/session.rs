//! Per-(symbol, timeframe) session state
//!
//! The only cross-call analysis state: the highest mitigation ever seen for
//! each zone. Analyses stay pure; the arena reconciles their zones afterwards.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::fibonacci::{Mitigation, Zone, ZoneKind};
use crate::market::{Direction, Timeframe};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl SessionKey {
    pub fn new(symbol: &str, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            timeframe,
        }
    }
}

/// Zone identity: kind, side and exact bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZoneKey {
    kind: ZoneKind,
    direction: Direction,
    top: u64,
    bottom: u64,
}

impl From<&Zone> for ZoneKey {
    fn from(zone: &Zone) -> Self {
        Self {
            kind: zone.kind,
            direction: zone.direction,
            top: zone.top.to_bits(),
            bottom: zone.bottom.to_bits(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    mitigation: HashMap<ZoneKey, Mitigation>,
    pub analyses: u64,
    pub last_analyzed: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn zone_count(&self) -> usize {
        self.mitigation.len()
    }

    /// Stored status for a zone, if it was ever seen
    pub fn mitigation_of(&self, zone: &Zone) -> Option<Mitigation> {
        self.mitigation.get(&ZoneKey::from(zone)).copied()
    }
}

#[derive(Debug, Default)]
pub struct SessionArena {
    sessions: DashMap<SessionKey, SessionState>,
}

impl SessionArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session. Returns false if it already existed.
    pub fn open(&self, symbol: &str, timeframe: Timeframe) -> bool {
        let key = SessionKey::new(symbol, timeframe);
        if self.sessions.contains_key(&key) {
            return false;
        }
        self.sessions.insert(key, SessionState::default());
        true
    }

    /// Forget tracked zones but keep the session
    pub fn clear(&self, symbol: &str, timeframe: Timeframe) {
        if let Some(mut state) = self.sessions.get_mut(&SessionKey::new(symbol, timeframe)) {
            *state = SessionState::default();
        }
    }

    pub fn remove(&self, symbol: &str, timeframe: Timeframe) -> Option<SessionState> {
        self.sessions
            .remove(&SessionKey::new(symbol, timeframe))
            .map(|(_, state)| state)
    }

    pub fn get(&self, symbol: &str, timeframe: Timeframe) -> Option<SessionState> {
        self.sessions
            .get(&SessionKey::new(symbol, timeframe))
            .map(|s| s.clone())
    }

    pub fn is_open(&self, symbol: &str, timeframe: Timeframe) -> bool {
        self.sessions.contains_key(&SessionKey::new(symbol, timeframe))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Merge observed zones into the session, opening it if needed.
    ///
    /// Each zone ends up with the max of its observed and stored status.
    pub fn reconcile<'a, I>(&self, symbol: &str, timeframe: Timeframe, zones: I, now: DateTime<Utc>)
    where
        I: IntoIterator<Item = &'a mut Zone>,
    {
        let mut state = self.sessions.entry(SessionKey::new(symbol, timeframe)).or_default();
        let mut escalated = 0usize;
        for zone in zones {
            let stored = state
                .mitigation
                .entry(ZoneKey::from(&*zone))
                .or_insert(zone.mitigation);
            let merged = stored.escalate(zone.mitigation);
            if merged != zone.mitigation {
                escalated += 1;
            }
            *stored = merged;
            zone.mitigation = merged;
        }
        state.analyses += 1;
        state.last_analyzed = Some(now);

        if escalated > 0 {
            debug!(
                "{} {}: {} zones carried forward a higher mitigation",
                symbol, timeframe, escalated
            );
        }
    }
}
