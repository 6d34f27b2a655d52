//! Opportunity alert tracking
//! Mission: Fire OPEN once on the way up, CLOSED once on the way down

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::models::{Opportunity, OpportunityKind};

/// Alerts are keyed by kind, symbol and spread sign: a sign reversal closes
/// the old alert and opens a fresh one instead of being suppressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub kind: OpportunityKind,
    pub symbol: String,
    pub positive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTransition {
    Opened,
    Closed,
}

#[derive(Debug, Clone)]
struct AlertState {
    opened_at: DateTime<Utc>,
}

/// Tracks OPEN/CLOSED transitions across detection ticks. Duplicate emits in
/// the same state are suppressed; an alert that never closes re-arms after
/// `ttl` so a persisting condition surfaces again.
pub struct AlertTracker {
    ttl_secs: i64,
    open: HashMap<AlertKey, AlertState>,
}

impl AlertTracker {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl_secs,
            open: HashMap::new(),
        }
    }

    fn key_for(opportunity: &Opportunity) -> AlertKey {
        let signed = opportunity
            .metadata
            .get("premium_pct")
            .and_then(|v| v.as_f64())
            .unwrap_or(opportunity.spread_bps);
        AlertKey {
            kind: opportunity.kind,
            symbol: opportunity.symbol.clone(),
            positive: signed >= 0.0,
        }
    }

    /// Feed one tick's emitted set; returns the transitions to announce.
    pub fn observe(
        &mut self,
        now: DateTime<Utc>,
        opportunities: &[Opportunity],
    ) -> Vec<(AlertKey, AlertTransition)> {
        let ttl = Duration::seconds(self.ttl_secs);
        self.open.retain(|_, state| now - state.opened_at <= ttl);

        let mut transitions = Vec::new();
        let mut seen: HashMap<AlertKey, ()> = HashMap::new();

        for opportunity in opportunities {
            let key = Self::key_for(opportunity);
            if seen.insert(key.clone(), ()).is_some() {
                continue;
            }
            if !self.open.contains_key(&key) {
                self.open.insert(key.clone(), AlertState { opened_at: now });
                transitions.push((key, AlertTransition::Opened));
            }
        }

        let closed: Vec<AlertKey> = self
            .open
            .keys()
            .filter(|key| !seen.contains_key(*key))
            .cloned()
            .collect();
        for key in closed {
            self.open.remove(&key);
            transitions.push((key, AlertTransition::Closed));
        }

        transitions
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}
