//! Fused market snapshot
//! Mission: One coherent read model over many eventually-consistent feeds

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::models::{FundingRate, Instrument, OpenInterest, Ticker, Venue, VenueKind};

pub type MarketKey = (Venue, Instrument);

/// Long-lived, in-memory fused view of all venue feeds. Connectors publish
/// per-key replacements under a short write lock; the detector takes a cloned
/// immutable [`SnapshotView`] per tick so every detector observes the same
/// data regardless of concurrent publishes.
#[derive(Default)]
pub struct MarketSnapshot {
    tickers: RwLock<HashMap<MarketKey, Ticker>>,
    funding: RwLock<HashMap<MarketKey, FundingRate>>,
    open_interest: RwLock<HashMap<MarketKey, OpenInterest>>,
}

impl MarketSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish_tickers(&self, tickers: Vec<Ticker>) {
        let mut map = self.tickers.write();
        for ticker in tickers {
            if ticker.last <= 0.0 {
                continue; // sanity: negative or zero prices never enter the model
            }
            map.insert((ticker.venue, ticker.instrument.clone()), ticker);
        }
    }

    pub fn publish_funding(&self, venue: Venue, rates: Vec<(Instrument, FundingRate)>) {
        let mut map = self.funding.write();
        for (instrument, rate) in rates {
            map.insert((venue, instrument), rate);
        }
    }

    pub fn publish_open_interest(&self, venue: Venue, entries: Vec<(Instrument, OpenInterest)>) {
        let mut map = self.open_interest.write();
        for (instrument, oi) in entries {
            map.insert((venue, instrument), oi);
        }
    }

    /// Drop tickers older than `stale_ttl`; their slice is no longer eligible
    /// for detection at all (not merely filtered by `max_age`).
    pub fn evict_stale(&self, now: DateTime<Utc>, stale_ttl_secs: i64) {
        let cutoff = now - Duration::seconds(stale_ttl_secs);
        self.tickers.write().retain(|_, t| t.ts >= cutoff);
    }

    /// Consistent view for one detection pass.
    pub fn view(&self) -> SnapshotView {
        SnapshotView {
            tickers: self.tickers.read().clone(),
            funding: self.funding.read().clone(),
            open_interest: self.open_interest.read().clone(),
            taken_at: Utc::now(),
        }
    }

    pub fn ticker(&self, venue: Venue, instrument: &Instrument) -> Option<Ticker> {
        self.tickers.read().get(&(venue, instrument.clone())).cloned()
    }

    pub fn ticker_count(&self) -> usize {
        self.tickers.read().len()
    }
}

/// Immutable copy of the snapshot taken at the top of a detection tick.
/// Detectors are pure functions over this.
#[derive(Debug, Clone, Default)]
pub struct SnapshotView {
    pub tickers: HashMap<MarketKey, Ticker>,
    pub funding: HashMap<MarketKey, FundingRate>,
    pub open_interest: HashMap<MarketKey, OpenInterest>,
    pub taken_at: DateTime<Utc>,
}

impl SnapshotView {
    pub fn ticker(&self, venue: Venue, instrument: &Instrument) -> Option<&Ticker> {
        self.tickers.get(&(venue, instrument.clone()))
    }

    /// Fresh tickers of one venue kind, grouped by (base, quote).
    pub fn fresh_by_pair(
        &self,
        kind: VenueKind,
        max_age_secs: i64,
    ) -> HashMap<(String, String), Vec<&Ticker>> {
        let mut groups: HashMap<(String, String), Vec<&Ticker>> = HashMap::new();
        for ticker in self.tickers.values() {
            if ticker.instrument.venue_kind != kind {
                continue;
            }
            if !ticker.is_fresh(self.taken_at, max_age_secs) {
                continue;
            }
            groups
                .entry((
                    ticker.instrument.base.clone(),
                    ticker.instrument.quote.clone(),
                ))
                .or_default()
                .push(ticker);
        }
        groups
    }

    /// Fresh tickers of one venue kind, grouped by base asset only (used by
    /// detectors that cross quote currencies, e.g. kimchi KRW vs USDT).
    pub fn fresh_by_base(
        &self,
        kind: VenueKind,
        max_age_secs: i64,
    ) -> HashMap<String, Vec<&Ticker>> {
        let mut groups: HashMap<String, Vec<&Ticker>> = HashMap::new();
        for ticker in self.tickers.values() {
            if ticker.instrument.venue_kind != kind {
                continue;
            }
            if !ticker.is_fresh(self.taken_at, max_age_secs) {
                continue;
            }
            groups
                .entry(ticker.instrument.base.clone())
                .or_default()
                .push(ticker);
        }
        groups
    }

    pub fn funding_for(&self, venue: Venue, instrument: &Instrument) -> Option<FundingRate> {
        self.funding.get(&(venue, instrument.clone())).copied()
    }

    pub fn oi_usd(&self, venue: Venue, instrument: &Instrument) -> Option<f64> {
        self.open_interest
            .get(&(venue, instrument.clone()))
            .map(|oi| oi.oi_usd)
    }
}
