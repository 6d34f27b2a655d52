//! Refresh-and-detect scheduler
//! Mission: Drive every connector concurrently, never let one stall the tick

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::arbitrage::alerts::{AlertTracker, AlertTransition};
use crate::arbitrage::engine::OpportunityEngine;
use crate::fx::FxResolver;
use crate::hub::BroadcastHub;
use crate::models::Venue;
use crate::scrapers::{Connector, ScrapeError};
use crate::snapshot::MarketSnapshot;
use crate::wallet::WalletStateOracle;

/// Backoff cap as a multiple of the detect interval.
const MAX_BACKOFF_TICKS: u32 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct ConnectorStatus {
    pub label: &'static str,
    pub venue: Venue,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub backoff_until: Option<DateTime<Utc>>,
}

impl ConnectorStatus {
    fn new(label: &'static str, venue: Venue) -> Self {
        Self {
            label,
            venue,
            last_success: None,
            last_error: None,
            consecutive_failures: 0,
            backoff_until: None,
        }
    }
}

/// Extra wait before a retry. The first transient failure retries on the
/// next tick; repeats double the wait, capped at `MAX_BACKOFF_TICKS` ticks.
/// Rate limits back off immediately.
fn backoff_delay(interval: Duration, consecutive_failures: u32, rate_limited: bool) -> Option<Duration> {
    let exponent = if rate_limited {
        consecutive_failures
    } else {
        consecutive_failures.saturating_sub(1)
    };
    if exponent == 0 {
        return None;
    }
    let ticks = 2u64.saturating_pow(exponent.min(8)).min(MAX_BACKOFF_TICKS as u64);
    Some(interval * ticks as u32)
}

pub struct Scheduler {
    connectors: Vec<Arc<dyn Connector>>,
    snapshot: Arc<MarketSnapshot>,
    engine: OpportunityEngine,
    fx: Arc<FxResolver>,
    wallet: Arc<WalletStateOracle>,
    hub: Arc<BroadcastHub>,
    alerts: Mutex<AlertTracker>,
    status: RwLock<HashMap<&'static str, ConnectorStatus>>,
    detect_interval: Duration,
    connector_timeout: Duration,
    stale_ttl_secs: i64,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connectors: Vec<Arc<dyn Connector>>,
        snapshot: Arc<MarketSnapshot>,
        engine: OpportunityEngine,
        fx: Arc<FxResolver>,
        wallet: Arc<WalletStateOracle>,
        hub: Arc<BroadcastHub>,
        alert_ttl_secs: i64,
        detect_interval: Duration,
        connector_timeout: Duration,
        stale_ttl_secs: i64,
    ) -> Self {
        let status = connectors
            .iter()
            .map(|c| (c.label(), ConnectorStatus::new(c.label(), c.venue())))
            .collect();
        Self {
            connectors,
            snapshot,
            engine,
            fx,
            wallet,
            hub,
            alerts: Mutex::new(AlertTracker::new(alert_ttl_secs)),
            status: RwLock::new(status),
            detect_interval,
            connector_timeout,
            stale_ttl_secs,
        }
    }

    pub fn spawn(self: Arc<Self>) {
        tokio::spawn(async move {
            info!(
                connectors = self.connectors.len(),
                interval_secs = self.detect_interval.as_secs(),
                "🔄 scheduler started"
            );
            let mut ticker = tokio::time::interval(self.detect_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.clone().run_tick().await;
            }
        });
    }

    /// One full refresh-and-detect cycle.
    pub async fn run_tick(self: Arc<Self>) {
        let now = Utc::now();
        let max_jitter_ms = (self.detect_interval.as_millis() as u64 / 10).max(1);

        let mut handles = Vec::new();
        for connector in &self.connectors {
            if let Some(until) = self
                .status
                .read()
                .get(connector.label())
                .and_then(|s| s.backoff_until)
            {
                if until > now {
                    continue; // still backing off
                }
            }

            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter_ms));
            let connector = connector.clone();
            let this = self.clone();
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(jitter).await;
                let outcome =
                    match tokio::time::timeout(this.connector_timeout, connector.refresh()).await {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(e),
                        Err(_) => Err(ScrapeError::Network(format!(
                            "refresh exceeded {:?}",
                            this.connector_timeout
                        ))),
                    };
                this.record_outcome(connector.label(), outcome);
            }));
        }

        // all in-flight refreshes finish (or time out) before the detector runs
        for handle in handles {
            let _ = handle.await;
        }

        self.detect_and_publish();
    }

    fn detect_and_publish(&self) {
        self.snapshot.evict_stale(Utc::now(), self.stale_ttl_secs);

        let view = self.snapshot.view();
        let fx = self.fx.current();
        let wallet = self.wallet.table_view();
        let opportunities = self.engine.detect(&view, Some(&fx), &wallet);

        for (key, transition) in self.alerts.lock().observe(view.taken_at, &opportunities) {
            match transition {
                AlertTransition::Opened => info!(
                    kind = key.kind.as_str(),
                    symbol = %key.symbol,
                    positive = key.positive,
                    "📈 opportunity alert opened"
                ),
                AlertTransition::Closed => info!(
                    kind = key.kind.as_str(),
                    symbol = %key.symbol,
                    positive = key.positive,
                    "📉 opportunity alert closed"
                ),
            }
        }

        debug!(
            tickers = view.tickers.len(),
            opportunities = opportunities.len(),
            subscribers = self.hub.subscriber_count(),
            "tick complete"
        );
        self.hub.publish(opportunities);
    }

    fn record_outcome(&self, label: &'static str, outcome: Result<(), ScrapeError>) {
        let mut status = self.status.write();
        let Some(entry) = status.get_mut(label) else {
            return;
        };
        match outcome {
            Ok(()) => {
                entry.last_success = Some(Utc::now());
                entry.last_error = None;
                entry.consecutive_failures = 0;
                entry.backoff_until = None;
            }
            Err(e) => {
                entry.consecutive_failures += 1;
                let rate_limited = e.is_rate_limited();
                let delay =
                    backoff_delay(self.detect_interval, entry.consecutive_failures, rate_limited);
                entry.backoff_until = delay.map(|d| {
                    Utc::now() + chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero())
                });
                warn!(
                    connector = label,
                    failures = entry.consecutive_failures,
                    backoff = ?delay,
                    error = %e,
                    "⚠️ connector refresh failed"
                );
                entry.last_error = Some(e.to_string());
            }
        }
    }

    pub fn status_report(&self) -> Vec<ConnectorStatus> {
        let mut report: Vec<ConnectorStatus> = self.status.read().values().cloned().collect();
        report.sort_by_key(|s| s.label);
        report
    }
}
