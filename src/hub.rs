//! Broadcast hub
//! Mission: Fan detection results out to every subscriber, drop the slow ones

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::models::Opportunity;

/// Per-subscriber send buffer; a receiver that falls more than this many
/// frames behind is disconnected rather than back-pressuring the detector.
pub const SUBSCRIBER_BUFFER: usize = 16;

/// One serialized frame per detection tick: the full opportunity list as a
/// JSON array.
pub struct BroadcastHub {
    tx: broadcast::Sender<String>,
    last_good: RwLock<LastGood>,
    latest_frame: RwLock<String>,
    last_good_ttl_secs: i64,
}

struct LastGood {
    opportunities: Vec<Opportunity>,
    at: DateTime<Utc>,
}

impl BroadcastHub {
    pub fn new(last_good_ttl_secs: i64) -> Self {
        let (tx, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Self {
            tx,
            last_good: RwLock::new(LastGood {
                opportunities: Vec::new(),
                at: Utc::now() - Duration::seconds(last_good_ttl_secs + 1),
            }),
            latest_frame: RwLock::new("[]".to_string()),
            last_good_ttl_secs,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish one completed tick. Non-empty results refresh the last-good
    /// list; empty ticks leave it in place for `last_good_ttl`.
    pub fn publish(&self, opportunities: Vec<Opportunity>) {
        let frame = serde_json::to_string(&opportunities).unwrap_or_else(|e| {
            warn!(error = %e, "failed to serialize opportunity frame");
            "[]".to_string()
        });

        if !opportunities.is_empty() {
            *self.last_good.write() = LastGood {
                opportunities,
                at: Utc::now(),
            };
        }
        *self.latest_frame.write() = frame.clone();

        // no receivers is normal; broadcast only fails when nobody listens
        if let Err(e) = self.tx.send(frame) {
            debug!("no active opportunity subscribers: {}", e);
        }
    }

    /// Most recent frame, used as the heartbeat payload.
    pub fn latest_frame(&self) -> String {
        self.latest_frame.read().clone()
    }

    /// Last-good list for the HTTP snapshot; `true` means the data is past
    /// its TTL and the caller should flag staleness.
    pub fn snapshot(&self) -> (Vec<Opportunity>, bool) {
        let last_good = self.last_good.read();
        let age = Utc::now().signed_duration_since(last_good.at);
        if age <= Duration::seconds(self.last_good_ttl_secs) {
            (last_good.opportunities.clone(), false)
        } else {
            (Vec::new(), true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OpportunityKind, Venue};
    use std::collections::BTreeMap;

    fn opportunity(spread_bps: f64) -> Opportunity {
        Opportunity {
            id: Opportunity::derive_id(
                OpportunityKind::SpotCross,
                "BTC/USDT",
                &[Venue::Binance, Venue::Okx],
                spread_bps,
            ),
            kind: OpportunityKind::SpotCross,
            symbol: "BTC/USDT".to_string(),
            spread_bps,
            expected_pnl_pct: 0.05,
            notional_usd: 10_000.0,
            detected_at: Utc::now(),
            description: String::new(),
            legs: Vec::new(),
            metadata: BTreeMap::new(),
            tradeable: None,
            deposit_status: None,
        }
    }

    #[test]
    fn test_empty_tick_keeps_last_good() {
        let hub = BroadcastHub::new(30);
        hub.publish(vec![opportunity(25.0)]);
        hub.publish(Vec::new());

        let (list, stale) = hub.snapshot();
        assert_eq!(list.len(), 1);
        assert!(!stale);
    }

    #[test]
    fn test_cold_start_is_stale() {
        let hub = BroadcastHub::new(30);
        let (list, stale) = hub.snapshot();
        assert!(list.is_empty());
        assert!(stale);
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_out() {
        let hub = BroadcastHub::new(30);
        let mut rx = hub.subscribe();

        // a subscriber that never drains falls behind the bounded buffer
        for i in 0..(SUBSCRIBER_BUFFER + 8) {
            hub.publish(vec![opportunity(10.0 + i as f64)]);
        }

        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(missed)) => assert!(missed > 0),
            other => panic!("expected lag, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_frames_are_json_arrays_in_order() {
        let hub = BroadcastHub::new(30);
        let mut rx = hub.subscribe();
        hub.publish(vec![opportunity(25.0)]);
        hub.publish(Vec::new());

        let first = rx.recv().await.unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&first).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["type"], "spot_cross");

        let second = rx.recv().await.unwrap();
        assert_eq!(second, "[]");
    }
}
