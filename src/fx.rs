//! USD/KRW rate resolution
//! Mission: One sane FX rate at all times, whatever the sources are doing

use chrono::Utc;
use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::{FxRate, Instrument, Venue};
use crate::snapshot::MarketSnapshot;

const DUNAMU_URL: &str =
    "https://quotation-api-cdn.dunamu.com/v1/forex/recent?codes=FRX.KRWUSD";
const OPEN_ER_URL: &str = "https://open.er-api.com/v6/latest/USD";

/// Values outside this band are treated as source glitches and skipped.
const SANE_BAND: (f64, f64) = (1000.0, 2000.0);

fn in_band(value: f64) -> bool {
    (SANE_BAND.0..=SANE_BAND.1).contains(&value)
}

/// Pick the first in-band candidate, in priority order.
fn first_sane(candidates: &[(&str, Option<f64>)]) -> Option<(String, f64)> {
    for (source, value) in candidates {
        match value {
            Some(v) if in_band(*v) => return Some((source.to_string(), *v)),
            Some(v) => {
                warn!(source, value = v, "fx source outside sanity band, trying next");
            }
            None => {}
        }
    }
    None
}

#[derive(Debug, Deserialize)]
struct DunamuQuote {
    #[serde(rename = "basePrice")]
    base_price: f64,
}

#[derive(Debug, Deserialize)]
struct OpenErResponse {
    rates: std::collections::HashMap<String, f64>,
}

/// KRW/USD resolver with a fixed fallback chain: Dunamu forex, then the open
/// exchange-rate API, then the rate implied by Upbit vs Binance BTC. Last
/// known good is served while all sources fail; the configured fallback (with
/// a stale flag) covers a cold start.
pub struct FxResolver {
    client: reqwest::Client,
    snapshot: Arc<MarketSnapshot>,
    fallback_krw_per_usd: f64,
    cache: RwLock<FxRate>,
}

impl FxResolver {
    pub fn new(
        client: reqwest::Client,
        snapshot: Arc<MarketSnapshot>,
        fallback_krw_per_usd: f64,
    ) -> Self {
        let initial = FxRate {
            krw_per_usd: fallback_krw_per_usd,
            source: "fallback".to_string(),
            fetched_at: Utc::now(),
            stale: true,
        };
        Self {
            client,
            snapshot,
            fallback_krw_per_usd,
            cache: RwLock::new(initial),
        }
    }

    /// Latest resolved rate; always available.
    pub fn current(&self) -> FxRate {
        self.cache.read().clone()
    }

    pub async fn refresh(&self) {
        let dunamu = self.fetch_dunamu().await;
        let open_er = self.fetch_open_er().await;
        let implied = self.implied_from_btc();

        let candidates = [
            ("dunamu", dunamu),
            ("open_er", open_er),
            ("implied_btc", implied),
        ];

        match first_sane(&candidates) {
            Some((source, krw_per_usd)) => {
                debug!(source = %source, rate = krw_per_usd, "fx refreshed");
                *self.cache.write() = FxRate {
                    krw_per_usd,
                    source,
                    fetched_at: Utc::now(),
                    stale: false,
                };
            }
            None => {
                let mut cache = self.cache.write();
                if cache.stale {
                    // never had a live value: keep the configured fallback
                    cache.krw_per_usd = self.fallback_krw_per_usd;
                    cache.source = "fallback".to_string();
                } else {
                    cache.stale = true;
                }
                warn!(
                    rate = cache.krw_per_usd,
                    source = %cache.source,
                    "all fx sources failed, serving last good / fallback"
                );
            }
        }
    }

    async fn fetch_dunamu(&self) -> Option<f64> {
        let quotes: Vec<DunamuQuote> = self
            .client
            .get(DUNAMU_URL)
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?
            .json()
            .await
            .ok()?;
        quotes.first().map(|q| q.base_price)
    }

    async fn fetch_open_er(&self) -> Option<f64> {
        let response: OpenErResponse = self
            .client
            .get(OPEN_ER_URL)
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?
            .json()
            .await
            .ok()?;
        response.rates.get("KRW").copied()
    }

    /// `Upbit(KRW-BTC).last / Binance(BTCUSDT).last`, both from the snapshot.
    fn implied_from_btc(&self) -> Option<f64> {
        let upbit = self
            .snapshot
            .ticker(Venue::Upbit, &Instrument::spot("BTC", "KRW"))?;
        let binance = self
            .snapshot
            .ticker(Venue::Binance, &Instrument::spot("BTC", "USDT"))?;
        if binance.last <= 0.0 {
            return None;
        }
        Some(upbit.last / binance.last)
    }

    /// Background refresher owned by the resolver; single writer.
    pub fn spawn_refresher(self: Arc<Self>, interval_secs: u64) {
        tokio::spawn(async move {
            info!(interval_secs, "fx refresher started");
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            loop {
                ticker.tick().await;
                self.refresh().await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_check() {
        assert!(in_band(1450.0));
        assert!(in_band(1000.0));
        assert!(in_band(2000.0));
        assert!(!in_band(999.0));
        assert!(!in_band(2000.5));
    }

    #[test]
    fn test_fallback_chain_skips_out_of_band_source() {
        // S5: Dunamu returns 999 (below band), open-ER returns 1480
        let picked = first_sane(&[
            ("dunamu", Some(999.0)),
            ("open_er", Some(1480.0)),
            ("implied_btc", None),
        ]);
        assert_eq!(picked, Some(("open_er".to_string(), 1480.0)));
    }

    #[test]
    fn test_all_sources_failing_yields_none() {
        let picked = first_sane(&[
            ("dunamu", None),
            ("open_er", Some(5.0)),
            ("implied_btc", Some(98_000.0)),
        ]);
        assert_eq!(picked, None);
    }

    #[tokio::test]
    async fn test_cold_start_serves_flagged_fallback() {
        let resolver = FxResolver::new(
            reqwest::Client::new(),
            Arc::new(MarketSnapshot::new()),
            1450.0,
        );
        let rate = resolver.current();
        assert_eq!(rate.krw_per_usd, 1450.0);
        assert!(rate.stale);
    }
}
