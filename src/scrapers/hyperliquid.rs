//! Hyperliquid connector
//! Mission: DEX perp prices, hourly funding and open interest in one call

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::models::{FundingRate, Instrument, OpenInterest, Ticker, Venue};
use crate::scrapers::{parse_f64, post_json, Connector, ScrapeError};
use crate::snapshot::MarketSnapshot;

const INFO_URL: &str = "https://api.hyperliquid.xyz/info";

/// Native funding interval; rates are normalized to 8h by the model.
const FUNDING_INTERVAL_HOURS: f64 = 1.0;

#[derive(Debug, Deserialize)]
struct Universe {
    universe: Vec<UniverseEntry>,
}

#[derive(Debug, Deserialize)]
struct UniverseEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AssetCtx {
    funding: String,
    #[serde(rename = "openInterest")]
    open_interest: String,
    #[serde(rename = "markPx")]
    mark_px: String,
    #[serde(rename = "midPx", default)]
    mid_px: Option<String>,
}

/// `metaAndAssetCtxs` returns the universe and the per-asset contexts as two
/// parallel arrays.
#[derive(Debug, Deserialize)]
struct MetaAndAssetCtxs(Universe, Vec<AssetCtx>);

pub struct HyperliquidConnector {
    client: reqwest::Client,
    snapshot: Arc<MarketSnapshot>,
    symbols: Vec<String>,
}

impl HyperliquidConnector {
    pub fn new(client: reqwest::Client, snapshot: Arc<MarketSnapshot>, symbols: Vec<String>) -> Self {
        Self {
            client,
            snapshot,
            symbols,
        }
    }

    fn wanted(&self, asset: &str) -> bool {
        self.symbols.is_empty() || self.symbols.iter().any(|s| s == &asset.to_uppercase())
    }
}

#[async_trait]
impl Connector for HyperliquidConnector {
    fn venue(&self) -> Venue {
        Venue::Hyperliquid
    }

    fn label(&self) -> &'static str {
        "hyperliquid"
    }

    async fn refresh(&self) -> Result<(), ScrapeError> {
        let body = serde_json::json!({"type": "metaAndAssetCtxs"});
        let MetaAndAssetCtxs(universe, contexts) =
            post_json(&self.client, INFO_URL, &body).await?;

        if universe.universe.len() != contexts.len() {
            return Err(ScrapeError::Decode(format!(
                "universe/context length mismatch: {} vs {}",
                universe.universe.len(),
                contexts.len()
            )));
        }

        let now = Utc::now();
        let mut tickers = Vec::new();
        let mut funding = Vec::new();
        let mut open_interest = Vec::new();

        for (entry, ctx) in universe.universe.iter().zip(contexts.iter()) {
            if !self.wanted(&entry.name) {
                continue;
            }
            let Some(mark) = parse_f64(&ctx.mark_px).filter(|v| *v > 0.0) else {
                continue;
            };
            let last = ctx
                .mid_px
                .as_deref()
                .and_then(parse_f64)
                .filter(|v| *v > 0.0)
                .unwrap_or(mark);

            let instrument = Instrument::perp(&entry.name, "USD");
            tickers.push(Ticker {
                venue: Venue::Hyperliquid,
                instrument: instrument.clone(),
                last,
                bid: None,
                ask: None,
                ts: now,
            });
            if let Some(rate) = parse_f64(&ctx.funding) {
                funding.push((
                    instrument.clone(),
                    FundingRate {
                        rate_per_interval: rate,
                        interval_hours: FUNDING_INTERVAL_HOURS,
                        next_funding_time: None,
                    },
                ));
            }
            if let Some(oi) = parse_f64(&ctx.open_interest) {
                open_interest.push((
                    instrument,
                    OpenInterest {
                        oi_usd: oi * mark,
                    },
                ));
            }
        }

        debug!(
            tickers = tickers.len(),
            funding = funding.len(),
            "hyperliquid slice refreshed"
        );
        self.snapshot.publish_tickers(tickers);
        self.snapshot.publish_funding(Venue::Hyperliquid, funding);
        self.snapshot
            .publish_open_interest(Venue::Hyperliquid, open_interest);
        Ok(())
    }
}
