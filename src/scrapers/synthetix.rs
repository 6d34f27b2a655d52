//! Synthetix (Base) connector
//! Mission: On-chain perp markets through the public markets feed

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::models::{FundingRate, Instrument, OpenInterest, Ticker, Venue};
use crate::scrapers::{get_json, Connector, ScrapeError};
use crate::snapshot::MarketSnapshot;

const MARKETS_URL: &str = "https://perps-api-mainnet.synthetix.io/markets";

/// Synthetix accrues funding continuously and reports a daily rate; the
/// model scales it to the 8h reference interval.
const FUNDING_INTERVAL_HOURS: f64 = 24.0;

#[derive(Debug, Deserialize)]
struct MarketsResponse {
    markets: Vec<MarketEntry>,
}

#[derive(Debug, Deserialize)]
struct MarketEntry {
    symbol: String,
    #[serde(rename = "markPrice")]
    mark_price: f64,
    #[serde(rename = "fundingRate24h")]
    funding_rate_24h: f64,
    #[serde(rename = "openInterestUsd", default)]
    open_interest_usd: Option<f64>,
}

pub struct SynthetixConnector {
    client: reqwest::Client,
    snapshot: Arc<MarketSnapshot>,
    symbols: Vec<String>,
}

impl SynthetixConnector {
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
impl Connector for SynthetixConnector {
    fn venue(&self) -> Venue {
        Venue::Synthetix
    }

    fn label(&self) -> &'static str {
        "synthetix"
    }

    async fn refresh(&self) -> Result<(), ScrapeError> {
        let response: MarketsResponse = get_json(&self.client, MARKETS_URL).await?;

        let now = Utc::now();
        let mut tickers = Vec::new();
        let mut funding = Vec::new();
        let mut open_interest = Vec::new();

        for market in response.markets {
            let asset = market.symbol.to_uppercase();
            if !self.wanted(&asset) || market.mark_price <= 0.0 {
                continue;
            }
            let instrument = Instrument::perp(&asset, "USD");
            tickers.push(Ticker {
                venue: Venue::Synthetix,
                instrument: instrument.clone(),
                last: market.mark_price,
                bid: None,
                ask: None,
                ts: now,
            });
            funding.push((
                instrument.clone(),
                FundingRate {
                    rate_per_interval: market.funding_rate_24h,
                    interval_hours: FUNDING_INTERVAL_HOURS,
                    next_funding_time: None,
                },
            ));
            if let Some(oi_usd) = market.open_interest_usd.filter(|v| *v > 0.0) {
                open_interest.push((instrument, OpenInterest { oi_usd }));
            }
        }

        debug!(
            tickers = tickers.len(),
            funding = funding.len(),
            "synthetix slice refreshed"
        );
        self.snapshot.publish_tickers(tickers);
        self.snapshot.publish_funding(Venue::Synthetix, funding);
        self.snapshot
            .publish_open_interest(Venue::Synthetix, open_interest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markets_decode() {
        let raw = r#"{
            "markets": [
                {"symbol": "BTC", "markPrice": 60025.0, "fundingRate24h": 0.0003, "openInterestUsd": 42000000.0},
                {"symbol": "ETH", "markPrice": 3001.5, "fundingRate24h": -0.0001}
            ]
        }"#;
        let response: MarketsResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.markets.len(), 2);
        assert!(response.markets[1].open_interest_usd.is_none());
    }

    #[test]
    fn test_daily_interval_normalizes_to_8h() {
        let rate = FundingRate::new(0.0003, FUNDING_INTERVAL_HOURS);
        assert!((rate.rate_8h() - 0.0001).abs() < 1e-12);
    }
}
