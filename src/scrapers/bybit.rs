//! Bybit connector
//! Mission: Spot and linear-perp slices from the unified v5 ticker endpoint

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::models::{FundingRate, Instrument, OpenInterest, Ticker, Venue};
use crate::scrapers::{get_json, normalize, parse_f64, Connector, ScrapeError};
use crate::snapshot::MarketSnapshot;

const TICKERS_URL: &str = "https://api.bybit.com/v5/market/tickers";

#[derive(Debug, Deserialize)]
struct V5Response {
    #[serde(rename = "retCode")]
    ret_code: i64,
    result: V5Result,
}

#[derive(Debug, Deserialize)]
struct V5Result {
    #[serde(default)]
    list: Vec<V5TickerEntry>,
}

#[derive(Debug, Deserialize)]
struct V5TickerEntry {
    symbol: String,
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "bid1Price", default)]
    bid1_price: String,
    #[serde(rename = "ask1Price", default)]
    ask1_price: String,
    // linear-only fields
    #[serde(rename = "fundingRate", default)]
    funding_rate: String,
    #[serde(rename = "nextFundingTime", default)]
    next_funding_time: String,
    #[serde(rename = "openInterestValue", default)]
    open_interest_value: String,
}

pub struct BybitConnector {
    client: reqwest::Client,
    snapshot: Arc<MarketSnapshot>,
    symbols: Vec<String>,
}

impl BybitConnector {
    pub fn new(client: reqwest::Client, snapshot: Arc<MarketSnapshot>, symbols: Vec<String>) -> Self {
        Self {
            client,
            snapshot,
            symbols,
        }
    }

    fn wanted(&self, raw_symbol: &str) -> Option<(String, String)> {
        let flat = normalize::flat_symbol(raw_symbol);
        let (base, quote) = normalize::split_quote(&flat, &["USDT"])?;
        if !self.symbols.is_empty() && !self.symbols.contains(&base) {
            return None;
        }
        Some((base, quote))
    }

    async fn fetch_category(&self, category: &str) -> Result<Vec<V5TickerEntry>, ScrapeError> {
        let url = format!("{TICKERS_URL}?category={category}");
        let response: V5Response = get_json(&self.client, &url).await?;
        if response.ret_code != 0 {
            return Err(ScrapeError::Decode(format!(
                "bybit retCode {} for category {category}",
                response.ret_code
            )));
        }
        Ok(response.result.list)
    }
}

#[async_trait]
impl Connector for BybitConnector {
    fn venue(&self) -> Venue {
        Venue::Bybit
    }

    fn label(&self) -> &'static str {
        "bybit"
    }

    async fn refresh(&self) -> Result<(), ScrapeError> {
        let now = Utc::now();

        let mut tickers = Vec::new();
        for entry in self.fetch_category("spot").await? {
            let Some((base, quote)) = self.wanted(&entry.symbol) else {
                continue;
            };
            let Some(last) = parse_f64(&entry.last_price).filter(|v| *v > 0.0) else {
                continue;
            };
            tickers.push(Ticker {
                venue: Venue::Bybit,
                instrument: Instrument::spot(&base, &quote),
                last,
                bid: parse_f64(&entry.bid1_price).filter(|v| *v > 0.0),
                ask: parse_f64(&entry.ask1_price).filter(|v| *v > 0.0),
                ts: now,
            });
        }

        let mut funding = Vec::new();
        let mut open_interest = Vec::new();
        for entry in self.fetch_category("linear").await? {
            let Some((base, quote)) = self.wanted(&entry.symbol) else {
                continue;
            };
            let Some(last) = parse_f64(&entry.last_price).filter(|v| *v > 0.0) else {
                continue;
            };
            let instrument = Instrument::perp(&base, &quote);
            tickers.push(Ticker {
                venue: Venue::Bybit,
                instrument: instrument.clone(),
                last,
                bid: parse_f64(&entry.bid1_price).filter(|v| *v > 0.0),
                ask: parse_f64(&entry.ask1_price).filter(|v| *v > 0.0),
                ts: now,
            });
            if let Some(rate) = parse_f64(&entry.funding_rate) {
                let next = parse_f64(&entry.next_funding_time)
                    .and_then(|ms| Utc.timestamp_millis_opt(ms as i64).single());
                funding.push((
                    instrument.clone(),
                    FundingRate {
                        rate_per_interval: rate,
                        interval_hours: 8.0,
                        next_funding_time: next,
                    },
                ));
            }
            if let Some(oi_usd) = parse_f64(&entry.open_interest_value) {
                open_interest.push((instrument, OpenInterest { oi_usd }));
            }
        }

        debug!(
            tickers = tickers.len(),
            funding = funding.len(),
            "bybit slice refreshed"
        );
        self.snapshot.publish_tickers(tickers);
        self.snapshot.publish_funding(Venue::Bybit, funding);
        self.snapshot
            .publish_open_interest(Venue::Bybit, open_interest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_ticker_decode() {
        let raw = r#"{
            "retCode": 0,
            "retMsg": "OK",
            "result": {
                "category": "linear",
                "list": [{
                    "symbol": "BTCUSDT",
                    "lastPrice": "60010.0",
                    "bid1Price": "60009.5",
                    "ask1Price": "60010.5",
                    "fundingRate": "0.0001",
                    "nextFundingTime": "1720000000000",
                    "openInterestValue": "52000000.00"
                }]
            }
        }"#;
        let response: V5Response = serde_json::from_str(raw).unwrap();
        assert_eq!(response.ret_code, 0);
        let entry = &response.result.list[0];
        assert_eq!(parse_f64(&entry.funding_rate), Some(0.0001));
        assert_eq!(parse_f64(&entry.open_interest_value), Some(52_000_000.0));
    }

    #[test]
    fn test_spot_ticker_missing_perp_fields() {
        let raw = r#"{
            "retCode": 0,
            "result": {
                "category": "spot",
                "list": [{"symbol": "BTCUSDT", "lastPrice": "60000.0"}]
            }
        }"#;
        let response: V5Response = serde_json::from_str(raw).unwrap();
        let entry = &response.result.list[0];
        assert_eq!(parse_f64(&entry.funding_rate), None);
    }
}
