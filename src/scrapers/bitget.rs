//! Bitget connector
//! Mission: Spot and USDT-futures tickers with funding and holding amount

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::models::{FundingRate, Instrument, OpenInterest, Ticker, Venue};
use crate::scrapers::{get_json, normalize, parse_f64, Connector, ScrapeError};
use crate::snapshot::MarketSnapshot;

const SPOT_TICKERS_URL: &str = "https://api.bitget.com/api/v2/spot/market/tickers";
const MIX_TICKERS_URL: &str =
    "https://api.bitget.com/api/v2/mix/market/tickers?productType=USDT-FUTURES";

#[derive(Debug, Deserialize)]
struct BitgetResponse<T> {
    code: String,
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct BitgetTickerEntry {
    symbol: String,
    #[serde(rename = "lastPr")]
    last_pr: String,
    #[serde(rename = "bidPr", default)]
    bid_pr: String,
    #[serde(rename = "askPr", default)]
    ask_pr: String,
    // futures-only fields
    #[serde(rename = "fundingRate", default)]
    funding_rate: String,
    #[serde(rename = "holdingAmount", default)]
    holding_amount: String,
}

pub struct BitgetConnector {
    client: reqwest::Client,
    snapshot: Arc<MarketSnapshot>,
    symbols: Vec<String>,
}

impl BitgetConnector {
    pub fn new(client: reqwest::Client, snapshot: Arc<MarketSnapshot>, symbols: Vec<String>) -> Self {
        Self {
            client,
            snapshot,
            symbols,
        }
    }

    fn wanted(&self, raw: &str) -> Option<(String, String)> {
        let flat = normalize::flat_symbol(raw);
        let (base, quote) = normalize::split_quote(&flat, &["USDT"])?;
        if !self.symbols.is_empty() && !self.symbols.contains(&base) {
            return None;
        }
        Some((base, quote))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<BitgetTickerEntry>, ScrapeError> {
        let response: BitgetResponse<BitgetTickerEntry> = get_json(&self.client, url).await?;
        if response.code != "00000" {
            return Err(ScrapeError::Decode(format!("bitget code {}", response.code)));
        }
        Ok(response.data)
    }
}

#[async_trait]
impl Connector for BitgetConnector {
    fn venue(&self) -> Venue {
        Venue::Bitget
    }

    fn label(&self) -> &'static str {
        "bitget"
    }

    async fn refresh(&self) -> Result<(), ScrapeError> {
        let now = Utc::now();
        let mut tickers = Vec::new();

        for entry in self.fetch(SPOT_TICKERS_URL).await? {
            let Some((base, quote)) = self.wanted(&entry.symbol) else {
                continue;
            };
            let Some(last) = parse_f64(&entry.last_pr).filter(|v| *v > 0.0) else {
                continue;
            };
            tickers.push(Ticker {
                venue: Venue::Bitget,
                instrument: Instrument::spot(&base, &quote),
                last,
                bid: parse_f64(&entry.bid_pr).filter(|v| *v > 0.0),
                ask: parse_f64(&entry.ask_pr).filter(|v| *v > 0.0),
                ts: now,
            });
        }

        let mut funding = Vec::new();
        let mut open_interest = Vec::new();
        for entry in self.fetch(MIX_TICKERS_URL).await? {
            let Some((base, quote)) = self.wanted(&entry.symbol) else {
                continue;
            };
            let Some(last) = parse_f64(&entry.last_pr).filter(|v| *v > 0.0) else {
                continue;
            };
            let instrument = Instrument::perp(&base, &quote);
            tickers.push(Ticker {
                venue: Venue::Bitget,
                instrument: instrument.clone(),
                last,
                bid: parse_f64(&entry.bid_pr).filter(|v| *v > 0.0),
                ask: parse_f64(&entry.ask_pr).filter(|v| *v > 0.0),
                ts: now,
            });
            if let Some(rate) = parse_f64(&entry.funding_rate) {
                funding.push((
                    instrument.clone(),
                    FundingRate {
                        rate_per_interval: rate,
                        interval_hours: 8.0,
                        next_funding_time: None,
                    },
                ));
            }
            // holdingAmount is in base units
            if let Some(holding) = parse_f64(&entry.holding_amount) {
                open_interest.push((
                    instrument,
                    OpenInterest {
                        oi_usd: holding * last,
                    },
                ));
            }
        }

        debug!(
            tickers = tickers.len(),
            funding = funding.len(),
            "bitget slice refreshed"
        );
        self.snapshot.publish_tickers(tickers);
        self.snapshot.publish_funding(Venue::Bitget, funding);
        self.snapshot
            .publish_open_interest(Venue::Bitget, open_interest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_ticker_decode() {
        let raw = r#"{
            "code": "00000",
            "msg": "success",
            "data": [{
                "symbol": "BTCUSDT",
                "lastPr": "60020.5",
                "bidPr": "60020.0",
                "askPr": "60021.0",
                "fundingRate": "0.000095",
                "holdingAmount": "850.25"
            }]
        }"#;
        let response: BitgetResponse<BitgetTickerEntry> = serde_json::from_str(raw).unwrap();
        assert_eq!(response.code, "00000");
        let entry = &response.data[0];
        assert_eq!(parse_f64(&entry.funding_rate), Some(0.000095));
        assert_eq!(parse_f64(&entry.holding_amount), Some(850.25));
    }
}
