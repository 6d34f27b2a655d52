//! Gate connector
//! Mission: Spot tickers plus USDT-settled perp tickers and funding

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::models::{FundingRate, Instrument, Ticker, Venue};
use crate::scrapers::{get_json, normalize, parse_f64, Connector, ScrapeError};
use crate::snapshot::MarketSnapshot;

const SPOT_TICKERS_URL: &str = "https://api.gateio.ws/api/v4/spot/tickers";
const FUTURES_TICKERS_URL: &str = "https://api.gateio.ws/api/v4/futures/usdt/tickers";

#[derive(Debug, Deserialize)]
struct GateSpotEntry {
    currency_pair: String,
    last: String,
    #[serde(default)]
    highest_bid: String,
    #[serde(default)]
    lowest_ask: String,
}

#[derive(Debug, Deserialize)]
struct GateFuturesEntry {
    contract: String,
    last: String,
    #[serde(default)]
    funding_rate: String,
}

pub struct GateConnector {
    client: reqwest::Client,
    snapshot: Arc<MarketSnapshot>,
    symbols: Vec<String>,
}

impl GateConnector {
    pub fn new(client: reqwest::Client, snapshot: Arc<MarketSnapshot>, symbols: Vec<String>) -> Self {
        Self {
            client,
            snapshot,
            symbols,
        }
    }

    /// `BTC_USDT` -> (BTC, USDT), filtered by allow list.
    fn wanted(&self, raw: &str) -> Option<(String, String)> {
        let flat = normalize::flat_symbol(raw);
        let (base, quote) = normalize::split_quote(&flat, &["USDT"])?;
        if !self.symbols.is_empty() && !self.symbols.contains(&base) {
            return None;
        }
        Some((base, quote))
    }
}

#[async_trait]
impl Connector for GateConnector {
    fn venue(&self) -> Venue {
        Venue::Gate
    }

    fn label(&self) -> &'static str {
        "gate"
    }

    async fn refresh(&self) -> Result<(), ScrapeError> {
        let now = Utc::now();
        let mut tickers = Vec::new();

        let spot: Vec<GateSpotEntry> = get_json(&self.client, SPOT_TICKERS_URL).await?;
        for entry in spot {
            let Some((base, quote)) = self.wanted(&entry.currency_pair) else {
                continue;
            };
            let Some(last) = parse_f64(&entry.last).filter(|v| *v > 0.0) else {
                continue;
            };
            tickers.push(Ticker {
                venue: Venue::Gate,
                instrument: Instrument::spot(&base, &quote),
                last,
                bid: parse_f64(&entry.highest_bid).filter(|v| *v > 0.0),
                ask: parse_f64(&entry.lowest_ask).filter(|v| *v > 0.0),
                ts: now,
            });
        }

        // no open-interest figure on this endpoint; Gate publishes tickers
        // and funding only (capability subset)
        let mut funding = Vec::new();
        let futures: Vec<GateFuturesEntry> = get_json(&self.client, FUTURES_TICKERS_URL).await?;
        for entry in futures {
            let Some((base, quote)) = self.wanted(&entry.contract) else {
                continue;
            };
            let Some(last) = parse_f64(&entry.last).filter(|v| *v > 0.0) else {
                continue;
            };
            let instrument = Instrument::perp(&base, &quote);
            tickers.push(Ticker {
                venue: Venue::Gate,
                instrument: instrument.clone(),
                last,
                bid: None,
                ask: None,
                ts: now,
            });
            if let Some(rate) = parse_f64(&entry.funding_rate) {
                funding.push((
                    instrument,
                    FundingRate {
                        rate_per_interval: rate,
                        interval_hours: 8.0,
                        next_funding_time: None,
                    },
                ));
            }
        }

        debug!(
            tickers = tickers.len(),
            funding = funding.len(),
            "gate slice refreshed"
        );
        self.snapshot.publish_tickers(tickers);
        self.snapshot.publish_funding(Venue::Gate, funding);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spot_decode() {
        let raw = r#"[{
            "currency_pair": "BTC_USDT",
            "last": "60080.2",
            "highest_bid": "60079.9",
            "lowest_ask": "60080.5",
            "base_volume": "1000"
        }]"#;
        let entries: Vec<GateSpotEntry> = serde_json::from_str(raw).unwrap();
        assert_eq!(entries[0].currency_pair, "BTC_USDT");
        assert_eq!(parse_f64(&entries[0].last), Some(60080.2));
    }

    #[test]
    fn test_futures_decode() {
        let raw = r#"[{"contract": "BTC_USDT", "last": "60090.0", "funding_rate": "0.0001"}]"#;
        let entries: Vec<GateFuturesEntry> = serde_json::from_str(raw).unwrap();
        assert_eq!(parse_f64(&entries[0].funding_rate), Some(0.0001));
    }

    #[test]
    fn test_pair_normalization() {
        let connector = GateConnector::new(
            reqwest::Client::new(),
            Arc::new(MarketSnapshot::new()),
            vec!["BTC".to_string()],
        );
        assert_eq!(
            connector.wanted("BTC_USDT"),
            Some(("BTC".to_string(), "USDT".to_string()))
        );
        assert_eq!(connector.wanted("SOL_USDT"), None);
    }
}
