//! Upbit connector
//! Mission: KRW spot prices for the kimchi anchor

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::models::{Instrument, Ticker, Venue};
use crate::scrapers::{get_json, normalize, Connector, ScrapeError};
use crate::snapshot::MarketSnapshot;

const TICKER_URL: &str = "https://api.upbit.com/v1/ticker";

#[derive(Debug, Deserialize)]
struct UpbitTickerEntry {
    market: String,
    trade_price: f64,
}

pub struct UpbitConnector {
    client: reqwest::Client,
    snapshot: Arc<MarketSnapshot>,
    symbols: Vec<String>,
}

impl UpbitConnector {
    pub fn new(client: reqwest::Client, snapshot: Arc<MarketSnapshot>, symbols: Vec<String>) -> Self {
        Self {
            client,
            snapshot,
            symbols,
        }
    }

    fn market_codes(&self) -> String {
        self.symbols
            .iter()
            .map(|base| format!("KRW-{base}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[async_trait]
impl Connector for UpbitConnector {
    fn venue(&self) -> Venue {
        Venue::Upbit
    }

    fn label(&self) -> &'static str {
        "upbit"
    }

    async fn refresh(&self) -> Result<(), ScrapeError> {
        if self.symbols.is_empty() {
            return Ok(());
        }
        let url = format!("{TICKER_URL}?markets={}", self.market_codes());
        let entries: Vec<UpbitTickerEntry> = get_json(&self.client, &url).await?;

        let now = Utc::now();
        let mut tickers = Vec::new();
        for entry in entries {
            let Some((base, quote)) = normalize::split_krw_market(&entry.market) else {
                continue;
            };
            if entry.trade_price <= 0.0 {
                continue;
            }
            tickers.push(Ticker {
                venue: Venue::Upbit,
                instrument: Instrument::spot(&base, &quote),
                last: entry.trade_price,
                bid: None,
                ask: None,
                ts: now,
            });
        }

        debug!(count = tickers.len(), "upbit krw tickers refreshed");
        self.snapshot.publish_tickers(tickers);
        Ok(())
    }
}
