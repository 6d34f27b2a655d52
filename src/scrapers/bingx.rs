//! BingX connector
//! Mission: Swap tickers, premium-index funding and per-symbol open interest

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::models::{FundingRate, Instrument, OpenInterest, Ticker, Venue};
use crate::scrapers::{get_json, normalize, parse_f64, Connector, ScrapeError};
use crate::snapshot::MarketSnapshot;

const SWAP_TICKER_URL: &str = "https://open-api.bingx.com/openApi/swap/v2/quote/ticker";
const PREMIUM_INDEX_URL: &str = "https://open-api.bingx.com/openApi/swap/v2/quote/premiumIndex";
const OPEN_INTEREST_URL: &str = "https://open-api.bingx.com/openApi/swap/v2/quote/openInterest";

#[derive(Debug, Deserialize)]
struct BingxResponse<T> {
    code: i64,
    data: T,
}

#[derive(Debug, Deserialize)]
struct BingxTickerEntry {
    symbol: String,
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "bidPrice", default)]
    bid_price: String,
    #[serde(rename = "askPrice", default)]
    ask_price: String,
}

#[derive(Debug, Deserialize)]
struct BingxPremiumEntry {
    symbol: String,
    #[serde(rename = "lastFundingRate")]
    last_funding_rate: String,
    #[serde(rename = "nextFundingTime", default)]
    next_funding_time: i64,
}

#[derive(Debug, Deserialize)]
struct BingxOpenInterest {
    #[serde(rename = "openInterest")]
    open_interest: String,
}

/// Swap-only connector; BingX symbols keep the `BTC-USDT` form on the wire.
pub struct BingxConnector {
    client: reqwest::Client,
    snapshot: Arc<MarketSnapshot>,
    symbols: Vec<String>,
}

impl BingxConnector {
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
}

#[async_trait]
impl Connector for BingxConnector {
    fn venue(&self) -> Venue {
        Venue::Bingx
    }

    fn label(&self) -> &'static str {
        "bingx"
    }

    async fn refresh(&self) -> Result<(), ScrapeError> {
        let now = Utc::now();

        let tickers_response: BingxResponse<Vec<BingxTickerEntry>> =
            get_json(&self.client, SWAP_TICKER_URL).await?;
        if tickers_response.code != 0 {
            return Err(ScrapeError::Decode(format!(
                "bingx code {}",
                tickers_response.code
            )));
        }

        let mut tickers = Vec::new();
        let mut raw_symbols: HashMap<String, (Instrument, f64)> = HashMap::new();
        for entry in tickers_response.data {
            let Some((base, quote)) = self.wanted(&entry.symbol) else {
                continue;
            };
            let Some(last) = parse_f64(&entry.last_price).filter(|v| *v > 0.0) else {
                continue;
            };
            let instrument = Instrument::perp(&base, &quote);
            tickers.push(Ticker {
                venue: Venue::Bingx,
                instrument: instrument.clone(),
                last,
                bid: parse_f64(&entry.bid_price).filter(|v| *v > 0.0),
                ask: parse_f64(&entry.ask_price).filter(|v| *v > 0.0),
                ts: now,
            });
            raw_symbols.insert(entry.symbol.clone(), (instrument, last));
        }

        let mut funding = Vec::new();
        let premium_response: BingxResponse<Vec<BingxPremiumEntry>> =
            get_json(&self.client, PREMIUM_INDEX_URL).await?;
        if premium_response.code == 0 {
            for entry in premium_response.data {
                let Some((instrument, _)) = raw_symbols.get(&entry.symbol) else {
                    continue;
                };
                if let Some(rate) = parse_f64(&entry.last_funding_rate) {
                    funding.push((
                        instrument.clone(),
                        FundingRate {
                            rate_per_interval: rate,
                            interval_hours: 8.0,
                            next_funding_time: Utc
                                .timestamp_millis_opt(entry.next_funding_time)
                                .single(),
                        },
                    ));
                }
            }
        }

        // open interest is per symbol and in base units
        let mut open_interest = Vec::new();
        for (raw_symbol, (instrument, last)) in &raw_symbols {
            let url = format!("{OPEN_INTEREST_URL}?symbol={raw_symbol}");
            match get_json::<BingxResponse<BingxOpenInterest>>(&self.client, &url).await {
                Ok(response) if response.code == 0 => {
                    if let Some(oi) = parse_f64(&response.data.open_interest) {
                        open_interest.push((
                            instrument.clone(),
                            OpenInterest {
                                oi_usd: oi * last,
                            },
                        ));
                    }
                }
                Ok(_) => {}
                Err(ScrapeError::RateLimited) => return Err(ScrapeError::RateLimited),
                Err(e) => debug!(symbol = %raw_symbol, error = %e, "bingx open interest fetch failed"),
            }
        }

        debug!(
            tickers = tickers.len(),
            funding = funding.len(),
            open_interest = open_interest.len(),
            "bingx slice refreshed"
        );
        self.snapshot.publish_tickers(tickers);
        self.snapshot.publish_funding(Venue::Bingx, funding);
        self.snapshot
            .publish_open_interest(Venue::Bingx, open_interest);
        Ok(())
    }
}
