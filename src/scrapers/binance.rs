//! Binance connectors
//! Mission: Spot top-of-book plus the futures premium index, normalized

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::models::{FundingRate, Instrument, OpenInterest, Ticker, Venue};
use crate::scrapers::{get_json, normalize, parse_f64, Connector, ScrapeError};
use crate::snapshot::MarketSnapshot;

const SPOT_BOOK_TICKER_URL: &str = "https://api.binance.com/api/v3/ticker/bookTicker";
const PREMIUM_INDEX_URL: &str = "https://fapi.binance.com/fapi/v1/premiumIndex";
const OPEN_INTEREST_URL: &str = "https://fapi.binance.com/fapi/v1/openInterest";

#[derive(Debug, Deserialize)]
struct BookTickerEntry {
    symbol: String,
    #[serde(rename = "bidPrice")]
    bid_price: String,
    #[serde(rename = "askPrice")]
    ask_price: String,
}

/// Spot top-of-book for the configured bases, quoted in USDT.
pub struct BinanceSpotConnector {
    client: reqwest::Client,
    snapshot: Arc<MarketSnapshot>,
    symbols: Vec<String>,
}

impl BinanceSpotConnector {
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
}

#[async_trait]
impl Connector for BinanceSpotConnector {
    fn venue(&self) -> Venue {
        Venue::Binance
    }

    fn label(&self) -> &'static str {
        "binance_spot"
    }

    async fn refresh(&self) -> Result<(), ScrapeError> {
        let entries: Vec<BookTickerEntry> = get_json(&self.client, SPOT_BOOK_TICKER_URL).await?;

        let now = Utc::now();
        let mut tickers = Vec::new();
        for entry in entries {
            let Some((base, quote)) = self.wanted(&entry.symbol) else {
                continue;
            };
            let (Some(bid), Some(ask)) = (parse_f64(&entry.bid_price), parse_f64(&entry.ask_price))
            else {
                continue;
            };
            if bid <= 0.0 || ask <= 0.0 {
                continue;
            }
            tickers.push(Ticker {
                venue: Venue::Binance,
                instrument: Instrument::spot(&base, &quote),
                last: (bid + ask) / 2.0,
                bid: Some(bid),
                ask: Some(ask),
                ts: now,
            });
        }

        debug!(count = tickers.len(), "binance spot tickers refreshed");
        self.snapshot.publish_tickers(tickers);
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct PremiumIndexEntry {
    symbol: String,
    #[serde(rename = "markPrice")]
    mark_price: String,
    #[serde(rename = "lastFundingRate")]
    last_funding_rate: String,
    #[serde(rename = "nextFundingTime")]
    next_funding_time: i64,
}

#[derive(Debug, Deserialize)]
struct OpenInterestResponse {
    #[serde(rename = "openInterest")]
    open_interest: String,
}

/// Derivative-only connector over the USDT-M premium index: perp mark
/// prices, 8h funding and per-symbol open interest.
pub struct BinanceFuturesConnector {
    client: reqwest::Client,
    snapshot: Arc<MarketSnapshot>,
    symbols: Vec<String>,
}

impl BinanceFuturesConnector {
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
}

#[async_trait]
impl Connector for BinanceFuturesConnector {
    fn venue(&self) -> Venue {
        Venue::Binance
    }

    fn label(&self) -> &'static str {
        "binance_futures"
    }

    async fn refresh(&self) -> Result<(), ScrapeError> {
        let entries: Vec<PremiumIndexEntry> = get_json(&self.client, PREMIUM_INDEX_URL).await?;

        let now = Utc::now();
        let mut tickers = Vec::new();
        let mut funding = Vec::new();
        let mut marks: HashMap<String, (Instrument, f64)> = HashMap::new();

        for entry in entries {
            let Some((base, quote)) = self.wanted(&entry.symbol) else {
                continue;
            };
            let Some(mark) = parse_f64(&entry.mark_price).filter(|m| *m > 0.0) else {
                continue;
            };
            let instrument = Instrument::perp(&base, &quote);
            tickers.push(Ticker {
                venue: Venue::Binance,
                instrument: instrument.clone(),
                last: mark,
                bid: None,
                ask: None,
                ts: now,
            });
            if let Some(rate) = parse_f64(&entry.last_funding_rate) {
                funding.push((
                    instrument.clone(),
                    FundingRate {
                        rate_per_interval: rate,
                        interval_hours: 8.0,
                        next_funding_time: Utc.timestamp_millis_opt(entry.next_funding_time).single(),
                    },
                ));
            }
            marks.insert(entry.symbol.clone(), (instrument, mark));
        }

        // open interest is a per-symbol endpoint; convert base units to USD
        let mut open_interest = Vec::new();
        for (raw_symbol, (instrument, mark)) in &marks {
            let url = format!("{OPEN_INTEREST_URL}?symbol={raw_symbol}");
            match get_json::<OpenInterestResponse>(&self.client, &url).await {
                Ok(response) => {
                    if let Some(oi) = parse_f64(&response.open_interest) {
                        open_interest.push((
                            instrument.clone(),
                            OpenInterest {
                                oi_usd: oi * mark,
                            },
                        ));
                    }
                }
                Err(ScrapeError::RateLimited) => return Err(ScrapeError::RateLimited),
                Err(e) => {
                    debug!(symbol = %raw_symbol, error = %e, "binance open interest fetch failed");
                }
            }
        }

        debug!(
            tickers = tickers.len(),
            funding = funding.len(),
            open_interest = open_interest.len(),
            "binance futures slice refreshed"
        );
        self.snapshot.publish_tickers(tickers);
        self.snapshot.publish_funding(Venue::Binance, funding);
        self.snapshot
            .publish_open_interest(Venue::Binance, open_interest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_ticker_decode() {
        let raw = r#"[
            {"symbol":"BTCUSDT","bidPrice":"59999.50","bidQty":"1.2","askPrice":"60000.50","askQty":"0.8"},
            {"symbol":"ETHBTC","bidPrice":"0.052","bidQty":"3.0","askPrice":"0.0521","askQty":"2.0"}
        ]"#;
        let entries: Vec<BookTickerEntry> = serde_json::from_str(raw).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].symbol, "BTCUSDT");
        assert_eq!(parse_f64(&entries[0].bid_price), Some(59999.5));
    }

    #[test]
    fn test_premium_index_decode() {
        let raw = r#"[{
            "symbol":"BTCUSDT",
            "markPrice":"60010.00000000",
            "indexPrice":"60005.00000000",
            "lastFundingRate":"0.00010000",
            "nextFundingTime":1720000000000,
            "interestRate":"0.00010000",
            "time":1719990000000
        }]"#;
        let entries: Vec<PremiumIndexEntry> = serde_json::from_str(raw).unwrap();
        assert_eq!(parse_f64(&entries[0].last_funding_rate), Some(0.0001));
        assert!(entries[0].next_funding_time > 0);
    }

    #[test]
    fn test_symbol_filter() {
        let connector = BinanceSpotConnector::new(
            reqwest::Client::new(),
            Arc::new(MarketSnapshot::new()),
            vec!["BTC".to_string()],
        );
        assert_eq!(
            connector.wanted("BTCUSDT"),
            Some(("BTC".to_string(), "USDT".to_string()))
        );
        assert_eq!(connector.wanted("ETHUSDT"), None); // not in the allow list
        assert_eq!(connector.wanted("BTCBUSD"), None); // wrong quote
    }
}
