//! OKX connector
//! Mission: Spot and swap tickers, per-instrument funding, swap open interest

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::models::{FundingRate, Instrument, OpenInterest, Ticker, Venue};
use crate::scrapers::{get_json, normalize, parse_f64, Connector, ScrapeError};
use crate::snapshot::MarketSnapshot;

const TICKERS_URL: &str = "https://www.okx.com/api/v5/market/tickers";
const FUNDING_URL: &str = "https://www.okx.com/api/v5/public/funding-rate";
const OPEN_INTEREST_URL: &str = "https://www.okx.com/api/v5/public/open-interest?instType=SWAP";

#[derive(Debug, Deserialize)]
struct OkxResponse<T> {
    code: String,
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct OkxTickerEntry {
    #[serde(rename = "instId")]
    inst_id: String,
    last: String,
    #[serde(rename = "bidPx", default)]
    bid_px: String,
    #[serde(rename = "askPx", default)]
    ask_px: String,
}

#[derive(Debug, Deserialize)]
struct OkxFundingEntry {
    #[serde(rename = "fundingRate")]
    funding_rate: String,
    #[serde(rename = "fundingTime", default)]
    funding_time: String,
}

#[derive(Debug, Deserialize)]
struct OkxOpenInterestEntry {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(rename = "oiCcy")]
    oi_ccy: String,
}

pub struct OkxConnector {
    client: reqwest::Client,
    snapshot: Arc<MarketSnapshot>,
    symbols: Vec<String>,
}

impl OkxConnector {
    pub fn new(client: reqwest::Client, snapshot: Arc<MarketSnapshot>, symbols: Vec<String>) -> Self {
        Self {
            client,
            snapshot,
            symbols,
        }
    }

    /// `BTC-USDT` / `BTC-USDT-SWAP` -> (BTC, USDT), filtered by allow list.
    fn wanted(&self, inst_id: &str) -> Option<(String, String)> {
        let flat = normalize::flat_symbol(inst_id);
        let (base, quote) = normalize::split_quote(&flat, &["USDT"])?;
        if !self.symbols.is_empty() && !self.symbols.contains(&base) {
            return None;
        }
        Some((base, quote))
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<Vec<T>, ScrapeError> {
        let response: OkxResponse<T> = get_json(&self.client, url).await?;
        if response.code != "0" {
            return Err(ScrapeError::Decode(format!("okx code {}", response.code)));
        }
        Ok(response.data)
    }
}

#[async_trait]
impl Connector for OkxConnector {
    fn venue(&self) -> Venue {
        Venue::Okx
    }

    fn label(&self) -> &'static str {
        "okx"
    }

    async fn refresh(&self) -> Result<(), ScrapeError> {
        let now = Utc::now();
        let mut tickers = Vec::new();

        let spot: Vec<OkxTickerEntry> =
            self.fetch(&format!("{TICKERS_URL}?instType=SPOT")).await?;
        for entry in spot {
            if entry.inst_id.contains("SWAP") {
                continue;
            }
            let Some((base, quote)) = self.wanted(&entry.inst_id) else {
                continue;
            };
            let Some(last) = parse_f64(&entry.last).filter(|v| *v > 0.0) else {
                continue;
            };
            tickers.push(Ticker {
                venue: Venue::Okx,
                instrument: Instrument::spot(&base, &quote),
                last,
                bid: parse_f64(&entry.bid_px).filter(|v| *v > 0.0),
                ask: parse_f64(&entry.ask_px).filter(|v| *v > 0.0),
                ts: now,
            });
        }

        let swap: Vec<OkxTickerEntry> =
            self.fetch(&format!("{TICKERS_URL}?instType=SWAP")).await?;
        let mut perp_last: HashMap<String, (Instrument, f64)> = HashMap::new();
        for entry in swap {
            let Some((base, quote)) = self.wanted(&entry.inst_id) else {
                continue;
            };
            let Some(last) = parse_f64(&entry.last).filter(|v| *v > 0.0) else {
                continue;
            };
            let instrument = Instrument::perp(&base, &quote);
            tickers.push(Ticker {
                venue: Venue::Okx,
                instrument: instrument.clone(),
                last,
                bid: parse_f64(&entry.bid_px).filter(|v| *v > 0.0),
                ask: parse_f64(&entry.ask_px).filter(|v| *v > 0.0),
                ts: now,
            });
            perp_last.insert(entry.inst_id.clone(), (instrument, last));
        }

        // funding is a per-instrument endpoint
        let mut funding = Vec::new();
        for (inst_id, (instrument, _)) in &perp_last {
            let url = format!("{FUNDING_URL}?instId={inst_id}");
            match self.fetch::<OkxFundingEntry>(&url).await {
                Ok(entries) => {
                    if let Some(rate) = entries.first().and_then(|e| parse_f64(&e.funding_rate)) {
                        let next = entries
                            .first()
                            .and_then(|e| parse_f64(&e.funding_time))
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
                }
                Err(ScrapeError::RateLimited) => return Err(ScrapeError::RateLimited),
                Err(e) => debug!(inst_id = %inst_id, error = %e, "okx funding fetch failed"),
            }
        }

        // oiCcy is in base units; convert at the swap's last price
        let mut open_interest = Vec::new();
        let oi_entries: Vec<OkxOpenInterestEntry> = self.fetch(OPEN_INTEREST_URL).await?;
        for entry in oi_entries {
            let Some((instrument, last)) = perp_last.get(&entry.inst_id) else {
                continue;
            };
            if let Some(oi_ccy) = parse_f64(&entry.oi_ccy) {
                open_interest.push((
                    instrument.clone(),
                    OpenInterest {
                        oi_usd: oi_ccy * last,
                    },
                ));
            }
        }

        debug!(
            tickers = tickers.len(),
            funding = funding.len(),
            open_interest = open_interest.len(),
            "okx slice refreshed"
        );
        self.snapshot.publish_tickers(tickers);
        self.snapshot.publish_funding(Venue::Okx, funding);
        self.snapshot
            .publish_open_interest(Venue::Okx, open_interest);
        Ok(())
    }
}
