//! Bithumb connector
//! Mission: Second KRW anchor plus the public wallet-status table

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::models::{Instrument, Ticker, Venue, WalletStatus};
use crate::scrapers::{get_json, parse_f64, Connector, ScrapeError};
use crate::snapshot::MarketSnapshot;
use crate::wallet::WalletStateOracle;

const TICKER_ALL_URL: &str = "https://api.bithumb.com/public/ticker/ALL_KRW";
const ASSETS_STATUS_URL: &str = "https://api.bithumb.com/public/assetsstatus/ALL";

#[derive(Debug, Deserialize)]
struct BithumbResponse<T> {
    status: String,
    data: T,
}

#[derive(Debug, Deserialize)]
struct BithumbTickerEntry {
    closing_price: String,
}

#[derive(Debug, Deserialize)]
struct BithumbAssetStatus {
    deposit_status: i64,
    withdrawal_status: i64,
}

/// Publishes KRW spot tickers into the snapshot and deposit/withdraw flags
/// into the wallet oracle; Bithumb exposes both without credentials.
pub struct BithumbConnector {
    client: reqwest::Client,
    snapshot: Arc<MarketSnapshot>,
    wallet: Arc<WalletStateOracle>,
    symbols: Vec<String>,
}

impl BithumbConnector {
    pub fn new(
        client: reqwest::Client,
        snapshot: Arc<MarketSnapshot>,
        wallet: Arc<WalletStateOracle>,
        symbols: Vec<String>,
    ) -> Self {
        Self {
            client,
            snapshot,
            wallet,
            symbols,
        }
    }

    fn wanted(&self, asset: &str) -> bool {
        self.symbols.is_empty() || self.symbols.iter().any(|s| s == &asset.to_uppercase())
    }
}

#[async_trait]
impl Connector for BithumbConnector {
    fn venue(&self) -> Venue {
        Venue::Bithumb
    }

    fn label(&self) -> &'static str {
        "bithumb"
    }

    async fn refresh(&self) -> Result<(), ScrapeError> {
        // the ALL_KRW payload mixes per-asset objects with a "date" string,
        // so decode values leniently and skip what doesn't parse
        let response: BithumbResponse<HashMap<String, serde_json::Value>> =
            get_json(&self.client, TICKER_ALL_URL).await?;
        if response.status != "0000" {
            return Err(ScrapeError::Decode(format!(
                "bithumb status {}",
                response.status
            )));
        }

        let now = Utc::now();
        let mut tickers = Vec::new();
        for (asset, value) in &response.data {
            if !self.wanted(asset) {
                continue;
            }
            let Ok(entry) = serde_json::from_value::<BithumbTickerEntry>(value.clone()) else {
                continue; // the "date" entry and delisted assets land here
            };
            let Some(last) = parse_f64(&entry.closing_price).filter(|v| *v > 0.0) else {
                continue;
            };
            tickers.push(Ticker {
                venue: Venue::Bithumb,
                instrument: Instrument::spot(asset, "KRW"),
                last,
                bid: None,
                ask: None,
                ts: now,
            });
        }

        debug!(count = tickers.len(), "bithumb krw tickers refreshed");
        self.snapshot.publish_tickers(tickers);

        // wallet status piggybacks on the same refresh cadence
        match self.refresh_wallet_status().await {
            Ok(count) => debug!(count, "bithumb wallet status refreshed"),
            Err(e) => debug!(error = %e, "bithumb wallet status fetch failed"),
        }
        Ok(())
    }
}

impl BithumbConnector {
    async fn refresh_wallet_status(&self) -> Result<usize, ScrapeError> {
        let response: BithumbResponse<HashMap<String, serde_json::Value>> =
            get_json(&self.client, ASSETS_STATUS_URL).await?;
        if response.status != "0000" {
            return Err(ScrapeError::Decode(format!(
                "bithumb status {}",
                response.status
            )));
        }

        let mut entries = Vec::new();
        for (asset, value) in &response.data {
            if !self.wanted(asset) {
                continue;
            }
            let Ok(status) = serde_json::from_value::<BithumbAssetStatus>(value.clone()) else {
                continue;
            };
            entries.push((
                asset.clone(),
                WalletStatus {
                    deposit: Some(status.deposit_status == 1),
                    withdraw: Some(status.withdrawal_status == 1),
                },
            ));
        }

        let count = entries.len();
        self.wallet.update(Venue::Bithumb, entries);
        Ok(count)
    }
}
