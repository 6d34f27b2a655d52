//! Venue connectors
//! Mission: Many heterogeneous public APIs, one normalized snapshot

pub mod binance; // spot bookTicker + derivative premium-index connector
pub mod bingx;
pub mod bitget;
pub mod bithumb; // KRW spot + public wallet status
pub mod bybit;
pub mod gate;
pub mod hyperliquid; // DEX-style info API, 1h funding
pub mod okx;
pub mod synthetix; // Base perps feed, daily funding
pub mod upbit; // KRW spot

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::models::Venue;

/// Connector failure taxonomy. The scheduler keys its recovery policy off
/// the variant: network errors retry next tick, decode errors leave the
/// slice stale, rate limits trigger capped exponential backoff.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("rate limited")]
    RateLimited,
}

impl ScrapeError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ScrapeError::RateLimited)
    }
}

/// A venue feed adapter. Venues implement the capability subset their API
/// offers (spot tickers, perp tickers, funding, open interest, wallet
/// state); `refresh` fetches that slice, normalizes it and publishes it into
/// the snapshot by replacement. Failures never propagate across connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    fn venue(&self) -> Venue;

    /// Human label for logs and the status endpoint; distinguishes multiple
    /// connectors on one venue (e.g. binance spot vs binance futures).
    fn label(&self) -> &'static str;

    async fn refresh(&self) -> Result<(), ScrapeError>;
}

pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, ScrapeError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ScrapeError::Network(e.to_string()))?;
    decode_response(response).await
}

pub(crate) async fn post_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    body: &serde_json::Value,
) -> Result<T, ScrapeError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| ScrapeError::Network(e.to_string()))?;
    decode_response(response).await
}

async fn decode_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ScrapeError> {
    if response.status() == StatusCode::TOO_MANY_REQUESTS {
        return Err(ScrapeError::RateLimited);
    }
    let response = response
        .error_for_status()
        .map_err(|e| ScrapeError::Network(e.to_string()))?;
    response
        .json::<T>()
        .await
        .map_err(|e| ScrapeError::Decode(e.to_string()))
}

/// Numeric fields arrive as strings on most venue APIs.
pub(crate) fn parse_f64(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Symbol canonicalization, applied between every connector and the
/// snapshot so detectors never see venue-specific formats.
pub mod normalize {
    /// Strip delimiters and perp contract suffixes, upper-case the rest:
    /// `BTC-USDT`, `btc_usdt`, `BTC/USDT:USDT`, `BTC-USDT-SWAP` -> `BTCUSDT`.
    pub fn flat_symbol(raw: &str) -> String {
        let mut flat: String = raw
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | '/' | ':'))
            .collect::<String>()
            .to_uppercase();
        for suffix in ["SWAP", "PERP"] {
            if flat.len() > suffix.len() && flat.ends_with(suffix) {
                flat.truncate(flat.len() - suffix.len());
            }
        }
        flat
    }

    /// Split a flat symbol on a known quote suffix: `BTCUSDT` -> (BTC, USDT).
    pub fn split_quote(flat: &str, quotes: &[&str]) -> Option<(String, String)> {
        for quote in quotes {
            if flat.len() > quote.len() && flat.ends_with(quote) {
                let base = &flat[..flat.len() - quote.len()];
                return Some((base.to_string(), quote.to_string()));
            }
        }
        None
    }

    /// Korean market codes lead with the quote: `KRW-BTC` -> (BTC, KRW).
    pub fn split_krw_market(raw: &str) -> Option<(String, String)> {
        let (quote, base) = raw.split_once('-')?;
        if !quote.eq_ignore_ascii_case("KRW") || base.is_empty() {
            return None;
        }
        Some((base.to_uppercase(), "KRW".to_string()))
    }
}
