//! Core market-data and opportunity model
//! Mission: One normalized vocabulary for every venue feed and detector

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Supported venues. Spot and perp markets on the same exchange share a venue;
/// the instrument's `venue_kind` tells them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    Binance,
    Bybit,
    Okx,
    Upbit,
    Bithumb,
    Gate,
    Bitget,
    Bingx,
    Hyperliquid,
    Synthetix,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Binance => "binance",
            Venue::Bybit => "bybit",
            Venue::Okx => "okx",
            Venue::Upbit => "upbit",
            Venue::Bithumb => "bithumb",
            Venue::Gate => "gate",
            Venue::Bitget => "bitget",
            Venue::Bingx => "bingx",
            Venue::Hyperliquid => "hyperliquid",
            Venue::Synthetix => "synthetix",
        }
    }

    /// Korean venues quote in KRW and anchor the kimchi-premium detector.
    pub fn is_korean(&self) -> bool {
        matches!(self, Venue::Upbit | Venue::Bithumb)
    }

    pub fn all() -> &'static [Venue] {
        &[
            Venue::Binance,
            Venue::Bybit,
            Venue::Okx,
            Venue::Upbit,
            Venue::Bithumb,
            Venue::Gate,
            Venue::Bitget,
            Venue::Bingx,
            Venue::Hyperliquid,
            Venue::Synthetix,
        ]
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueKind {
    Spot,
    Perp,
    Fx,
}

/// Canonical trading pair. Base/quote are upper-case with no delimiter by the
/// time an instrument reaches the snapshot (see `scrapers::normalize`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instrument {
    pub base: String,
    pub quote: String,
    pub venue_kind: VenueKind,
}

impl Instrument {
    pub fn spot(base: &str, quote: &str) -> Self {
        Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
            venue_kind: VenueKind::Spot,
        }
    }

    pub fn perp(base: &str, quote: &str) -> Self {
        Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
            venue_kind: VenueKind::Perp,
        }
    }

    /// Flat symbol form, e.g. `BTCUSDT`.
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Top-of-book quote for one (venue, instrument).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub venue: Venue,
    pub instrument: Instrument,
    pub last: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub ts: DateTime<Utc>,
}

impl Ticker {
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age_secs: i64) -> bool {
        now.signed_duration_since(self.ts) <= Duration::seconds(max_age_secs)
    }

    /// Price to pay when buying: best ask, falling back to last.
    pub fn buy_price(&self) -> f64 {
        self.ask.filter(|a| *a > 0.0).unwrap_or(self.last)
    }

    /// Price received when selling: best bid, falling back to last.
    pub fn sell_price(&self) -> f64 {
        self.bid.filter(|b| *b > 0.0).unwrap_or(self.last)
    }
}

/// Funding rate in fraction-per-native-interval. Normalization to the 8h
/// reference interval happens here, not in the connectors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FundingRate {
    pub rate_per_interval: f64,
    pub interval_hours: f64,
    pub next_funding_time: Option<DateTime<Utc>>,
}

impl FundingRate {
    pub fn new(rate_per_interval: f64, interval_hours: f64) -> Self {
        Self {
            rate_per_interval,
            interval_hours,
            next_funding_time: None,
        }
    }

    /// 8h-equivalent rate; all detectors compare this.
    pub fn rate_8h(&self) -> f64 {
        if self.interval_hours <= 0.0 {
            return 0.0;
        }
        self.rate_per_interval * (8.0 / self.interval_hours)
    }
}

/// Open interest in USD, used only as a liquidity gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OpenInterest {
    pub oi_usd: f64,
}

/// KRW/USD rate with provenance. The resolver guarantees the sanity band
/// `[1000, 2000]` unless `stale` marks the configured fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FxRate {
    pub krw_per_usd: f64,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    pub stale: bool,
}

impl FxRate {
    pub fn usd_per_krw(&self) -> f64 {
        1.0 / self.krw_per_usd
    }
}

/// Deposit/withdraw flags for one (venue, asset). `None` = unknown; unknown
/// propagates to opportunities rather than blocking them.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WalletStatus {
    pub deposit: Option<bool>,
    pub withdraw: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buy, -1 for sell; used by the delta-neutrality invariant.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OpportunityKind {
    #[serde(rename = "spot_cross")]
    SpotCross,
    #[serde(rename = "kimchi_premium")]
    KimchiPremium,
    #[serde(rename = "funding_arb")]
    FundingArb,
    #[serde(rename = "spot_vs_perp")]
    SpotPerpBasis,
    #[serde(rename = "perp_perp_spread")]
    PerpPerpSpread,
}

impl OpportunityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityKind::SpotCross => "spot_cross",
            OpportunityKind::KimchiPremium => "kimchi_premium",
            OpportunityKind::FundingArb => "funding_arb",
            OpportunityKind::SpotPerpBasis => "spot_vs_perp",
            OpportunityKind::PerpPerpSpread => "perp_perp_spread",
        }
    }
}

/// One side of an opportunity on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leg {
    pub exchange: Venue,
    pub venue_type: VenueKind,
    pub side: Side,
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
}

impl Leg {
    pub fn signed_notional(&self) -> f64 {
        self.side.sign() * self.price * self.quantity
    }
}

/// Per-leg wallet flags stamped on kimchi opportunities. `null` = unknown.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DepositStatus {
    pub buy: Option<bool>,
    pub sell: Option<bool>,
}

/// A detected arbitrage opportunity. Ephemeral: regenerated every tick,
/// never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: OpportunityKind,
    pub symbol: String,
    pub spread_bps: f64,
    pub expected_pnl_pct: f64,
    #[serde(rename = "notional")]
    pub notional_usd: f64,
    #[serde(rename = "timestamp")]
    pub detected_at: DateTime<Utc>,
    pub description: String,
    pub legs: Vec<Leg>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tradeable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_status: Option<DepositStatus>,
}

impl Opportunity {
    /// Content-derived id: the same snapshot always yields the same id for
    /// the same opportunity, making detection deterministic per snapshot.
    pub fn derive_id(
        kind: OpportunityKind,
        symbol: &str,
        venues: &[Venue],
        spread_bps: f64,
    ) -> Uuid {
        let mut sorted: Vec<&str> = venues.iter().map(|v| v.as_str()).collect();
        sorted.sort_unstable();
        let name = format!(
            "{}|{}|{}|{:.4}",
            kind.as_str(),
            symbol,
            sorted.join(","),
            spread_bps
        );
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
    }

    /// Net signed notional across legs. Zero (within rounding) for every
    /// emitted opportunity.
    pub fn net_notional(&self) -> f64 {
        self.legs.iter().map(Leg::signed_notional).sum()
    }

    pub fn max_leg_notional(&self) -> f64 {
        self.legs
            .iter()
            .map(|l| l.signed_notional().abs())
            .fold(0.0, f64::max)
    }

    /// Dedup key: one opportunity per (kind, symbol, venue set) per tick.
    pub fn dedup_key(&self) -> (OpportunityKind, String, Vec<Venue>) {
        let mut venues: Vec<Venue> = self.legs.iter().map(|l| l.exchange).collect();
        venues.sort_unstable();
        venues.dedup();
        (self.kind, self.symbol.clone(), venues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_funding_rate_8h_normalization() {
        // 8h native interval passes through unchanged
        let binance = FundingRate::new(0.0001, 8.0);
        assert!((binance.rate_8h() - 0.0001).abs() < 1e-12);

        // Hyperliquid 1h -> x8
        let hl = FundingRate::new(0.0002, 1.0);
        assert!((hl.rate_8h() - 0.0016).abs() < 1e-12);

        // Synthetix daily -> /3
        let snx = FundingRate::new(0.0003, 24.0);
        assert!((snx.rate_8h() - 0.0001).abs() < 1e-12);
    }

    #[test]
    fn test_opportunity_id_is_pure_function_of_content() {
        let a = Opportunity::derive_id(
            OpportunityKind::SpotCross,
            "BTC/USDT",
            &[Venue::Binance, Venue::Okx],
            25.0,
        );
        let b = Opportunity::derive_id(
            OpportunityKind::SpotCross,
            "BTC/USDT",
            &[Venue::Okx, Venue::Binance],
            25.0,
        );
        assert_eq!(a, b); // venue order must not matter

        let c = Opportunity::derive_id(
            OpportunityKind::SpotCross,
            "BTC/USDT",
            &[Venue::Binance, Venue::Okx],
            26.0,
        );
        assert_ne!(a, c);
    }

    #[test]
    fn test_leg_signed_notional() {
        let buy = Leg {
            exchange: Venue::Binance,
            venue_type: VenueKind::Spot,
            side: Side::Buy,
            symbol: "BTCUSDT".to_string(),
            price: 60000.0,
            quantity: 0.5,
        };
        let sell = Leg {
            exchange: Venue::Okx,
            venue_type: VenueKind::Spot,
            side: Side::Sell,
            symbol: "BTCUSDT".to_string(),
            price: 60000.0,
            quantity: 0.5,
        };
        assert!((buy.signed_notional() + sell.signed_notional()).abs() < 1e-9);
    }

    #[test]
    fn test_wire_kind_names() {
        assert_eq!(
            serde_json::to_string(&OpportunityKind::SpotPerpBasis).unwrap(),
            "\"spot_vs_perp\""
        );
        assert_eq!(
            serde_json::to_string(&OpportunityKind::KimchiPremium).unwrap(),
            "\"kimchi_premium\""
        );
    }

    #[test]
    fn test_ticker_freshness_window() {
        let now = Utc::now();
        let ticker = Ticker {
            venue: Venue::Bithumb,
            instrument: Instrument::spot("BTC", "KRW"),
            last: 88_500_000.0,
            bid: None,
            ask: None,
            ts: now - Duration::seconds(30),
        };
        assert!(!ticker.is_fresh(now, 10));
        assert!(ticker.is_fresh(now, 60));
    }
}
