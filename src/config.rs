//! Application configuration
//! Mission: Every tunable in one place, environment-driven, sane defaults

use crate::arbitrage::allocation::{AllocationAction, AllocationTier};
use crate::models::Venue;
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::env;

/// Optional read-only venue credentials. Presence unlocks credential-gated
/// wallet-state refreshes; absence leaves those entries unknown.
#[derive(Debug, Clone)]
pub struct VenueCredentials {
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub enabled_venues: Vec<Venue>,
    /// Base assets to detect on; empty means the default set.
    pub trading_symbols: Vec<String>,

    pub detect_interval_secs: u64,
    pub connector_timeout_secs: u64,
    pub subscriber_write_timeout_secs: u64,
    pub fx_refresh_interval_secs: u64,

    pub max_ticker_age_secs: i64,
    pub stale_ttl_secs: i64,
    pub last_good_ttl_secs: i64,
    pub alert_ttl_secs: i64,

    pub min_oi_usd: f64,
    pub min_funding_8h_pct: f64,
    pub min_basis_bps: f64,
    pub min_spread_bps: f64,
    pub min_kimchi_pct: f64,
    pub max_combined_spread_bps: f64,
    pub max_opportunities: usize,

    pub fee_bps: f64,
    pub slippage_bps: f64,

    pub tether_total_equity_usd: f64,
    pub allocation_curve: Vec<AllocationTier>,
    pub fx_fallback_krw_per_usd: f64,

    pub credentials: HashMap<Venue, VenueCredentials>,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let port = env_parse("PORT", 8080u16);

        let mut enabled_venues = Vec::new();
        for venue in Venue::all() {
            let key = format!("ENABLE_{}", venue.as_str().to_uppercase());
            if env_flag(&key, true) {
                enabled_venues.push(*venue);
            }
        }

        let trading_symbols: Vec<String> = env::var("TRADING_SYMBOLS")
            .unwrap_or_else(|_| "BTC,ETH,SOL,XRP,DOGE,ADA".to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let allocation_curve = match env::var("ALLOCATION_CURVE") {
            Ok(raw) => parse_allocation_curve(&raw)
                .context("invalid ALLOCATION_CURVE (expected premium:alloc:action;...)")?,
            Err(_) => default_allocation_curve(),
        };

        let mut credentials = HashMap::new();
        for venue in Venue::all() {
            let prefix = venue.as_str().to_uppercase();
            if let (Ok(api_key), Ok(api_secret)) = (
                env::var(format!("{prefix}_API_KEY")),
                env::var(format!("{prefix}_API_SECRET")),
            ) {
                credentials.insert(*venue, VenueCredentials { api_key, api_secret });
            }
        }

        let config = Self {
            port,
            enabled_venues,
            trading_symbols,
            detect_interval_secs: env_parse("DETECT_INTERVAL_SECS", 3),
            connector_timeout_secs: env_parse("CONNECTOR_TIMEOUT_SECS", 5),
            subscriber_write_timeout_secs: env_parse("SUBSCRIBER_WRITE_TIMEOUT_SECS", 2),
            fx_refresh_interval_secs: env_parse("FX_REFRESH_INTERVAL_SECS", 60),
            max_ticker_age_secs: env_parse("MAX_TICKER_AGE_SECS", 10),
            stale_ttl_secs: env_parse("STALE_TTL_SECS", 30),
            last_good_ttl_secs: env_parse("LAST_GOOD_TTL_SECS", 30),
            alert_ttl_secs: env_parse("ALERT_TTL_SECS", 60),
            min_oi_usd: env_parse("MIN_OI_USD", 100_000.0),
            min_funding_8h_pct: env_parse("MIN_FUNDING_8H_PCT", 0.01),
            min_basis_bps: env_parse("MIN_BASIS_BPS", 10.0),
            min_spread_bps: env_parse("MIN_SPREAD_BPS", 5.0),
            min_kimchi_pct: env_parse("MIN_KIMCHI_PCT", 0.3),
            max_combined_spread_bps: env_parse("MAX_COMBINED_SPREAD_BPS", 20.0),
            max_opportunities: env_parse("MAX_OPPORTUNITIES", 200),
            fee_bps: env_parse("FEE_BPS", 10.0),
            slippage_bps: env_parse("SLIPPAGE_BPS", 5.0),
            tether_total_equity_usd: env_parse("TETHER_TOTAL_EQUITY_USD", 100_000.0),
            allocation_curve,
            fx_fallback_krw_per_usd: env_parse("FX_FALLBACK_KRW_PER_USD", 1450.0),
            credentials,
        };

        config.validate()?;
        Ok(config)
    }

    /// Startup-fatal checks; everything else degrades at runtime.
    fn validate(&self) -> Result<()> {
        if self.detect_interval_secs == 0 {
            bail!("DETECT_INTERVAL_SECS must be > 0");
        }
        if !(1000.0..=2000.0).contains(&self.fx_fallback_krw_per_usd) {
            bail!(
                "FX_FALLBACK_KRW_PER_USD {} outside sanity band [1000, 2000]",
                self.fx_fallback_krw_per_usd
            );
        }
        if self.allocation_curve.is_empty() {
            bail!("allocation curve must have at least one breakpoint");
        }
        if !self
            .allocation_curve
            .windows(2)
            .all(|w| w[0].premium_pct < w[1].premium_pct)
        {
            bail!("allocation curve breakpoints must be strictly increasing");
        }
        Ok(())
    }

    pub fn venue_enabled(&self, venue: Venue) -> bool {
        self.enabled_venues.contains(&venue)
    }
}

fn default_allocation_curve() -> Vec<AllocationTier> {
    vec![
        AllocationTier::new(0.0, 0.0, AllocationAction::Flat),
        AllocationTier::new(2.0, 25.0, AllocationAction::SellKrw),
        AllocationTier::new(5.0, 75.0, AllocationAction::SellKrw),
    ]
}

/// Parse `premium:alloc:action` triples separated by `;`,
/// e.g. `0:0:flat;2:25:sell_krw;5:75:sell_krw`.
fn parse_allocation_curve(raw: &str) -> Result<Vec<AllocationTier>> {
    let mut tiers = Vec::new();
    for part in raw.split(';').filter(|p| !p.trim().is_empty()) {
        let fields: Vec<&str> = part.trim().split(':').collect();
        if fields.len() != 3 {
            bail!("breakpoint `{part}` is not premium:alloc:action");
        }
        let premium_pct: f64 = fields[0].parse().context("bad premium")?;
        let allocation_pct: f64 = fields[1].parse().context("bad allocation")?;
        let action = match fields[2].to_lowercase().as_str() {
            "buy_krw" => AllocationAction::BuyKrw,
            "sell_krw" => AllocationAction::SellKrw,
            "flat" => AllocationAction::Flat,
            other => bail!("unknown action `{other}`"),
        };
        tiers.push(AllocationTier::new(premium_pct, allocation_pct, action));
    }
    tiers.sort_by(|a, b| a.premium_pct.total_cmp(&b.premium_pct));
    Ok(tiers)
}
