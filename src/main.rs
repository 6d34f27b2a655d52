//! Spreadbot - Real-time Crypto Arbitrage Opportunity Detector
//! Mission: Fuse many eventually-consistent venue feeds into one coherent,
//! low-latency opportunity stream
//! Philosophy: Every feed can fail; the detector never does

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use spreadbot_backend::{
    api::{self, AppState},
    arbitrage::engine::OpportunityEngine,
    config::Config,
    fx::FxResolver,
    hub::BroadcastHub,
    models::Venue,
    scheduler::Scheduler,
    scrapers::{
        binance::{BinanceFuturesConnector, BinanceSpotConnector},
        bingx::BingxConnector,
        bitget::BitgetConnector,
        bithumb::BithumbConnector,
        bybit::BybitConnector,
        gate::GateConnector,
        hyperliquid::HyperliquidConnector,
        okx::OkxConnector,
        synthetix::SynthetixConnector,
        upbit::UpbitConnector,
        Connector,
    },
    snapshot::MarketSnapshot,
    wallet::WalletStateOracle,
};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn build_connectors(
    config: &Config,
    client: &reqwest::Client,
    snapshot: &Arc<MarketSnapshot>,
    wallet: &Arc<WalletStateOracle>,
) -> Vec<Arc<dyn Connector>> {
    let symbols = config.trading_symbols.clone();
    let mut connectors: Vec<Arc<dyn Connector>> = Vec::new();

    if config.venue_enabled(Venue::Binance) {
        connectors.push(Arc::new(BinanceSpotConnector::new(
            client.clone(),
            snapshot.clone(),
            symbols.clone(),
        )));
        connectors.push(Arc::new(BinanceFuturesConnector::new(
            client.clone(),
            snapshot.clone(),
            symbols.clone(),
        )));
    }
    if config.venue_enabled(Venue::Bybit) {
        connectors.push(Arc::new(BybitConnector::new(
            client.clone(),
            snapshot.clone(),
            symbols.clone(),
        )));
    }
    if config.venue_enabled(Venue::Okx) {
        connectors.push(Arc::new(OkxConnector::new(
            client.clone(),
            snapshot.clone(),
            symbols.clone(),
        )));
    }
    if config.venue_enabled(Venue::Upbit) {
        connectors.push(Arc::new(UpbitConnector::new(
            client.clone(),
            snapshot.clone(),
            symbols.clone(),
        )));
    }
    if config.venue_enabled(Venue::Bithumb) {
        connectors.push(Arc::new(BithumbConnector::new(
            client.clone(),
            snapshot.clone(),
            wallet.clone(),
            symbols.clone(),
        )));
    }
    if config.venue_enabled(Venue::Gate) {
        connectors.push(Arc::new(GateConnector::new(
            client.clone(),
            snapshot.clone(),
            symbols.clone(),
        )));
    }
    if config.venue_enabled(Venue::Bitget) {
        connectors.push(Arc::new(BitgetConnector::new(
            client.clone(),
            snapshot.clone(),
            symbols.clone(),
        )));
    }
    if config.venue_enabled(Venue::Bingx) {
        connectors.push(Arc::new(BingxConnector::new(
            client.clone(),
            snapshot.clone(),
            symbols.clone(),
        )));
    }
    if config.venue_enabled(Venue::Hyperliquid) {
        connectors.push(Arc::new(HyperliquidConnector::new(
            client.clone(),
            snapshot.clone(),
            symbols.clone(),
        )));
    }
    if config.venue_enabled(Venue::Synthetix) {
        connectors.push(Arc::new(SynthetixConnector::new(
            client.clone(),
            snapshot.clone(),
            symbols.clone(),
        )));
    }

    connectors
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Arc::new(Config::from_env().context("configuration parse failed")?);

    info!("🚀 Spreadbot starting");
    info!(
        venues = config.enabled_venues.len(),
        symbols = ?config.trading_symbols,
        interval_secs = config.detect_interval_secs,
        "configuration loaded"
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.connector_timeout_secs))
        .user_agent("spreadbot/0.1 (arbitrage monitor)")
        .build()
        .context("failed to build HTTP client")?;

    let snapshot = Arc::new(MarketSnapshot::new());
    let wallet = Arc::new(WalletStateOracle::new());

    let connectors = build_connectors(&config, &client, &snapshot, &wallet);
    info!(count = connectors.len(), "📡 connectors registered");

    // FX runs on its own cadence, independent of the detection scheduler
    let fx = Arc::new(FxResolver::new(
        client.clone(),
        snapshot.clone(),
        config.fx_fallback_krw_per_usd,
    ));
    fx.clone().spawn_refresher(config.fx_refresh_interval_secs);

    let hub = Arc::new(BroadcastHub::new(config.last_good_ttl_secs));
    let engine = OpportunityEngine::from_config(&config);

    let scheduler = Arc::new(Scheduler::new(
        connectors,
        snapshot,
        engine,
        fx.clone(),
        wallet,
        hub.clone(),
        config.alert_ttl_secs,
        Duration::from_secs(config.detect_interval_secs),
        Duration::from_secs(config.connector_timeout_secs),
        config.stale_ttl_secs,
    ));
    scheduler.clone().spawn();

    let state = AppState {
        hub,
        scheduler,
        fx,
        config: config.clone(),
    };
    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("🌐 listening on {addr}");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
