//! HTTP & WebSocket API
//! Mission: Expose the live opportunity set for pull and push consumers

pub mod routes;
pub mod ws;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::fx::FxResolver;
use crate::hub::BroadcastHub;
use crate::scheduler::Scheduler;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
    pub scheduler: Arc<Scheduler>,
    pub fx: Arc<FxResolver>,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .route("/api/opportunities", get(routes::get_opportunities))
        .route("/api/signals/tether-bot", get(routes::get_tether_bot_signals))
        .route("/api/monitor/spreads", get(routes::get_monitor_spreads))
        .route("/api/status", get(routes::get_status))
        .route("/api/ws/opportunities", get(ws::ws_opportunities))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
