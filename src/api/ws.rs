//! WebSocket push endpoint
//! Mission: One frame per tick to every subscriber that can keep up

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::api::AppState;

/// Heartbeat cadence; a duplicate of the latest frame keeps idle
/// connections alive well inside client timeouts.
const HEARTBEAT_SECS: u64 = 25;

/// GET /api/ws/opportunities
pub async fn ws_opportunities(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.hub.subscribe();
    let write_timeout = Duration::from_secs(state.config.subscriber_write_timeout_secs);

    info!(subscribers = state.hub.subscriber_count(), "ws subscriber connected");

    // replay the latest frame so a new client isn't empty until the next tick
    if !send_frame(&mut socket, state.hub.latest_frame(), write_timeout).await {
        return;
    }

    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_SECS));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    heartbeat.reset();

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(frame) => {
                        if !send_frame(&mut socket, frame, write_timeout).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        // the bounded buffer overflowed: this subscriber is
                        // too slow to keep, never back-pressure the detector
                        debug!(missed, "closing lagged ws subscriber");
                        break;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            _ = heartbeat.tick() => {
                if !send_frame(&mut socket, state.hub.latest_frame(), write_timeout).await {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    // no client->server protocol; tolerate pings, drop on close
                    Some(Ok(Message::Text(text))) if text == "ping" => {
                        let _ = socket.send(Message::Text("pong".to_string())).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    debug!("ws subscriber disconnected");
}

/// Send one frame within the configured write timeout; `false` means the
/// subscriber should be dropped.
async fn send_frame(socket: &mut WebSocket, frame: String, write_timeout: Duration) -> bool {
    match tokio::time::timeout(write_timeout, socket.send(Message::Text(frame))).await {
        Ok(Ok(())) => true,
        Ok(Err(_)) => false,
        Err(_) => {
            debug!("ws write timed out, dropping subscriber");
            false
        }
    }
}
