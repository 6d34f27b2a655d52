//! HTTP pull endpoints
//! Mission: Fast, clear, actionable snapshots of the detection state

use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue},
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::api::AppState;
use crate::models::{Opportunity, OpportunityKind};
use crate::scheduler::ConnectorStatus;

/// Flagged on the snapshot response when the last-good list has expired.
const STALE_HEADER: &str = "x-data-stale";

pub async fn health_check() -> &'static str {
    "spreadbot operational"
}

#[derive(Debug, Serialize)]
pub struct OpportunitiesResponse {
    pub opportunities: Vec<Opportunity>,
    pub count: usize,
    pub timestamp: String,
}

/// GET /api/opportunities
/// Most recent detection set; serves last-good within its TTL, then an empty
/// list with the stale header.
pub async fn get_opportunities(
    State(state): State<AppState>,
) -> (HeaderMap, Json<OpportunitiesResponse>) {
    let (opportunities, stale) = state.hub.snapshot();

    let mut headers = HeaderMap::new();
    if stale {
        headers.insert(STALE_HEADER, HeaderValue::from_static("1"));
    }

    let response = OpportunitiesResponse {
        count: opportunities.len(),
        opportunities,
        timestamp: Utc::now().to_rfc3339(),
    };
    (headers, Json(response))
}

#[derive(Debug, Serialize)]
pub struct TetherBotSignal {
    pub symbol: String,
    pub premium_pct: Option<f64>,
    pub target_allocation_pct: Option<f64>,
    pub recommended_notional: Option<f64>,
    pub recommended_action: Option<String>,
    pub spread_bps: f64,
    pub tradeable: Option<bool>,
    pub deposit_status: Option<crate::models::DepositStatus>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct TetherBotResponse {
    pub usd_krw: f64,
    pub fx_stale: bool,
    pub total_equity_usd: f64,
    pub signals: Vec<TetherBotSignal>,
    pub count: usize,
    pub timestamp: String,
}

/// GET /api/signals/tether-bot
/// Kimchi-premium subset with the allocation metadata the tether bot trades on.
pub async fn get_tether_bot_signals(State(state): State<AppState>) -> Json<TetherBotResponse> {
    let (opportunities, _) = state.hub.snapshot();
    let fx = state.fx.current();

    let signals: Vec<TetherBotSignal> = opportunities
        .iter()
        .filter(|o| o.kind == OpportunityKind::KimchiPremium)
        .map(|o| TetherBotSignal {
            symbol: o.symbol.clone(),
            premium_pct: o.metadata.get("premium_pct").and_then(|v| v.as_f64()),
            target_allocation_pct: o
                .metadata
                .get("target_allocation_pct")
                .and_then(|v| v.as_f64()),
            recommended_notional: o
                .metadata
                .get("recommended_notional")
                .and_then(|v| v.as_f64()),
            recommended_action: o
                .metadata
                .get("recommended_action")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            spread_bps: o.spread_bps,
            tradeable: o.tradeable,
            deposit_status: o.deposit_status,
            timestamp: o.detected_at.to_rfc3339(),
        })
        .collect();

    Json(TetherBotResponse {
        usd_krw: fx.krw_per_usd,
        fx_stale: fx.stale,
        total_equity_usd: state.config.tether_total_equity_usd,
        count: signals.len(),
        signals,
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadsQuery {
    /// Generic floor on |spread_bps| across all kinds.
    pub min_gap: Option<f64>,
    /// Floor on |premium_pct| for kimchi entries.
    pub min_kimchi: Option<f64>,
    /// Floor on the 8h funding differential (pct) for funding entries.
    pub min_funding: Option<f64>,
    /// Floor on |spread_bps| for cross-exchange spot entries.
    pub min_cex: Option<f64>,
    /// Comma-separated kind filter, e.g. `kimchi_premium,funding_arb`.
    pub types: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct KindStats {
    pub count: usize,
    pub max: f64,
    pub avg: f64,
}

#[derive(Debug, Serialize)]
pub struct SpreadsSummary {
    pub total: usize,
    pub by_kind: HashMap<String, KindStats>,
    pub usd_krw: f64,
    pub exchange_counts: HashMap<String, usize>,
}

#[derive(Debug, Serialize)]
pub struct SpreadsResponse {
    pub spreads: Vec<Opportunity>,
    pub summary: SpreadsSummary,
    pub timestamp: String,
}

fn passes_filters(opportunity: &Opportunity, query: &SpreadsQuery) -> bool {
    if let Some(types) = &query.types {
        let wanted: Vec<&str> = types.split(',').map(str::trim).collect();
        if !wanted.is_empty() && !wanted.contains(&opportunity.kind.as_str()) {
            return false;
        }
    }
    if let Some(min_gap) = query.min_gap {
        if opportunity.spread_bps.abs() < min_gap {
            return false;
        }
    }
    match opportunity.kind {
        OpportunityKind::KimchiPremium => {
            if let Some(min_kimchi) = query.min_kimchi {
                let premium = opportunity
                    .metadata
                    .get("premium_pct")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0);
                if premium.abs() < min_kimchi {
                    return false;
                }
            }
        }
        OpportunityKind::FundingArb => {
            if let Some(min_funding) = query.min_funding {
                let diff = opportunity
                    .metadata
                    .get("funding_diff_8h_pct")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0);
                if diff.abs() < min_funding {
                    return false;
                }
            }
        }
        OpportunityKind::SpotCross => {
            if let Some(min_cex) = query.min_cex {
                if opportunity.spread_bps.abs() < min_cex {
                    return false;
                }
            }
        }
        _ => {}
    }
    true
}

fn summarize(spreads: &[Opportunity], usd_krw: f64) -> SpreadsSummary {
    let mut by_kind: HashMap<String, KindStats> = HashMap::new();
    let mut exchange_counts: HashMap<String, usize> = HashMap::new();

    for opportunity in spreads {
        let stats = by_kind
            .entry(opportunity.kind.as_str().to_string())
            .or_insert(KindStats {
                count: 0,
                max: 0.0,
                avg: 0.0,
            });
        stats.count += 1;
        stats.max = stats.max.max(opportunity.spread_bps.abs());
        stats.avg += opportunity.spread_bps.abs();

        for leg in &opportunity.legs {
            *exchange_counts
                .entry(leg.exchange.as_str().to_string())
                .or_insert(0) += 1;
        }
    }
    for stats in by_kind.values_mut() {
        if stats.count > 0 {
            stats.avg /= stats.count as f64;
        }
    }

    SpreadsSummary {
        total: spreads.len(),
        by_kind,
        usd_krw,
        exchange_counts,
    }
}

/// GET /api/monitor/spreads
/// Unified spread list with per-type floors and summary stats.
pub async fn get_monitor_spreads(
    Query(query): Query<SpreadsQuery>,
    State(state): State<AppState>,
) -> Json<SpreadsResponse> {
    let (opportunities, _) = state.hub.snapshot();
    let fx = state.fx.current();

    let spreads: Vec<Opportunity> = opportunities
        .into_iter()
        .filter(|o| passes_filters(o, &query))
        .collect();

    let summary = summarize(&spreads, fx.krw_per_usd);
    Json(SpreadsResponse {
        spreads,
        summary,
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub connectors: Vec<ConnectorStatus>,
    pub fx: crate::models::FxRate,
    pub subscribers: usize,
    pub timestamp: String,
}

/// GET /api/status
/// Per-connector health mirror of the scheduler's bookkeeping.
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        connectors: state.scheduler.status_report(),
        fx: state.fx.current(),
        subscribers: state.hub.subscriber_count(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Venue;
    use std::collections::BTreeMap;

    fn opportunity(kind: OpportunityKind, spread_bps: f64) -> Opportunity {
        Opportunity {
            id: uuid::Uuid::nil(),
            kind,
            symbol: "BTC".to_string(),
            spread_bps,
            expected_pnl_pct: 0.0,
            notional_usd: 10_000.0,
            detected_at: Utc::now(),
            description: String::new(),
            legs: Vec::new(),
            metadata: BTreeMap::new(),
            tradeable: None,
            deposit_status: None,
        }
    }

    #[test]
    fn test_types_filter() {
        let query = SpreadsQuery {
            types: Some("kimchi_premium,funding_arb".to_string()),
            ..Default::default()
        };
        assert!(passes_filters(
            &opportunity(OpportunityKind::KimchiPremium, 50.0),
            &query
        ));
        assert!(!passes_filters(
            &opportunity(OpportunityKind::SpotCross, 50.0),
            &query
        ));
    }

    #[test]
    fn test_min_kimchi_reads_metadata() {
        let query = SpreadsQuery {
            min_kimchi: Some(1.0),
            ..Default::default()
        };
        let mut opp = opportunity(OpportunityKind::KimchiPremium, 80.0);
        opp.metadata
            .insert("premium_pct".to_string(), serde_json::json!(0.8));
        assert!(!passes_filters(&opp, &query));

        opp.metadata
            .insert("premium_pct".to_string(), serde_json::json!(-1.4));
        assert!(passes_filters(&opp, &query)); // magnitude comparison
    }

    #[test]
    fn test_min_cex_only_applies_to_spot_cross() {
        let query = SpreadsQuery {
            min_cex: Some(30.0),
            ..Default::default()
        };
        assert!(!passes_filters(
            &opportunity(OpportunityKind::SpotCross, 25.0),
            &query
        ));
        assert!(passes_filters(
            &opportunity(OpportunityKind::PerpPerpSpread, 25.0),
            &query
        ));
    }

    #[test]
    fn test_summary_stats() {
        let mut a = opportunity(OpportunityKind::SpotCross, 20.0);
        a.legs.push(crate::models::Leg {
            exchange: Venue::Binance,
            venue_type: crate::models::VenueKind::Spot,
            side: crate::models::Side::Buy,
            symbol: "BTCUSDT".to_string(),
            price: 60_000.0,
            quantity: 0.1,
        });
        let b = opportunity(OpportunityKind::SpotCross, 40.0);

        let summary = summarize(&[a, b], 1450.0);
        assert_eq!(summary.total, 2);
        let stats = &summary.by_kind["spot_cross"];
        assert_eq!(stats.count, 2);
        assert_eq!(stats.max, 40.0);
        assert_eq!(stats.avg, 30.0);
        assert_eq!(summary.exchange_counts["binance"], 1);
        assert_eq!(summary.usd_krw, 1450.0);
    }
}
