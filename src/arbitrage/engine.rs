//! Arbitrage detection engine
//! Mission: Find and quantify cross-venue price mismatches in real time
//! Philosophy: Every tick is a clean slate computed from one snapshot view

use std::collections::HashMap;
use tracing::{debug, error};

use crate::arbitrage::allocation::AllocationTier;
use crate::arbitrage::detectors::{
    detect_funding_arb, detect_kimchi, detect_perp_perp, detect_spot_cross,
    detect_spot_perp_basis, DetectCtx, DetectorParams,
};
use crate::arbitrage::fees::CostModel;
use crate::config::Config;
use crate::models::{FxRate, Opportunity, Venue, WalletStatus};
use crate::snapshot::SnapshotView;

/// Net leg notional tolerance relative to the largest leg.
const NEUTRALITY_EPSILON: f64 = 1e-6;

pub struct OpportunityEngine {
    params: DetectorParams,
    curve: Vec<AllocationTier>,
    total_equity_usd: f64,
    max_opportunities: usize,
}

impl OpportunityEngine {
    pub fn from_config(config: &Config) -> Self {
        Self {
            params: DetectorParams {
                max_age_secs: config.max_ticker_age_secs,
                min_oi_usd: config.min_oi_usd,
                min_funding_8h_pct: config.min_funding_8h_pct,
                min_basis_bps: config.min_basis_bps,
                min_spread_bps: config.min_spread_bps,
                min_kimchi_pct: config.min_kimchi_pct,
                max_combined_spread_bps: config.max_combined_spread_bps,
                costs: CostModel::new(config.fee_bps, config.slippage_bps),
                trading_symbols: config.trading_symbols.clone(),
            },
            curve: config.allocation_curve.clone(),
            total_equity_usd: config.tether_total_equity_usd,
            max_opportunities: config.max_opportunities,
        }
    }

    /// One detection pass: run every detector over the same view, validate,
    /// dedupe by (kind, symbol, venue set), rank by |spread| and truncate.
    pub fn detect(
        &self,
        view: &SnapshotView,
        fx: Option<&FxRate>,
        wallet: &HashMap<(Venue, String), WalletStatus>,
    ) -> Vec<Opportunity> {
        let ctx = DetectCtx {
            view,
            fx,
            wallet,
            curve: &self.curve,
            total_equity_usd: self.total_equity_usd,
            params: &self.params,
        };

        let mut candidates = Vec::new();
        candidates.extend(detect_spot_cross(&ctx));
        candidates.extend(detect_kimchi(&ctx));
        candidates.extend(detect_funding_arb(&ctx));
        candidates.extend(detect_spot_perp_basis(&ctx));
        candidates.extend(detect_perp_perp(&ctx));

        let total = candidates.len();
        let valid: Vec<Opportunity> = candidates
            .into_iter()
            .filter(|opp| self.check_invariants(opp))
            .collect();

        let deduped = dedupe(valid);
        let ranked = rank_and_truncate(deduped, self.max_opportunities);

        debug!(
            candidates = total,
            emitted = ranked.len(),
            "detection pass complete"
        );
        ranked
    }
}

impl OpportunityEngine {
    fn check_invariants(&self, opportunity: &Opportunity) -> bool {
        if opportunity.legs.len() < 2 {
            error!(
                kind = opportunity.kind.as_str(),
                symbol = %opportunity.symbol,
                "dropping opportunity with fewer than two legs"
            );
            return false;
        }
        let net = opportunity.net_notional().abs();
        let tolerance = NEUTRALITY_EPSILON * opportunity.max_leg_notional().max(1.0);
        if net > tolerance {
            error!(
                kind = opportunity.kind.as_str(),
                symbol = %opportunity.symbol,
                net_notional = net,
                "dropping opportunity with unbalanced legs"
            );
            return false;
        }
        if opportunity.legs.iter().any(|l| l.price <= 0.0 || l.quantity <= 0.0) {
            error!(
                kind = opportunity.kind.as_str(),
                symbol = %opportunity.symbol,
                "dropping opportunity with non-positive leg price or quantity"
            );
            return false;
        }
        true
    }
}

/// Keep the widest spread per (kind, symbol, sorted venue set), with a
/// deterministic tiebreak so identical snapshots produce identical sets.
fn dedupe(opportunities: Vec<Opportunity>) -> Vec<Opportunity> {
    let mut best: HashMap<_, Opportunity> = HashMap::new();
    for opportunity in opportunities {
        let key = opportunity.dedup_key();
        match best.get(&key) {
            Some(existing)
                if (existing.spread_bps, &existing.id) >= (opportunity.spread_bps, &opportunity.id) => {}
            _ => {
                best.insert(key, opportunity);
            }
        }
    }
    best.into_values().collect()
}

fn rank_and_truncate(mut opportunities: Vec<Opportunity>, limit: usize) -> Vec<Opportunity> {
    opportunities.sort_by(|a, b| {
        b.spread_bps
            .abs()
            .total_cmp(&a.spread_bps.abs())
            .then_with(|| a.kind.cmp(&b.kind))
            .then_with(|| a.symbol.cmp(&b.symbol))
            .then_with(|| a.id.cmp(&b.id))
    });
    opportunities.truncate(limit);
    opportunities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::allocation::{AllocationAction, AllocationTier};
    use crate::models::{Instrument, Leg, OpportunityKind, Side, Ticker, VenueKind};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn engine() -> OpportunityEngine {
        OpportunityEngine {
            params: DetectorParams {
                max_age_secs: 10,
                min_oi_usd: 100_000.0,
                min_funding_8h_pct: 0.01,
                min_basis_bps: 10.0,
                min_spread_bps: 5.0,
                min_kimchi_pct: 0.3,
                max_combined_spread_bps: 20.0,
                costs: CostModel::new(10.0, 0.0),
                trading_symbols: Vec::new(),
            },
            curve: vec![
                AllocationTier::new(0.0, 0.0, AllocationAction::Flat),
                AllocationTier::new(2.0, 25.0, AllocationAction::SellKrw),
            ],
            total_equity_usd: 100_000.0,
            max_opportunities: 200,
        }
    }

    fn spot_view(prices: &[(Venue, f64)]) -> SnapshotView {
        let mut view = SnapshotView::default();
        view.taken_at = Utc::now();
        for (venue, last) in prices {
            let instrument = Instrument::spot("BTC", "USDT");
            view.tickers.insert(
                (*venue, instrument.clone()),
                Ticker {
                    venue: *venue,
                    instrument,
                    last: *last,
                    bid: None,
                    ask: None,
                    ts: Utc::now(),
                },
            );
        }
        view
    }

    #[test]
    fn test_detection_is_deterministic_per_snapshot() {
        let engine = engine();
        let view = spot_view(&[
            (Venue::Binance, 60_000.0),
            (Venue::Okx, 60_150.0),
            (Venue::Gate, 60_080.0),
        ]);
        let wallet = HashMap::new();

        let first = engine.detect(&view, None, &wallet);
        let second = engine.detect(&view, None, &wallet);

        assert!(!first.is_empty());
        let ids_a: Vec<_> = first.iter().map(|o| o.id).collect();
        let ids_b: Vec<_> = second.iter().map(|o| o.id).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_ranking_is_by_absolute_spread() {
        let engine = engine();
        let view = spot_view(&[
            (Venue::Binance, 60_000.0),
            (Venue::Okx, 60_150.0),
        ]);
        let wallet = HashMap::new();
        let opportunities = engine.detect(&view, None, &wallet);
        for pair in opportunities.windows(2) {
            assert!(pair[0].spread_bps.abs() >= pair[1].spread_bps.abs());
        }
    }

    #[test]
    fn test_unbalanced_candidate_dropped() {
        let engine = engine();
        let opportunity = Opportunity {
            id: uuid::Uuid::nil(),
            kind: OpportunityKind::SpotCross,
            symbol: "BTC/USDT".to_string(),
            spread_bps: 25.0,
            expected_pnl_pct: 0.05,
            notional_usd: 10_000.0,
            detected_at: Utc::now(),
            description: String::new(),
            legs: vec![
                Leg {
                    exchange: Venue::Binance,
                    venue_type: VenueKind::Spot,
                    side: Side::Buy,
                    symbol: "BTCUSDT".to_string(),
                    price: 60_000.0,
                    quantity: 1.0,
                },
                Leg {
                    exchange: Venue::Okx,
                    venue_type: VenueKind::Spot,
                    side: Side::Sell,
                    symbol: "BTCUSDT".to_string(),
                    price: 60_150.0,
                    quantity: 1.0, // equal quantity at unequal price: not balanced
                },
            ],
            metadata: BTreeMap::new(),
            tradeable: None,
            deposit_status: None,
        };
        assert!(!engine.check_invariants(&opportunity));
    }

    #[test]
    fn test_dedupe_keeps_widest_spread() {
        let make = |spread: f64| {
            let mut opp = Opportunity {
                id: Opportunity::derive_id(
                    OpportunityKind::SpotCross,
                    "BTC/USDT",
                    &[Venue::Binance, Venue::Okx],
                    spread,
                ),
                kind: OpportunityKind::SpotCross,
                symbol: "BTC/USDT".to_string(),
                spread_bps: spread,
                expected_pnl_pct: 0.0,
                notional_usd: 10_000.0,
                detected_at: Utc::now(),
                description: String::new(),
                legs: Vec::new(),
                metadata: BTreeMap::new(),
                tradeable: None,
                deposit_status: None,
            };
            opp.legs = vec![
                Leg {
                    exchange: Venue::Binance,
                    venue_type: VenueKind::Spot,
                    side: Side::Buy,
                    symbol: "BTCUSDT".to_string(),
                    price: 60_000.0,
                    quantity: 1.0,
                },
                Leg {
                    exchange: Venue::Okx,
                    venue_type: VenueKind::Spot,
                    side: Side::Sell,
                    symbol: "BTCUSDT".to_string(),
                    price: 60_000.0,
                    quantity: 1.0,
                },
            ];
            opp
        };

        let deduped = dedupe(vec![make(10.0), make(25.0), make(18.0)]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].spread_bps, 25.0);
    }
}
