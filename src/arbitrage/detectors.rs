//! Strategy detectors
//! Mission: Turn one snapshot view into candidate opportunities
//!
//! Every detector is a pure function of the [`DetectCtx`]: same view in,
//! same candidates out. Gating that applies to all kinds (freshness, cost,
//! dedup, ranking) lives in the engine; kind-specific thresholds live here.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};

use crate::arbitrage::allocation::{evaluate_curve, AllocationTier};
use crate::arbitrage::fees::{spread_bps, CostModel};
use crate::models::{
    DepositStatus, FxRate, Leg, Opportunity, OpportunityKind, Side, Ticker, Venue, VenueKind,
    WalletStatus,
};
use crate::snapshot::SnapshotView;

/// Leg sizing when no allocator drives the notional.
const DEFAULT_NOTIONAL_USD: f64 = 10_000.0;

/// Kimchi premiums beyond this are treated as halted/stale markets.
const MAX_SANE_KIMCHI_PCT: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct DetectorParams {
    pub max_age_secs: i64,
    pub min_oi_usd: f64,
    pub min_funding_8h_pct: f64,
    pub min_basis_bps: f64,
    pub min_spread_bps: f64,
    pub min_kimchi_pct: f64,
    pub max_combined_spread_bps: f64,
    pub costs: CostModel,
    /// Base assets to restrict detection to; empty means all.
    pub trading_symbols: Vec<String>,
}

/// Everything a detection pass may read. Detectors never touch live state.
pub struct DetectCtx<'a> {
    pub view: &'a SnapshotView,
    pub fx: Option<&'a FxRate>,
    pub wallet: &'a HashMap<(Venue, String), WalletStatus>,
    pub curve: &'a [AllocationTier],
    pub total_equity_usd: f64,
    pub params: &'a DetectorParams,
}

impl<'a> DetectCtx<'a> {
    fn symbol_enabled(&self, base: &str) -> bool {
        self.params.trading_symbols.is_empty()
            || self.params.trading_symbols.iter().any(|s| s == base)
    }

    fn wallet_flag(&self, venue: Venue, asset: &str) -> WalletStatus {
        self.wallet
            .get(&(venue, asset.to_string()))
            .copied()
            .unwrap_or_default()
    }
}

/// Equal-USD-notional sizing on both sides keeps the signed leg notionals
/// summing to zero exactly, which is the invariant the engine enforces.
fn paired_legs(
    buy: &Ticker,
    sell: &Ticker,
    buy_price: f64,
    sell_price: f64,
    notional_usd: f64,
) -> Vec<Leg> {
    vec![
        Leg {
            exchange: buy.venue,
            venue_type: buy.instrument.venue_kind,
            side: Side::Buy,
            symbol: buy.instrument.symbol(),
            price: buy_price,
            quantity: notional_usd / buy_price,
        },
        Leg {
            exchange: sell.venue,
            venue_type: sell.instrument.venue_kind,
            side: Side::Sell,
            symbol: sell.instrument.symbol(),
            price: sell_price,
            quantity: notional_usd / sell_price,
        },
    ]
}

fn meta_num(value: f64) -> serde_json::Value {
    serde_json::Number::from_f64(value)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// Best-bid/best-ask cross between every pair of venues quoting the same
/// spot pair. BUY the venue with the lowest ask, SELL the venue with the
/// highest bid.
pub fn detect_spot_cross(ctx: &DetectCtx) -> Vec<Opportunity> {
    cross_venue_spread(ctx, VenueKind::Spot, OpportunityKind::SpotCross)
}

/// SPOT_CROSS on perp markets, with the open-interest gate on both legs.
pub fn detect_perp_perp(ctx: &DetectCtx) -> Vec<Opportunity> {
    cross_venue_spread(ctx, VenueKind::Perp, OpportunityKind::PerpPerpSpread)
}

fn cross_venue_spread(
    ctx: &DetectCtx,
    kind: VenueKind,
    out_kind: OpportunityKind,
) -> Vec<Opportunity> {
    let params = ctx.params;
    let mut out = Vec::new();

    for ((base, quote), tickers) in ctx.view.fresh_by_pair(kind, params.max_age_secs) {
        if tickers.len() < 2 || !ctx.symbol_enabled(&base) {
            continue;
        }

        let mut buy_side: Option<(&Ticker, f64)> = None;
        let mut sell_side: Option<(&Ticker, f64)> = None;
        for ticker in tickers {
            if kind == VenueKind::Perp {
                let oi = ctx.view.oi_usd(ticker.venue, &ticker.instrument);
                if oi.unwrap_or(0.0) < params.min_oi_usd {
                    continue; // missing OI fails the liquidity gate
                }
            }
            let ask = ticker.buy_price();
            let bid = ticker.sell_price();
            if ask <= 0.0 || bid <= 0.0 {
                continue;
            }
            if buy_side.map_or(true, |(_, best)| ask < best) {
                buy_side = Some((ticker, ask));
            }
            if sell_side.map_or(true, |(_, best)| bid > best) {
                sell_side = Some((ticker, bid));
            }
        }

        let (Some((buy, buy_price)), Some((sell, sell_price))) = (buy_side, sell_side) else {
            continue;
        };
        if buy.venue == sell.venue {
            continue;
        }

        let gross = spread_bps(buy_price, sell_price);
        if gross < params.min_spread_bps || !params.costs.passes_cost_gate(gross) {
            continue;
        }

        let symbol = format!("{base}/{quote}");
        let venues = [buy.venue, sell.venue];
        let mut metadata = BTreeMap::new();
        metadata.insert("buy_exchange".to_string(), buy.venue.as_str().into());
        metadata.insert("sell_exchange".to_string(), sell.venue.as_str().into());
        if out_kind == OpportunityKind::PerpPerpSpread {
            if let Some(oi) = ctx.view.oi_usd(buy.venue, &buy.instrument) {
                metadata.insert("buy_oi_usd".to_string(), meta_num(oi));
            }
            if let Some(oi) = ctx.view.oi_usd(sell.venue, &sell.instrument) {
                metadata.insert("sell_oi_usd".to_string(), meta_num(oi));
            }
        }

        out.push(Opportunity {
            id: Opportunity::derive_id(out_kind, &symbol, &venues, gross),
            kind: out_kind,
            symbol,
            spread_bps: gross,
            expected_pnl_pct: params.costs.expected_pnl_pct(gross),
            notional_usd: DEFAULT_NOTIONAL_USD,
            detected_at: Utc::now(),
            description: format!(
                "buy {} @ {:.4} on {}, sell @ {:.4} on {} ({:.1} bps)",
                base, buy_price, buy.venue, sell_price, sell.venue, gross
            ),
            legs: paired_legs(buy, sell, buy_price, sell_price, DEFAULT_NOTIONAL_USD),
            metadata,
            tradeable: None,
            deposit_status: None,
        });
    }

    out
}

/// Kimchi premium: KRW spot vs USDT spot for the same base asset, compared
/// through the resolved FX rate. Leg prices are USD-denominated (the Korean
/// leg converted at the stamped rate); metadata carries the native KRW price.
pub fn detect_kimchi(ctx: &DetectCtx) -> Vec<Opportunity> {
    let params = ctx.params;
    let Some(fx) = ctx.fx else {
        return Vec::new(); // no FX, no comparison
    };
    let mut out = Vec::new();

    for (base, tickers) in ctx.view.fresh_by_base(VenueKind::Spot, params.max_age_secs) {
        if !ctx.symbol_enabled(&base) {
            continue;
        }
        let korean: Vec<&&Ticker> = tickers
            .iter()
            .filter(|t| t.venue.is_korean() && t.instrument.quote == "KRW")
            .collect();
        let foreign: Vec<&&Ticker> = tickers
            .iter()
            .filter(|t| !t.venue.is_korean() && t.instrument.quote == "USDT")
            .collect();

        for kr in &korean {
            let kr_usd = kr.last / fx.krw_per_usd;
            for fo in &foreign {
                let premium_pct = (kr_usd - fo.last) / fo.last * 100.0;
                if premium_pct.abs() > MAX_SANE_KIMCHI_PCT {
                    continue; // trading halt or stale book, not an opportunity
                }
                if premium_pct.abs() < params.min_kimchi_pct {
                    continue;
                }
                let gross = premium_pct * 100.0; // pct -> bps
                if !params.costs.passes_cost_gate(gross) {
                    continue;
                }

                let decision = evaluate_curve(ctx.curve, premium_pct, ctx.total_equity_usd);
                let notional = if decision.recommended_notional_usd > 0.0 {
                    decision.recommended_notional_usd
                } else {
                    DEFAULT_NOTIONAL_USD
                };

                // premium > 0: Korea rich -> buy foreign, sell Korea.
                let (buy, buy_price, sell, sell_price) = if premium_pct > 0.0 {
                    (**fo, fo.last, **kr, kr_usd)
                } else {
                    (**kr, kr_usd, **fo, fo.last)
                };

                let buy_wallet = ctx.wallet_flag(buy.venue, &base);
                let sell_wallet = ctx.wallet_flag(sell.venue, &base);
                let deposit_status = DepositStatus {
                    buy: buy_wallet.withdraw,
                    sell: sell_wallet.deposit,
                };
                let tradeable =
                    crate::wallet::combine_flags(&[deposit_status.buy, deposit_status.sell]);

                let mut metadata = BTreeMap::new();
                metadata.insert("premium_pct".to_string(), meta_num(premium_pct));
                metadata.insert("fx_rate".to_string(), meta_num(fx.krw_per_usd));
                metadata.insert("korean_price_krw".to_string(), meta_num(kr.last));
                metadata.insert(
                    "target_allocation_pct".to_string(),
                    meta_num(decision.target_allocation_pct),
                );
                metadata.insert(
                    "recommended_notional".to_string(),
                    meta_num(decision.recommended_notional_usd),
                );
                metadata.insert(
                    "recommended_action".to_string(),
                    decision.action.as_str().into(),
                );
                if fx.stale {
                    metadata.insert("fx_stale".to_string(), true.into());
                }

                let venues = [kr.venue, fo.venue];
                out.push(Opportunity {
                    id: Opportunity::derive_id(OpportunityKind::KimchiPremium, &base, &venues, gross),
                    kind: OpportunityKind::KimchiPremium,
                    symbol: base.clone(),
                    spread_bps: gross.abs(),
                    expected_pnl_pct: params.costs.expected_pnl_pct(gross),
                    notional_usd: notional,
                    detected_at: Utc::now(),
                    description: format!(
                        "{} kimchi premium {:+.2}% ({} vs {}, fx {:.1})",
                        base, premium_pct, kr.venue, fo.venue, fx.krw_per_usd
                    ),
                    legs: paired_legs(buy, sell, buy_price, sell_price, notional),
                    metadata,
                    tradeable,
                    deposit_status: Some(deposit_status),
                });
            }
        }
    }

    out
}

/// Funding-rate differential: long the receiver, short the payer, priced as
/// a delta-neutral perp pair. `spread_bps` is the price cross-spread; the
/// funding differential rides in metadata.
pub fn detect_funding_arb(ctx: &DetectCtx) -> Vec<Opportunity> {
    let params = ctx.params;
    let mut out = Vec::new();

    for (base, tickers) in ctx.view.fresh_by_base(VenueKind::Perp, params.max_age_secs) {
        if !ctx.symbol_enabled(&base) {
            continue;
        }

        // venues with a fresh perp ticker, funding data and enough OI
        let mut candidates: Vec<(&Ticker, f64, f64)> = Vec::new();
        for ticker in tickers {
            let Some(funding) = ctx.view.funding_for(ticker.venue, &ticker.instrument) else {
                continue;
            };
            let Some(oi) = ctx.view.oi_usd(ticker.venue, &ticker.instrument) else {
                continue;
            };
            if oi < params.min_oi_usd {
                continue;
            }
            candidates.push((ticker, funding.rate_8h(), oi));
        }
        if candidates.len() < 2 {
            continue;
        }

        let best_abs_pct = candidates
            .iter()
            .map(|(_, r, _)| r.abs() * 100.0)
            .fold(0.0, f64::max);
        if best_abs_pct < params.min_funding_8h_pct {
            continue;
        }

        // long collects (most negative rate), short pays out (most positive)
        let (long, long_rate, long_oi) = *candidates
            .iter()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .expect("len checked");
        let (short, short_rate, short_oi) = *candidates
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .expect("len checked");
        if long.venue == short.venue {
            continue;
        }

        let long_price = long.buy_price();
        let short_price = short.sell_price();
        let cross = spread_bps(long_price.min(short_price), long_price.max(short_price));
        if cross > params.max_combined_spread_bps {
            continue; // too far apart to enter both legs near each other
        }

        let funding_diff_pct = (short_rate - long_rate) * 100.0;
        let expected_pnl_pct =
            (funding_diff_pct - cross / 100.0 - params.costs.round_trip_bps() / 100.0).max(0.0);

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "funding_diff_8h_pct".to_string(),
            meta_num(funding_diff_pct),
        );
        metadata.insert(
            "funding_rate_24h_pct".to_string(),
            meta_num(funding_diff_pct * 3.0),
        );
        metadata.insert("long_exchange".to_string(), long.venue.as_str().into());
        metadata.insert("short_exchange".to_string(), short.venue.as_str().into());
        metadata.insert("long_funding_8h_pct".to_string(), meta_num(long_rate * 100.0));
        metadata.insert(
            "short_funding_8h_pct".to_string(),
            meta_num(short_rate * 100.0),
        );
        metadata.insert("long_oi_usd".to_string(), meta_num(long_oi));
        metadata.insert("short_oi_usd".to_string(), meta_num(short_oi));

        let venues = [long.venue, short.venue];
        out.push(Opportunity {
            id: Opportunity::derive_id(OpportunityKind::FundingArb, &base, &venues, cross),
            kind: OpportunityKind::FundingArb,
            symbol: base.clone(),
            spread_bps: cross.abs(),
            expected_pnl_pct,
            notional_usd: DEFAULT_NOTIONAL_USD,
            detected_at: Utc::now(),
            description: format!(
                "{} funding arb: long {} ({:+.4}%/8h), short {} ({:+.4}%/8h)",
                base,
                long.venue,
                long_rate * 100.0,
                short.venue,
                short_rate * 100.0
            ),
            legs: paired_legs(long, short, long_price, short_price, DEFAULT_NOTIONAL_USD),
            metadata,
            tradeable: None,
            deposit_status: None,
        });
    }

    out
}

/// Spot vs perp basis for the same (base, quote), same or different venues.
pub fn detect_spot_perp_basis(ctx: &DetectCtx) -> Vec<Opportunity> {
    let params = ctx.params;
    let mut out = Vec::new();

    let spot_groups = ctx.view.fresh_by_pair(VenueKind::Spot, params.max_age_secs);
    let perp_groups = ctx.view.fresh_by_pair(VenueKind::Perp, params.max_age_secs);

    for ((base, quote), spots) in &spot_groups {
        if !ctx.symbol_enabled(base) {
            continue;
        }
        let Some(perps) = perp_groups.get(&(base.clone(), quote.clone())) else {
            continue;
        };

        for spot in spots {
            for perp in perps {
                // perp legs carry the liquidity gate
                if ctx
                    .view
                    .oi_usd(perp.venue, &perp.instrument)
                    .unwrap_or(0.0)
                    < params.min_oi_usd
                {
                    continue;
                }

                let basis = spread_bps(spot.last, perp.last);
                if basis.abs() < params.min_basis_bps || !params.costs.passes_cost_gate(basis) {
                    continue;
                }

                // buy the cheaper instrument, sell the richer
                let (buy, sell) = if basis > 0.0 {
                    (*spot, *perp)
                } else {
                    (*perp, *spot)
                };
                let buy_price = buy.buy_price();
                let sell_price = sell.sell_price();

                // holding cost: longs pay positive funding, shorts collect it
                let funding_8h_bps = ctx
                    .view
                    .funding_for(perp.venue, &perp.instrument)
                    .map(|f| f.rate_8h() * 10_000.0)
                    .unwrap_or(0.0);
                let perp_is_buy = basis < 0.0;
                let expected_funding_cost_bps = if perp_is_buy {
                    funding_8h_bps
                } else {
                    -funding_8h_bps
                };
                let expected_pnl_pct = (basis.abs() - expected_funding_cost_bps) / 100.0;

                let symbol = format!("{base}/{quote}");
                let mut metadata = BTreeMap::new();
                metadata.insert("basis_bps".to_string(), meta_num(basis));
                metadata.insert("spot_exchange".to_string(), spot.venue.as_str().into());
                metadata.insert("perp_exchange".to_string(), perp.venue.as_str().into());
                metadata.insert(
                    "expected_funding_cost_bps".to_string(),
                    meta_num(expected_funding_cost_bps),
                );

                let venues = [spot.venue, perp.venue];
                out.push(Opportunity {
                    id: Opportunity::derive_id(
                        OpportunityKind::SpotPerpBasis,
                        &symbol,
                        &venues,
                        basis,
                    ),
                    kind: OpportunityKind::SpotPerpBasis,
                    symbol,
                    spread_bps: basis.abs(),
                    expected_pnl_pct,
                    notional_usd: DEFAULT_NOTIONAL_USD,
                    detected_at: Utc::now(),
                    description: format!(
                        "{} basis {:+.1} bps: spot {} vs perp {}",
                        base, basis, spot.venue, perp.venue
                    ),
                    legs: paired_legs(buy, sell, buy_price, sell_price, DEFAULT_NOTIONAL_USD),
                    metadata,
                    tradeable: None,
                    deposit_status: None,
                });
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FundingRate, Instrument};
    use chrono::Duration;

    fn ticker(venue: Venue, instrument: Instrument, last: f64) -> Ticker {
        Ticker {
            venue,
            instrument,
            last,
            bid: None,
            ask: None,
            ts: Utc::now(),
        }
    }

    fn base_params() -> DetectorParams {
        DetectorParams {
            max_age_secs: 10,
            min_oi_usd: 100_000.0,
            min_funding_8h_pct: 0.01,
            min_basis_bps: 10.0,
            min_spread_bps: 5.0,
            min_kimchi_pct: 0.3,
            max_combined_spread_bps: 20.0,
            costs: CostModel::new(10.0, 0.0),
            trading_symbols: Vec::new(),
        }
    }

    fn fx(krw_per_usd: f64) -> FxRate {
        FxRate {
            krw_per_usd,
            source: "test".to_string(),
            fetched_at: Utc::now(),
            stale: false,
        }
    }

    fn curve() -> Vec<AllocationTier> {
        use crate::arbitrage::allocation::AllocationAction::*;
        vec![
            AllocationTier::new(0.0, 0.0, Flat),
            AllocationTier::new(2.0, 25.0, SellKrw),
            AllocationTier::new(5.0, 75.0, SellKrw),
        ]
    }

    fn ctx<'a>(
        view: &'a SnapshotView,
        fx: Option<&'a FxRate>,
        wallet: &'a HashMap<(Venue, String), WalletStatus>,
        curve: &'a [AllocationTier],
        params: &'a DetectorParams,
    ) -> DetectCtx<'a> {
        DetectCtx {
            view,
            fx,
            wallet,
            curve,
            total_equity_usd: 100_000.0,
            params,
        }
    }

    #[test]
    fn test_spot_cross_s1() {
        let mut view = SnapshotView::default();
        view.taken_at = Utc::now();
        for (venue, last) in [(Venue::Binance, 60_000.0), (Venue::Okx, 60_150.0)] {
            let t = ticker(venue, Instrument::spot("BTC", "USDT"), last);
            view.tickers.insert((venue, t.instrument.clone()), t);
        }

        let params = base_params();
        let wallet = HashMap::new();
        let curve = curve();
        let opps = detect_spot_cross(&ctx(&view, None, &wallet, &curve, &params));

        assert_eq!(opps.len(), 1);
        let opp = &opps[0];
        assert!((opp.spread_bps - 25.0).abs() < 1e-9);
        assert!((opp.expected_pnl_pct - 0.05).abs() < 1e-9);
        assert_eq!(opp.legs[0].exchange, Venue::Binance);
        assert_eq!(opp.legs[0].side, Side::Buy);
        assert_eq!(opp.legs[1].exchange, Venue::Okx);
        assert!(opp.net_notional().abs() < 1e-6 * opp.max_leg_notional());
    }

    #[test]
    fn test_spot_cross_symmetry() {
        // swapping which venue carries which price inverts the legs but
        // leaves |spread_bps| unchanged
        let run = |a: f64, b: f64| {
            let mut view = SnapshotView::default();
            view.taken_at = Utc::now();
            for (venue, last) in [(Venue::Binance, a), (Venue::Okx, b)] {
                let t = ticker(venue, Instrument::spot("BTC", "USDT"), last);
                view.tickers.insert((venue, t.instrument.clone()), t);
            }
            let params = base_params();
            let wallet = HashMap::new();
            let curve = curve();
            detect_spot_cross(&ctx(&view, None, &wallet, &curve, &params))
        };

        let forward = run(60_000.0, 60_150.0);
        let swapped = run(60_150.0, 60_000.0);
        assert_eq!(forward.len(), 1);
        assert_eq!(swapped.len(), 1);
        assert!((forward[0].spread_bps - swapped[0].spread_bps).abs() < 1e-9);
        assert_eq!(forward[0].legs[0].exchange, swapped[0].legs[1].exchange);
        assert_eq!(forward[0].legs[1].exchange, swapped[0].legs[0].exchange);
    }

    #[test]
    fn test_kimchi_s2_allocation_and_unknown_wallet() {
        let mut view = SnapshotView::default();
        view.taken_at = Utc::now();
        let kr = ticker(Venue::Upbit, Instrument::spot("BTC", "KRW"), 88_500_000.0);
        let fo = ticker(Venue::Binance, Instrument::spot("BTC", "USDT"), 60_000.0);
        view.tickers.insert((kr.venue, kr.instrument.clone()), kr);
        view.tickers.insert((fo.venue, fo.instrument.clone()), fo);

        let params = base_params();
        let rate = fx(1450.0);
        let wallet = HashMap::new(); // everything unknown
        let curve = curve();
        let opps = detect_kimchi(&ctx(&view, Some(&rate), &wallet, &curve, &params));

        assert_eq!(opps.len(), 1);
        let opp = &opps[0];
        let premium = opp.metadata["premium_pct"].as_f64().unwrap();
        assert!((premium - 1.7241).abs() < 1e-3);
        let alloc = opp.metadata["target_allocation_pct"].as_f64().unwrap();
        assert!((alloc - 21.55).abs() < 0.05);
        let notional = opp.metadata["recommended_notional"].as_f64().unwrap();
        assert!((notional - 21_551.0).abs() < 60.0);
        assert_eq!(opp.metadata["recommended_action"], "SELL_KRW");
        // premium > 0: buy foreign, sell Korea
        assert_eq!(opp.legs[0].exchange, Venue::Binance);
        assert_eq!(opp.legs[1].exchange, Venue::Upbit);
        // unknown wallet flags never resolve to false
        assert_eq!(opp.tradeable, None);
    }

    #[test]
    fn test_kimchi_sign_law_negative_premium() {
        let mut view = SnapshotView::default();
        view.taken_at = Utc::now();
        // Korea cheap: 85.0M KRW / 1450 = 58620 < 60000
        let kr = ticker(Venue::Upbit, Instrument::spot("BTC", "KRW"), 85_000_000.0);
        let fo = ticker(Venue::Binance, Instrument::spot("BTC", "USDT"), 60_000.0);
        view.tickers.insert((kr.venue, kr.instrument.clone()), kr);
        view.tickers.insert((fo.venue, fo.instrument.clone()), fo);

        let params = base_params();
        let rate = fx(1450.0);
        let wallet = HashMap::new();
        let curve = curve();
        let opps = detect_kimchi(&ctx(&view, Some(&rate), &wallet, &curve, &params));

        assert_eq!(opps.len(), 1);
        let premium = opps[0].metadata["premium_pct"].as_f64().unwrap();
        assert!(premium < 0.0);
        // negative premium: buy Korea, sell foreign
        assert_eq!(opps[0].legs[0].exchange, Venue::Upbit);
        assert_eq!(opps[0].legs[0].side, Side::Buy);
    }

    #[test]
    fn test_kimchi_sanity_band_rejects_halted_market() {
        let mut view = SnapshotView::default();
        view.taken_at = Utc::now();
        // 180M KRW at fx 1450 -> ~107% premium: halted market, not an opportunity
        let kr = ticker(Venue::Upbit, Instrument::spot("BTC", "KRW"), 180_000_000.0);
        let fo = ticker(Venue::Binance, Instrument::spot("BTC", "USDT"), 60_000.0);
        view.tickers.insert((kr.venue, kr.instrument.clone()), kr);
        view.tickers.insert((fo.venue, fo.instrument.clone()), fo);

        let params = base_params();
        let rate = fx(1450.0);
        let wallet = HashMap::new();
        let curve = curve();
        assert!(detect_kimchi(&ctx(&view, Some(&rate), &wallet, &curve, &params)).is_empty());
    }

    #[test]
    fn test_kimchi_wallet_false_blocks() {
        let mut view = SnapshotView::default();
        view.taken_at = Utc::now();
        let kr = ticker(Venue::Upbit, Instrument::spot("BTC", "KRW"), 88_500_000.0);
        let fo = ticker(Venue::Binance, Instrument::spot("BTC", "USDT"), 60_000.0);
        view.tickers.insert((kr.venue, kr.instrument.clone()), kr);
        view.tickers.insert((fo.venue, fo.instrument.clone()), fo);

        let params = base_params();
        let rate = fx(1450.0);
        let mut wallet = HashMap::new();
        wallet.insert(
            (Venue::Binance, "BTC".to_string()),
            WalletStatus {
                deposit: Some(true),
                withdraw: Some(false),
            },
        );
        wallet.insert(
            (Venue::Upbit, "BTC".to_string()),
            WalletStatus {
                deposit: Some(true),
                withdraw: Some(true),
            },
        );
        let curve = curve();
        let opps = detect_kimchi(&ctx(&view, Some(&rate), &wallet, &curve, &params));
        assert_eq!(opps[0].tradeable, Some(false));
        assert_eq!(opps[0].deposit_status.unwrap().buy, Some(false));
    }

    #[test]
    fn test_funding_arb_s3() {
        let mut view = SnapshotView::default();
        view.taken_at = Utc::now();

        let binance = ticker(Venue::Binance, Instrument::perp("BTC", "USDT"), 60_000.0);
        let hl = ticker(Venue::Hyperliquid, Instrument::perp("BTC", "USDT"), 60_010.0);
        for t in [&binance, &hl] {
            view.tickers.insert((t.venue, t.instrument.clone()), t.clone());
            view.open_interest.insert(
                (t.venue, t.instrument.clone()),
                crate::models::OpenInterest { oi_usd: 50_000_000.0 },
            );
        }
        view.funding.insert(
            (Venue::Binance, binance.instrument.clone()),
            FundingRate::new(0.0001, 8.0), // 0.01%/8h
        );
        view.funding.insert(
            (Venue::Hyperliquid, hl.instrument.clone()),
            FundingRate::new(0.0002, 1.0), // 0.02%/1h -> 0.16%/8h
        );

        let params = base_params();
        let wallet = HashMap::new();
        let curve = curve();
        let opps = detect_funding_arb(&ctx(&view, None, &wallet, &curve, &params));

        assert_eq!(opps.len(), 1);
        let opp = &opps[0];
        let diff = opp.metadata["funding_diff_8h_pct"].as_f64().unwrap();
        assert!((diff - 0.15).abs() < 1e-9);
        assert_eq!(opp.metadata["long_exchange"], "binance");
        assert_eq!(opp.metadata["short_exchange"], "hyperliquid");
        assert!(opp.spread_bps <= params.max_combined_spread_bps);
        assert!(opp.net_notional().abs() < 1e-6 * opp.max_leg_notional());
    }

    #[test]
    fn test_funding_arb_oi_gate() {
        let mut view = SnapshotView::default();
        view.taken_at = Utc::now();

        let binance = ticker(Venue::Binance, Instrument::perp("BTC", "USDT"), 60_000.0);
        let hl = ticker(Venue::Hyperliquid, Instrument::perp("BTC", "USDT"), 60_010.0);
        for t in [&binance, &hl] {
            view.tickers.insert((t.venue, t.instrument.clone()), t.clone());
        }
        view.open_interest.insert(
            (Venue::Binance, binance.instrument.clone()),
            crate::models::OpenInterest { oi_usd: 50_000_000.0 },
        );
        // Hyperliquid below the gate
        view.open_interest.insert(
            (Venue::Hyperliquid, hl.instrument.clone()),
            crate::models::OpenInterest { oi_usd: 50_000.0 },
        );
        view.funding.insert(
            (Venue::Binance, binance.instrument.clone()),
            FundingRate::new(0.0001, 8.0),
        );
        view.funding.insert(
            (Venue::Hyperliquid, hl.instrument.clone()),
            FundingRate::new(0.0002, 1.0),
        );

        let params = base_params();
        let wallet = HashMap::new();
        let curve = curve();
        assert!(detect_funding_arb(&ctx(&view, None, &wallet, &curve, &params)).is_empty());
    }

    #[test]
    fn test_basis_detector_includes_funding_cost() {
        let mut view = SnapshotView::default();
        view.taken_at = Utc::now();

        let spot = ticker(Venue::Binance, Instrument::spot("BTC", "USDT"), 60_000.0);
        let perp = ticker(Venue::Bybit, Instrument::perp("BTC", "USDT"), 60_300.0);
        view.tickers.insert((spot.venue, spot.instrument.clone()), spot.clone());
        view.tickers.insert((perp.venue, perp.instrument.clone()), perp.clone());
        view.open_interest.insert(
            (Venue::Bybit, perp.instrument.clone()),
            crate::models::OpenInterest { oi_usd: 10_000_000.0 },
        );
        view.funding.insert(
            (Venue::Bybit, perp.instrument.clone()),
            FundingRate::new(0.0001, 8.0), // 1 bp / 8h
        );

        let params = base_params();
        let wallet = HashMap::new();
        let curve = curve();
        let opps = detect_spot_perp_basis(&ctx(&view, None, &wallet, &curve, &params));

        assert_eq!(opps.len(), 1);
        let opp = &opps[0];
        // basis = +50 bps: buy spot, sell (short) perp; short collects the
        // positive funding so the holding cost is negative
        assert!((opp.spread_bps - 50.0).abs() < 1e-9);
        let cost = opp.metadata["expected_funding_cost_bps"].as_f64().unwrap();
        assert!((cost + 1.0).abs() < 1e-9);
        assert!((opp.expected_pnl_pct - 0.51).abs() < 1e-9);
        assert_eq!(opp.legs[0].venue_type, VenueKind::Spot);
        assert_eq!(opp.legs[1].venue_type, VenueKind::Perp);
    }

    #[test]
    fn test_stale_ticker_excluded_s4() {
        let mut view = SnapshotView::default();
        view.taken_at = Utc::now();
        let mut kr = ticker(Venue::Bithumb, Instrument::spot("BTC", "KRW"), 92_000_000.0);
        kr.ts = Utc::now() - Duration::seconds(30); // 2x max_age
        let fo = ticker(Venue::Binance, Instrument::spot("BTC", "USDT"), 60_000.0);
        view.tickers.insert((kr.venue, kr.instrument.clone()), kr);
        view.tickers.insert((fo.venue, fo.instrument.clone()), fo);

        let params = base_params();
        let rate = fx(1450.0);
        let wallet = HashMap::new();
        let curve = curve();
        assert!(detect_kimchi(&ctx(&view, Some(&rate), &wallet, &curve, &params)).is_empty());
    }

    #[test]
    fn test_perp_perp_requires_oi_both_sides() {
        let mut view = SnapshotView::default();
        view.taken_at = Utc::now();
        let a = ticker(Venue::Binance, Instrument::perp("ETH", "USDT"), 3_000.0);
        let b = ticker(Venue::Okx, Instrument::perp("ETH", "USDT"), 3_010.0);
        for t in [&a, &b] {
            view.tickers.insert((t.venue, t.instrument.clone()), t.clone());
        }
        // only one side has OI
        view.open_interest.insert(
            (Venue::Binance, a.instrument.clone()),
            crate::models::OpenInterest { oi_usd: 5_000_000.0 },
        );

        let params = base_params();
        let wallet = HashMap::new();
        let curve = curve();
        assert!(detect_perp_perp(&ctx(&view, None, &wallet, &curve, &params)).is_empty());
    }
}
