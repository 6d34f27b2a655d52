//! Premium-tier capital allocation
//! Mission: Map kimchi premium to a target allocation, nothing hidden

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationAction {
    BuyKrw,
    SellKrw,
    Flat,
}

impl AllocationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationAction::BuyKrw => "BUY_KRW",
            AllocationAction::SellKrw => "SELL_KRW",
            AllocationAction::Flat => "FLAT",
        }
    }
}

/// One breakpoint of the piecewise-linear allocation curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AllocationTier {
    pub premium_pct: f64,
    pub allocation_pct: f64,
    pub action: AllocationAction,
}

impl AllocationTier {
    pub fn new(premium_pct: f64, allocation_pct: f64, action: AllocationAction) -> Self {
        Self {
            premium_pct,
            allocation_pct,
            action,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AllocationDecision {
    pub target_allocation_pct: f64,
    pub recommended_notional_usd: f64,
    pub action: AllocationAction,
}

/// Evaluate the curve at `premium_pct`. Linear interpolation between
/// breakpoints; outside the configured range the nearest endpoint wins (no
/// extrapolation). Pure function of its inputs.
pub fn evaluate_curve(
    curve: &[AllocationTier],
    premium_pct: f64,
    total_equity_usd: f64,
) -> AllocationDecision {
    if curve.is_empty() {
        // curve presence is validated at startup; stay flat if it ever isn't
        return AllocationDecision {
            target_allocation_pct: 0.0,
            recommended_notional_usd: 0.0,
            action: AllocationAction::Flat,
        };
    }

    let first = curve[0];
    let last = curve[curve.len() - 1];

    let (target_allocation_pct, action) = if premium_pct <= first.premium_pct {
        (first.allocation_pct, first.action)
    } else if premium_pct >= last.premium_pct {
        (last.allocation_pct, last.action)
    } else {
        // find the active segment and interpolate
        let mut result = (last.allocation_pct, last.action);
        for window in curve.windows(2) {
            let (lo, hi) = (window[0], window[1]);
            if premium_pct >= lo.premium_pct && premium_pct <= hi.premium_pct {
                let span = hi.premium_pct - lo.premium_pct;
                let t = if span > 0.0 {
                    (premium_pct - lo.premium_pct) / span
                } else {
                    0.0
                };
                let alloc = lo.allocation_pct + t * (hi.allocation_pct - lo.allocation_pct);
                // the segment's bias is the upper breakpoint's action
                result = (alloc, hi.action);
                break;
            }
        }
        result
    };

    AllocationDecision {
        target_allocation_pct,
        recommended_notional_usd: total_equity_usd * target_allocation_pct / 100.0,
        action,
    }
}
