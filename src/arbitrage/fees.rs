//! Fee and cost gating for cross-venue arbitrage
//! Mission: A profitable spread on paper must survive the round trip

use serde::{Deserialize, Serialize};

/// Round-trip cost model in basis points. One configurable taker fee per
/// side plus a slippage buffer; venue-specific schedules can override later.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostModel {
    pub fee_bps_per_side: f64,
    pub slippage_bps: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            fee_bps_per_side: 10.0,
            slippage_bps: 5.0,
        }
    }
}

impl CostModel {
    pub fn new(fee_bps_per_side: f64, slippage_bps: f64) -> Self {
        Self {
            fee_bps_per_side,
            slippage_bps,
        }
    }

    /// Total cost of a two-leg round trip in bps.
    pub fn round_trip_bps(&self) -> f64 {
        self.fee_bps_per_side * 2.0 + self.slippage_bps
    }

    /// Spread remaining after fees and slippage; the cost gate requires this
    /// to be positive.
    pub fn net_spread_bps(&self, gross_spread_bps: f64) -> f64 {
        gross_spread_bps.abs() - self.round_trip_bps()
    }

    pub fn passes_cost_gate(&self, gross_spread_bps: f64) -> bool {
        self.net_spread_bps(gross_spread_bps) > 0.0
    }

    /// Expected PnL of the round trip as a percentage of notional.
    pub fn expected_pnl_pct(&self, gross_spread_bps: f64) -> f64 {
        self.net_spread_bps(gross_spread_bps).max(0.0) / 100.0
    }
}

/// `(sell − buy) / buy × 10000`
pub fn spread_bps(buy_price: f64, sell_price: f64) -> f64 {
    if buy_price <= 0.0 {
        return 0.0;
    }
    (sell_price - buy_price) / buy_price * 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spread_bps() {
        // S1 numbers: buy 60000, sell 60150 -> 25 bps
        assert!((spread_bps(60_000.0, 60_150.0) - 25.0).abs() < 1e-9);
        assert_eq!(spread_bps(0.0, 100.0), 0.0);
    }

    #[test]
    fn test_cost_gate() {
        let costs = CostModel::new(10.0, 0.0);
        // 25 bps gross - 20 bps fees = 5 bps net
        assert!(costs.passes_cost_gate(25.0));
        assert!((costs.net_spread_bps(25.0) - 5.0).abs() < 1e-9);
        // 15 bps gross does not survive two 10 bps sides
        assert!(!costs.passes_cost_gate(15.0));
    }

    #[test]
    fn test_expected_pnl_pct() {
        let costs = CostModel::new(10.0, 0.0);
        // S1: 25 bps gross -> 5 bps net -> 0.05%
        assert!((costs.expected_pnl_pct(25.0) - 0.05).abs() < 1e-9);
        // below cost floor clamps to zero
        assert_eq!(costs.expected_pnl_pct(10.0), 0.0);
    }

    #[test]
    fn test_negative_spread_uses_magnitude() {
        let costs = CostModel::new(10.0, 0.0);
        assert!(costs.passes_cost_gate(-25.0));
    }
}
