//! Wallet-state oracle
//! Mission: Know whether an asset can actually move between venues

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::models::{Venue, WalletStatus};

/// Tri-state conjunction for tradeability: any false wins, then any unknown,
/// then true. Unknown never downgrades to false.
pub fn combine_flags(flags: &[Option<bool>]) -> Option<bool> {
    if flags.iter().any(|f| *f == Some(false)) {
        return Some(false);
    }
    if flags.iter().any(|f| f.is_none()) {
        return None;
    }
    Some(true)
}

/// Read-mostly cache of per-(venue, asset) deposit/withdraw flags. Connectors
/// with a public or credentialed wallet endpoint publish refreshed tables;
/// everything else stays unknown.
#[derive(Default)]
pub struct WalletStateOracle {
    table: RwLock<HashMap<(Venue, String), WalletStatus>>,
}

impl WalletStateOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, venue: Venue, asset: &str) -> WalletStatus {
        self.table
            .read()
            .get(&(venue, asset.to_uppercase()))
            .copied()
            .unwrap_or_default()
    }

    /// Replace one venue's entries; single writer per venue refresher.
    pub fn update(&self, venue: Venue, entries: Vec<(String, WalletStatus)>) {
        let mut table = self.table.write();
        for (asset, status) in entries {
            table.insert((venue, asset.to_uppercase()), status);
        }
    }

    /// Cloned table for a detection pass.
    pub fn table_view(&self) -> HashMap<(Venue, String), WalletStatus> {
        self.table.read().clone()
    }

    pub fn entry_count(&self) -> usize {
        self.table.read().len()
    }
}
