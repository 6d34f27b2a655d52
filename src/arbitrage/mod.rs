//! Arbitrage detection module
//! Mission: Identify and quantify cross-venue price mismatches
//! Philosophy: Profit is in the spread, survival is in the gates

pub mod alerts;
pub mod allocation;
pub mod detectors;
pub mod engine;
pub mod fees;
