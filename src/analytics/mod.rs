//! Aggregate analytics over restaurant batches

pub mod risk_stats;

pub use risk_stats::RiskStats;
