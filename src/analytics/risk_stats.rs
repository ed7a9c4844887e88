//! Risk distribution over a batch of restaurants

use crate::models::RiskLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Count and share of each risk level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskStats {
    /// Restaurants that contributed a risk level
    pub total_analyzed: usize,

    /// Count per level, every level present
    pub risk_distribution: BTreeMap<RiskLevel, usize>,

    /// Percentage per level rounded to one decimal
    pub risk_percentages: BTreeMap<RiskLevel, f64>,
}

impl RiskStats {
    /// Aggregate a list of risk levels
    pub fn aggregate(levels: &[RiskLevel]) -> Self {
        let mut risk_distribution: BTreeMap<RiskLevel, usize> =
            RiskLevel::ALL.iter().map(|level| (*level, 0)).collect();
        for level in levels {
            *risk_distribution.entry(*level).or_insert(0) += 1;
        }

        let total_analyzed = levels.len();
        let risk_percentages = risk_distribution
            .iter()
            .map(|(level, count)| {
                let pct = if total_analyzed == 0 {
                    0.0
                } else {
                    percentage(*count, total_analyzed)
                };
                (*level, pct)
            })
            .collect();

        Self {
            total_analyzed,
            risk_distribution,
            risk_percentages,
        }
    }

    /// Count for one level
    pub fn count(&self, level: RiskLevel) -> usize {
        self.risk_distribution.get(&level).copied().unwrap_or(0)
    }

    /// Percentage for one level
    pub fn percentage(&self, level: RiskLevel) -> f64 {
        self.risk_percentages.get(&level).copied().unwrap_or(0.0)
    }
}

fn percentage(count: usize, total: usize) -> f64 {
    (count as f64 / total as f64 * 1000.0).round() / 10.0
}
