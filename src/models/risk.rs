use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Upper bound (inclusive) of the Low band
pub const LOW_RISK_MAX_SCORE: f64 = 13.0;

/// Upper bound (inclusive) of the Medium band
pub const MEDIUM_RISK_MAX_SCORE: f64 = 27.0;

/// Ordinal sanitary risk band derived from the average inspection score
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumString,
    Display,
)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// All levels in ordinal order
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    /// Classify an average inspection score.
    ///
    /// `avg ≤ 13` is Low, `13 < avg ≤ 27` is Medium, anything else is High
    /// (NaN falls through both comparisons and lands in High).
    pub fn from_avg_score(avg_score: f64) -> Self {
        if avg_score <= LOW_RISK_MAX_SCORE {
            RiskLevel::Low
        } else if avg_score <= MEDIUM_RISK_MAX_SCORE {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    /// Class index used as the learner label
    pub fn index(&self) -> usize {
        match self {
            RiskLevel::Low => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
        }
    }

    /// Inverse of [`RiskLevel::index`]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Risk band of an average score
pub fn risk_of(avg_score: f64) -> RiskLevel {
    RiskLevel::from_avg_score(avg_score)
}
