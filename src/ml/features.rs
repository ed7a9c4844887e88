use crate::error::{AppError, Result};
use crate::models::{RestaurantRecord, RiskLevel};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Feature matrix column order shared by training and inference
pub const FEATURE_COLUMNS: [&str; 9] = [
    "cuisine_encoded",
    "borough_encoded",
    "avg_score",
    "max_score",
    "min_score",
    "std_score",
    "num_inspections",
    "score_trend",
    "bad_grades_ratio",
];

/// Number of feature columns
pub const N_FEATURES: usize = FEATURE_COLUMNS.len();

/// Fixed-schema summary of one restaurant's inspection history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Restaurant the row was derived from
    pub restaurant_id: String,

    pub cuisine: String,
    pub borough: String,
    pub avg_score: f64,
    pub max_score: f64,
    pub min_score: f64,

    /// Population standard deviation (0 for a single inspection)
    pub std_score: f64,

    pub num_inspections: usize,

    /// Latest score minus the average
    pub score_trend: f64,

    /// Fraction of inspections graded B, C or Z
    pub bad_grades_ratio: f64,
}

impl FeatureRow {
    /// Assemble the numeric vector in [`FEATURE_COLUMNS`] order
    pub fn to_vector(&self, cuisine_code: f64, borough_code: f64) -> [f64; N_FEATURES] {
        [
            cuisine_code,
            borough_code,
            self.avg_score,
            self.max_score,
            self.min_score,
            self.std_score,
            self.num_inspections as f64,
            self.score_trend,
            self.bad_grades_ratio,
        ]
    }
}

/// Feature rows plus the labels derived from the same records
#[derive(Debug, Clone, Default)]
pub struct ExtractedFeatures {
    pub rows: Vec<FeatureRow>,

    /// Latest observed score, the regression target
    pub scores: Vec<f64>,

    /// Risk band of the average score, the classification target
    pub risk_levels: Vec<RiskLevel>,
}

impl ExtractedFeatures {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Stateless feature extractor for restaurant inspection histories
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract feature rows and labels from a batch of records.
    ///
    /// Records without inspections are skipped. Fails when a fully dated
    /// history is not ordered most-recent-first.
    pub fn extract(&self, records: &[RestaurantRecord]) -> Result<ExtractedFeatures> {
        let mut extracted = ExtractedFeatures::default();

        for record in records {
            let Some(row) = self.extract_one(record)? else {
                debug!(restaurant_id = %record.id, "Skipping restaurant without inspections");
                continue;
            };

            let latest_score = record.events[0].score;
            extracted.risk_levels.push(RiskLevel::from_avg_score(row.avg_score));
            extracted.scores.push(latest_score);
            extracted.rows.push(row);
        }

        Ok(extracted)
    }

    /// Extract the feature row of a single record, `None` without history
    pub fn extract_one(&self, record: &RestaurantRecord) -> Result<Option<FeatureRow>> {
        if record.events.is_empty() {
            return Ok(None);
        }

        if !record.is_chronologically_ordered() {
            return Err(AppError::UnsortedHistory(record.id.clone()));
        }

        let scores: Vec<f64> = record.events.iter().map(|e| e.score).collect();
        let n = scores.len() as f64;

        let avg_score = scores.iter().sum::<f64>() / n;
        let max_score = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min_score = scores.iter().copied().fold(f64::INFINITY, f64::min);

        let std_score = if scores.len() > 1 {
            let variance = scores.iter().map(|s| (s - avg_score).powi(2)).sum::<f64>() / n;
            variance.sqrt()
        } else {
            0.0
        };

        let bad_grades = record.events.iter().filter(|e| e.is_bad_grade()).count();

        Ok(Some(FeatureRow {
            restaurant_id: record.id.clone(),
            cuisine: record.cuisine.clone(),
            borough: record.borough.clone(),
            avg_score,
            max_score,
            min_score,
            std_score,
            num_inspections: scores.len(),
            score_trend: scores[0] - avg_score,
            bad_grades_ratio: bad_grades as f64 / n,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InspectionEvent;
    use chrono::{TimeZone, Utc};

    fn sample_record() -> RestaurantRecord {
        RestaurantRecord::new("r1", "Sample Diner", "American", "Manhattan")
            .with_event(5.0, "A")
            .with_event(20.0, "B")
            .with_event(30.0, "C")
    }

    #[test]
    fn test_reference_history() {
        let extracted = FeatureExtractor::new().extract(&[sample_record()]).unwrap();

        assert_eq!(extracted.len(), 1);
        let row = &extracted.rows[0];
        assert!((row.avg_score - 18.333_333).abs() < 1e-3);
        assert_eq!(row.max_score, 30.0);
        assert_eq!(row.min_score, 5.0);
        assert!((row.score_trend + 13.333_333).abs() < 1e-3);
        assert!((row.bad_grades_ratio - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(row.num_inspections, 3);
        assert_eq!(extracted.scores[0], 5.0);
        assert_eq!(extracted.risk_levels[0], RiskLevel::Medium);
    }

    #[test]
    fn test_population_std() {
        let record = RestaurantRecord::new("r1", "x", "Pizza", "Bronx")
            .with_event(10.0, "A")
            .with_event(20.0, "A");
        let row = FeatureExtractor::new().extract_one(&record).unwrap().unwrap();
        assert!((row.std_score - 5.0).abs() < 1e-12);

        let single = RestaurantRecord::new("r2", "x", "Pizza", "Bronx").with_event(10.0, "A");
        let row = FeatureExtractor::new().extract_one(&single).unwrap().unwrap();
        assert_eq!(row.std_score, 0.0);
        assert_eq!(row.score_trend, 0.0);
    }

    #[test]
    fn test_empty_histories_are_skipped() {
        let records = vec![
            RestaurantRecord::new("empty", "x", "Pizza", "Bronx"),
            sample_record(),
            RestaurantRecord::new("empty2", "x", "Pizza", "Bronx"),
        ];

        let extracted = FeatureExtractor::new().extract(&records).unwrap();
        assert_eq!(extracted.rows.len(), 1);
        assert_eq!(extracted.scores.len(), 1);
        assert_eq!(extracted.risk_levels.len(), 1);
        assert_eq!(extracted.rows[0].restaurant_id, "r1");
    }

    #[test]
    fn test_single_unscored_record_yields_nothing() {
        let record = RestaurantRecord::new("empty", "x", "Pizza", "Bronx");
        let extracted = FeatureExtractor::new().extract(&[record]).unwrap();
        assert!(extracted.is_empty());
    }

    #[test]
    fn test_summary_invariants() {
        let records: Vec<RestaurantRecord> = (1..30)
            .map(|i| {
                let events = (0..(i % 7 + 1))
                    .map(|j| InspectionEvent::new(((i * 7 + j * 13) % 45) as f64, "A"))
                    .collect();
                RestaurantRecord::new(format!("r{i}"), "x", "Thai", "Queens").with_events(events)
            })
            .collect();

        let extracted = FeatureExtractor::new().extract(&records).unwrap();
        for (row, record) in extracted.rows.iter().zip(&records) {
            assert!(row.min_score <= row.avg_score && row.avg_score <= row.max_score);
            assert_eq!(row.num_inspections, record.events.len());
        }
    }

    #[test]
    fn test_unsorted_history_rejected() {
        let record = RestaurantRecord::new("r1", "x", "Thai", "Queens").with_events(vec![
            InspectionEvent::new(10.0, "A").with_date(Utc.with_ymd_and_hms(2019, 5, 1, 0, 0, 0).unwrap()),
            InspectionEvent::new(25.0, "B").with_date(Utc.with_ymd_and_hms(2021, 5, 1, 0, 0, 0).unwrap()),
        ]);

        let err = FeatureExtractor::new().extract(&[record]).unwrap_err();
        assert!(matches!(err, AppError::UnsortedHistory(id) if id == "r1"));
    }

    #[test]
    fn test_vector_column_order() {
        let row = FeatureExtractor::new()
            .extract_one(&sample_record())
            .unwrap()
            .unwrap();
        let vector = row.to_vector(3.0, 1.0);

        assert_eq!(vector.len(), FEATURE_COLUMNS.len());
        assert_eq!(vector[0], 3.0);
        assert_eq!(vector[1], 1.0);
        assert_eq!(vector[2], row.avg_score);
        assert_eq!(vector[6], 3.0);
        assert_eq!(vector[8], row.bad_grades_ratio);
    }
}
