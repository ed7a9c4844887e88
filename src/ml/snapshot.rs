use crate::config::UnknownCategoryPolicy;
use crate::error::{AppError, Result};
use crate::ml::classifier::{most_probable, RiskPredictor};
use crate::ml::encoders::CategoryEncoder;
use crate::ml::features::{FeatureRow, FEATURE_COLUMNS, N_FEATURES};
use crate::ml::models::Prediction;
use crate::ml::regressor::ScorePredictor;
use crate::models::RiskLevel;
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Description of a trained snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub trained_at: DateTime<Utc>,
    pub n_training_samples: usize,
    pub n_features: usize,
    pub feature_columns: Vec<String>,
    pub classes: Vec<RiskLevel>,
    pub hyperparameters: HashMap<String, String>,
}

/// Everything needed to serve predictions, trained and persisted together
#[derive(Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub score_predictor: ScorePredictor,
    pub risk_predictor: RiskPredictor,
    pub cuisine_encoder: CategoryEncoder,
    pub borough_encoder: CategoryEncoder,
    pub metadata: SnapshotMetadata,
}

impl ModelSnapshot {
    pub fn new(
        score_predictor: ScorePredictor,
        risk_predictor: RiskPredictor,
        cuisine_encoder: CategoryEncoder,
        borough_encoder: CategoryEncoder,
        n_training_samples: usize,
    ) -> Self {
        let metadata = SnapshotMetadata {
            trained_at: Utc::now(),
            n_training_samples,
            n_features: N_FEATURES,
            feature_columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            classes: risk_predictor.classes().to_vec(),
            hyperparameters: score_predictor.metadata().hyperparameters.clone(),
        };

        Self {
            score_predictor,
            risk_predictor,
            cuisine_encoder,
            borough_encoder,
            metadata,
        }
    }

    /// Encode a feature row into the model input vector.
    ///
    /// Returns the vector and the fields that fell back to the sentinel code.
    pub fn encode_row(
        &self,
        row: &FeatureRow,
        policy: UnknownCategoryPolicy,
    ) -> Result<([f64; N_FEATURES], Vec<String>)> {
        let mut substituted = Vec::new();
        let cuisine = encode_value(&self.cuisine_encoder, &row.cuisine, policy, &mut substituted)?;
        let borough = encode_value(&self.borough_encoder, &row.borough, policy, &mut substituted)?;

        Ok((row.to_vector(cuisine as f64, borough as f64), substituted))
    }

    /// Predict score and risk for a single feature row
    pub fn predict_row(&self, row: &FeatureRow, policy: UnknownCategoryPolicy) -> Result<Prediction> {
        let (vector, unknown_categories) = self.encode_row(row, policy)?;
        let features = Array2::from_shape_vec((1, N_FEATURES), vector.to_vec())
            .map_err(|e| AppError::Internal(format!("Failed to shape feature row: {}", e)))?;

        let predicted_score = self
            .score_predictor
            .predict(&features)?
            .get(0)
            .copied()
            .ok_or_else(|| AppError::Internal("Score predictor returned no rows".to_string()))?;

        let risk_probabilities = self
            .risk_predictor
            .predict_proba(&features)?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("Risk predictor returned no rows".to_string()))?;

        Ok(Prediction {
            restaurant_id: row.restaurant_id.clone(),
            predicted_score,
            predicted_risk_level: most_probable(&risk_probabilities),
            risk_probabilities,
            current_avg_score: row.avg_score,
            num_inspections: row.num_inspections,
            unknown_categories,
        })
    }
}

fn encode_value(
    encoder: &CategoryEncoder,
    value: &str,
    policy: UnknownCategoryPolicy,
    substituted: &mut Vec<String>,
) -> Result<usize> {
    match (encoder.transform(value), policy) {
        (Ok(code), _) => Ok(code),
        (Err(AppError::UnknownCategory { field, value }), UnknownCategoryPolicy::Sentinel) => {
            debug!(%field, %value, "Substituting sentinel code for unseen category");
            substituted.push(field);
            Ok(encoder.sentinel_code())
        }
        (Err(e), _) => Err(e),
    }
}

/// Snapshot persistence
pub struct ModelStore;

impl ModelStore {
    /// Atomically write the snapshot to `path`.
    ///
    /// The bytes go to a temporary file in the target directory which then
    /// replaces `path`, so readers never observe a partial snapshot.
    pub fn save(snapshot: &ModelSnapshot, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let bytes = bincode::serialize(snapshot).map_err(|e| {
            AppError::Serialization(format!("Failed to serialize snapshot: {}", e))
        })?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| AppError::Io(e.error))?;

        info!(path = %path.display(), bytes = bytes.len(), "Model snapshot saved");
        Ok(())
    }

    /// Read a snapshot, `None` when nothing has been saved at `path`
    pub fn load(path: &Path) -> Result<Option<ModelSnapshot>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: ModelSnapshot = bincode::deserialize(&bytes).map_err(|e| {
            AppError::Serialization(format!("Failed to deserialize snapshot: {}", e))
        })?;

        info!(
            path = %path.display(),
            samples = snapshot.metadata.n_training_samples,
            "Model snapshot loaded"
        );
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::models::ForestConfig;
    use tempfile::TempDir;

    fn row(id: &str, cuisine: &str, avg: f64) -> FeatureRow {
        FeatureRow {
            restaurant_id: id.to_string(),
            cuisine: cuisine.to_string(),
            borough: "Queens".to_string(),
            avg_score: avg,
            max_score: avg + 3.0,
            min_score: avg - 3.0,
            std_score: 2.0,
            num_inspections: 3,
            score_trend: 1.0,
            bad_grades_ratio: if avg > 13.0 { 0.5 } else { 0.0 },
        }
    }

    fn trained_snapshot() -> ModelSnapshot {
        let cuisines = ["Pizza", "Thai", "Bakery"];
        let rows: Vec<FeatureRow> = (0..30)
            .map(|i| row(&format!("r{i}"), cuisines[i % 3], (i % 35) as f64))
            .collect();

        let cuisine_encoder = CategoryEncoder::fit("cuisine", rows.iter().map(|r| r.cuisine.as_str()));
        let borough_encoder = CategoryEncoder::fit("borough", rows.iter().map(|r| r.borough.as_str()));

        let vectors: Vec<[f64; N_FEATURES]> = rows
            .iter()
            .map(|r| {
                let c = cuisine_encoder.transform(&r.cuisine).unwrap() as f64;
                let b = borough_encoder.transform(&r.borough).unwrap() as f64;
                r.to_vector(c, b)
            })
            .collect();
        let features = Array2::from_shape_vec(
            (vectors.len(), N_FEATURES),
            vectors.iter().flatten().copied().collect(),
        )
        .unwrap();
        let scores = ndarray::Array1::from_iter(rows.iter().map(|r| r.avg_score + 1.0));
        let levels: Vec<RiskLevel> = rows.iter().map(|r| RiskLevel::from_avg_score(r.avg_score)).collect();

        let config = ForestConfig {
            n_trees: 10,
            ..Default::default()
        };
        let mut score_predictor = ScorePredictor::new(config.clone());
        score_predictor.train(&features, &scores).unwrap();
        let mut risk_predictor = RiskPredictor::new(config);
        risk_predictor.train(&features, &levels).unwrap();

        ModelSnapshot::new(score_predictor, risk_predictor, cuisine_encoder, borough_encoder, rows.len())
    }

    #[test]
    fn test_predict_row() {
        let snapshot = trained_snapshot();
        let prediction = snapshot
            .predict_row(&row("x", "Thai", 25.0), UnknownCategoryPolicy::Reject)
            .unwrap();

        assert_eq!(prediction.restaurant_id, "x");
        assert_eq!(prediction.current_avg_score, 25.0);
        assert_eq!(prediction.num_inspections, 3);
        let total: f64 = prediction.risk_probabilities.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(prediction.unknown_categories.is_empty());
    }

    #[test]
    fn test_unknown_category_policies() {
        let snapshot = trained_snapshot();
        let unseen = row("x", "Ethiopian", 10.0);

        let err = snapshot
            .predict_row(&unseen, UnknownCategoryPolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownCategory { ref field, .. } if field == "cuisine"));

        let (vector, substituted) = snapshot
            .encode_row(&unseen, UnknownCategoryPolicy::Sentinel)
            .unwrap();
        assert_eq!(vector[0], 3.0);
        assert_eq!(substituted, vec!["cuisine".to_string()]);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("model.bin");
        let snapshot = trained_snapshot();

        ModelStore::save(&snapshot, &path).unwrap();
        let loaded = ModelStore::load(&path).unwrap().unwrap();

        assert_eq!(loaded.metadata.n_training_samples, 30);
        assert_eq!(loaded.metadata.feature_columns.len(), N_FEATURES);
        for probe in [row("a", "Pizza", 4.0), row("b", "Bakery", 19.0), row("c", "Thai", 33.0)] {
            let before = snapshot.predict_row(&probe, UnknownCategoryPolicy::Reject).unwrap();
            let after = loaded.predict_row(&probe, UnknownCategoryPolicy::Reject).unwrap();
            assert_eq!(before, after);
        }
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(ModelStore::load(&dir.path().join("absent.bin")).unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.bin");
        fs::write(&path, b"not a snapshot").unwrap();

        match ModelStore::load(&path) {
            Err(err) => assert!(err.is_persistence()),
            Ok(_) => panic!("corrupt snapshot should not load"),
        }
    }
}
