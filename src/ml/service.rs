use crate::analytics::RiskStats;
use crate::config::ModelConfig;
use crate::error::{AppError, Result};
use crate::ml::classifier::RiskPredictor;
use crate::ml::encoders::CategoryEncoder;
use crate::ml::features::{FeatureExtractor, FEATURE_COLUMNS, N_FEATURES};
use crate::ml::models::{
    FeatureImportance, ForestConfig, ModelMetrics, Prediction, RegressionMetrics, TrainResult,
    TrainingDataset,
};
use crate::ml::regressor::ScorePredictor;
use crate::ml::snapshot::{ModelSnapshot, ModelStore};
use crate::models::{RestaurantRecord, RiskLevel};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::Validate;

/// Training and prediction entry point.
///
/// The active model lives in an immutable [`ModelSnapshot`] behind a
/// read-write lock. Readers clone the `Arc` and release the lock at once;
/// train and load build a complete replacement before swapping it in, so a
/// failure leaves the previous snapshot serving.
pub struct MLService {
    /// Configuration
    config: ModelConfig,

    /// Feature extractor
    extractor: FeatureExtractor,

    /// Published snapshot
    snapshot: RwLock<Option<Arc<ModelSnapshot>>>,

    /// Serializes train and load
    update_lock: Mutex<()>,
}

impl MLService {
    /// Create an untrained service
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            extractor: FeatureExtractor::new(),
            snapshot: RwLock::new(None),
            update_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Train both predictors on a batch of restaurants and publish the result
    pub fn train(&self, records: &[RestaurantRecord]) -> Result<TrainResult> {
        let _guard = self.update_lock.lock();

        let usable = usable_records(records);
        let extracted = self.extractor.extract(&usable)?;
        let sample_count = extracted.len();
        if sample_count < self.config.min_training_samples {
            warn!(
                found = sample_count,
                required = self.config.min_training_samples,
                "Too few usable restaurants for training"
            );
            return Err(AppError::InsufficientData {
                found: sample_count,
                required: self.config.min_training_samples,
            });
        }

        info!("Training models on {} restaurants", sample_count);

        let cuisine_encoder =
            CategoryEncoder::fit("cuisine", extracted.rows.iter().map(|r| r.cuisine.as_str()));
        let borough_encoder =
            CategoryEncoder::fit("borough", extracted.rows.iter().map(|r| r.borough.as_str()));

        let vectors = extracted
            .rows
            .iter()
            .map(|row| {
                let cuisine = cuisine_encoder.transform(&row.cuisine)? as f64;
                let borough = borough_encoder.transform(&row.borough)? as f64;
                Ok(row.to_vector(cuisine, borough))
            })
            .collect::<Result<Vec<[f64; N_FEATURES]>>>()?;
        let dataset =
            TrainingDataset::from_rows(&vectors, &extracted.scores, &extracted.risk_levels);

        let forest = ForestConfig::from(&self.config);
        let (validation_score_metrics, validation_risk_metrics) =
            self.holdout_metrics(&dataset, &forest)?;

        let mut score_predictor = ScorePredictor::new(forest.clone());
        let score_metrics = score_predictor.train(&dataset.features, &dataset.scores)?;

        let mut risk_predictor = RiskPredictor::new(forest);
        let risk_metrics = risk_predictor.train(&dataset.features, &dataset.risk_levels)?;

        let importances =
            score_predictor.permutation_importances(&dataset.features, &dataset.scores)?;
        let mut feature_importances: Vec<FeatureImportance> = FEATURE_COLUMNS
            .iter()
            .zip(importances)
            .map(|(feature, importance)| FeatureImportance {
                feature: feature.to_string(),
                importance,
            })
            .collect();
        feature_importances.sort_by(|a, b| b.importance.total_cmp(&a.importance));

        for fi in &feature_importances {
            debug!(feature = %fi.feature, importance = fi.importance, "Feature importance");
        }

        let snapshot = ModelSnapshot::new(
            score_predictor,
            risk_predictor,
            cuisine_encoder,
            borough_encoder,
            sample_count,
        );
        *self.snapshot.write() = Some(Arc::new(snapshot));

        info!(
            score_r2 = score_metrics.r2,
            risk_accuracy = risk_metrics.accuracy,
            "✅ Model training completed"
        );

        Ok(TrainResult {
            score_fit: score_metrics.r2,
            risk_accuracy: risk_metrics.accuracy,
            sample_count,
            score_metrics,
            risk_metrics,
            validation_score_metrics,
            validation_risk_metrics,
            feature_importances,
        })
    }

    /// Fit throwaway models on the head of the dataset and score the tail
    fn holdout_metrics(
        &self,
        dataset: &TrainingDataset,
        forest: &ForestConfig,
    ) -> Result<(Option<RegressionMetrics>, Option<ModelMetrics>)> {
        let split = self.config.validation_split;
        if !(split > 0.0 && split < 1.0) {
            return Ok((None, None));
        }

        let (train, test) = dataset.train_test_split(split);
        if train.n_samples < 2 || test.n_samples < 2 {
            debug!(
                train = train.n_samples,
                test = test.n_samples,
                "Validation split too small, skipping held-out metrics"
            );
            return Ok((None, None));
        }

        let mut score_predictor = ScorePredictor::new(forest.clone());
        score_predictor.train(&train.features, &train.scores)?;
        let score_metrics = score_predictor.evaluate(&test.features, &test.scores)?;

        let mut risk_predictor = RiskPredictor::new(forest.clone());
        risk_predictor.train(&train.features, &train.risk_levels)?;
        let predicted = risk_predictor.predict(&test.features)?;
        let classes: Vec<RiskLevel> = RiskLevel::ALL
            .into_iter()
            .filter(|c| risk_predictor.classes().contains(c) || test.risk_levels.contains(c))
            .collect();
        let risk_metrics = ModelMetrics::calculate(&test.risk_levels, &predicted, &classes);

        info!(
            held_out = test.n_samples,
            score_r2 = score_metrics.r2,
            risk_accuracy = risk_metrics.accuracy,
            "Held-out validation metrics"
        );

        Ok((Some(score_metrics), Some(risk_metrics)))
    }

    /// Predict the next score and risk level of one restaurant
    pub fn predict(&self, record: &RestaurantRecord) -> Result<Prediction> {
        let snapshot = self.current_snapshot();
        self.predict_with(snapshot.as_deref(), record)
    }

    /// Predict every record against the same snapshot, one result per record
    pub fn predict_batch(&self, records: &[RestaurantRecord]) -> Vec<(String, Result<Prediction>)> {
        let snapshot = self.current_snapshot();

        records
            .par_iter()
            .map(|record| (record.id.clone(), self.predict_with(snapshot.as_deref(), record)))
            .collect()
    }

    fn predict_with(
        &self,
        snapshot: Option<&ModelSnapshot>,
        record: &RestaurantRecord,
    ) -> Result<Prediction> {
        let snapshot = snapshot.ok_or(AppError::NotTrained)?;
        record.validate()?;

        let row = self
            .extractor
            .extract_one(record)?
            .ok_or_else(|| AppError::NoHistory(record.id.clone()))?;

        debug!(restaurant_id = %record.id, "Predicting restaurant risk");
        snapshot.predict_row(&row, self.config.unknown_category)
    }

    /// Rule-based risk distribution over a batch, no model required.
    ///
    /// Invalid and unsorted records are left out of the counts.
    pub fn risk_statistics(records: &[RestaurantRecord]) -> Result<RiskStats> {
        let extracted = FeatureExtractor::new().extract(&usable_records(records))?;
        Ok(RiskStats::aggregate(&extracted.risk_levels))
    }

    /// Persist the published snapshot
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = self.current_snapshot().ok_or(AppError::NotTrained)?;
        ModelStore::save(&snapshot, path)
    }

    /// Load and publish a snapshot, `false` when the file does not exist
    pub fn load_snapshot(&self, path: &Path) -> Result<bool> {
        let _guard = self.update_lock.lock();

        match ModelStore::load(path)? {
            Some(snapshot) => {
                *self.snapshot.write() = Some(Arc::new(snapshot));
                Ok(true)
            }
            None => {
                info!(path = %path.display(), "No model snapshot found");
                Ok(false)
            }
        }
    }

    pub fn is_trained(&self) -> bool {
        self.snapshot.read().is_some()
    }

    /// Currently published snapshot
    pub fn current_snapshot(&self) -> Option<Arc<ModelSnapshot>> {
        self.snapshot.read().clone()
    }

    /// Get service statistics
    pub fn stats(&self) -> MLServiceStats {
        match self.current_snapshot() {
            Some(snapshot) => MLServiceStats {
                is_trained: true,
                trained_at: Some(snapshot.metadata.trained_at),
                n_training_samples: snapshot.metadata.n_training_samples,
                n_cuisines: snapshot.cuisine_encoder.len(),
                n_boroughs: snapshot.borough_encoder.len(),
                classes: snapshot.metadata.classes.clone(),
            },
            None => MLServiceStats::default(),
        }
    }
}

/// Records fit for batch work; the rest are skipped with a warning
fn usable_records(records: &[RestaurantRecord]) -> Vec<RestaurantRecord> {
    records
        .iter()
        .filter(|record| {
            if let Err(e) = record.validate() {
                warn!(restaurant_id = %record.id, error = %e, "Skipping invalid restaurant record");
                return false;
            }
            if !record.is_chronologically_ordered() {
                warn!(restaurant_id = %record.id, "Skipping restaurant with unsorted inspection history");
                return false;
            }
            true
        })
        .cloned()
        .collect()
}

/// ML service statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MLServiceStats {
    pub is_trained: bool,
    pub trained_at: Option<DateTime<Utc>>,
    pub n_training_samples: usize,
    pub n_cuisines: usize,
    pub n_boroughs: usize,
    pub classes: Vec<RiskLevel>,
}
