use crate::error::{AppError, Result};
use crate::ml::models::{ForestConfig, ModelMetadata, ModelType, RegressionMetrics};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Convert an ndarray matrix into the smartcore dense layout (row-major)
pub(crate) fn ndarray_to_densematrix(arr: &Array2<f64>) -> DenseMatrix<f64> {
    let shape = arr.shape();
    let data: Vec<f64> = arr.iter().copied().collect();
    DenseMatrix::new(shape[0], shape[1], data, false)
}

/// Next-score regressor backed by a random forest
#[derive(Serialize, Deserialize)]
pub struct ScorePredictor {
    /// Model metadata
    metadata: ModelMetadata,

    /// Hyperparameters
    config: ForestConfig,

    /// Trained forest
    model: Option<Forest>,
}

impl ScorePredictor {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            metadata: ModelMetadata::new(
                "Score Predictor",
                ModelType::RandomForestRegressor,
                &config,
            ),
            config,
            model: None,
        }
    }

    /// Fit the forest and report in-sample metrics
    pub fn train(&mut self, features: &Array2<f64>, targets: &Array1<f64>) -> Result<RegressionMetrics> {
        if features.nrows() == 0 || features.nrows() != targets.len() {
            return Err(AppError::Internal(format!(
                "Score predictor needs matching non-empty inputs, got {} rows and {} targets",
                features.nrows(),
                targets.len()
            )));
        }

        let x = ndarray_to_densematrix(features);
        let y: Vec<f64> = targets.to_vec();

        let mut params = RandomForestRegressorParameters::default()
            .with_n_trees(self.config.n_trees as _)
            .with_min_samples_leaf(self.config.min_samples_leaf as _)
            .with_seed(self.config.seed);
        if let Some(depth) = self.config.max_depth {
            params = params.with_max_depth(depth);
        }

        let model = RandomForestRegressor::fit(&x, &y, params).map_err(|e| {
            AppError::Model(format!("Failed to train score predictor: {}", e))
        })?;
        self.model = Some(model);

        let predictions = self.predict(features)?;
        let metrics = RegressionMetrics::calculate(&y, &predictions.to_vec());

        self.metadata.n_training_samples = features.nrows();
        self.metadata.n_features = features.ncols();
        self.metadata.trained_at = chrono::Utc::now();

        Ok(metrics)
    }

    /// Predict the next score for each row
    pub fn predict(&self, features: &Array2<f64>) -> Result<Array1<f64>> {
        let model = self.model.as_ref().ok_or(AppError::NotTrained)?;

        let x = ndarray_to_densematrix(features);
        let predictions = model
            .predict(&x)
            .map_err(|e| AppError::Model(format!("Score prediction failed: {}", e)))?;

        Ok(Array1::from_vec(predictions))
    }

    /// Evaluate against labelled rows
    pub fn evaluate(&self, features: &Array2<f64>, targets: &Array1<f64>) -> Result<RegressionMetrics> {
        let predictions = self.predict(features)?;
        Ok(RegressionMetrics::calculate(
            &targets.to_vec(),
            &predictions.to_vec(),
        ))
    }

    /// Permutation importance of every column.
    ///
    /// Each column is rotated by half the row count and the resulting drop
    /// in R² is recorded. Drops are clamped at zero and normalized to sum to 1
    /// when any is positive.
    pub fn permutation_importances(
        &self,
        features: &Array2<f64>,
        targets: &Array1<f64>,
    ) -> Result<Vec<f64>> {
        let baseline = self.evaluate(features, targets)?.r2;
        let n_rows = features.nrows();
        let shift = (n_rows / 2).max(1);

        let mut drops = Vec::with_capacity(features.ncols());
        for col in 0..features.ncols() {
            let mut permuted = features.clone();
            for row in 0..n_rows {
                permuted[[row, col]] = features[[(row + shift) % n_rows, col]];
            }
            let r2 = self.evaluate(&permuted, targets)?.r2;
            drops.push((baseline - r2).max(0.0));
        }

        let total: f64 = drops.iter().sum();
        if total > 0.0 {
            drops.iter_mut().for_each(|d| *d /= total);
        }
        Ok(drops)
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }
}
