//! Machine learning pipeline for restaurant inspection risk
//!
//! - Feature extraction from inspection histories
//! - Categorical encoding of cuisine and borough
//! - Next-score regression and risk-level classification
//! - Atomic snapshot persistence
//! - Training and prediction orchestration

pub mod classifier;
pub mod encoders;
pub mod features;
pub mod models;
pub mod regressor;
pub mod service;
pub mod snapshot;

pub use classifier::RiskPredictor;
pub use encoders::CategoryEncoder;
pub use features::{ExtractedFeatures, FeatureExtractor, FeatureRow, FEATURE_COLUMNS, N_FEATURES};
pub use models::{
    FeatureImportance, ForestConfig, ModelMetadata, ModelMetrics, ModelType, Prediction,
    RegressionMetrics, TrainResult, TrainingDataset,
};
pub use regressor::ScorePredictor;
pub use service::{MLService, MLServiceStats};
pub use snapshot::{ModelSnapshot, ModelStore, SnapshotMetadata};
