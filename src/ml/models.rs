use crate::config::ModelConfig;
use crate::models::RiskLevel;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};

/// Ensemble hyperparameters shared by both predictors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees
    pub n_trees: usize,

    /// Base seed for bootstrap sampling
    pub seed: u64,

    /// Maximum tree depth
    pub max_depth: Option<u16>,

    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            seed: 42,
            max_depth: None,
            min_samples_leaf: 1,
        }
    }
}

impl From<&ModelConfig> for ForestConfig {
    fn from(config: &ModelConfig) -> Self {
        Self {
            n_trees: config.n_trees.max(1),
            seed: config.seed,
            max_depth: config.max_depth,
            min_samples_leaf: config.min_samples_leaf.max(1),
        }
    }
}

impl ForestConfig {
    /// Hyperparameters as strings for model metadata
    pub fn hyperparameters(&self) -> HashMap<String, String> {
        let mut params = HashMap::from([
            ("n_trees".to_string(), self.n_trees.to_string()),
            ("seed".to_string(), self.seed.to_string()),
            ("min_samples_leaf".to_string(), self.min_samples_leaf.to_string()),
        ]);
        if let Some(depth) = self.max_depth {
            params.insert("max_depth".to_string(), depth.to_string());
        }
        params
    }
}

/// Training dataset
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    /// Feature matrix (n_samples × n_features)
    pub features: Array2<f64>,

    /// Regression targets
    pub scores: Array1<f64>,

    /// Classification targets
    pub risk_levels: Vec<RiskLevel>,

    /// Number of samples
    pub n_samples: usize,

    /// Number of features
    pub n_features: usize,
}

impl TrainingDataset {
    /// Create a dataset from encoded feature vectors and labels
    pub fn from_rows<const N: usize>(
        rows: &[[f64; N]],
        scores: &[f64],
        risk_levels: &[RiskLevel],
    ) -> Self {
        let n_samples = rows.len();
        let mut features = Array2::zeros((n_samples, N));

        for (i, row) in rows.iter().enumerate() {
            for (j, &val) in row.iter().enumerate() {
                features[[i, j]] = val;
            }
        }

        Self {
            features,
            scores: Array1::from_vec(scores.to_vec()),
            risk_levels: risk_levels.to_vec(),
            n_samples,
            n_features: N,
        }
    }

    /// Split dataset into train/test sets, holding out the tail
    pub fn train_test_split(&self, test_size: f64) -> (TrainingDataset, TrainingDataset) {
        let n_test = (self.n_samples as f64 * test_size) as usize;
        let n_train = self.n_samples - n_test.min(self.n_samples);

        let train_dataset = TrainingDataset {
            features: self.features.slice(ndarray::s![..n_train, ..]).to_owned(),
            scores: self.scores.slice(ndarray::s![..n_train]).to_owned(),
            risk_levels: self.risk_levels[..n_train].to_vec(),
            n_samples: n_train,
            n_features: self.n_features,
        };

        let test_dataset = TrainingDataset {
            features: self.features.slice(ndarray::s![n_train.., ..]).to_owned(),
            scores: self.scores.slice(ndarray::s![n_train..]).to_owned(),
            risk_levels: self.risk_levels[n_train..].to_vec(),
            n_samples: self.n_samples - n_train,
            n_features: self.n_features,
        };

        (train_dataset, test_dataset)
    }
}

/// Classification evaluation metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Accuracy
    pub accuracy: f64,

    /// Macro-averaged precision
    pub precision: f64,

    /// Macro-averaged recall
    pub recall: f64,

    /// Macro-averaged F1 score
    pub f1_score: f64,

    /// Per-class metrics
    pub per_class_metrics: BTreeMap<RiskLevel, ClassMetrics>,
}

/// Per-class evaluation metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self {
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            per_class_metrics: BTreeMap::new(),
        }
    }

    /// Compute metrics over the given classes
    pub fn calculate(y_true: &[RiskLevel], y_pred: &[RiskLevel], classes: &[RiskLevel]) -> Self {
        let n_samples = y_true.len();
        if n_samples == 0 || classes.is_empty() {
            return Self::new();
        }

        let correct = y_true
            .iter()
            .zip(y_pred.iter())
            .filter(|(t, p)| t == p)
            .count();
        let accuracy = correct as f64 / n_samples as f64;

        let mut per_class = BTreeMap::new();

        for &class in classes {
            let tp = y_true
                .iter()
                .zip(y_pred.iter())
                .filter(|(t, p)| **t == class && **p == class)
                .count();

            let fp = y_pred
                .iter()
                .zip(y_true.iter())
                .filter(|(p, t)| **p == class && **t != class)
                .count();

            let fn_count = y_true
                .iter()
                .zip(y_pred.iter())
                .filter(|(t, p)| **t == class && **p != class)
                .count();

            let precision = if tp + fp > 0 {
                tp as f64 / (tp + fp) as f64
            } else {
                0.0
            };

            let recall = if tp + fn_count > 0 {
                tp as f64 / (tp + fn_count) as f64
            } else {
                0.0
            };

            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            let support = y_true.iter().filter(|&&t| t == class).count();

            per_class.insert(
                class,
                ClassMetrics {
                    precision,
                    recall,
                    f1_score: f1,
                    support,
                },
            );
        }

        let n_classes = classes.len() as f64;
        let precision = per_class.values().map(|m| m.precision).sum::<f64>() / n_classes;
        let recall = per_class.values().map(|m| m.recall).sum::<f64>() / n_classes;
        let f1_score = per_class.values().map(|m| m.f1_score).sum::<f64>() / n_classes;

        Self {
            accuracy,
            precision,
            recall,
            f1_score,
            per_class_metrics: per_class,
        }
    }
}

impl Default for ModelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Regression evaluation metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RegressionMetrics {
    /// Coefficient of determination
    pub r2: f64,

    /// Mean absolute error
    pub mae: f64,

    /// Root mean squared error
    pub rmse: f64,
}

impl RegressionMetrics {
    pub fn calculate(y_true: &[f64], y_pred: &[f64]) -> Self {
        let n = y_true.len();
        if n == 0 {
            return Self::default();
        }

        let mean = y_true.iter().sum::<f64>() / n as f64;
        let ss_tot: f64 = y_true.iter().map(|y| (y - mean).powi(2)).sum();
        let ss_res: f64 = y_true
            .iter()
            .zip(y_pred)
            .map(|(y, p)| (y - p).powi(2))
            .sum();
        let abs_err: f64 = y_true.iter().zip(y_pred).map(|(y, p)| (y - p).abs()).sum();

        // Constant targets: perfect fit scores 1, anything else 0
        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        Self {
            r2,
            mae: abs_err / n as f64,
            rmse: (ss_res / n as f64).sqrt(),
        }
    }
}

/// Model type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Bagged regression trees
    RandomForestRegressor,

    /// Bagged classification trees with vote-fraction probabilities
    BaggedDecisionTrees,
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelType::RandomForestRegressor => write!(f, "Random Forest Regressor"),
            ModelType::BaggedDecisionTrees => write!(f, "Bagged Decision Trees"),
        }
    }
}

/// Model metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub name: String,

    /// Model type
    pub model_type: ModelType,

    /// Training timestamp
    pub trained_at: chrono::DateTime<chrono::Utc>,

    /// Number of training samples
    pub n_training_samples: usize,

    /// Number of features
    pub n_features: usize,

    /// Hyperparameters
    pub hyperparameters: HashMap<String, String>,
}

impl ModelMetadata {
    pub fn new(name: &str, model_type: ModelType, config: &ForestConfig) -> Self {
        Self {
            name: name.to_string(),
            model_type,
            trained_at: chrono::Utc::now(),
            n_training_samples: 0,
            n_features: 0,
            hyperparameters: config.hyperparameters(),
        }
    }
}

/// Relative contribution of one feature column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Outcome of a successful training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainResult {
    /// In-sample R² of the score predictor
    pub score_fit: f64,

    /// In-sample accuracy of the risk predictor
    pub risk_accuracy: f64,

    /// Number of usable restaurants
    pub sample_count: usize,

    /// Full in-sample regression metrics
    pub score_metrics: RegressionMetrics,

    /// Full in-sample classification metrics
    pub risk_metrics: ModelMetrics,

    /// Held-out regression metrics, when a validation split was configured
    pub validation_score_metrics: Option<RegressionMetrics>,

    /// Held-out classification metrics, when a validation split was configured
    pub validation_risk_metrics: Option<ModelMetrics>,

    /// Score predictor feature importances, descending
    pub feature_importances: Vec<FeatureImportance>,
}

/// Prediction for one restaurant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub restaurant_id: String,

    /// Expected next inspection score, serialized to one decimal
    #[serde(serialize_with = "serialize_one_decimal")]
    pub predicted_score: f64,

    /// Predicted risk band
    pub predicted_risk_level: RiskLevel,

    /// Probability per class seen at training time
    pub risk_probabilities: BTreeMap<RiskLevel, f64>,

    /// Average of the historical scores, serialized to one decimal
    #[serde(serialize_with = "serialize_one_decimal")]
    pub current_avg_score: f64,

    /// Number of historical inspections
    pub num_inspections: usize,

    /// Fields that fell back to the sentinel code
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unknown_categories: Vec<String>,
}

impl Prediction {
    /// Probability of the predicted class
    pub fn confidence(&self) -> f64 {
        self.risk_probabilities
            .get(&self.predicted_risk_level)
            .copied()
            .unwrap_or(0.0)
    }

    /// Predicted score rounded to one decimal
    pub fn predicted_score_rounded(&self) -> f64 {
        round1(self.predicted_score)
    }

    /// Average score rounded to one decimal
    pub fn current_avg_score_rounded(&self) -> f64 {
        round1(self.current_avg_score)
    }
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn serialize_one_decimal<S>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(round1(*value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: usize) -> TrainingDataset {
        let rows: Vec<[f64; 2]> = (0..n).map(|i| [i as f64, (i * 2) as f64]).collect();
        let scores: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let levels: Vec<RiskLevel> = (0..n)
            .map(|i| if i % 2 == 0 { RiskLevel::Low } else { RiskLevel::High })
            .collect();
        TrainingDataset::from_rows(&rows, &scores, &levels)
    }

    #[test]
    fn test_training_dataset_from_rows() {
        let dataset = dataset(3);

        assert_eq!(dataset.n_samples, 3);
        assert_eq!(dataset.n_features, 2);
        assert_eq!(dataset.features.shape(), &[3, 2]);
        assert_eq!(dataset.features[[2, 1]], 4.0);
        assert_eq!(dataset.risk_levels.len(), 3);
    }

    #[test]
    fn test_train_test_split() {
        let (train, test) = dataset(100).train_test_split(0.2);

        assert_eq!(train.n_samples, 80);
        assert_eq!(test.n_samples, 20);
        assert_eq!(train.scores.len(), 80);
        assert_eq!(test.risk_levels.len(), 20);
        assert_eq!(test.features[[0, 0]], 80.0);
    }

    #[test]
    fn test_classification_metrics() {
        use RiskLevel::*;
        let y_true = [Low, Low, Medium, High];
        let y_pred = [Low, Medium, Medium, High];

        let metrics = ModelMetrics::calculate(&y_true, &y_pred, &[Low, Medium, High]);
        assert_eq!(metrics.accuracy, 0.75);
        assert_eq!(metrics.per_class_metrics[&Low].recall, 0.5);
        assert_eq!(metrics.per_class_metrics[&Medium].precision, 0.5);
        assert_eq!(metrics.per_class_metrics[&High].f1_score, 1.0);
    }

    #[test]
    fn test_regression_metrics() {
        let perfect = RegressionMetrics::calculate(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
        assert_eq!(perfect.r2, 1.0);
        assert_eq!(perfect.mae, 0.0);

        let mean_only = RegressionMetrics::calculate(&[1.0, 2.0, 3.0], &[2.0, 2.0, 2.0]);
        assert!(mean_only.r2.abs() < 1e-12);

        let constant = RegressionMetrics::calculate(&[4.0, 4.0], &[4.0, 5.0]);
        assert_eq!(constant.r2, 0.0);
    }

    #[test]
    fn test_prediction_rounding() {
        let prediction = Prediction {
            restaurant_id: "r1".to_string(),
            predicted_score: 12.345,
            predicted_risk_level: RiskLevel::Low,
            risk_probabilities: BTreeMap::from([(RiskLevel::Low, 0.8), (RiskLevel::Medium, 0.2)]),
            current_avg_score: 18.3333,
            num_inspections: 3,
            unknown_categories: Vec::new(),
        };

        assert_eq!(prediction.predicted_score_rounded(), 12.3);
        assert_eq!(prediction.current_avg_score_rounded(), 18.3);
        assert_eq!(prediction.confidence(), 0.8);

        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(json["predicted_score"], 12.3);
        assert_eq!(json["current_avg_score"], 18.3);
        assert_eq!(json["risk_probabilities"]["Low"], 0.8);
        assert!(json.get("unknown_categories").is_none());
    }

    #[test]
    fn test_forest_config_from_model_config() {
        let mut model = ModelConfig::default();
        model.n_trees = 0;
        model.max_depth = Some(8);

        let forest = ForestConfig::from(&model);
        assert_eq!(forest.n_trees, 1);
        assert_eq!(forest.hyperparameters()["max_depth"], "8");
    }

    #[test]
    fn test_model_type_display() {
        assert_eq!(
            ModelType::RandomForestRegressor.to_string(),
            "Random Forest Regressor"
        );
        assert_eq!(
            ModelType::BaggedDecisionTrees.to_string(),
            "Bagged Decision Trees"
        );
    }
}
