use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Model training and persistence configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("INSPECTION_RISK_CONFIG")
            .unwrap_or_else(|_| "config/inspection-risk.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: INSPECTION_RISK_)
            .add_source(
                config::Environment::with_prefix("INSPECTION_RISK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Where the trained snapshot is persisted
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Number of trees in each ensemble
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    /// Base seed for bootstrap sampling
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Maximum tree depth (unbounded when absent)
    #[serde(default)]
    pub max_depth: Option<u16>,

    /// Minimum samples per leaf
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,

    /// Minimum usable restaurants required to train
    #[serde(default = "default_min_training_samples")]
    pub min_training_samples: usize,

    /// What to do with cuisines/boroughs unseen at training time
    #[serde(default)]
    pub unknown_category: UnknownCategoryPolicy,

    /// Fraction of rows held out for validation metrics (0 disables)
    #[serde(default)]
    pub validation_split: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            n_trees: default_n_trees(),
            seed: default_seed(),
            max_depth: None,
            min_samples_leaf: default_min_samples_leaf(),
            min_training_samples: default_min_training_samples(),
            unknown_category: UnknownCategoryPolicy::default(),
            validation_split: 0.0,
        }
    }
}

/// Handling of category values absent from the training vocabulary
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnknownCategoryPolicy {
    /// Fail the prediction with `UnknownCategory`
    #[default]
    Reject,
    /// Substitute a sentinel code and report the substitution
    Sentinel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

// Default value functions
fn default_snapshot_path() -> PathBuf {
    PathBuf::from("./data/restaurant_model.bin")
}

fn default_n_trees() -> usize {
    100
}

fn default_seed() -> u64 {
    42
}

fn default_min_samples_leaf() -> usize {
    1
}

fn default_min_training_samples() -> usize {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}
