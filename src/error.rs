use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Too few usable rows survived feature extraction
    #[error("Insufficient data: {found} usable restaurants, at least {required} required")]
    InsufficientData { found: usize, required: usize },

    /// No snapshot has been trained or loaded yet
    #[error("Model not trained: train or load a snapshot first")]
    NotTrained,

    /// The restaurant has no inspection events to derive features from
    #[error("No inspection history for restaurant {0}")]
    NoHistory(String),

    /// Category value absent from the fitted vocabulary
    #[error("Unknown {field} category: {value:?}")]
    UnknownCategory { field: String, value: String },

    /// Dated events are not ordered most-recent-first
    #[error("Inspection history of restaurant {0} is not ordered most-recent-first")]
    UnsortedHistory(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Learner failures reported by the ML backend
    #[error("Model error: {0}")]
    Model(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::InsufficientData { .. } => "INSUFFICIENT_DATA",
            AppError::NotTrained => "NOT_TRAINED",
            AppError::NoHistory(_) => "NO_HISTORY",
            AppError::UnknownCategory { .. } => "UNKNOWN_CATEGORY",
            AppError::UnsortedHistory(_) => "UNSORTED_HISTORY",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Model(_) => "MODEL_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error comes from snapshot persistence rather than the model itself
    pub fn is_persistence(&self) -> bool {
        matches!(self, AppError::Io(_) | AppError::Serialization(_))
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from bincode::Error
impl From<bincode::Error> for AppError {
    fn from(err: bincode::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Conversion from smartcore::error::Failed
impl From<smartcore::error::Failed> for AppError {
    fn from(err: smartcore::error::Failed) -> Self {
        AppError::Model(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
