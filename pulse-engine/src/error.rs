//! Error types for pulse-engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason a baseline could not be produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineErrorKind {
    /// Fewer samples than the configured minimum
    InsufficientData,
    /// Backing table does not exist yet
    TableMissing,
    /// No metric registered under the requested key
    MetricNotFound,
    /// The store failed while reading values
    DatabaseError,
    /// Statistics could not be computed from the values
    ComputationError,
}

impl BaselineErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientData => "insufficient_data",
            Self::TableMissing => "table_missing",
            Self::MetricNotFound => "metric_not_found",
            Self::DatabaseError => "database_error",
            Self::ComputationError => "computation_error",
        }
    }
}

/// Typed failure for baseline computation
///
/// `recoverable` separates "try again later" (more data may arrive, the store
/// may come back) from "the request itself is wrong".
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("baseline unavailable ({}) for {user_id}/{metric_key}: {message}", .kind.as_str())]
pub struct BaselineError {
    pub kind: BaselineErrorKind,
    pub message: String,
    pub user_id: String,
    pub metric_key: String,
    pub recoverable: bool,
}

impl BaselineError {
    pub fn new(
        kind: BaselineErrorKind,
        message: impl Into<String>,
        user_id: impl Into<String>,
        metric_key: impl Into<String>,
    ) -> Self {
        let recoverable = !matches!(kind, BaselineErrorKind::MetricNotFound);
        Self {
            kind,
            message: message.into(),
            user_id: user_id.into(),
            metric_key: metric_key.into(),
            recoverable,
        }
    }

    pub fn insufficient_data(
        user_id: impl Into<String>,
        metric_key: impl Into<String>,
        found: usize,
        required: usize,
    ) -> Self {
        Self::new(
            BaselineErrorKind::InsufficientData,
            format!("{found} samples, need at least {required}"),
            user_id,
            metric_key,
        )
    }

    /// A store failure while reading or writing baseline inputs
    ///
    /// [`EngineError::TableMissing`] keeps its own kind.
    pub fn from_store(
        user_id: impl Into<String>,
        metric_key: impl Into<String>,
        err: &EngineError,
    ) -> Self {
        let kind = match err {
            EngineError::TableMissing(_) => BaselineErrorKind::TableMissing,
            _ => BaselineErrorKind::DatabaseError,
        };
        Self::new(kind, err.to_string(), user_id, metric_key)
    }
}

/// Error type for engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Baseline could not be computed or loaded
    #[error(transparent)]
    BaselineUnavailable(#[from] BaselineError),

    /// Metric key is not present in the registry
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    /// Metric exists but has no detection policy
    #[error("No policy defined for metric: {0}")]
    NoPolicy(String),

    /// Input windows are empty where a computation requires values
    #[error("Not enough data: {0}")]
    NotEnoughData(String),

    /// Experiment lookup failed
    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    /// Confidence hierarchy level outside 1..=5
    #[error("Invalid confidence level: {0}")]
    InvalidConfidenceLevel(u8),

    /// Configuration could not be parsed or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistence collaborator failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// A store's backing table has not been created yet
    #[error("Table missing: {0}")]
    TableMissing(String),

    /// Serialization or deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether a caller should retry later rather than reject the request
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::BaselineUnavailable(err) => err.recoverable,
            Self::Storage(_) | Self::TableMissing(_) | Self::Io(_) => true,
            Self::UnknownMetric(_)
            | Self::NoPolicy(_)
            | Self::NotEnoughData(_)
            | Self::ExperimentNotFound(_)
            | Self::InvalidConfidenceLevel(_)
            | Self::Config(_)
            | Self::Serialization(_) => false,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
