//! Error types for the activity classification pipeline.
//!
//! Every fallible operation in the library returns [`PipelineError`]. Variants
//! carry enough context (session id, row, line number, path) to find the bad
//! input without re-running the pipeline.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A sensor stream does not have the expected column shape.
    #[error("Shape error in session '{session}': {detail}")]
    Shape { session: String, detail: String },

    /// A session input cell could not be interpreted.
    #[error("Input error in session '{session}' at row {row}: {reason}")]
    Input {
        session: String,
        row: usize,
        reason: String,
    },

    /// A corpus or range-file line is malformed.
    #[error("Parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// There is not enough data to split, fit or train.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Underlying storage failed.
    #[error("IO failure on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted model is corrupt or incompatible.
    #[error("Failed to load model from {path:?}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    /// A feature vector has the wrong number of entries.
    #[error("Dimension mismatch: expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The classifier backend rejected the training problem.
    #[error("Training failed: {0}")]
    Training(String),

    /// Training did not finish within the caller's bound.
    #[error("Training timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Configuration validation failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    #[must_use]
    pub fn shape(session: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Shape {
            session: session.into(),
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn input(session: impl Into<String>, row: usize, reason: impl Into<String>) -> Self {
        Self::Input {
            session: session.into(),
            row,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn insufficient_data(msg: impl Into<String>) -> Self {
        Self::InsufficientData(msg.into())
    }

    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn model_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ModelLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    #[must_use]
    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_context() {
        let err = PipelineError::parse(7, "bad token 'x'");
        assert!(err.to_string().contains("line 7"));

        let err = PipelineError::shape("session-3", "expected 3 axis columns, got 2");
        assert!(err.to_string().contains("session-3"));

        let err = PipelineError::dimension_mismatch(18, 17);
        assert!(err.to_string().contains("18"));
        assert!(err.to_string().contains("17"));
    }

    #[test]
    fn test_config_error_converts() {
        let err: PipelineError = ConfigError::Invalid("stride must be > 0".to_string()).into();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(err.to_string().contains("stride"));
    }
}
