// Error taxonomy for handler construction and runs

use thiserror::Error;

use crate::tracker::TrackerError;

/// Errors a handler can surface while being built or while running.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler requires storage it cannot reach. Construction-time
    /// occurrences terminate the whole process: a handler that cannot reach
    /// required storage must not silently proceed.
    #[error("required database unavailable: {0}")]
    DatabaseUnavailable(String),

    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("ticket {key} is missing field {field}")]
    MissingField { key: String, field: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn database(msg: impl Into<String>) -> Self {
        HandlerError::DatabaseUnavailable(msg.into())
    }

    pub fn missing_field(key: impl Into<String>, field: impl Into<String>) -> Self {
        HandlerError::MissingField {
            key: key.into(),
            field: field.into(),
        }
    }

    /// Whether this error must stop the service rather than just this worker.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HandlerError::DatabaseUnavailable(_))
    }
}
