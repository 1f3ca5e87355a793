//! Error types shared by the core operations

use thiserror::Error;

/// Errors surfaced to the caller of a core operation.
///
/// Network failures are not errors: they come back as
/// [`ExecutionOutcome`](crate::executor::ExecutionOutcome) values.
#[derive(Debug, Error)]
pub enum AppError {
    /// User-entered data was rejected; nothing was mutated
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("no collection loaded")]
    NoCollection,

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("automation is already running")]
    AutomationRunning,

    #[error("automation queue is empty")]
    EmptyQueue,

    #[error("method already queued: {0}")]
    AlreadyQueued(String),

    #[error("queue position {0} out of range")]
    QueuePosition(usize),

    #[error("failed to parse collection: {0}")]
    CollectionParse(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
