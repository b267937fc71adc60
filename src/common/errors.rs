use log::error;
use thiserror::Error;

/// Engine-level error taxonomy. Outer layers (api, bootstrap, main) wrap
/// these in `anyhow` with context; the engine itself stays typed so callers
/// can distinguish a missing workflow from a broker outage.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("workflow '{0}' has no steps")]
    InvalidWorkflow(String),

    #[error("broker delivery failed: {0}")]
    Delivery(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("timed out waiting for job result")]
    TimedOut,
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<redb::DatabaseError> for EngineError {
    fn from(err: redb::DatabaseError) -> Self {
        EngineError::StoreUnavailable(err.to_string())
    }
}

impl From<redb::TransactionError> for EngineError {
    fn from(err: redb::TransactionError) -> Self {
        EngineError::StoreUnavailable(err.to_string())
    }
}

impl From<redb::TableError> for EngineError {
    fn from(err: redb::TableError) -> Self {
        EngineError::StoreUnavailable(err.to_string())
    }
}

impl From<redb::StorageError> for EngineError {
    fn from(err: redb::StorageError) -> Self {
        EngineError::StoreUnavailable(err.to_string())
    }
}

impl From<redb::CommitError> for EngineError {
    fn from(err: redb::CommitError) -> Self {
        EngineError::StoreUnavailable(err.to_string())
    }
}

// Rows are serde_json-encoded, so a decode failure means the store handed us
// something unusable.
impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::StoreUnavailable(format!("corrupt row: {}", err))
    }
}

/// Log an error chain and hand it back, for detached contexts where nobody
/// upstream will print it.
pub fn handle_error(error: anyhow::Error) -> anyhow::Error {
    error!("{:?}", error);
    error
}
