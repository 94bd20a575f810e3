use std::result::Result as StdResult;

use thiserror::Error;
use uuid::Uuid;

/// Error type shared by the calendar, recurrence, budget and storage layers.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid anchor: {0}")]
    InvalidAnchor(String),
    #[error("Invalid recurrence rule: {0}")]
    InvalidRule(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Date out of range: {0}")]
    OutOfRange(String),
    #[error("Store write failed: {0}")]
    StoreWriteFailed(String),
    #[error("Store read failed: {0}")]
    StoreReadFailed(String),
    #[error("Budget not found: {0}")]
    BudgetNotFound(Uuid),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),
    #[error("Recurring schedule not found: {0}")]
    ScheduleNotFound(Uuid),
    #[error("Category not found: {0}")]
    CategoryNotFound(Uuid),
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = StdResult<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::StoreWriteFailed(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::StoreReadFailed(err.to_string())
    }
}

impl EngineError {
    /// True for failures raised by the persistence collaborator.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            EngineError::StoreWriteFailed(_) | EngineError::StoreReadFailed(_)
        )
    }
}
