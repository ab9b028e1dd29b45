use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("question generation failed: {0}")]
    Generation(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("no active session")]
    NoActiveSession,

    #[error("a session is already active")]
    SessionActive,

    #[error("no pending question")]
    NoPendingQuestion,

    #[error("practice queue exhausted")]
    QueueExhausted,

    #[error("initial assessment already completed")]
    AssessmentAlreadyDone,

    #[error("no assessment in progress")]
    NoAssessmentPending,
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::Persistence(err.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
