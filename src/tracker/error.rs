use crate::store::StoreError;

pub type TrackerResult<T> = Result<T, TrackerError>;

/// 追踪引擎错误
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
