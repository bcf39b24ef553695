use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("lock not held")]
    NotHeld,

    #[error("timed out acquiring lock {0:?} after {1:?}")]
    LockTimeout(String, std::time::Duration),
}
