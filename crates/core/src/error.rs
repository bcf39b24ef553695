use thiserror::Error;

/// Top-level error type shared by crates that don't need a richer taxonomy
/// of their own (see `latchflow-authz::AuthzError`, `latchflow-history::HistoryError`,
/// etc. for subsystem-specific variants that carry HTTP-mapping metadata).
#[derive(Debug, Error)]
pub enum LatchflowError {
    #[error("state error: {0}")]
    State(String),

    #[error("authorization error: {0}")]
    Authz(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("plugin error: {0}")]
    Plugin(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Other(String),
}
