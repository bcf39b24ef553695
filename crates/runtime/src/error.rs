use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("trigger definition not found: {0}")]
    TriggerNotFound(String),

    #[error("action definition not found: {0}")]
    ActionNotFound(String),

    #[error("capability not registered: {0}")]
    CapabilityNotRegistered(String),

    #[error("plugin error: {0}")]
    Plugin(#[from] latchflow_plugins::PluginError),

    #[error("queue error: {0}")]
    Queue(#[from] latchflow_queue::QueueError),

    #[error("config decryption failed: {0}")]
    Crypto(String),

    #[error("store error: {0}")]
    Store(String),
}
