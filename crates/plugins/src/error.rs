use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plug-in {0:?} not found")]
    NotFound(String),

    #[error("capability {0:?} not found")]
    CapabilityNotFound(String),

    #[error("failed to load plug-in module at {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("trigger runtime error: {0}")]
    TriggerRuntime(String),

    #[error("action execution error: {0}")]
    ActionExecution(String),

    #[error("filesystem watch error: {0}")]
    Watch(#[from] notify::Error),
}
