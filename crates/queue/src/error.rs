use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is stopped")]
    Stopped,

    #[error("a consumer is already registered")]
    ConsumerAlreadyRegistered,

    #[error("backend error: {0}")]
    Backend(String),
}
