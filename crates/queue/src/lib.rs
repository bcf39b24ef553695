//! Abstract work queue and in-memory FIFO reference driver (§4.13 / C13).
//!
//! The queue is deliberately narrow: `enqueue_action`/`consume_actions`/
//! `stop`. Semantics are at-least-once, FIFO within a single partition; the
//! in-memory driver serializes delivery to a single registered handler, one
//! message at a time, matching the spec's "serializes delivery to one
//! handler with a wake-up primitive." A durable driver (SQS, a Postgres
//! outbox, ...) is an external collaborator satisfying the same trait
//! while preserving per-partition FIFO.

pub mod driver;
pub mod error;
pub mod message;

pub use driver::MemoryWorkQueue;
pub use error::QueueError;
pub use message::ActionMessage;

use async_trait::async_trait;
use std::sync::Arc;

/// What a handler reports back after processing one message.
#[derive(Debug, Clone, PartialEq)]
pub enum HandleOutcome {
    /// The message was handled (successfully or with a terminal failure);
    /// it should not be redelivered.
    Done,
    /// Redeliver the same message after `delay_ms`, per §4.15's action
    /// retry contract.
    Retry { delay_ms: u64 },
}

/// Consumes one dequeued message at a time. The action consumer (C15) is
/// the production implementation; tests supply simpler stand-ins.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, message: ActionMessage) -> HandleOutcome;
}

/// The work queue's operations (§4.13).
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue a message for eventual delivery to the registered handler.
    async fn enqueue_action(&self, message: ActionMessage) -> Result<(), QueueError>;

    /// Register the single handler that drains this queue. Only one
    /// handler may be registered at a time (§4.13, §4.15 "started once").
    async fn consume_actions(&self, handler: Arc<dyn ActionHandler>) -> Result<(), QueueError>;

    /// Stop delivering messages and release the registered handler.
    async fn stop(&self) -> Result<(), QueueError>;
}
