//! In-memory reference `WorkQueue` (§4.13).
//!
//! Backed by a `tokio::sync::mpsc::unbounded_channel`, which already gives
//! FIFO delivery and a wake-up primitive for free. `consume_actions` spawns
//! one drain task that pulls messages one at a time and awaits the
//! handler before pulling the next, so delivery to the single registered
//! handler is always serialized. A `Retry` outcome re-enqueues the same
//! message after `delay_ms` via a detached `tokio::time::sleep` task,
//! which preserves at-least-once delivery without blocking the drain loop
//! on the retry delay.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::error::QueueError;
use crate::message::ActionMessage;
use crate::{ActionHandler, HandleOutcome, WorkQueue};

struct Inner {
    sender: mpsc::UnboundedSender<ActionMessage>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<ActionMessage>>>,
    stopped: AtomicBool,
    drain_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// In-memory FIFO work queue. Construct one instance and share it (via
/// `Arc`) between the trigger runner, which enqueues, and the action
/// consumer, which registers the draining handler.
pub struct MemoryWorkQueue {
    inner: Arc<Inner>,
}

impl MemoryWorkQueue {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                sender,
                receiver: Mutex::new(Some(receiver)),
                stopped: AtomicBool::new(false),
                drain_task: Mutex::new(None),
            }),
        }
    }
}

impl Default for MemoryWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn enqueue_action(&self, message: ActionMessage) -> Result<(), QueueError> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Err(QueueError::Stopped);
        }
        self.inner
            .sender
            .send(message)
            .map_err(|e| QueueError::Backend(e.to_string()))
    }

    async fn consume_actions(&self, handler: Arc<dyn ActionHandler>) -> Result<(), QueueError> {
        let mut receiver_slot = self.inner.receiver.lock().await;
        let mut receiver = receiver_slot
            .take()
            .ok_or(QueueError::ConsumerAlreadyRegistered)?;

        let sender = self.inner.sender.clone();
        let task = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                match handler.handle(message.clone()).await {
                    HandleOutcome::Done => {}
                    HandleOutcome::Retry { delay_ms } => {
                        debug!(
                            action_definition_id = %message.action_definition_id,
                            delay_ms,
                            "rescheduling action message for retry"
                        );
                        let sender = sender.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                            if sender.send(message).is_err() {
                                warn!("failed to re-enqueue message after retry delay: queue closed");
                            }
                        });
                    }
                }
            }
        });

        *self.inner.drain_task.lock().await = Some(task);
        Ok(())
    }

    async fn stop(&self) -> Result<(), QueueError> {
        self.inner.stopped.store(true, Ordering::SeqCst);
        if let Some(task) = self.inner.drain_task.lock().await.take() {
            task.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct RecordingHandler {
        received: StdMutex<Vec<String>>,
        retry_once_ids: StdMutex<std::collections::HashSet<String>>,
    }

    #[async_trait]
    impl ActionHandler for RecordingHandler {
        async fn handle(&self, message: ActionMessage) -> HandleOutcome {
            let id = message.action_definition_id.clone();
            if self.retry_once_ids.lock().unwrap().remove(&id) {
                return HandleOutcome::Retry { delay_ms: 5 };
            }
            self.received.lock().unwrap().push(id);
            HandleOutcome::Done
        }
    }

    #[tokio::test]
    async fn messages_are_delivered_in_fifo_order() {
        let queue = MemoryWorkQueue::new();
        let handler = Arc::new(RecordingHandler {
            received: StdMutex::new(Vec::new()),
            retry_once_ids: StdMutex::new(Default::default()),
        });

        queue.enqueue_action(ActionMessage::new("a1")).await.unwrap();
        queue.enqueue_action(ActionMessage::new("a2")).await.unwrap();
        queue.enqueue_action(ActionMessage::new("a3")).await.unwrap();

        queue.consume_actions(handler.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(*handler.received.lock().unwrap(), vec!["a1", "a2", "a3"]);
    }

    #[tokio::test]
    async fn retry_redelivers_after_delay() {
        let queue = MemoryWorkQueue::new();
        let mut retry_ids = std::collections::HashSet::new();
        retry_ids.insert("a1".to_owned());
        let handler = Arc::new(RecordingHandler {
            received: StdMutex::new(Vec::new()),
            retry_once_ids: StdMutex::new(retry_ids),
        });

        queue.enqueue_action(ActionMessage::new("a1")).await.unwrap();
        queue.consume_actions(handler.clone()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handler.received.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(*handler.received.lock().unwrap(), vec!["a1"]);
    }

    #[tokio::test]
    async fn second_consumer_registration_is_rejected() {
        let queue = MemoryWorkQueue::new();
        let handler = Arc::new(RecordingHandler {
            received: StdMutex::new(Vec::new()),
            retry_once_ids: StdMutex::new(Default::default()),
        });
        queue.consume_actions(handler.clone()).await.unwrap();
        let err = queue.consume_actions(handler).await.unwrap_err();
        assert!(matches!(err, QueueError::ConsumerAlreadyRegistered));
    }

    #[tokio::test]
    async fn enqueue_after_stop_is_rejected() {
        let queue = MemoryWorkQueue::new();
        queue.stop().await.unwrap();
        let err = queue.enqueue_action(ActionMessage::new("a1")).await.unwrap_err();
        assert!(matches!(err, QueueError::Stopped));
    }
}
