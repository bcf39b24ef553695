//! Trigger runner (§4.14 / C14).
//!
//! `fire_trigger_once` records a `TriggerEvent`, resolves the enabled
//! trigger→action mappings for the fired definition (ordered by
//! `sortOrder asc`), and enqueues one action message per mapping. There is
//! no idempotency at this level — calling it twice produces two events and
//! two full fan-outs, exactly as §4.14 specifies.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use latchflow_queue::{ActionMessage, WorkQueue};

use crate::error::RuntimeError;

/// A recorded firing of a trigger definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerEvent {
    pub id: String,
    pub trigger_definition_id: String,
    pub context: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// One enabled `(triggerDefinitionId -> actionDefinitionId)` binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMapping {
    pub action_definition_id: String,
    pub sort_order: i64,
}

/// Persists trigger events and resolves a trigger definition's enabled
/// action mappings. Implemented by the server's persistence layer.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    async fn insert_trigger_event(&self, event: &TriggerEvent) -> Result<(), RuntimeError>;

    /// Enabled mappings for `trigger_definition_id`, ordered by
    /// `sort_order` ascending (§4.14 step 2).
    async fn enabled_mappings(&self, trigger_definition_id: &str) -> Result<Vec<TriggerMapping>, RuntimeError>;
}

/// Fire a trigger once: record the event, then enqueue one action message
/// per enabled mapping in `sortOrder` order.
pub async fn fire_trigger_once(
    store: &dyn TriggerStore,
    queue: &dyn WorkQueue,
    trigger_definition_id: &str,
    context: Option<Value>,
) -> Result<TriggerEvent, RuntimeError> {
    let event = TriggerEvent {
        id: latchflow_core::generate_token(),
        trigger_definition_id: trigger_definition_id.to_owned(),
        context: context.clone(),
        created_at: Utc::now(),
    };
    store.insert_trigger_event(&event).await?;

    let mut mappings = store.enabled_mappings(trigger_definition_id).await?;
    mappings.sort_by_key(|m| m.sort_order);

    for mapping in mappings {
        let message = ActionMessage::new(mapping.action_definition_id)
            .with_trigger_event(event.id.clone());
        let message = match &context {
            Some(ctx) => message.with_context(ctx.clone()),
            None => message,
        };
        queue.enqueue_action(message).await?;
    }

    Ok(event)
}
