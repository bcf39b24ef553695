//! Adapters binding the trigger runner/action consumer (`latchflow-runtime`)
//! to this crate's `Store`. Trigger events and action invocations are
//! append-only audit logs rather than admin-CRUD entities, so they live in
//! their own small in-memory logs here instead of on the `Store` trait.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use latchflow_runtime::{
    ActionDefinition, ActionDefinitionStore, ActionInvocation, InvocationRecorder, RuntimeError,
    TriggerEvent, TriggerMapping as RuntimeTriggerMapping, TriggerStore,
};

use crate::store::Store;

pub struct StoreActionDefinitions {
    store: Arc<dyn Store>,
}

impl StoreActionDefinitions {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ActionDefinitionStore for StoreActionDefinitions {
    async fn load_action_definition(&self, id: &str) -> Result<Option<ActionDefinition>, RuntimeError> {
        let row = self
            .store
            .get_action_definition(id)
            .await
            .map_err(|e| RuntimeError::Store(e.to_string()))?;
        Ok(row.map(|r| ActionDefinition {
            id: r.id,
            capability_id: r.capability_id,
            config: r.config,
        }))
    }
}

pub struct StoreTriggers {
    store: Arc<dyn Store>,
    events: DashMap<String, Vec<TriggerEvent>>,
}

impl StoreTriggers {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            events: DashMap::new(),
        }
    }

    #[must_use]
    pub fn events_for(&self, trigger_definition_id: &str) -> Vec<TriggerEvent> {
        self.events.get(trigger_definition_id).map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TriggerStore for StoreTriggers {
    async fn insert_trigger_event(&self, event: &TriggerEvent) -> Result<(), RuntimeError> {
        self.events
            .entry(event.trigger_definition_id.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn enabled_mappings(&self, trigger_definition_id: &str) -> Result<Vec<RuntimeTriggerMapping>, RuntimeError> {
        let mappings = self
            .store
            .enabled_trigger_mappings(trigger_definition_id)
            .await
            .map_err(|e| RuntimeError::Store(e.to_string()))?;
        Ok(mappings
            .into_iter()
            .map(|m| RuntimeTriggerMapping {
                action_definition_id: m.action_definition_id,
                sort_order: m.sort_order,
            })
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryInvocations {
    rows: DashMap<String, Vec<ActionInvocation>>,
}

impl InMemoryInvocations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn for_action(&self, action_definition_id: &str) -> Vec<ActionInvocation> {
        self.rows.get(action_definition_id).map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl InvocationRecorder for InMemoryInvocations {
    async fn record_invocation(&self, invocation: &ActionInvocation) -> Result<(), RuntimeError> {
        self.rows
            .entry(invocation.action_definition_id.clone())
            .or_default()
            .push(invocation.clone());
        Ok(())
    }
}
