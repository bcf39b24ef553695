//! Action consumer (§4.15 / C15).
//!
//! Registered once with the work queue, this is the thing that actually
//! does something: it loads the action definition, resolves its capability
//! factory from the plug-in registry, materializes (and optionally
//! decrypts) config, invokes `execute`, and records an `ActionInvocation`.
//! A `Retry` outcome from the plug-in is translated into the queue's own
//! `HandleOutcome::Retry` so the message is redelivered after the
//! requested delay without the consumer blocking on it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{error, info, warn};

use latchflow_crypto::{MasterKey, SecretString, is_encrypted};
use latchflow_plugins::PluginRegistry;
use latchflow_queue::{ActionHandler, ActionMessage, HandleOutcome};

use crate::error::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStatus {
    Success,
    Failed,
    Retry,
}

/// A recorded attempt at executing an action (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct ActionInvocation {
    pub id: String,
    pub action_definition_id: String,
    pub trigger_event_id: Option<String>,
    pub manual_invoker_id: Option<String>,
    pub status: InvocationStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub output: Option<Value>,
    pub error: Option<String>,
}

/// An action definition as loaded from persistence: which capability it
/// binds to and its (possibly per-field encrypted) config.
#[derive(Debug, Clone)]
pub struct ActionDefinition {
    pub id: String,
    pub capability_id: String,
    pub config: Value,
}

#[async_trait]
pub trait ActionDefinitionStore: Send + Sync {
    async fn load_action_definition(&self, id: &str) -> Result<Option<ActionDefinition>, RuntimeError>;
}

#[async_trait]
pub trait InvocationRecorder: Send + Sync {
    async fn record_invocation(&self, invocation: &ActionInvocation) -> Result<(), RuntimeError>;
}

/// Drains the action queue: loads the definition, resolves the factory,
/// executes, and records the outcome.
pub struct ActionConsumer {
    definitions: std::sync::Arc<dyn ActionDefinitionStore>,
    recorder: std::sync::Arc<dyn InvocationRecorder>,
    registry: std::sync::Arc<PluginRegistry>,
    master_key: Option<MasterKey>,
}

impl ActionConsumer {
    #[must_use]
    pub fn new(
        definitions: std::sync::Arc<dyn ActionDefinitionStore>,
        recorder: std::sync::Arc<dyn InvocationRecorder>,
        registry: std::sync::Arc<PluginRegistry>,
        master_key: Option<MasterKey>,
    ) -> Self {
        Self {
            definitions,
            recorder,
            registry,
            master_key,
        }
    }

    /// Decrypt every `ENC[...]` string leaf in a config object in place,
    /// per §4.8's encryption wrapper note applied to plug-in config
    /// secrets. A config containing encrypted values with no master key
    /// configured is a fatal configuration error (§4.8).
    fn materialize_config(&self, config: &Value) -> Result<Value, RuntimeError> {
        match config {
            Value::String(s) if is_encrypted(s) => {
                let key = self
                    .master_key
                    .as_ref()
                    .ok_or_else(|| RuntimeError::Crypto("encrypted config present but no master key configured".into()))?;
                let plain: SecretString = latchflow_crypto::decrypt_value(s, key)
                    .map_err(|e| RuntimeError::Crypto(e.to_string()))?;
                use latchflow_crypto::ExposeSecret;
                Ok(Value::String(plain.expose_secret().to_owned()))
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), self.materialize_config(v)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.materialize_config(item)?);
                }
                Ok(Value::Array(out))
            }
            other => Ok(other.clone()),
        }
    }

    async fn process(&self, message: ActionMessage) -> HandleOutcome {
        let started_at = Utc::now();
        let invocation_id = latchflow_core::generate_token();

        let outcome = self.try_execute(&message).await;

        let (status, output, error, retry) = match outcome {
            Ok(ExecResult::Success(output)) => (InvocationStatus::Success, output, None, None),
            Ok(ExecResult::Retry(delay_ms)) => {
                (InvocationStatus::Retry, None, None, Some(delay_ms))
            }
            Err(e) => {
                error!(action_definition_id = %message.action_definition_id, error = %e, "action invocation failed");
                (InvocationStatus::Failed, None, Some(e.to_string()), None)
            }
        };

        let invocation = ActionInvocation {
            id: invocation_id,
            action_definition_id: message.action_definition_id.clone(),
            trigger_event_id: message.trigger_event_id.clone(),
            manual_invoker_id: message.manual_invoker_id.clone(),
            status,
            started_at,
            finished_at: Some(Utc::now()),
            output,
            error,
        };

        if let Err(e) = self.recorder.record_invocation(&invocation).await {
            warn!(error = %e, "failed to record action invocation");
        }

        if status == InvocationStatus::Success {
            info!(action_definition_id = %message.action_definition_id, "action invocation succeeded");
        }

        match retry {
            Some(delay_ms) => HandleOutcome::Retry { delay_ms },
            None => HandleOutcome::Done,
        }
    }

    async fn try_execute(&self, message: &ActionMessage) -> Result<ExecResult, RuntimeError> {
        let definition = self
            .definitions
            .load_action_definition(&message.action_definition_id)
            .await?
            .ok_or_else(|| RuntimeError::ActionNotFound(message.action_definition_id.clone()))?;

        let lookup = self
            .registry
            .get_action_by_id(&definition.capability_id)
            .ok_or_else(|| RuntimeError::CapabilityNotRegistered(definition.capability_id.clone()))?;

        let config = self.materialize_config(&definition.config)?;
        let executor = lookup.factory.create(config)?;

        let input = message.context.clone().unwrap_or(Value::Null);
        let outcome = executor.execute(input).await?;

        if let Some(retry) = outcome.retry {
            return Ok(ExecResult::Retry(retry.delay_ms.unwrap_or(0)));
        }
        Ok(ExecResult::Success(outcome.output))
    }
}

enum ExecResult {
    Success(Option<Value>),
    Retry(u64),
}

#[async_trait]
impl ActionHandler for ActionConsumer {
    async fn handle(&self, message: ActionMessage) -> HandleOutcome {
        self.process(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latchflow_plugins::{
        ActionExecutor, ActionFactory, Capability, CapabilityKind, ExecuteOutcome, RetryRequest,
    };
    use latchflow_plugins::registry::ActionRegistration;
    use std::sync::{Arc, Mutex};

    struct StubExecutor {
        retry_once: Mutex<bool>,
    }

    #[async_trait]
    impl ActionExecutor for StubExecutor {
        async fn execute(&self, input: Value) -> Result<ExecuteOutcome, latchflow_plugins::PluginError> {
            let mut retry = self.retry_once.lock().unwrap();
            if *retry {
                *retry = false;
                return Ok(ExecuteOutcome {
                    output: None,
                    retry: Some(RetryRequest { delay_ms: Some(5), reason: Some("backoff".into()) }),
                });
            }
            Ok(ExecuteOutcome { output: Some(input), retry: None })
        }
    }

    struct StubFactory {
        retry_once: bool,
    }

    impl ActionFactory for StubFactory {
        fn create(&self, _config: Value) -> Result<Box<dyn ActionExecutor>, latchflow_plugins::PluginError> {
            Ok(Box::new(StubExecutor { retry_once: Mutex::new(self.retry_once) }))
        }
    }

    struct FakeDefs(ActionDefinition);
    #[async_trait]
    impl ActionDefinitionStore for FakeDefs {
        async fn load_action_definition(&self, id: &str) -> Result<Option<ActionDefinition>, RuntimeError> {
            if id == self.0.id {
                Ok(Some(self.0.clone()))
            } else {
                Ok(None)
            }
        }
    }

    #[derive(Default)]
    struct FakeRecorder {
        recorded: Mutex<Vec<ActionInvocation>>,
    }
    #[async_trait]
    impl InvocationRecorder for FakeRecorder {
        async fn record_invocation(&self, invocation: &ActionInvocation) -> Result<(), RuntimeError> {
            self.recorded.lock().unwrap().push(invocation.clone());
            Ok(())
        }
    }

    fn registry_with(retry_once: bool) -> Arc<PluginRegistry> {
        let registry = PluginRegistry::new();
        registry.register_action(ActionRegistration {
            plugin_name: "p".into(),
            plugin_id: "p-1".into(),
            capability_id: "cap-1".into(),
            capability: Capability {
                kind: CapabilityKind::Action,
                key: "cap".into(),
                display_name: "cap".into(),
                config_schema: None,
            },
            factory: Arc::new(StubFactory { retry_once }),
        });
        Arc::new(registry)
    }

    #[tokio::test]
    async fn success_records_success_invocation() {
        let defs = Arc::new(FakeDefs(ActionDefinition {
            id: "act-1".into(),
            capability_id: "cap-1".into(),
            config: Value::Null,
        }));
        let recorder = Arc::new(FakeRecorder::default());
        let consumer = ActionConsumer::new(defs, recorder.clone(), registry_with(false), None);

        let outcome = consumer.handle(ActionMessage::new("act-1")).await;
        assert_eq!(outcome, HandleOutcome::Done);
        let recorded = recorder.recorded.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].status, InvocationStatus::Success);
    }

    #[tokio::test]
    async fn retry_outcome_propagates_delay() {
        let defs = Arc::new(FakeDefs(ActionDefinition {
            id: "act-1".into(),
            capability_id: "cap-1".into(),
            config: Value::Null,
        }));
        let recorder = Arc::new(FakeRecorder::default());
        let consumer = ActionConsumer::new(defs, recorder, registry_with(true), None);

        let outcome = consumer.handle(ActionMessage::new("act-1")).await;
        assert_eq!(outcome, HandleOutcome::Retry { delay_ms: 5 });
    }

    #[tokio::test]
    async fn missing_definition_records_failure() {
        let defs = Arc::new(FakeDefs(ActionDefinition {
            id: "other".into(),
            capability_id: "cap-1".into(),
            config: Value::Null,
        }));
        let recorder = Arc::new(FakeRecorder::default());
        let consumer = ActionConsumer::new(defs, recorder.clone(), registry_with(false), None);

        let outcome = consumer.handle(ActionMessage::new("act-1")).await;
        assert_eq!(outcome, HandleOutcome::Done);
        let recorded = recorder.recorded.lock().unwrap();
        assert_eq!(recorded[0].status, InvocationStatus::Failed);
    }
}
