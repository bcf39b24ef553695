//! Capability and runtime shapes a plug-in exposes (§4.12).

use async_trait::async_trait;
use serde_json::Value;

use crate::error::PluginError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    Trigger,
    Action,
}

/// One capability a plug-in exports. `config_schema` is opaque JSON Schema
/// used only to validate a consumer's config before materializing a
/// runtime; this crate does not itself enforce it (that's §4.12's scope
/// note: "Out of scope beyond the interface shape" for provider-style
/// extension points, which this mirrors).
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    pub kind: CapabilityKind,
    pub key: String,
    pub display_name: String,
    pub config_schema: Option<Value>,
}

/// A running trigger instance. `on_config_change`/`dispose` are optional in
/// the spec ("...`onConfigChange?/dispose?`"); default impls make them
/// no-ops so implementors only override what they need.
#[async_trait]
pub trait TriggerRuntime: Send + Sync {
    async fn start(&self) -> Result<(), PluginError>;
    async fn stop(&self) -> Result<(), PluginError>;

    async fn on_config_change(&self, _config: &Value) -> Result<(), PluginError> {
        Ok(())
    }

    async fn dispose(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Outcome of an action's `execute`, including the optional retry request
/// from §4.15: "Retry returned by the action reschedules the same message
/// after `delayMs`".
#[derive(Debug, Clone, PartialEq)]
pub struct RetryRequest {
    pub delay_ms: Option<u64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecuteOutcome {
    pub output: Option<Value>,
    pub retry: Option<RetryRequest>,
}

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, input: Value) -> Result<ExecuteOutcome, PluginError>;
}

/// Produces a [`TriggerRuntime`] bound to a specific capability + config.
/// Factories are what the registry indexes by `capability_id`, not the
/// runtimes themselves — each call to `create` may mint a fresh instance.
pub trait TriggerFactory: Send + Sync {
    fn create(&self, config: Value) -> Result<Box<dyn TriggerRuntime>, PluginError>;
}

pub trait ActionFactory: Send + Sync {
    fn create(&self, config: Value) -> Result<Box<dyn ActionExecutor>, PluginError>;
}
