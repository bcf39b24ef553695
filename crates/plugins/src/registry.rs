//! Capability registry: `registerTrigger`/`registerAction` indexed by
//! `capabilityId`, with `removePlugin` tearing down a plug-in's running
//! instances before dropping its entries (§4.12).
//!
//! Grounded on `ProviderRegistry`'s `HashMap`-keyed-by-name shape, extended
//! with per-plug-in grouping so `removePlugin` can find every capability
//! a given plug-in registered.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::capability::{ActionFactory, Capability, TriggerFactory};

struct TriggerEntry {
    plugin_name: String,
    plugin_id: String,
    capability: Capability,
    factory: Arc<dyn TriggerFactory>,
}

struct ActionEntry {
    plugin_name: String,
    plugin_id: String,
    capability: Capability,
    factory: Arc<dyn ActionFactory>,
}

/// Registration request mirroring §4.12's
/// `{pluginName, pluginId, capabilityId, capability, factory}` shape.
pub struct TriggerRegistration {
    pub plugin_name: String,
    pub plugin_id: String,
    pub capability_id: String,
    pub capability: Capability,
    pub factory: Arc<dyn TriggerFactory>,
}

pub struct ActionRegistration {
    pub plugin_name: String,
    pub plugin_id: String,
    pub capability_id: String,
    pub capability: Capability,
    pub factory: Arc<dyn ActionFactory>,
}

/// What callers get back from `get_trigger_by_id`/`get_action_by_id`: the
/// capability's metadata plus a factory to materialize a runtime from it.
pub struct TriggerLookup {
    pub capability: Capability,
    pub factory: Arc<dyn TriggerFactory>,
}

pub struct ActionLookup {
    pub capability: Capability,
    pub factory: Arc<dyn ActionFactory>,
}

#[derive(Default)]
pub struct PluginRegistry {
    triggers: DashMap<String, TriggerEntry>,
    actions: DashMap<String, ActionEntry>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_trigger(&self, reg: TriggerRegistration) {
        self.triggers.insert(
            reg.capability_id,
            TriggerEntry {
                plugin_name: reg.plugin_name,
                plugin_id: reg.plugin_id,
                capability: reg.capability,
                factory: reg.factory,
            },
        );
    }

    pub fn register_action(&self, reg: ActionRegistration) {
        self.actions.insert(
            reg.capability_id,
            ActionEntry {
                plugin_name: reg.plugin_name,
                plugin_id: reg.plugin_id,
                capability: reg.capability,
                factory: reg.factory,
            },
        );
    }

    #[must_use]
    pub fn get_trigger_by_id(&self, capability_id: &str) -> Option<TriggerLookup> {
        self.triggers.get(capability_id).map(|e| TriggerLookup {
            capability: e.capability.clone(),
            factory: e.factory.clone(),
        })
    }

    #[must_use]
    pub fn get_action_by_id(&self, capability_id: &str) -> Option<ActionLookup> {
        self.actions.get(capability_id).map(|e| ActionLookup {
            capability: e.capability.clone(),
            factory: e.factory.clone(),
        })
    }

    /// Remove every trigger/action capability registered by `plugin_name`.
    /// Tearing down live runtime instances is the caller's responsibility
    /// (the registry only holds factories, not running instances) — the
    /// hot-reload watcher is what actually stops runtimes before calling
    /// this.
    pub fn remove_plugin(&self, plugin_name: &str) {
        self.triggers.retain(|_, e| e.plugin_name != plugin_name);
        self.actions.retain(|_, e| e.plugin_name != plugin_name);
    }

    #[must_use]
    pub fn plugin_ids(&self, plugin_name: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .triggers
            .iter()
            .filter(|e| e.plugin_name == plugin_name)
            .map(|e| e.plugin_id.clone())
            .chain(
                self.actions
                    .iter()
                    .filter(|e| e.plugin_name == plugin_name)
                    .map(|e| e.plugin_id.clone()),
            )
            .collect::<HashMap<_, ()>>()
            .into_keys()
            .collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.triggers.len() + self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityKind, ExecuteOutcome, ActionExecutor, TriggerRuntime};
    use async_trait::async_trait;
    use serde_json::Value;

    struct StubTrigger;
    #[async_trait]
    impl TriggerRuntime for StubTrigger {
        async fn start(&self) -> Result<(), crate::error::PluginError> {
            Ok(())
        }
        async fn stop(&self) -> Result<(), crate::error::PluginError> {
            Ok(())
        }
    }

    struct StubTriggerFactory;
    impl TriggerFactory for StubTriggerFactory {
        fn create(&self, _config: Value) -> Result<Box<dyn TriggerRuntime>, crate::error::PluginError> {
            Ok(Box::new(StubTrigger))
        }
    }

    struct StubAction;
    #[async_trait]
    impl ActionExecutor for StubAction {
        async fn execute(&self, _input: Value) -> Result<ExecuteOutcome, crate::error::PluginError> {
            Ok(ExecuteOutcome::default())
        }
    }

    struct StubActionFactory;
    impl ActionFactory for StubActionFactory {
        fn create(&self, _config: Value) -> Result<Box<dyn ActionExecutor>, crate::error::PluginError> {
            Ok(Box::new(StubAction))
        }
    }

    fn capability(key: &str, kind: CapabilityKind) -> Capability {
        Capability {
            kind,
            key: key.to_owned(),
            display_name: key.to_owned(),
            config_schema: None,
        }
    }

    #[test]
    fn register_and_lookup_trigger() {
        let registry = PluginRegistry::new();
        registry.register_trigger(TriggerRegistration {
            plugin_name: "webhook-plugin".into(),
            plugin_id: "plugin-1".into(),
            capability_id: "webhook.trigger".into(),
            capability: capability("webhook", CapabilityKind::Trigger),
            factory: Arc::new(StubTriggerFactory),
        });

        assert!(registry.get_trigger_by_id("webhook.trigger").is_some());
        assert!(registry.get_trigger_by_id("missing").is_none());
    }

    #[test]
    fn remove_plugin_drops_all_its_capabilities() {
        let registry = PluginRegistry::new();
        registry.register_trigger(TriggerRegistration {
            plugin_name: "p".into(),
            plugin_id: "id-1".into(),
            capability_id: "p.trigger".into(),
            capability: capability("t", CapabilityKind::Trigger),
            factory: Arc::new(StubTriggerFactory),
        });
        registry.register_action(ActionRegistration {
            plugin_name: "p".into(),
            plugin_id: "id-1".into(),
            capability_id: "p.action".into(),
            capability: capability("a", CapabilityKind::Action),
            factory: Arc::new(StubActionFactory),
        });
        registry.register_trigger(TriggerRegistration {
            plugin_name: "other".into(),
            plugin_id: "id-2".into(),
            capability_id: "other.trigger".into(),
            capability: capability("t2", CapabilityKind::Trigger),
            factory: Arc::new(StubTriggerFactory),
        });

        registry.remove_plugin("p");

        assert!(registry.get_trigger_by_id("p.trigger").is_none());
        assert!(registry.get_action_by_id("p.action").is_none());
        assert!(registry.get_trigger_by_id("other.trigger").is_some());
    }
}
