//! Plug-in capability registry and directory hot-reload (§4.12 / C12).

pub mod capability;
pub mod error;
pub mod registry;
pub mod watcher;

pub use capability::{
    ActionExecutor, ActionFactory, Capability, CapabilityKind, ExecuteOutcome, RetryRequest, TriggerFactory, TriggerRuntime,
};
pub use error::PluginError;
pub use registry::{ActionLookup, ActionRegistration, PluginRegistry, TriggerLookup, TriggerRegistration};
pub use watcher::{PluginLoader, PluginWatcher, DEFAULT_DEBOUNCE};
