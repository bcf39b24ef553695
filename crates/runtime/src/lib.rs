//! Trigger runner and action consumer (§4.14-4.15 / C14-C15).
//!
//! Sits between the work queue (`latchflow-queue`) and the plug-in
//! registry (`latchflow-plugins`): the trigger runner records events and
//! fans out onto the queue, the action consumer drains it and invokes
//! plug-in capabilities.

pub mod consumer;
pub mod error;
pub mod trigger;

pub use consumer::{ActionConsumer, ActionDefinition, ActionDefinitionStore, ActionInvocation, InvocationRecorder, InvocationStatus};
pub use error::RuntimeError;
pub use trigger::{TriggerEvent, TriggerMapping, TriggerStore, fire_trigger_once};
