use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A queued unit of action work (§4.13).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionMessage {
    pub action_definition_id: String,
    pub trigger_event_id: Option<String>,
    pub manual_invoker_id: Option<String>,
    pub context: Option<Value>,
}

impl ActionMessage {
    #[must_use]
    pub fn new(action_definition_id: impl Into<String>) -> Self {
        Self {
            action_definition_id: action_definition_id.into(),
            trigger_event_id: None,
            manual_invoker_id: None,
            context: None,
        }
    }

    #[must_use]
    pub fn with_trigger_event(mut self, trigger_event_id: impl Into<String>) -> Self {
        self.trigger_event_id = Some(trigger_event_id.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}
