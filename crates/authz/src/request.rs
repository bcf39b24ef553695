use std::collections::HashMap;

use serde_json::Value;

/// The slice of an inbound request the authorizer and its guards need.
///
/// This is intentionally narrower than the full HTTP adapter `Request`
/// (`latchflow-http`) so that `latchflow-authz` has no dependency on the
/// HTTP layer; the adapter builds one of these per request.
#[derive(Debug, Clone, Default)]
pub struct RequestSnapshot {
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
}

impl RequestSnapshot {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The actor's role as resolved from session/token, reused from `latchflow-core`.
pub use latchflow_core::Role;

/// Authorization context: the resolved principal plus any route-scoped ids.
#[derive(Debug, Clone, Default)]
pub struct AuthzContext {
    pub user_id: String,
    pub role: Role,
    pub is_active: bool,
    pub bundle_id: Option<String>,
    pub pipeline_id: Option<String>,
    pub action_id: Option<String>,
}
