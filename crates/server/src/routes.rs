//! Static route → `PolicyEntry` table (§3 "Policy entry", §4.6, §4.16).
//! Looked up by `"METHOD /path"` signature once the path params have been
//! matched, before `require_permission` runs.

use std::collections::HashMap;
use std::sync::OnceLock;

use latchflow_authz::PolicyEntry;

fn entry(action: &str, resource: &str, v1_allow_executor: bool) -> PolicyEntry {
    PolicyEntry {
        action: action.to_owned(),
        resource: resource.to_owned(),
        v1_allow_executor,
    }
}

/// The fixed route table. Built once and cached — the set of routes is
/// compiled into the binary, not configured at runtime.
fn table() -> &'static HashMap<&'static str, PolicyEntry> {
    static TABLE: OnceLock<HashMap<&'static str, PolicyEntry>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut m = HashMap::new();

        m.insert("GET /admin/bundles", entry("read", "bundle", true));
        m.insert("POST /admin/bundles", entry("create", "bundle", false));
        m.insert("PUT /admin/bundles/:id", entry("update", "bundle", false));
        m.insert("DELETE /admin/bundles/:id", entry("delete", "bundle", false));
        m.insert("POST /admin/bundles/:id/objects", entry("update", "bundle", false));
        m.insert("DELETE /admin/bundles/:id/objects/:objectId", entry("update", "bundle", false));
        m.insert("POST /admin/bundles/:id/build", entry("update", "bundle", false));
        m.insert("GET /admin/bundles/:id/build/status", entry("read", "bundle", true));

        m.insert("GET /admin/pipelines", entry("read", "pipeline", true));
        m.insert("POST /admin/pipelines", entry("create", "pipeline", false));
        m.insert("PUT /admin/pipelines/:id", entry("update", "pipeline", false));
        m.insert("DELETE /admin/pipelines/:id", entry("delete", "pipeline", false));

        m.insert("GET /admin/users", entry("read", "user", false));
        m.insert("POST /admin/users", entry("create", "user", false));
        m.insert("PUT /admin/users/:id", entry("update", "user", false));
        m.insert("DELETE /admin/users/:id", entry("delete", "user", false));

        m.insert("GET /admin/presets", entry("read", "preset", false));
        m.insert("POST /admin/presets", entry("create", "preset", false));
        m.insert("PUT /admin/presets/:id", entry("update", "preset", false));
        m.insert("POST /admin/presets/:id/activate", entry("update", "preset", false));
        m.insert("DELETE /admin/presets/:id", entry("delete", "preset", false));

        m.insert("GET /admin/triggers", entry("read", "trigger", true));
        m.insert("POST /admin/triggers", entry("create", "trigger", false));
        m.insert("PUT /admin/triggers/:id", entry("update", "trigger", false));
        m.insert("DELETE /admin/triggers/:id", entry("delete", "trigger", false));
        m.insert("POST /admin/trigger-mappings", entry("create", "trigger", false));
        m.insert("DELETE /admin/trigger-mappings/:id", entry("delete", "trigger", false));

        m.insert("GET /admin/actions", entry("read", "action", true));
        m.insert("POST /admin/actions", entry("create", "action", false));
        m.insert("PUT /admin/actions/:id", entry("update", "action", false));
        m.insert("DELETE /admin/actions/:id", entry("delete", "action", false));

        m.insert("GET /admin/assignments", entry("read", "assignment", true));
        m.insert("POST /admin/assignments", entry("create", "assignment", false));
        m.insert("PUT /admin/assignments/:id", entry("update", "assignment", false));
        m.insert("DELETE /admin/assignments/:id", entry("delete", "assignment", false));

        m.insert("GET /admin/recipients", entry("read", "recipient", true));
        m.insert("POST /admin/recipients", entry("create", "recipient", false));
        m.insert("PUT /admin/recipients/:id", entry("update", "recipient", false));
        m.insert("DELETE /admin/recipients/:id", entry("delete", "recipient", false));

        m.insert("GET /admin/files", entry("read", "file", true));
        m.insert("POST /admin/files", entry("create", "file", false));
        m.insert("DELETE /admin/files/:id", entry("delete", "file", false));

        m.insert("POST /admin/permissions/simulate", entry("simulate", "permission", false));

        m
    })
}

/// Resolve the policy entry for a concrete request, given its raw path
/// template (already parameterized, e.g. `/admin/bundles/:id`).
#[must_use]
pub fn resolve(method: &str, path_template: &str) -> Option<&'static PolicyEntry> {
    let signature = format!("{} {}", method.to_ascii_uppercase(), path_template);
    table().get(signature.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_route() {
        let entry = resolve("GET", "/admin/bundles").expect("route present");
        assert_eq!(entry.resource, "bundle");
        assert_eq!(entry.action, "read");
        assert!(entry.v1_allow_executor);
    }

    #[test]
    fn unknown_route_resolves_to_none() {
        assert!(resolve("GET", "/admin/nonexistent").is_none());
    }

    #[test]
    fn write_routes_do_not_allow_executor_by_default() {
        let entry = resolve("POST", "/admin/bundles").expect("route present");
        assert!(!entry.v1_allow_executor);
    }
}
