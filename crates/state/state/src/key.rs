use serde::{Deserialize, Serialize};

/// The kind of process-wide state a key addresses.
///
/// A much smaller set than a general-purpose event-processing state store
/// needs: Latchflow's process-singleton state (§5, §9) is limited to the
/// rate limiter, the rebuild scheduler's debounce bookkeeping, and the
/// plug-in hot-reload watcher's in-flight/debounce tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// Input-guard sliding-window rate-limit sample buckets (§4.4).
    RateLimit,
    /// Anti-enumeration / login-attempt rate limiting for auth endpoints (§4.18).
    AuthRateLimit,
    /// Rebuild-scheduler per-bundle debounce/state-machine bookkeeping (§4.11).
    RebuildScheduler,
    /// Plug-in hot-reload per-plugin debounce/in-flight tracking (§4.12).
    PluginReload,
    Custom(String),
}

impl KeyKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::AuthRateLimit => "auth_rate_limit",
            Self::RebuildScheduler => "rebuild_scheduler",
            Self::PluginReload => "plugin_reload",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key used to address state entries. `scope` namespaces callers that
/// share a kind but not a key space (e.g. two rate-limited routes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub scope: String,
    pub kind: KeyKind,
    pub id: String,
}

impl StateKey {
    #[must_use]
    pub fn new(scope: impl Into<String>, kind: KeyKind, id: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            kind,
            id: id.into(),
        }
    }

    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}:{}:{}", self.scope, self.kind, self.id)
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_key_format() {
        let key = StateKey::new("latchflow", KeyKind::RateLimit, "hash:rule:user");
        assert_eq!(key.canonical(), "latchflow:rate_limit:hash:rule:user");
    }
}
