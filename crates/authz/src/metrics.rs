use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide authorization counters, mirroring the flat atomic-counter
/// facade used elsewhere in the workspace for in-process metrics that get
/// exported by the server's telemetry layer.
#[derive(Debug, Default)]
pub struct AuthzMetrics {
    pub decisions_allow: AtomicU64,
    pub decisions_deny: AtomicU64,
    pub decisions_shadow: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub cache_invalidations: AtomicU64,
    pub compilations: AtomicU64,
    pub two_factor_challenge_required: AtomicU64,
    pub two_factor_session_expired: AtomicU64,
    pub two_factor_challenge_satisfied: AtomicU64,
    pub simulations: AtomicU64,
}

impl AuthzMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_decision(&self, allowed: bool, shadow: bool) {
        if shadow {
            self.decisions_shadow.fetch_add(1, Ordering::Relaxed);
        }
        if allowed {
            self.decisions_allow.fetch_add(1, Ordering::Relaxed);
        } else {
            self.decisions_deny.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_invalidate(&self) {
        self.cache_invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compilation(&self) {
        self.compilations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_simulation(&self) {
        self.simulations.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_counters_increment_independently() {
        let metrics = AuthzMetrics::new();
        metrics.record_decision(true, false);
        metrics.record_decision(false, true);
        assert_eq!(metrics.decisions_allow.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.decisions_deny.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.decisions_shadow.load(Ordering::Relaxed), 1);
    }
}
