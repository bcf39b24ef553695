use std::sync::Arc;

use dashmap::DashMap;

use crate::compiler::{CompiledPermissions, compile};
use crate::rule::PermissionRule;

/// Process-global `rulesHash -> CompiledPermissions` cache.
///
/// Lock-free concurrent reads via `DashMap`; concurrent compilations of the
/// same hash may duplicate work but always converge to an identical value,
/// since compilation is pure.
#[derive(Debug, Default)]
pub struct CompiledRuleCache {
    entries: DashMap<String, Arc<CompiledPermissions>>,
}

impl CompiledRuleCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Look up by `desired_hash` first (if given); on miss, compile and store
    /// under both the desired hash and the compiler-computed hash, guarding
    /// against a caller supplying a stale hash for the same rule bytes.
    pub fn get_or_compile(
        &self,
        rules: &[PermissionRule],
        desired_hash: Option<&str>,
    ) -> Arc<CompiledPermissions> {
        if let Some(hash) = desired_hash {
            if let Some(hit) = self.entries.get(hash) {
                return Arc::clone(&hit);
            }
        }

        let compiled = Arc::new(compile(rules));
        if let Some(hash) = desired_hash {
            self.entries
                .insert(hash.to_owned(), Arc::clone(&compiled));
        }
        self.entries
            .insert(compiled.rules_hash.clone(), Arc::clone(&compiled));
        compiled
    }

    /// Remove every entry whose key, or whose compiled `rules_hash`, equals
    /// `rules_hash`.
    pub fn invalidate(&self, rules_hash: &str) {
        self.entries
            .retain(|key, value| key != rules_hash && value.rules_hash != rules_hash);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleSource;

    fn rules() -> Vec<PermissionRule> {
        vec![PermissionRule {
            id: Some("one".to_owned()),
            source: RuleSource::Direct,
            action: "read".to_owned(),
            resource: "bundle".to_owned(),
            r#where: None,
            input: None,
        }]
    }

    #[test]
    fn repeated_lookup_returns_same_instance() {
        let cache = CompiledRuleCache::new();
        let rules = rules();
        let first = cache.get_or_compile(&rules, None);
        let second = cache.get_or_compile(&rules, Some(&first.rules_hash));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn invalidate_then_recompile_yields_identical_hash() {
        let cache = CompiledRuleCache::new();
        let rules = rules();
        let first = cache.get_or_compile(&rules, None);
        cache.invalidate(&first.rules_hash);
        assert!(cache.is_empty());
        let second = cache.get_or_compile(&rules, None);
        assert_eq!(first.rules_hash, second.rules_hash);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn stale_desired_hash_does_not_poison_the_cache() {
        let cache = CompiledRuleCache::new();
        let rules = rules();
        let compiled = cache.get_or_compile(&rules, Some("stale-hash"));
        // both the stale key and the real hash should resolve to the same value
        let via_stale = cache.get_or_compile(&rules, Some("stale-hash"));
        let via_real = cache.get_or_compile(&rules, Some(&compiled.rules_hash));
        assert!(Arc::ptr_eq(&via_stale, &via_real));
    }
}
