use std::collections::BTreeMap;

use latchflow_core::compute_rules_hash;
use serde_json::Value;

use crate::rule::{CompiledRule, PermissionRule};

/// The result of compiling a permission list: a stable hash plus a
/// resource/action bucket index for O(1) candidate-rule lookup.
#[derive(Debug, Clone)]
pub struct CompiledPermissions {
    pub rules_hash: String,
    pub rules: Vec<CompiledRule>,
    pub buckets: BTreeMap<String, BTreeMap<String, Vec<usize>>>,
}

impl CompiledPermissions {
    /// Candidate rules for `(resource, action)`: the resource-specific bucket
    /// followed by the wildcard bucket, preserving input order within each.
    ///
    /// The `"*"` bucket also holds every non-wildcard rule (so a query whose
    /// own resource is `"*"` sees all of them in O(1)); when `resource` is
    /// concrete, only the genuinely wildcard-resource rules are pulled from
    /// it, so a rule already emitted from its own resource bucket isn't
    /// counted twice.
    #[must_use]
    pub fn candidates(&self, resource: &str, action: &str) -> Vec<&CompiledRule> {
        let mut out = Vec::new();
        if let Some(by_action) = self.buckets.get(resource) {
            if let Some(indices) = by_action.get(action) {
                out.extend(indices.iter().map(|&i| &self.rules[i]));
            }
        }
        if resource != "*" {
            if let Some(by_action) = self.buckets.get("*") {
                if let Some(indices) = by_action.get(action) {
                    out.extend(
                        indices
                            .iter()
                            .map(|&i| &self.rules[i])
                            .filter(|rule| rule.resource == "*"),
                    );
                }
            }
        }
        out
    }
}

/// Compile a permission list into buckets + a stable rules-hash.
///
/// Entries that aren't representable as a rule object, or that lack an
/// `action`, are skipped. Ids are assigned deterministically when absent:
/// `"{resource}:{action}:{index}"` using the rule's position in the input.
#[must_use]
pub fn compile(rules: &[PermissionRule]) -> CompiledPermissions {
    let mut compiled = Vec::with_capacity(rules.len());
    let mut buckets: BTreeMap<String, BTreeMap<String, Vec<usize>>> = BTreeMap::new();

    for (index, rule) in rules.iter().enumerate() {
        if rule.action.is_empty() {
            continue;
        }
        let id = rule
            .id
            .clone()
            .unwrap_or_else(|| format!("{}:{}:{index}", rule.resource, rule.action));

        let compiled_rule = CompiledRule {
            id,
            source: rule.source,
            action: rule.action.clone(),
            resource: rule.resource.clone(),
            r#where: rule.r#where.clone(),
            input: rule.input.clone(),
        };

        let position = compiled.len();
        buckets
            .entry(compiled_rule.resource.clone())
            .or_default()
            .entry(compiled_rule.action.clone())
            .or_default()
            .push(position);
        if compiled_rule.resource != "*" {
            buckets
                .entry("*".to_owned())
                .or_default()
                .entry(compiled_rule.action.clone())
                .or_default()
                .push(position);
        }

        compiled.push(compiled_rule);
    }

    let rule_values: Vec<Value> = compiled
        .iter()
        .map(|r| serde_json::to_value(r).unwrap_or(Value::Null))
        .collect();
    let rules_hash = compute_rules_hash(&rule_values, None);

    CompiledPermissions {
        rules_hash,
        rules: compiled,
        buckets,
    }
}
