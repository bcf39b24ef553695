//! Deterministic canonicalization and hashing.
//!
//! Canonicalization establishes a byte-identical serialization for
//! arbitrary nested JSON-ish data so that semantically equal values
//! (same keys, same elements, different order) hash identically.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand_core::{OsRng, RngCore};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Recursively canonicalize a JSON value: object keys are sorted by
/// code-point order, and array elements are canonicalized first, then
/// the array itself is sorted by the serialized form of each element.
///
/// Sorting is stable, so two elements with identical serialized forms
/// keep their relative order.
#[must_use]
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().collect())
        }
        Value::Array(items) => {
            let mut canonicalized: Vec<Value> = items.iter().map(canonicalize).collect();
            canonicalized.sort_by(|a, b| {
                let sa = serde_json::to_string(a).unwrap_or_default();
                let sb = serde_json::to_string(b).unwrap_or_default();
                sa.cmp(&sb)
            });
            Value::Array(canonicalized)
        }
        other => other.clone(),
    }
}

/// Serialize a value to its canonical JSON string form.
#[must_use]
pub fn canonical_json_string(value: &Value) -> String {
    serde_json::to_string(&canonicalize(value)).unwrap_or_else(|_| "null".to_owned())
}

/// SHA-256 hex digest of arbitrary bytes.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 hex digest of a value's canonical JSON form.
///
/// This is the `hash = sha256(canonical(state))` operation used by the
/// change log to stamp each stored version.
#[must_use]
pub fn hash_canonical(value: &Value) -> String {
    sha256_hex(canonical_json_string(value).as_bytes())
}

/// Compute a stable rules-hash over a permission-rule sequence.
///
/// Each rule is deeply canonicalized (object keys sorted, nested arrays
/// sorted after recursive canonicalization) but the *outer* sequence
/// order is preserved — a ruleset is an ordered list, not a set. Rules
/// that fail to canonicalize (non-representable values) are logged and
/// skipped; if every rule fails, falls back to `fallback_hash` when
/// provided, else a time-seeded sentinel.
#[must_use]
pub fn compute_rules_hash(rules: &[Value], fallback_hash: Option<&str>) -> String {
    let mut canonicalized = Vec::with_capacity(rules.len());
    let mut any_skipped = false;
    for (index, rule) in rules.iter().enumerate() {
        match serde_json::to_string(rule) {
            Ok(_) => canonicalized.push(canonicalize(rule)),
            Err(err) => {
                warn!(rule_index = index, error = %err, "skipping rule that failed to canonicalize");
                any_skipped = true;
            }
        }
    }

    if canonicalized.is_empty() && any_skipped {
        if let Some(fallback) = fallback_hash {
            return fallback.to_owned();
        }
        return sentinel_hash();
    }

    let array = Value::Array(canonicalized);
    let json = serde_json::to_string(&array).unwrap_or_else(|_| "[]".to_owned());
    sha256_hex(json.as_bytes())
}

/// A time-seeded sentinel hash used only when canonicalization of an
/// entire ruleset fails and no caller-provided fallback hash exists.
/// Distinct per call so that a broken ruleset never silently collides
/// with a real rules-hash.
fn sentinel_hash() -> String {
    let mut rng = OsRng;
    let mut buf = [0u8; 16];
    rng.fill_bytes(&mut buf);
    sha256_hex(&buf)
}

/// Generate a random opaque token: 32 CSPRNG bytes, base64url without
/// padding. Used for session cookies, magic links, and API token secrets.
#[must_use]
pub fn generate_token() -> String {
    let mut rng = OsRng;
    let mut buf = [0u8; 32];
    rng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Generate a zero-padded decimal OTP of the given length using a CSPRNG.
///
/// Not required to be cryptographically uniform over `[0, 10^length)`,
/// but the underlying randomness source must be a CSPRNG.
#[must_use]
pub fn generate_otp(length: usize) -> String {
    let mut rng = OsRng;
    let max = 10u64.saturating_pow(u32::try_from(length).unwrap_or(6));
    let value = rng.next_u64() % max.max(1);
    format!("{value:0width$}", width = length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_are_sorted() {
        let v = json!({"b": 1, "a": 2});
        let c = canonicalize(&v);
        assert_eq!(canonical_json_string(&v), canonical_json_string(&c));
        assert_eq!(canonical_json_string(&v), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn array_elements_sorted_after_canonicalization() {
        let v = json!([{"b": 1, "a": 2}, {"a": 0}]);
        let s = canonical_json_string(&v);
        // canonicalized elements: {"a":0} and {"a":2,"b":1}; lexical sort by
        // serialized form puts {"a":0} first.
        assert_eq!(s, r#"[{"a":0},{"a":2,"b":1}]"#);
    }

    #[test]
    fn primitives_pass_through() {
        assert_eq!(canonical_json_string(&json!(42)), "42");
        assert_eq!(canonical_json_string(&json!("x")), "\"x\"");
        assert_eq!(canonical_json_string(&json!(null)), "null");
    }

    #[test]
    fn hash_is_deterministic_and_order_independent_for_keys() {
        let a = json!({"x": 1, "y": 2});
        let b = json!({"y": 2, "x": 1});
        assert_eq!(hash_canonical(&a), hash_canonical(&b));
    }

    #[test]
    fn hash_differs_when_array_order_differs_before_canonicalization_of_non_identical_elems() {
        let a = json!([1, 2, 3]);
        let b = json!([3, 2, 1]);
        // Arrays are sorted post-canonicalization, so numeric arrays with the
        // same multiset of scalars hash identically regardless of input order.
        assert_eq!(hash_canonical(&a), hash_canonical(&b));
    }

    #[test]
    fn rules_hash_is_64_char_hex() {
        let rules = vec![
            json!({"id": "one", "action": "read", "resource": "bundle"}),
            json!({"id": "two", "action": "update", "resource": "bundle", "where": {"bundleIds": ["a"]}}),
        ];
        let hash = compute_rules_hash(&rules, None);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn rules_hash_idempotent_under_key_reorder() {
        let rules_a = vec![json!({"id": "one", "action": "read", "resource": "bundle"})];
        let rules_b = vec![json!({"resource": "bundle", "id": "one", "action": "read"})];
        assert_eq!(
            compute_rules_hash(&rules_a, None),
            compute_rules_hash(&rules_b, None)
        );
    }

    #[test]
    fn rules_hash_changes_when_rule_order_changes() {
        let a = vec![json!({"id": "one"}), json!({"id": "two"})];
        let b = vec![json!({"id": "two"}), json!({"id": "one"})];
        assert_ne!(compute_rules_hash(&a, None), compute_rules_hash(&b, None));
    }

    #[test]
    fn token_generation_is_url_safe_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert!(!a.contains('+') && !a.contains('/') && !a.contains('='));
    }

    #[test]
    fn otp_is_zero_padded_to_length() {
        for _ in 0..20 {
            let otp = generate_otp(6);
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    proptest::proptest! {
        #[test]
        fn canonicalize_is_idempotent(v in arb_json_value(3)) {
            let once = canonicalize(&v);
            let twice = canonicalize(&once);
            proptest::prop_assert_eq!(once, twice);
        }
    }

    fn arb_json_value(depth: u32) -> impl proptest::strategy::Strategy<Value = Value> {
        use proptest::prelude::*;
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-z]{1,6}".prop_map(Value::String),
        ];
        if depth == 0 {
            leaf.boxed()
        } else {
            leaf.prop_recursive(depth, 16, 4, |inner| {
                prop_oneof![
                    proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                    proptest::collection::vec(("[a-z]{1,4}", inner), 0..4).prop_map(|entries| {
                        Value::Object(entries.into_iter().collect())
                    }),
                ]
            })
            .boxed()
        }
    }
}
