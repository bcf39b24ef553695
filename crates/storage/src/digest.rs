//! Bundle digest computation (§4.9 / C9).
//!
//! The digest is the sha256 of the canonical JSON array of a bundle's
//! enabled file assignments, ordered `(sortOrder asc, id asc)`. It drives
//! the scheduler's skip-if-unchanged check (§4.11) and is what changes
//! when — and only when — a rebuild would actually change the archive.

use serde::Serialize;
use sha2::{Digest as _, Sha256};

/// One bundle file assignment as seen by digest computation. Disabled
/// assignments are filtered out by the caller before calling
/// [`compute_bundle_digest`]; this type only carries what the digest
/// itself is a function of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleFileAssignment {
    pub file_id: String,
    pub content_hash: Option<String>,
    pub path: String,
    pub required: bool,
    pub sort_order: i64,
    pub is_enabled: bool,
}

#[derive(Serialize)]
struct DigestEntry<'a> {
    #[serde(rename = "fileId")]
    file_id: &'a str,
    #[serde(rename = "contentHash")]
    content_hash: &'a str,
    path: &'a str,
    required: bool,
    #[serde(rename = "sortOrder")]
    sort_order: i64,
}

/// Compute the bundle digest: sha256 over the canonical JSON array of
/// enabled assignments ordered by `(sortOrder asc, id asc)`, with a
/// missing `contentHash` rendered as `""` (§4.9).
#[must_use]
pub fn compute_bundle_digest(assignments: &[BundleFileAssignment]) -> String {
    let mut enabled: Vec<&BundleFileAssignment> = assignments.iter().filter(|a| a.is_enabled).collect();
    enabled.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.file_id.cmp(&b.file_id)));

    let entries: Vec<DigestEntry> = enabled
        .iter()
        .map(|a| DigestEntry {
            file_id: &a.file_id,
            content_hash: a.content_hash.as_deref().unwrap_or(""),
            path: &a.path,
            required: a.required,
            sort_order: a.sort_order,
        })
        .collect();

    let json = serde_json::to_string(&entries).expect("digest entries are always serializable");
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(file_id: &str, sort_order: i64, enabled: bool) -> BundleFileAssignment {
        BundleFileAssignment {
            file_id: file_id.to_owned(),
            content_hash: Some(format!("hash-{file_id}")),
            path: format!("/{file_id}.txt"),
            required: true,
            sort_order,
            is_enabled: enabled,
        }
    }

    #[test]
    fn disabled_assignments_are_excluded() {
        let with_disabled = vec![assignment("a", 0, true), assignment("b", 1, false)];
        let without_disabled = vec![assignment("a", 0, true)];
        assert_eq!(
            compute_bundle_digest(&with_disabled),
            compute_bundle_digest(&without_disabled)
        );
    }

    #[test]
    fn ordering_is_by_sort_order_then_id_not_input_order() {
        let in_order = vec![assignment("a", 0, true), assignment("b", 1, true)];
        let out_of_order = vec![assignment("b", 1, true), assignment("a", 0, true)];
        assert_eq!(compute_bundle_digest(&in_order), compute_bundle_digest(&out_of_order));
    }

    #[test]
    fn missing_content_hash_becomes_empty_string() {
        let mut a = assignment("a", 0, true);
        a.content_hash = None;
        let mut b = assignment("a", 0, true);
        b.content_hash = Some(String::new());
        assert_eq!(compute_bundle_digest(&[a]), compute_bundle_digest(&[b]));
    }

    #[test]
    fn changing_a_field_changes_the_digest() {
        let base = vec![assignment("a", 0, true)];
        let mut moved = base.clone();
        moved[0].sort_order = 5;
        assert_ne!(compute_bundle_digest(&base), compute_bundle_digest(&moved));
    }

    #[test]
    fn empty_bundle_has_a_stable_digest() {
        assert_eq!(compute_bundle_digest(&[]), compute_bundle_digest(&[]));
    }
}
