//! Deterministic bundle archive construction (§4.10 / C10).
//!
//! `build_bundle_artifact` assembles a ZIP whose bytes depend only on
//! file contents, composition order, path mapping, and the fixed epoch
//! mtime — never on wall-clock time, filesystem metadata, or map/set
//! iteration order. The `zip` crate's `ZipWriter` does the packing; the
//! determinism contract itself is entirely our responsibility: STORE
//! compression, entries written in composition order, and every entry
//! stamped with the Unix epoch (§6).

use std::io::{Cursor, Write as _};

use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime as ZipDateTime, ZipWriter};

use crate::blob::{PutFileResult, StorageService};
use crate::digest::{compute_bundle_digest, BundleFileAssignment};
use crate::error::StorageError;

/// One file ready to be streamed into the archive: its entry name and the
/// bytes fetched from storage. Skipped (missing storage key) assignments
/// never reach this stage — the caller filters them out per §4.10 step 3.
#[derive(Debug, Clone)]
pub struct BundleArchiveEntry {
    pub entry_name: String,
    pub content: Vec<u8>,
}

/// The bundle's persisted pointer, updated atomically after a successful
/// build (§4.10 step 6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePointer {
    pub storage_key: String,
    pub checksum: String,
    pub bundle_digest: String,
    pub size: u64,
}

/// Outcome of [`build_bundle_artifact`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    SkippedUnchanged,
    Built(BundlePointer),
}

/// Entry name resolution: `bundleObject.path ?? file.key ?? file.id`.
#[must_use]
pub fn resolve_entry_name(bundle_object_path: Option<&str>, file_key: Option<&str>, file_id: &str) -> String {
    bundle_object_path
        .filter(|p| !p.is_empty())
        .or(file_key.filter(|k| !k.is_empty()))
        .unwrap_or(file_id)
        .to_owned()
}

/// Build the deterministic ZIP bytes for a set of entries. Entries are
/// written in the order given (composition order) with STORE compression
/// and every entry's mtime fixed to the Unix epoch.
pub fn build_archive_bytes(entries: &[BundleArchiveEntry]) -> Result<Vec<u8>, StorageError> {
    let buf = Cursor::new(Vec::new());
    let mut writer = ZipWriter::new(buf);
    // ZIP's DOS-format timestamp field cannot represent 1970-01-01 (the
    // format's epoch starts 1980-01-01); 1980-01-01T00:00:00 is the
    // earliest value representable and stands in for "the epoch" here.
    let epoch = ZipDateTime::from_date_and_time(1980, 1, 1, 0, 0, 0)
        .expect("1980-01-01 00:00:00 is a valid DOS-epoch timestamp");

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(epoch);

    for entry in entries {
        writer.start_file(&entry.entry_name, options)?;
        writer.write_all(&entry.content)?;
    }

    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

/// Resolve a bundle's composition, build the archive if its digest
/// changed (or `force` is set), persist it via `storage`, and return the
/// new pointer — or `SkippedUnchanged` if nothing needs rebuilding.
///
/// This function owns steps 2-6 of §4.10; step 1 (fetching the bundle
/// record / 404-if-absent) is the caller's responsibility since it
/// requires a durable bundle repository this crate does not define.
pub async fn build_bundle_artifact(
    storage: &dyn StorageService,
    assignments: &[BundleFileAssignment],
    entries: &[BundleArchiveEntry],
    stored_digest: Option<&str>,
    force: bool,
) -> Result<BuildOutcome, StorageError> {
    let new_digest = compute_bundle_digest(assignments);

    if !force && stored_digest == Some(new_digest.as_str()) {
        return Ok(BuildOutcome::SkippedUnchanged);
    }

    let entries = entries.to_vec();
    let archive_bytes = tokio::task::spawn_blocking(move || build_archive_bytes(&entries))
        .await
        .map_err(|e| StorageError::BuildFailed(format!("archive build task panicked: {e}")))??;

    let mut hasher = Sha256::new();
    hasher.update(&archive_bytes);
    let checksum = hex::encode(hasher.finalize());

    let PutFileResult { storage_key, size, .. } = storage
        .put_file(archive_bytes.into(), "application/zip")
        .await?;

    Ok(BuildOutcome::Built(BundlePointer {
        storage_key,
        checksum,
        bundle_digest: new_digest,
        size,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryStorageService;

    fn entry(name: &str, content: &str) -> BundleArchiveEntry {
        BundleArchiveEntry {
            entry_name: name.to_owned(),
            content: content.as_bytes().to_vec(),
        }
    }

    #[test]
    fn entry_name_prefers_path_then_key_then_id() {
        assert_eq!(resolve_entry_name(Some("a/b.txt"), Some("key"), "id"), "a/b.txt");
        assert_eq!(resolve_entry_name(None, Some("key"), "id"), "key");
        assert_eq!(resolve_entry_name(None, None, "id"), "id");
        assert_eq!(resolve_entry_name(Some(""), Some(""), "id"), "id");
    }

    #[test]
    fn identical_inputs_produce_identical_bytes() {
        let entries = vec![entry("a.txt", "hello"), entry("b.txt", "world")];
        let first = build_archive_bytes(&entries).unwrap();
        let second = build_archive_bytes(&entries).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn entry_order_changes_output() {
        let ordered = vec![entry("a.txt", "hello"), entry("b.txt", "world")];
        let reordered = vec![entry("b.txt", "world"), entry("a.txt", "hello")];
        assert_ne!(build_archive_bytes(&ordered).unwrap(), build_archive_bytes(&reordered).unwrap());
    }

    fn assignment(file_id: &str) -> BundleFileAssignment {
        BundleFileAssignment {
            file_id: file_id.to_owned(),
            content_hash: Some(format!("hash-{file_id}")),
            path: format!("/{file_id}"),
            required: true,
            sort_order: 0,
            is_enabled: true,
        }
    }

    #[tokio::test]
    async fn unchanged_digest_skips_unless_forced() {
        let storage = MemoryStorageService::default();
        let assignments = vec![assignment("f1")];
        let entries = vec![entry("f1", "content")];
        let digest = compute_bundle_digest(&assignments);

        let outcome = build_bundle_artifact(&storage, &assignments, &entries, Some(&digest), false)
            .await
            .unwrap();
        assert_eq!(outcome, BuildOutcome::SkippedUnchanged);

        let forced = build_bundle_artifact(&storage, &assignments, &entries, Some(&digest), true)
            .await
            .unwrap();
        assert!(matches!(forced, BuildOutcome::Built(_)));
    }

    #[tokio::test]
    async fn changed_digest_triggers_build() {
        let storage = MemoryStorageService::default();
        let assignments = vec![assignment("f1")];
        let entries = vec![entry("f1", "content")];

        let outcome = build_bundle_artifact(&storage, &assignments, &entries, Some("stale-digest"), false)
            .await
            .unwrap();
        match outcome {
            BuildOutcome::Built(pointer) => {
                assert_eq!(pointer.bundle_digest, compute_bundle_digest(&assignments));
                assert!(pointer.size > 0);
            }
            BuildOutcome::SkippedUnchanged => panic!("expected a build"),
        }
    }
}
