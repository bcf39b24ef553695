//! Content-addressed storage service, bundle digest/build, and the
//! debounced per-bundle rebuild scheduler (§4.8-4.11 / C8-C11).

pub mod blob;
pub mod bundle;
pub mod digest;
pub mod error;
pub mod scheduler;

pub use blob::{FileHead, MemoryStorageService, PutFileResult, ReleaseLink, StorageService, storage_key_for_hash};
pub use bundle::{build_archive_bytes, build_bundle_artifact, resolve_entry_name, BuildOutcome, BundleArchiveEntry, BundlePointer};
pub use digest::{compute_bundle_digest, BundleFileAssignment};
pub use error::StorageError;
pub use scheduler::{BundleStatus, LastRun, LastRunStatus, RebuildOutcome, RebuildScheduler, SchedulerState, DEFAULT_DEBOUNCE};
