//! Bridges the bundle build pipeline (`latchflow-storage`) to this crate's
//! `Store`: resolves composition, fetches file bytes, builds, and writes
//! the pointer back (§4.10 steps 1-6).

use latchflow_storage::{
    build_bundle_artifact, resolve_entry_name, BuildOutcome, BundleArchiveEntry, BundleFileAssignment, StorageError,
    StorageService,
};

use crate::store::Store;

pub async fn rebuild_bundle(
    store: &dyn Store,
    storage: &dyn StorageService,
    bundle_id: &str,
    force: bool,
) -> Result<BuildOutcome, StorageError> {
    let bundle = store
        .get_bundle(bundle_id)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .ok_or_else(|| StorageError::BundleNotFound(bundle_id.to_owned()))?;

    let objects = store
        .list_bundle_objects(bundle_id)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    let mut assignments = Vec::with_capacity(objects.len());
    let mut entries = Vec::new();

    for object in &objects {
        let file = store
            .get_file(&object.file_id)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let Some(file) = file else { continue };

        let entry_name = resolve_entry_name(object.path.as_deref(), file.key.as_deref(), &file.id);

        assignments.push(BundleFileAssignment {
            file_id: file.id.clone(),
            content_hash: file.content_hash.clone(),
            path: entry_name.clone(),
            required: object.required,
            sort_order: object.sort_order,
            is_enabled: object.is_enabled,
        });

        if object.is_enabled {
            let Some(storage_key) = file.storage_key.as_deref() else {
                continue;
            };
            let content = storage.get_file_stream(storage_key).await?.to_vec();
            entries.push(BundleArchiveEntry { entry_name, content });
        }
    }

    let outcome = build_bundle_artifact(
        storage,
        &assignments,
        &entries,
        bundle.bundle_digest.as_deref(),
        force,
    )
    .await?;

    if let BuildOutcome::Built(pointer) = &outcome {
        store
            .put_bundle_pointer(
                bundle_id,
                pointer.storage_key.clone(),
                pointer.checksum.clone(),
                pointer.bundle_digest.clone(),
                pointer.size,
            )
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
    }

    Ok(outcome)
}
