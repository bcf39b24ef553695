use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("no prior state to serialize entity {entity_type}/{entity_id}")]
    SerializationUnavailable {
        entity_type: String,
        entity_id: String,
    },

    #[error("failed to apply patch while materializing {entity_type}/{entity_id} at version {version}: {source}")]
    PatchApply {
        entity_type: String,
        entity_id: String,
        version: u64,
        #[source]
        source: json_patch::PatchError,
    },

    #[error("store error: {0}")]
    Store(String),
}
