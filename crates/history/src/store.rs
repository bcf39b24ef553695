use async_trait::async_trait;

use crate::entry::ChangeLogEntry;
use crate::error::HistoryError;

/// Durable storage for change-log rows. The in-memory reference
/// implementation (`MemoryChangeLogStore`) backs every method with a
/// process-local map; a clustered deployment swaps in a durable driver that
/// preserves the append-only, version-dense-per-entity contract.
#[async_trait]
pub trait ChangeLogStore: Send + Sync {
    /// Highest stored version for `(entity_type, entity_id)`, or `None` if
    /// no entries exist yet.
    async fn highest_version(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<u64>, HistoryError>;

    /// Append a row. Callers must have already computed its final shape;
    /// the store only persists it atomically.
    async fn insert(&self, entry: ChangeLogEntry) -> Result<(), HistoryError>;

    /// All rows for `(entity_type, entity_id)` with `version <= up_to`, in
    /// ascending version order.
    async fn entries_up_to(
        &self,
        entity_type: &str,
        entity_id: &str,
        up_to: u64,
    ) -> Result<Vec<ChangeLogEntry>, HistoryError>;

    /// The most recent snapshot at or below `up_to`, and its version, if any.
    async fn latest_snapshot_up_to(
        &self,
        entity_type: &str,
        entity_id: &str,
        up_to: u64,
    ) -> Result<Option<ChangeLogEntry>, HistoryError>;

    /// Count of consecutive patch entries since the last snapshot, as of the
    /// highest stored version. Used to enforce `MAX_CHAIN_DEPTH`.
    async fn chain_depth(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<u64, HistoryError>;
}

/// External collaborator that serializes the current state of an entity
/// aggregate to JSON. The change log itself has no notion of entity schemas.
#[async_trait]
pub trait StateSerializer: Send + Sync {
    async fn serialize(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<serde_json::Value, HistoryError>;
}
