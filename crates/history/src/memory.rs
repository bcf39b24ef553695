//! In-memory reference implementation of [`ChangeLogStore`].
//!
//! Backs the process-local map with a `DashMap` keyed by
//! `(entity_type, entity_id)`, each holding a version-ordered `Vec` of rows.
//! Concurrent appends against the same entity are serialized by the
//! per-key entry lock that `DashMap` already provides for the duration of
//! a closure, which is sufficient for the single-process reference driver.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::entry::ChangeLogEntry;
use crate::error::HistoryError;
use crate::store::ChangeLogStore;

#[derive(Debug, Default)]
pub struct MemoryChangeLogStore {
    rows: DashMap<(String, String), Vec<ChangeLogEntry>>,
}

impl MemoryChangeLogStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChangeLogStore for MemoryChangeLogStore {
    async fn highest_version(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<u64>, HistoryError> {
        let key = (entity_type.to_owned(), entity_id.to_owned());
        Ok(self.rows.get(&key).and_then(|rows| rows.last().map(|e| e.version)))
    }

    async fn insert(&self, entry: ChangeLogEntry) -> Result<(), HistoryError> {
        let key = (entry.entity_type.clone(), entry.entity_id.clone());
        let mut rows = self.rows.entry(key).or_default();
        if let Some(last) = rows.last() {
            if last.version + 1 != entry.version {
                return Err(HistoryError::Store(format!(
                    "non-dense version append: last={} new={}",
                    last.version, entry.version
                )));
            }
        } else if entry.version != 1 {
            return Err(HistoryError::Store(format!(
                "first version must be 1, got {}",
                entry.version
            )));
        }
        rows.push(entry);
        Ok(())
    }

    async fn entries_up_to(
        &self,
        entity_type: &str,
        entity_id: &str,
        up_to: u64,
    ) -> Result<Vec<ChangeLogEntry>, HistoryError> {
        let key = (entity_type.to_owned(), entity_id.to_owned());
        Ok(self
            .rows
            .get(&key)
            .map(|rows| {
                rows.iter()
                    .filter(|e| e.version <= up_to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn latest_snapshot_up_to(
        &self,
        entity_type: &str,
        entity_id: &str,
        up_to: u64,
    ) -> Result<Option<ChangeLogEntry>, HistoryError> {
        let key = (entity_type.to_owned(), entity_id.to_owned());
        Ok(self.rows.get(&key).and_then(|rows| {
            rows.iter()
                .rev()
                .find(|e| e.version <= up_to && e.is_snapshot)
                .cloned()
        }))
    }

    async fn chain_depth(&self, entity_type: &str, entity_id: &str) -> Result<u64, HistoryError> {
        let key = (entity_type.to_owned(), entity_id.to_owned());
        Ok(self
            .rows
            .get(&key)
            .map(|rows| {
                rows.iter()
                    .rev()
                    .take_while(|e| !e.is_snapshot)
                    .count() as u64
            })
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latchflow_core::Actor;

    fn entry(version: u64, is_snapshot: bool) -> ChangeLogEntry {
        ChangeLogEntry {
            entity_type: "widget".into(),
            entity_id: "w-1".into(),
            version,
            is_snapshot,
            state: is_snapshot.then(|| serde_json::json!({"v": version})),
            diff: None,
            hash: "deadbeef".into(),
            actor: Actor::system(),
            change_note: None,
            changed_path: None,
            change_kind: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn rejects_non_dense_version() {
        let store = MemoryChangeLogStore::new();
        store.insert(entry(1, true)).await.unwrap();
        let err = store.insert(entry(3, true)).await.unwrap_err();
        assert!(matches!(err, HistoryError::Store(_)));
    }

    #[tokio::test]
    async fn chain_depth_counts_trailing_patches() {
        let store = MemoryChangeLogStore::new();
        store.insert(entry(1, true)).await.unwrap();
        store.insert(entry(2, false)).await.unwrap();
        store.insert(entry(3, false)).await.unwrap();
        assert_eq!(store.chain_depth("widget", "w-1").await.unwrap(), 2);
    }
}
