use chrono::Utc;
use latchflow_core::{hash_canonical, Actor};
use serde_json::Value;

use crate::entry::{AppendOptions, ChangeLogEntry};
use crate::error::HistoryError;
use crate::store::{ChangeLogStore, StateSerializer};

/// Default snapshot cadence (§6 `HISTORY_SNAPSHOT_INTERVAL`, default 20):
/// a fresh snapshot is forced at least this often, bounding patch-chain
/// replay cost during `materialize`.
pub const SNAPSHOT_INTERVAL: u64 = 20;

/// Default chain-depth ceiling (§6 `HISTORY_MAX_CHAIN_DEPTH`, default 200):
/// a patch chain longer than this forces a snapshot regardless of
/// `SNAPSHOT_INTERVAL`, bounding worst-case replay depth.
pub const MAX_CHAIN_DEPTH: u64 = 200;

/// The two §6-configurable knobs that govern snapshot cadence, passed in by
/// the caller rather than hardcoded so `HISTORY_SNAPSHOT_INTERVAL`/
/// `HISTORY_MAX_CHAIN_DEPTH` actually take effect.
#[derive(Debug, Clone, Copy)]
pub struct HistoryPolicy {
    pub snapshot_interval: u64,
    pub max_chain_depth: u64,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            snapshot_interval: SNAPSHOT_INTERVAL,
            max_chain_depth: MAX_CHAIN_DEPTH,
        }
    }
}

/// Append a new version to an entity's change log.
///
/// Implements §4.7 `append`: resolves the next version, decides whether it
/// is a snapshot, computes a patch against the prior materialized state
/// when it isn't, and stamps the row with `hash = sha256(canonical(state))`.
pub async fn append(
    store: &dyn ChangeLogStore,
    serializer: &dyn StateSerializer,
    entity_type: &str,
    entity_id: &str,
    actor: Actor,
    opts: AppendOptions,
    policy: HistoryPolicy,
) -> Result<ChangeLogEntry, HistoryError> {
    let previous_version = store.highest_version(entity_type, entity_id).await?;
    let next_version = previous_version.unwrap_or(0) + 1;

    let state = serializer.serialize(entity_type, entity_id).await?;

    let prior_state = if next_version > 1 {
        materialize(store, entity_type, entity_id, next_version - 1).await.ok().flatten()
    } else {
        None
    };

    let chain_depth = if next_version > 1 {
        store.chain_depth(entity_type, entity_id).await?
    } else {
        0
    };

    let is_snapshot = next_version == 1
        || (next_version - 1) % policy.snapshot_interval == 0
        || prior_state.is_none()
        || chain_depth >= policy.max_chain_depth;

    let diff = if is_snapshot {
        None
    } else {
        let prior = prior_state.clone().unwrap_or(Value::Null);
        Some(json_patch::diff(&prior, &state))
    };

    let hash = hash_canonical(&state);

    let entry = ChangeLogEntry {
        entity_type: entity_type.to_owned(),
        entity_id: entity_id.to_owned(),
        version: next_version,
        is_snapshot,
        state: if is_snapshot { Some(state) } else { None },
        diff,
        hash,
        actor,
        change_note: opts.change_note,
        changed_path: opts.changed_path,
        change_kind: opts.change_kind,
        created_at: Utc::now(),
    };

    store.insert(entry.clone()).await?;
    Ok(entry)
}

/// Fold all entries with `version <= version` into the terminal state.
///
/// Returns `None` if no entries exist for the entity at all.
pub async fn materialize(
    store: &dyn ChangeLogStore,
    entity_type: &str,
    entity_id: &str,
    version: u64,
) -> Result<Option<Value>, HistoryError> {
    let entries = store.entries_up_to(entity_type, entity_id, version).await?;
    if entries.is_empty() {
        return Ok(None);
    }

    let mut state = Value::Null;
    for entry in &entries {
        if entry.is_snapshot {
            state = entry.state.clone().unwrap_or(Value::Null);
        } else if let Some(diff) = &entry.diff {
            json_patch::patch(&mut state, diff).map_err(|source| HistoryError::PatchApply {
                entity_type: entity_type.to_owned(),
                entity_id: entity_id.to_owned(),
                version: entry.version,
                source,
            })?;
        }
    }

    Ok(Some(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryChangeLogStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct StaticSerializer {
        state: Mutex<Value>,
    }

    #[async_trait]
    impl StateSerializer for StaticSerializer {
        async fn serialize(
            &self,
            _entity_type: &str,
            _entity_id: &str,
        ) -> Result<Value, HistoryError> {
            Ok(self.state.lock().unwrap().clone())
        }
    }

    #[tokio::test]
    async fn first_append_is_always_a_snapshot() {
        let store = MemoryChangeLogStore::new();
        let serializer = StaticSerializer {
            state: Mutex::new(json!({"name": "A"})),
        };
        let entry = append(
            &store,
            &serializer,
            "widget",
            "w-1",
            Actor::system(),
            AppendOptions::default(),
            HistoryPolicy::default(),
        )
        .await
        .unwrap();
        assert_eq!(entry.version, 1);
        assert!(entry.is_snapshot);
        assert_eq!(entry.hash, hash_canonical(&json!({"name": "A"})));
    }

    #[tokio::test]
    async fn twenty_one_updates_round_trip_materialize() {
        let store = MemoryChangeLogStore::new();
        let serializer = StaticSerializer {
            state: Mutex::new(json!({"name": "A"})),
        };

        append(
            &store,
            &serializer,
            "widget",
            "w-1",
            Actor::system(),
            AppendOptions::default(),
            HistoryPolicy::default(),
        )
        .await
        .unwrap();

        let letters = "BCDEFGHIJKLMNOPQRSTU";
        for ch in letters.chars() {
            *serializer.state.lock().unwrap() = json!({"name": ch.to_string()});
            append(
                &store,
                &serializer,
                "widget",
                "w-1",
                Actor::system(),
                AppendOptions::default(),
                HistoryPolicy::default(),
            )
            .await
            .unwrap();
        }

        // 1 initial + 20 updates = 21 versions total
        let materialized_15 = materialize(&store, "widget", "w-1", 15).await.unwrap();
        assert_eq!(materialized_15, Some(json!({"name": "O"})));

        let materialized_21 = materialize(&store, "widget", "w-1", 21).await.unwrap();
        assert_eq!(materialized_21, Some(json!({"name": "U"})));
    }

    #[tokio::test]
    async fn materialize_of_unknown_entity_is_none() {
        let store = MemoryChangeLogStore::new();
        let result = materialize(&store, "widget", "missing", 1).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn hash_equals_canonical_hash_of_materialized_state() {
        let store = MemoryChangeLogStore::new();
        let serializer = StaticSerializer {
            state: Mutex::new(json!({"name": "A"})),
        };
        append(
            &store,
            &serializer,
            "widget",
            "w-1",
            Actor::system(),
            AppendOptions::default(),
            HistoryPolicy::default(),
        )
        .await
        .unwrap();

        *serializer.state.lock().unwrap() = json!({"name": "B"});
        let entry = append(
            &store,
            &serializer,
            "widget",
            "w-1",
            Actor::system(),
            AppendOptions::default(),
            HistoryPolicy::default(),
        )
        .await
        .unwrap();

        let materialized = materialize(&store, "widget", "w-1", entry.version)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.hash, hash_canonical(&materialized));
    }

    #[tokio::test]
    async fn custom_max_chain_depth_forces_an_earlier_snapshot() {
        let store = MemoryChangeLogStore::new();
        let serializer = StaticSerializer {
            state: Mutex::new(json!({"name": "A"})),
        };
        let policy = HistoryPolicy {
            snapshot_interval: 1000,
            max_chain_depth: 1,
        };

        for name in ["A", "B", "C"] {
            *serializer.state.lock().unwrap() = json!({"name": name});
            append(
                &store,
                &serializer,
                "widget",
                "w-1",
                Actor::system(),
                AppendOptions::default(),
                policy,
            )
            .await
            .unwrap();
        }

        // version 1 snapshot, version 2 patch (trailing chain depth 1),
        // version 3 sees chain_depth==max_chain_depth and is forced back
        // to a snapshot.
        let entries = store.entries_up_to("widget", "w-1", 3).await.unwrap();
        assert!(entries[0].is_snapshot);
        assert!(!entries[1].is_snapshot);
        assert!(entries[2].is_snapshot);
    }
}
