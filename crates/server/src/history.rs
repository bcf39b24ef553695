//! Thin helper wiring admin handlers to the change-log engine (§4.7).
//! Handlers already hold the entity's just-written state as JSON, so the
//! serializer here just hands it back rather than re-fetching anything.

use async_trait::async_trait;
use latchflow_core::Actor;
use latchflow_history::{append, AppendOptions, ChangeLogEntry, HistoryError, HistoryPolicy, StateSerializer};
use serde_json::Value;

use crate::state::AppState;

struct FixedStateSerializer(Value);

#[async_trait]
impl StateSerializer for FixedStateSerializer {
    async fn serialize(&self, _entity_type: &str, _entity_id: &str) -> Result<Value, HistoryError> {
        Ok(self.0.clone())
    }
}

/// Append one change-log entry for `entity_type`/`entity_id`, given the
/// entity's new state already serialized to JSON.
///
/// Snapshot cadence comes from `state.config.history` (§6
/// `HISTORY_SNAPSHOT_INTERVAL`/`HISTORY_MAX_CHAIN_DEPTH`), not a hardcoded
/// default, so those env vars take effect.
pub async fn record_change(
    state: &AppState,
    entity_type: &str,
    entity_id: &str,
    value: Value,
    actor: Actor,
    change_kind: &str,
) -> Result<ChangeLogEntry, HistoryError> {
    let serializer = FixedStateSerializer(value);
    let policy = HistoryPolicy {
        snapshot_interval: u64::from(state.config.history.snapshot_interval),
        max_chain_depth: u64::from(state.config.history.max_chain_depth),
    };
    append(
        &*state.change_log,
        &serializer,
        entity_type,
        entity_id,
        actor,
        AppendOptions {
            change_note: None,
            changed_path: None,
            change_kind: Some(change_kind.to_owned()),
        },
        policy,
    )
    .await
}
