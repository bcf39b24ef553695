use chrono::{DateTime, Utc};
use json_patch::Patch;
use latchflow_core::Actor;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single row in the append-only change log.
///
/// Version 1 of an entity is always a snapshot; later versions are either a
/// fresh snapshot or a patch against the materialized state of the prior
/// version, decided by [`crate::engine::should_snapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub entity_type: String,
    pub entity_id: String,
    pub version: u64,
    pub is_snapshot: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<Patch>,
    pub hash: String,
    pub actor: Actor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_kind: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied metadata for an `append` call.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    pub change_note: Option<String>,
    pub changed_path: Option<String>,
    pub change_kind: Option<String>,
}
