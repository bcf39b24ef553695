//! The persistence seam (A4): entity structs plus the `Store` trait every
//! handler, auth flow, and background job goes through. `memory` is the
//! in-memory reference driver used by tests and the reference deployment;
//! a durable (Postgres, per `DATABASE_URL`) driver satisfies the same
//! trait as an external collaborator — out of scope to implement fully
//! (§1 Non-goals name storage-driver internals), but the trait shape is
//! the documented seam.

pub mod memory;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use latchflow_authz::PermissionRule;
use latchflow_core::Role;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("{0} is referenced by dependent rows")]
    InUse(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone)]
pub struct Bundle {
    pub id: String,
    pub name: String,
    pub is_enabled: bool,
    pub storage_key: Option<String>,
    pub checksum: Option<String>,
    pub bundle_digest: Option<String>,
    pub size: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BundleObject {
    pub id: String,
    pub bundle_id: String,
    pub file_id: String,
    pub path: Option<String>,
    pub required: bool,
    pub sort_order: i64,
    pub is_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: String,
    pub key: Option<String>,
    pub storage_key: Option<String>,
    pub content_hash: Option<String>,
    pub size: u64,
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    pub id: String,
    pub name: String,
    pub is_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct PermissionPreset {
    pub id: String,
    pub name: String,
    pub version: u32,
    pub rules: Vec<PermissionRule>,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub mfa_enabled: bool,
    pub permissions_hash: Option<String>,
    pub direct_permissions: Vec<PermissionRule>,
    pub permission_preset_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TriggerDefinition {
    pub id: String,
    pub pipeline_id: Option<String>,
    pub kind: String,
    pub config: Value,
    pub is_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct ActionDefinitionRow {
    pub id: String,
    pub pipeline_id: Option<String>,
    pub capability_id: String,
    pub config: Value,
    pub is_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct TriggerMapping {
    pub id: String,
    pub trigger_definition_id: String,
    pub action_definition_id: String,
    pub sort_order: i64,
    pub is_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct Recipient {
    pub id: String,
    pub email: String,
    pub is_enabled: bool,
    pub tags: Vec<String>,
    pub verification_required: bool,
    pub verified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub id: String,
    pub recipient_id: String,
    pub bundle_id: String,
    pub is_enabled: bool,
    pub max_downloads: Option<u32>,
    pub downloads_used: u32,
    pub cooldown_seconds: Option<i64>,
    pub last_download_at: Option<DateTime<Utc>>,
}

impl Assignment {
    #[must_use]
    pub fn downloads_remaining(&self) -> Option<u32> {
        self.max_downloads.map(|m| m.saturating_sub(self.downloads_used))
    }

    #[must_use]
    pub fn next_available_at(&self) -> Option<DateTime<Utc>> {
        match (self.last_download_at, self.cooldown_seconds) {
            (Some(last), Some(secs)) => Some(last + chrono::Duration::seconds(secs)),
            _ => None,
        }
    }

    #[must_use]
    pub fn cooldown_remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        match self.next_available_at() {
            Some(next) if next > now => {
                let ms = (next - now).num_milliseconds().max(0);
                (ms + 999) / 1000
            }
            _ => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdminSession {
    pub jti: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub reauthenticated_at: Option<DateTime<Utc>>,
    pub mfa_verified_at: Option<DateTime<Utc>>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RecipientSession {
    pub jti: String,
    pub recipient_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ApiToken {
    pub token_hash: String,
    pub user_id: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct MagicLink {
    pub token_hash: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct RecipientOtp {
    pub recipient_id: String,
    pub code_hash: String,
    pub attempts: u32,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DeviceAuth {
    pub device_code_hash: String,
    pub user_code_hash: String,
    pub user_code: String,
    pub interval_sec: u32,
    pub expires_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub token_id: Option<String>,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub last_polled_ip: Option<String>,
    pub plaintext_token: Option<String>,
}

/// Everything handlers, auth flows, and the background rebuild/trigger
/// jobs need from persistence. One trait, regardless of backend — the
/// in-memory reference driver and a durable driver both implement it.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn get_bundle(&self, id: &str) -> Result<Option<Bundle>, StoreError>;
    async fn list_bundles(&self, offset: usize, limit: usize) -> Result<Vec<Bundle>, StoreError>;
    async fn put_bundle(&self, bundle: Bundle) -> Result<(), StoreError>;
    async fn delete_bundle(&self, id: &str) -> Result<(), StoreError>;
    async fn put_bundle_pointer(
        &self,
        bundle_id: &str,
        storage_key: String,
        checksum: String,
        bundle_digest: String,
        size: u64,
    ) -> Result<(), StoreError>;

    async fn list_bundle_objects(&self, bundle_id: &str) -> Result<Vec<BundleObject>, StoreError>;
    async fn put_bundle_object(&self, object: BundleObject) -> Result<(), StoreError>;
    async fn delete_bundle_object(&self, id: &str) -> Result<(), StoreError>;

    async fn get_file(&self, id: &str) -> Result<Option<StoredFile>, StoreError>;
    async fn put_file_row(&self, file: StoredFile) -> Result<(), StoreError>;
    async fn delete_file_row(&self, id: &str) -> Result<(), StoreError>;

    async fn get_pipeline(&self, id: &str) -> Result<Option<Pipeline>, StoreError>;
    async fn list_pipelines(&self, offset: usize, limit: usize) -> Result<Vec<Pipeline>, StoreError>;
    async fn put_pipeline(&self, pipeline: Pipeline) -> Result<(), StoreError>;
    async fn delete_pipeline(&self, id: &str) -> Result<(), StoreError>;

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&self, offset: usize, limit: usize) -> Result<Vec<User>, StoreError>;
    async fn put_user(&self, user: User) -> Result<(), StoreError>;
    async fn delete_user(&self, id: &str) -> Result<(), StoreError>;

    async fn get_preset(&self, id: &str) -> Result<Option<PermissionPreset>, StoreError>;
    async fn list_presets(&self, offset: usize, limit: usize) -> Result<Vec<PermissionPreset>, StoreError>;
    async fn put_preset(&self, preset: PermissionPreset) -> Result<(), StoreError>;
    async fn delete_preset(&self, id: &str) -> Result<(), StoreError>;

    async fn get_trigger_definition(&self, id: &str) -> Result<Option<TriggerDefinition>, StoreError>;
    async fn list_trigger_definitions(&self, offset: usize, limit: usize) -> Result<Vec<TriggerDefinition>, StoreError>;
    async fn put_trigger_definition(&self, trigger: TriggerDefinition) -> Result<(), StoreError>;
    async fn delete_trigger_definition(&self, id: &str) -> Result<(), StoreError>;

    async fn get_action_definition(&self, id: &str) -> Result<Option<ActionDefinitionRow>, StoreError>;
    async fn list_action_definitions(&self, offset: usize, limit: usize) -> Result<Vec<ActionDefinitionRow>, StoreError>;
    async fn put_action_definition(&self, action: ActionDefinitionRow) -> Result<(), StoreError>;
    async fn delete_action_definition(&self, id: &str) -> Result<(), StoreError>;

    async fn enabled_trigger_mappings(&self, trigger_definition_id: &str) -> Result<Vec<TriggerMapping>, StoreError>;
    async fn list_trigger_mappings(&self, offset: usize, limit: usize) -> Result<Vec<TriggerMapping>, StoreError>;
    async fn put_trigger_mapping(&self, mapping: TriggerMapping) -> Result<(), StoreError>;
    async fn delete_trigger_mapping(&self, id: &str) -> Result<(), StoreError>;

    async fn get_recipient(&self, id: &str) -> Result<Option<Recipient>, StoreError>;
    async fn get_recipient_by_email(&self, email: &str) -> Result<Option<Recipient>, StoreError>;
    async fn list_recipients(&self, offset: usize, limit: usize) -> Result<Vec<Recipient>, StoreError>;
    async fn put_recipient(&self, recipient: Recipient) -> Result<(), StoreError>;
    async fn delete_recipient(&self, id: &str) -> Result<(), StoreError>;

    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>, StoreError>;
    async fn find_assignment(&self, recipient_id: &str, bundle_id: &str) -> Result<Option<Assignment>, StoreError>;
    async fn list_assignments_for_recipient(&self, recipient_id: &str, offset: usize, limit: usize) -> Result<Vec<Assignment>, StoreError>;
    async fn put_assignment(&self, assignment: Assignment) -> Result<(), StoreError>;
    async fn delete_assignment(&self, id: &str) -> Result<(), StoreError>;
    async fn record_download(&self, assignment_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn put_admin_session(&self, session: AdminSession) -> Result<(), StoreError>;
    async fn find_admin_session(&self, jti: &str) -> Result<Option<AdminSession>, StoreError>;
    async fn revoke_admin_session(&self, jti: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn put_recipient_session(&self, session: RecipientSession) -> Result<(), StoreError>;
    async fn find_recipient_session(&self, jti: &str) -> Result<Option<RecipientSession>, StoreError>;

    async fn put_api_token(&self, token: ApiToken) -> Result<(), StoreError>;
    async fn find_api_token(&self, token_hash: &str) -> Result<Option<ApiToken>, StoreError>;
    async fn mark_api_token_used(&self, token_hash: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
    async fn revoke_api_token(&self, token_hash: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn put_magic_link(&self, link: MagicLink) -> Result<(), StoreError>;
    async fn find_magic_link(&self, token_hash: &str) -> Result<Option<MagicLink>, StoreError>;
    async fn consume_magic_link(&self, token_hash: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn clear_recipient_otps(&self, recipient_id: &str) -> Result<(), StoreError>;
    async fn put_recipient_otp(&self, otp: RecipientOtp) -> Result<(), StoreError>;
    async fn latest_recipient_otp(&self, recipient_id: &str) -> Result<Option<RecipientOtp>, StoreError>;
    async fn increment_otp_attempts(&self, recipient_id: &str) -> Result<(), StoreError>;
    async fn delete_recipient_otp(&self, recipient_id: &str) -> Result<(), StoreError>;

    async fn put_device_auth(&self, device: DeviceAuth) -> Result<(), StoreError>;
    async fn find_device_auth_by_device_code(&self, device_code_hash: &str) -> Result<Option<DeviceAuth>, StoreError>;
    async fn find_device_auth_by_user_code(&self, user_code: &str) -> Result<Option<DeviceAuth>, StoreError>;
    async fn update_device_auth(&self, device: DeviceAuth) -> Result<(), StoreError>;
}
