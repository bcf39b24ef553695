//! In-memory reference `Store` (A4), selected when `DATABASE_URL` is unset
//! or `memory://`. Backed by per-entity `DashMap`s, mirroring the
//! DashMap-per-key idiom used throughout `latchflow-storage`/`-authz`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::*;

#[derive(Default)]
pub struct MemoryStore {
    bundles: DashMap<String, Bundle>,
    bundle_objects: DashMap<String, BundleObject>,
    files: DashMap<String, StoredFile>,
    pipelines: DashMap<String, Pipeline>,
    users: DashMap<String, User>,
    presets: DashMap<String, PermissionPreset>,
    triggers: DashMap<String, TriggerDefinition>,
    actions: DashMap<String, ActionDefinitionRow>,
    mappings: DashMap<String, TriggerMapping>,
    recipients: DashMap<String, Recipient>,
    assignments: DashMap<String, Assignment>,
    admin_sessions: DashMap<String, AdminSession>,
    recipient_sessions: DashMap<String, RecipientSession>,
    api_tokens: DashMap<String, ApiToken>,
    magic_links: DashMap<String, MagicLink>,
    recipient_otps: DashMap<String, RecipientOtp>,
    device_auths: DashMap<String, DeviceAuth>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn page<T: Clone, I: Iterator<Item = T>>(iter: I, offset: usize, limit: usize) -> Vec<T> {
    iter.skip(offset).take(limit).collect()
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get_bundle(&self, id: &str) -> Result<Option<Bundle>, StoreError> {
        Ok(self.bundles.get(id).map(|r| r.clone()))
    }

    async fn list_bundles(&self, offset: usize, limit: usize) -> Result<Vec<Bundle>, StoreError> {
        Ok(page(self.bundles.iter().map(|r| r.clone()), offset, limit))
    }

    async fn put_bundle(&self, bundle: Bundle) -> Result<(), StoreError> {
        self.bundles.insert(bundle.id.clone(), bundle);
        Ok(())
    }

    async fn delete_bundle(&self, id: &str) -> Result<(), StoreError> {
        if self.bundle_objects.iter().any(|o| o.bundle_id == id) {
            return Err(StoreError::InUse("bundle has bundle objects".into()));
        }
        if self.assignments.iter().any(|a| a.bundle_id == id) {
            return Err(StoreError::InUse("bundle has assignments".into()));
        }
        self.bundles.remove(id).ok_or(StoreError::NotFound)?;
        Ok(())
    }

    async fn put_bundle_pointer(
        &self,
        bundle_id: &str,
        storage_key: String,
        checksum: String,
        bundle_digest: String,
        size: u64,
    ) -> Result<(), StoreError> {
        let mut bundle = self.bundles.get_mut(bundle_id).ok_or(StoreError::NotFound)?;
        bundle.storage_key = Some(storage_key);
        bundle.checksum = Some(checksum);
        bundle.bundle_digest = Some(bundle_digest);
        bundle.size = Some(size);
        bundle.updated_at = Utc::now();
        Ok(())
    }

    async fn list_bundle_objects(&self, bundle_id: &str) -> Result<Vec<BundleObject>, StoreError> {
        let mut objects: Vec<_> = self
            .bundle_objects
            .iter()
            .filter(|o| o.bundle_id == bundle_id)
            .map(|o| o.clone())
            .collect();
        objects.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.id.cmp(&b.id)));
        Ok(objects)
    }

    async fn put_bundle_object(&self, object: BundleObject) -> Result<(), StoreError> {
        self.bundle_objects.insert(object.id.clone(), object);
        Ok(())
    }

    async fn delete_bundle_object(&self, id: &str) -> Result<(), StoreError> {
        self.bundle_objects.remove(id).ok_or(StoreError::NotFound)?;
        Ok(())
    }

    async fn get_file(&self, id: &str) -> Result<Option<StoredFile>, StoreError> {
        Ok(self.files.get(id).map(|r| r.clone()))
    }

    async fn put_file_row(&self, file: StoredFile) -> Result<(), StoreError> {
        self.files.insert(file.id.clone(), file);
        Ok(())
    }

    async fn delete_file_row(&self, id: &str) -> Result<(), StoreError> {
        if self.bundle_objects.iter().any(|o| o.file_id == id) {
            return Err(StoreError::InUse("file is referenced by a bundle object".into()));
        }
        self.files.remove(id).ok_or(StoreError::NotFound)?;
        Ok(())
    }

    async fn get_pipeline(&self, id: &str) -> Result<Option<Pipeline>, StoreError> {
        Ok(self.pipelines.get(id).map(|r| r.clone()))
    }

    async fn list_pipelines(&self, offset: usize, limit: usize) -> Result<Vec<Pipeline>, StoreError> {
        Ok(page(self.pipelines.iter().map(|r| r.clone()), offset, limit))
    }

    async fn put_pipeline(&self, pipeline: Pipeline) -> Result<(), StoreError> {
        self.pipelines.insert(pipeline.id.clone(), pipeline);
        Ok(())
    }

    async fn delete_pipeline(&self, id: &str) -> Result<(), StoreError> {
        let in_use = self.triggers.iter().any(|t| t.pipeline_id.as_deref() == Some(id))
            || self.actions.iter().any(|a| a.pipeline_id.as_deref() == Some(id));
        if in_use {
            return Err(StoreError::InUse("pipeline has trigger/action definitions".into()));
        }
        self.pipelines.remove(id).ok_or(StoreError::NotFound)?;
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(id).map(|r| r.clone()))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.iter().find(|u| u.email.eq_ignore_ascii_case(email)).map(|u| u.clone()))
    }

    async fn list_users(&self, offset: usize, limit: usize) -> Result<Vec<User>, StoreError> {
        Ok(page(self.users.iter().map(|r| r.clone()), offset, limit))
    }

    async fn put_user(&self, user: User) -> Result<(), StoreError> {
        self.users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn delete_user(&self, id: &str) -> Result<(), StoreError> {
        self.users.remove(id).ok_or(StoreError::NotFound)?;
        Ok(())
    }

    async fn get_preset(&self, id: &str) -> Result<Option<PermissionPreset>, StoreError> {
        Ok(self.presets.get(id).map(|r| r.clone()))
    }

    async fn list_presets(&self, offset: usize, limit: usize) -> Result<Vec<PermissionPreset>, StoreError> {
        Ok(page(self.presets.iter().map(|r| r.clone()), offset, limit))
    }

    async fn put_preset(&self, preset: PermissionPreset) -> Result<(), StoreError> {
        self.presets.insert(preset.id.clone(), preset);
        Ok(())
    }

    async fn delete_preset(&self, id: &str) -> Result<(), StoreError> {
        if self.users.iter().any(|u| u.permission_preset_id.as_deref() == Some(id)) {
            return Err(StoreError::InUse("preset is assigned to users".into()));
        }
        self.presets.remove(id).ok_or(StoreError::NotFound)?;
        Ok(())
    }

    async fn get_trigger_definition(&self, id: &str) -> Result<Option<TriggerDefinition>, StoreError> {
        Ok(self.triggers.get(id).map(|r| r.clone()))
    }

    async fn list_trigger_definitions(&self, offset: usize, limit: usize) -> Result<Vec<TriggerDefinition>, StoreError> {
        Ok(page(self.triggers.iter().map(|r| r.clone()), offset, limit))
    }

    async fn put_trigger_definition(&self, trigger: TriggerDefinition) -> Result<(), StoreError> {
        self.triggers.insert(trigger.id.clone(), trigger);
        Ok(())
    }

    async fn delete_trigger_definition(&self, id: &str) -> Result<(), StoreError> {
        if self.mappings.iter().any(|m| m.trigger_definition_id == id) {
            return Err(StoreError::InUse("trigger has mappings".into()));
        }
        self.triggers.remove(id).ok_or(StoreError::NotFound)?;
        Ok(())
    }

    async fn get_action_definition(&self, id: &str) -> Result<Option<ActionDefinitionRow>, StoreError> {
        Ok(self.actions.get(id).map(|r| r.clone()))
    }

    async fn list_action_definitions(&self, offset: usize, limit: usize) -> Result<Vec<ActionDefinitionRow>, StoreError> {
        Ok(page(self.actions.iter().map(|r| r.clone()), offset, limit))
    }

    async fn put_action_definition(&self, action: ActionDefinitionRow) -> Result<(), StoreError> {
        self.actions.insert(action.id.clone(), action);
        Ok(())
    }

    async fn delete_action_definition(&self, id: &str) -> Result<(), StoreError> {
        if self.mappings.iter().any(|m| m.action_definition_id == id) {
            return Err(StoreError::InUse("action is referenced by a mapping".into()));
        }
        self.actions.remove(id).ok_or(StoreError::NotFound)?;
        Ok(())
    }

    async fn enabled_trigger_mappings(&self, trigger_definition_id: &str) -> Result<Vec<TriggerMapping>, StoreError> {
        let mut mappings: Vec<_> = self
            .mappings
            .iter()
            .filter(|m| m.trigger_definition_id == trigger_definition_id && m.is_enabled)
            .map(|m| m.clone())
            .collect();
        mappings.sort_by_key(|m| m.sort_order);
        Ok(mappings)
    }

    async fn list_trigger_mappings(&self, offset: usize, limit: usize) -> Result<Vec<TriggerMapping>, StoreError> {
        Ok(page(self.mappings.iter().map(|r| r.clone()), offset, limit))
    }

    async fn put_trigger_mapping(&self, mapping: TriggerMapping) -> Result<(), StoreError> {
        self.mappings.insert(mapping.id.clone(), mapping);
        Ok(())
    }

    async fn delete_trigger_mapping(&self, id: &str) -> Result<(), StoreError> {
        self.mappings.remove(id).ok_or(StoreError::NotFound)?;
        Ok(())
    }

    async fn get_recipient(&self, id: &str) -> Result<Option<Recipient>, StoreError> {
        Ok(self.recipients.get(id).map(|r| r.clone()))
    }

    async fn get_recipient_by_email(&self, email: &str) -> Result<Option<Recipient>, StoreError> {
        Ok(self.recipients.iter().find(|r| r.email.eq_ignore_ascii_case(email)).map(|r| r.clone()))
    }

    async fn list_recipients(&self, offset: usize, limit: usize) -> Result<Vec<Recipient>, StoreError> {
        Ok(page(self.recipients.iter().map(|r| r.clone()), offset, limit))
    }

    async fn put_recipient(&self, recipient: Recipient) -> Result<(), StoreError> {
        self.recipients.insert(recipient.id.clone(), recipient);
        Ok(())
    }

    async fn delete_recipient(&self, id: &str) -> Result<(), StoreError> {
        if self.assignments.iter().any(|a| a.recipient_id == id) {
            return Err(StoreError::InUse("recipient has assignments".into()));
        }
        self.recipients.remove(id).ok_or(StoreError::NotFound)?;
        Ok(())
    }

    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>, StoreError> {
        Ok(self.assignments.get(id).map(|r| r.clone()))
    }

    async fn find_assignment(&self, recipient_id: &str, bundle_id: &str) -> Result<Option<Assignment>, StoreError> {
        Ok(self
            .assignments
            .iter()
            .find(|a| a.recipient_id == recipient_id && a.bundle_id == bundle_id)
            .map(|a| a.clone()))
    }

    async fn list_assignments_for_recipient(&self, recipient_id: &str, offset: usize, limit: usize) -> Result<Vec<Assignment>, StoreError> {
        Ok(page(
            self.assignments.iter().filter(|a| a.recipient_id == recipient_id).map(|a| a.clone()),
            offset,
            limit,
        ))
    }

    async fn put_assignment(&self, assignment: Assignment) -> Result<(), StoreError> {
        self.assignments.insert(assignment.id.clone(), assignment);
        Ok(())
    }

    async fn delete_assignment(&self, id: &str) -> Result<(), StoreError> {
        self.assignments.remove(id).ok_or(StoreError::NotFound)?;
        Ok(())
    }

    async fn record_download(&self, assignment_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut assignment = self.assignments.get_mut(assignment_id).ok_or(StoreError::NotFound)?;
        assignment.downloads_used += 1;
        assignment.last_download_at = Some(at);
        Ok(())
    }

    async fn put_admin_session(&self, session: AdminSession) -> Result<(), StoreError> {
        self.admin_sessions.insert(session.jti.clone(), session);
        Ok(())
    }

    async fn find_admin_session(&self, jti: &str) -> Result<Option<AdminSession>, StoreError> {
        Ok(self.admin_sessions.get(jti).map(|r| r.clone()))
    }

    async fn revoke_admin_session(&self, jti: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut session = self.admin_sessions.get_mut(jti).ok_or(StoreError::NotFound)?;
        session.revoked_at = Some(at);
        Ok(())
    }

    async fn put_recipient_session(&self, session: RecipientSession) -> Result<(), StoreError> {
        self.recipient_sessions.insert(session.jti.clone(), session);
        Ok(())
    }

    async fn find_recipient_session(&self, jti: &str) -> Result<Option<RecipientSession>, StoreError> {
        Ok(self.recipient_sessions.get(jti).map(|r| r.clone()))
    }

    async fn put_api_token(&self, token: ApiToken) -> Result<(), StoreError> {
        self.api_tokens.insert(token.token_hash.clone(), token);
        Ok(())
    }

    async fn find_api_token(&self, token_hash: &str) -> Result<Option<ApiToken>, StoreError> {
        Ok(self.api_tokens.get(token_hash).map(|r| r.clone()))
    }

    async fn mark_api_token_used(&self, token_hash: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(mut token) = self.api_tokens.get_mut(token_hash) {
            token.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn revoke_api_token(&self, token_hash: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut token = self.api_tokens.get_mut(token_hash).ok_or(StoreError::NotFound)?;
        token.revoked_at = Some(at);
        Ok(())
    }

    async fn put_magic_link(&self, link: MagicLink) -> Result<(), StoreError> {
        self.magic_links.insert(link.token_hash.clone(), link);
        Ok(())
    }

    async fn find_magic_link(&self, token_hash: &str) -> Result<Option<MagicLink>, StoreError> {
        Ok(self.magic_links.get(token_hash).map(|r| r.clone()))
    }

    async fn consume_magic_link(&self, token_hash: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut link = self.magic_links.get_mut(token_hash).ok_or(StoreError::NotFound)?;
        link.consumed_at = Some(at);
        Ok(())
    }

    async fn clear_recipient_otps(&self, recipient_id: &str) -> Result<(), StoreError> {
        self.recipient_otps.remove(recipient_id);
        Ok(())
    }

    async fn put_recipient_otp(&self, otp: RecipientOtp) -> Result<(), StoreError> {
        self.recipient_otps.insert(otp.recipient_id.clone(), otp);
        Ok(())
    }

    async fn latest_recipient_otp(&self, recipient_id: &str) -> Result<Option<RecipientOtp>, StoreError> {
        Ok(self.recipient_otps.get(recipient_id).map(|r| r.clone()))
    }

    async fn increment_otp_attempts(&self, recipient_id: &str) -> Result<(), StoreError> {
        if let Some(mut otp) = self.recipient_otps.get_mut(recipient_id) {
            otp.attempts += 1;
        }
        Ok(())
    }

    async fn delete_recipient_otp(&self, recipient_id: &str) -> Result<(), StoreError> {
        self.recipient_otps.remove(recipient_id);
        Ok(())
    }

    async fn put_device_auth(&self, device: DeviceAuth) -> Result<(), StoreError> {
        self.device_auths.insert(device.device_code_hash.clone(), device);
        Ok(())
    }

    async fn find_device_auth_by_device_code(&self, device_code_hash: &str) -> Result<Option<DeviceAuth>, StoreError> {
        Ok(self.device_auths.get(device_code_hash).map(|r| r.clone()))
    }

    async fn find_device_auth_by_user_code(&self, user_code: &str) -> Result<Option<DeviceAuth>, StoreError> {
        Ok(self.device_auths.iter().find(|d| d.user_code == user_code).map(|d| d.clone()))
    }

    async fn update_device_auth(&self, device: DeviceAuth) -> Result<(), StoreError> {
        self.device_auths.insert(device.device_code_hash.clone(), device);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(id: &str) -> Bundle {
        let now = Utc::now();
        Bundle {
            id: id.to_owned(),
            name: id.to_owned(),
            is_enabled: true,
            storage_key: None,
            checksum: None,
            bundle_digest: None,
            size: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn delete_bundle_with_objects_is_rejected() {
        let store = MemoryStore::new();
        store.put_bundle(bundle("b-1")).await.unwrap();
        store
            .put_bundle_object(BundleObject {
                id: "bo-1".into(),
                bundle_id: "b-1".into(),
                file_id: "f-1".into(),
                path: None,
                required: true,
                sort_order: 0,
                is_enabled: true,
            })
            .await
            .unwrap();

        let err = store.delete_bundle("b-1").await.unwrap_err();
        assert!(matches!(err, StoreError::InUse(_)));
    }

    #[tokio::test]
    async fn delete_bundle_without_dependents_succeeds() {
        let store = MemoryStore::new();
        store.put_bundle(bundle("b-1")).await.unwrap();
        store.delete_bundle("b-1").await.unwrap();
        assert!(store.get_bundle("b-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bundle_objects_are_listed_in_sort_order() {
        let store = MemoryStore::new();
        store
            .put_bundle_object(BundleObject {
                id: "bo-2".into(),
                bundle_id: "b-1".into(),
                file_id: "f-2".into(),
                path: None,
                required: true,
                sort_order: 1,
                is_enabled: true,
            })
            .await
            .unwrap();
        store
            .put_bundle_object(BundleObject {
                id: "bo-1".into(),
                bundle_id: "b-1".into(),
                file_id: "f-1".into(),
                path: None,
                required: true,
                sort_order: 0,
                is_enabled: true,
            })
            .await
            .unwrap();

        let objects = store.list_bundle_objects("b-1").await.unwrap();
        assert_eq!(objects[0].id, "bo-1");
        assert_eq!(objects[1].id, "bo-2");
    }
}
