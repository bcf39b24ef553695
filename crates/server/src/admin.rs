//! Admin CRUD endpoints (§4.17): bundles, pipelines, users, presets,
//! triggers, actions, assignments, recipients, files. Every write appends
//! a change-log entry; deletes refuse with 409 `IN_USE` when the `Store`
//! reports a dependent row exists.

use chrono::Utc;
use latchflow_core::Actor;
use latchflow_http::ApiError;
use serde::Serialize;
use serde_json::Value;

use crate::error::from_store_error;
use crate::history::record_change;
use crate::state::AppState;
use crate::store::{
    ActionDefinitionRow, Bundle, BundleObject, PermissionPreset, Pipeline, Recipient, StoredFile, TriggerDefinition,
    TriggerMapping, User,
};

fn state_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

macro_rules! crud_module {
    (
        $module:ident,
        $entity:ty,
        $entity_type:literal,
        get = $get:ident,
        list = $list:ident,
        put = $put:ident,
        delete = $delete:ident
    ) => {
        pub mod $module {
            use super::*;

            pub async fn get(state: &AppState, id: &str) -> Result<$entity, ApiError> {
                state
                    .store
                    .$get(id)
                    .await
                    .map_err(from_store_error)?
                    .ok_or_else(|| ApiError::not_found(concat!($entity_type, " not found")))
            }

            pub async fn list(state: &AppState, offset: usize, limit: usize) -> Result<Vec<$entity>, ApiError> {
                state.store.$list(offset, limit.clamp(1, 100)).await.map_err(from_store_error)
            }

            pub async fn upsert(state: &AppState, actor: Actor, entity: $entity) -> Result<$entity, ApiError> {
                state.store.$put(entity.clone()).await.map_err(from_store_error)?;
                record_change(
                    state,
                    $entity_type,
                    &entity.id,
                    state_json(&SerializableView(&entity)),
                    actor,
                    "upsert",
                )
                .await
                .map_err(|e| ApiError::internal(e.to_string()))?;
                Ok(entity)
            }

            pub async fn delete(state: &AppState, actor: Actor, id: &str) -> Result<(), ApiError> {
                state.store.$delete(id).await.map_err(from_store_error)?;
                record_change(
                    state,
                    $entity_type,
                    id,
                    Value::Null,
                    actor,
                    "delete",
                )
                .await
                .map_err(|e| ApiError::internal(e.to_string()))?;
                Ok(())
            }
        }
    };
}

/// Entities don't derive `Serialize` directly on the `store` module (kept
/// persistence-shape focused); this wraps one in a small mirrored view
/// purely for the change-log's `state` payload.
struct SerializableView<'a, T>(&'a T);

impl Serialize for SerializableView<'_, Bundle> {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let b = self.0;
        let mut st = s.serialize_struct("Bundle", 4)?;
        st.serialize_field("id", &b.id)?;
        st.serialize_field("name", &b.name)?;
        st.serialize_field("isEnabled", &b.is_enabled)?;
        st.serialize_field("bundleDigest", &b.bundle_digest)?;
        st.end()
    }
}

impl Serialize for SerializableView<'_, Pipeline> {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let p = self.0;
        let mut st = s.serialize_struct("Pipeline", 3)?;
        st.serialize_field("id", &p.id)?;
        st.serialize_field("name", &p.name)?;
        st.serialize_field("isEnabled", &p.is_enabled)?;
        st.end()
    }
}

impl Serialize for SerializableView<'_, User> {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let u = self.0;
        let mut st = s.serialize_struct("User", 4)?;
        st.serialize_field("id", &u.id)?;
        st.serialize_field("email", &u.email)?;
        st.serialize_field("role", &u.role.to_string())?;
        st.serialize_field("isActive", &u.is_active)?;
        st.end()
    }
}

impl Serialize for SerializableView<'_, PermissionPreset> {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let p = self.0;
        let mut st = s.serialize_struct("PermissionPreset", 3)?;
        st.serialize_field("id", &p.id)?;
        st.serialize_field("name", &p.name)?;
        st.serialize_field("version", &p.version)?;
        st.end()
    }
}

impl Serialize for SerializableView<'_, TriggerDefinition> {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let t = self.0;
        let mut st = s.serialize_struct("TriggerDefinition", 4)?;
        st.serialize_field("id", &t.id)?;
        st.serialize_field("pipelineId", &t.pipeline_id)?;
        st.serialize_field("kind", &t.kind)?;
        st.serialize_field("isEnabled", &t.is_enabled)?;
        st.end()
    }
}

impl Serialize for SerializableView<'_, ActionDefinitionRow> {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let a = self.0;
        let mut st = s.serialize_struct("ActionDefinition", 4)?;
        st.serialize_field("id", &a.id)?;
        st.serialize_field("pipelineId", &a.pipeline_id)?;
        st.serialize_field("capabilityId", &a.capability_id)?;
        st.serialize_field("isEnabled", &a.is_enabled)?;
        st.end()
    }
}

impl Serialize for SerializableView<'_, Recipient> {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let r = self.0;
        let mut st = s.serialize_struct("Recipient", 4)?;
        st.serialize_field("id", &r.id)?;
        st.serialize_field("email", &r.email)?;
        st.serialize_field("isEnabled", &r.is_enabled)?;
        st.serialize_field("verificationRequired", &r.verification_required)?;
        st.end()
    }
}

impl Serialize for SerializableView<'_, StoredFile> {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let f = self.0;
        let mut st = s.serialize_struct("StoredFile", 3)?;
        st.serialize_field("id", &f.id)?;
        st.serialize_field("contentHash", &f.content_hash)?;
        st.serialize_field("size", &f.size)?;
        st.end()
    }
}

crud_module!(bundles, Bundle, "bundle", get = get_bundle, list = list_bundles, put = put_bundle, delete = delete_bundle);
crud_module!(pipelines, Pipeline, "pipeline", get = get_pipeline, list = list_pipelines, put = put_pipeline, delete = delete_pipeline);
crud_module!(users, User, "user", get = get_user, list = list_users, put = put_user, delete = delete_user);
crud_module!(presets, PermissionPreset, "preset", get = get_preset, list = list_presets, put = put_preset, delete = delete_preset);
crud_module!(triggers, TriggerDefinition, "trigger", get = get_trigger_definition, list = list_trigger_definitions, put = put_trigger_definition, delete = delete_trigger_definition);
crud_module!(actions, ActionDefinitionRow, "action", get = get_action_definition, list = list_action_definitions, put = put_action_definition, delete = delete_action_definition);
crud_module!(recipients, Recipient, "recipient", get = get_recipient, list = list_recipients, put = put_recipient, delete = delete_recipient);

/// Assignments are addressed per-recipient rather than via a flat list, so
/// they don't fit the macro's `list(offset,limit)` shape; handled by hand.
pub mod assignments {
    use super::*;
    use crate::store::Assignment;

    pub async fn get(state: &AppState, id: &str) -> Result<Assignment, ApiError> {
        state
            .store
            .get_assignment(id)
            .await
            .map_err(from_store_error)?
            .ok_or_else(|| ApiError::not_found("assignment not found"))
    }

    pub async fn list_for_recipient(
        state: &AppState,
        recipient_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Assignment>, ApiError> {
        state
            .store
            .list_assignments_for_recipient(recipient_id, offset, limit.clamp(1, 100))
            .await
            .map_err(from_store_error)
    }

    pub async fn upsert(state: &AppState, actor: Actor, assignment: Assignment) -> Result<Assignment, ApiError> {
        state.store.put_assignment(assignment.clone()).await.map_err(from_store_error)?;
        record_change(
            state,
            "assignment",
            &assignment.id,
            serde_json::json!({
                "recipientId": assignment.recipient_id,
                "bundleId": assignment.bundle_id,
                "isEnabled": assignment.is_enabled,
                "maxDownloads": assignment.max_downloads,
                "cooldownSeconds": assignment.cooldown_seconds,
            }),
            actor,
            "upsert",
        )
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
        Ok(assignment)
    }

    pub async fn delete(state: &AppState, actor: Actor, id: &str) -> Result<(), ApiError> {
        state.store.delete_assignment(id).await.map_err(from_store_error)?;
        record_change(state, "assignment", id, Value::Null, actor, "delete")
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        Ok(())
    }
}

/// Files: create from already-stored bytes (storage is handled by the
/// portal/upload transport, out of scope here — §1), delete refuses if a
/// bundle object still references the file.
pub mod files {
    use super::*;

    pub async fn get(state: &AppState, id: &str) -> Result<StoredFile, ApiError> {
        state
            .store
            .get_file(id)
            .await
            .map_err(from_store_error)?
            .ok_or_else(|| ApiError::not_found("file not found"))
    }

    pub async fn upsert(state: &AppState, actor: Actor, file: StoredFile) -> Result<StoredFile, ApiError> {
        state.store.put_file_row(file.clone()).await.map_err(from_store_error)?;
        record_change(
            state,
            "file",
            &file.id,
            state_json(&SerializableView(&file)),
            actor,
            "upsert",
        )
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
        Ok(file)
    }

    pub async fn delete(state: &AppState, actor: Actor, id: &str) -> Result<(), ApiError> {
        state.store.delete_file_row(id).await.map_err(from_store_error)?;
        record_change(state, "file", id, Value::Null, actor, "delete")
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        Ok(())
    }
}

/// Bundle composition (§3 "Bundle composition"): objects attached to a
/// bundle, mutated as part of the bundle's own admin surface.
pub mod bundle_objects {
    use super::*;

    pub async fn list(state: &AppState, bundle_id: &str) -> Result<Vec<BundleObject>, ApiError> {
        state.store.list_bundle_objects(bundle_id).await.map_err(from_store_error)
    }

    pub async fn upsert(state: &AppState, actor: Actor, bundle_id: &str, object: BundleObject) -> Result<BundleObject, ApiError> {
        state.store.put_bundle_object(object.clone()).await.map_err(from_store_error)?;
        record_change(
            state,
            "bundle_object",
            &object.id,
            serde_json::json!({
                "bundleId": bundle_id,
                "fileId": object.file_id,
                "path": object.path,
                "required": object.required,
                "sortOrder": object.sort_order,
                "isEnabled": object.is_enabled,
            }),
            actor,
            "upsert",
        )
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
        state.rebuild_scheduler.schedule(bundle_id, false).await;
        Ok(object)
    }

    pub async fn delete(state: &AppState, actor: Actor, bundle_id: &str, id: &str) -> Result<(), ApiError> {
        state.store.delete_bundle_object(id).await.map_err(from_store_error)?;
        record_change(state, "bundle_object", id, Value::Null, actor, "delete")
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        state.rebuild_scheduler.schedule(bundle_id, false).await;
        Ok(())
    }
}

/// Trigger→action mappings.
pub mod trigger_mappings {
    use super::*;

    pub async fn upsert(state: &AppState, actor: Actor, mapping: TriggerMapping) -> Result<TriggerMapping, ApiError> {
        state.store.put_trigger_mapping(mapping.clone()).await.map_err(from_store_error)?;
        record_change(
            state,
            "trigger_mapping",
            &mapping.id,
            serde_json::json!({
                "triggerDefinitionId": mapping.trigger_definition_id,
                "actionDefinitionId": mapping.action_definition_id,
                "sortOrder": mapping.sort_order,
                "isEnabled": mapping.is_enabled,
            }),
            actor,
            "upsert",
        )
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
        Ok(mapping)
    }

    pub async fn delete(state: &AppState, actor: Actor, id: &str) -> Result<(), ApiError> {
        state.store.delete_trigger_mapping(id).await.map_err(from_store_error)?;
        record_change(state, "trigger_mapping", id, Value::Null, actor, "delete")
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        Ok(())
    }
}

/// `POST /admin/permissions/simulate`: run the authorizer against a target
/// user/route without any side effect.
pub mod permissions {
    use latchflow_authz::{authorize, AuthzContext, AuthzPreset, AuthzUser, Decision, RequestSnapshot, SessionFreshness};

    use super::*;
    use crate::routes;

    pub struct SimulateRequest {
        pub method: String,
        pub path_template: String,
        pub ctx: AuthzContext,
        pub user_id: String,
    }

    pub struct SimulateResult {
        pub allowed: bool,
        pub reason: String,
    }

    pub async fn simulate(state: &AppState, req: SimulateRequest) -> Result<SimulateResult, ApiError> {
        let user = state
            .store
            .get_user(&req.user_id)
            .await
            .map_err(from_store_error)?
            .ok_or_else(|| ApiError::not_found("user not found"))?;

        let preset = match &user.permission_preset_id {
            Some(id) => state.store.get_preset(id).await.map_err(from_store_error)?,
            None => None,
        };

        let entry = routes::resolve(&req.method, &req.path_template);
        let authz_user = AuthzUser {
            role: user.role,
            is_active: user.is_active,
            mfa_enabled: user.mfa_enabled,
            permissions_hash: user.permissions_hash.as_deref(),
            direct_permissions: &user.direct_permissions,
            preset: preset.as_ref().map(|p| AuthzPreset {
                id: &p.id,
                version: p.version,
                rules: &p.rules,
            }),
        };

        let session = SessionFreshness {
            reauthenticated_at: None,
            mfa_verified_at: None,
            created_at: Utc::now(),
        };

        let (decision, log) = authorize(
            entry,
            &RequestSnapshot::default(),
            &req.ctx,
            &authz_user,
            &state.rule_cache,
            &state.rate_limiter,
            state.config.evaluation_mode(),
            &state.config.history.system_user_id,
            Utc::now(),
            state.config.authz.require_admin_2fa,
            chrono::Duration::from_std(state.config.authz.reauth_window).unwrap_or(chrono::Duration::zero()),
            Some(&session),
        );

        Ok(SimulateResult {
            allowed: matches!(decision, Decision::Allow(_)),
            reason: log.reason,
        })
    }
}
