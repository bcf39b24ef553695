//! Builds the axum `Router` (C16): every route in `routes.rs`'s policy
//! table plus the portal, auth, and build endpoints from §6. Each handler
//! (1) builds a `latchflow_http::Request` via `adapter::build_request`,
//! (2) authenticates/authorizes, (3) calls into `admin`/`portal`/
//! `auth_flows`, and (4) converts the result back with `adapter`.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};

use latchflow_authz::AuthzContext;
use latchflow_http::ApiError;

use crate::adapter::{api_error_response, build_request, buffer, empty, json_ok};
use crate::auth::{authorize_admin, require_admin_session, require_recipient_session};
use crate::state::AppState;
use crate::store::{
    ActionDefinitionRow, Assignment, Bundle, BundleObject, PermissionPreset, Pipeline, Recipient, StoredFile,
    TriggerDefinition, TriggerMapping, User,
};
use crate::{admin, auth_flows, portal, routes};

// ---------------------------------------------------------------------
// JSON body parsing helpers
// ---------------------------------------------------------------------

fn s(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn s_req(v: &Value, key: &str) -> Result<String, ApiError> {
    s(v, key).ok_or_else(|| ApiError::bad_request(format!("{key} is required")))
}

fn b_or(v: &Value, key: &str, default: bool) -> bool {
    v.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn i64_or(v: &Value, key: &str, default: i64) -> i64 {
    v.get(key).and_then(Value::as_i64).unwrap_or(default)
}

fn strs(v: &Value, key: &str) -> Vec<String> {
    v.get(key)
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_owned).collect())
        .unwrap_or_default()
}

fn page_params(query: &HashMap<String, String>) -> (usize, usize) {
    let offset = query.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
    let limit = query.get("limit").and_then(|v| v.parse().ok()).unwrap_or(20usize).clamp(1, 100);
    (offset, limit)
}

fn actor_for(user: &User) -> latchflow_core::Actor {
    latchflow_core::Actor::user(user.id.clone())
}

fn ctx_none(_id: &str) -> AuthzContext {
    AuthzContext::default()
}

fn ctx_bundle(id: &str) -> AuthzContext {
    AuthzContext { bundle_id: Some(id.to_owned()), ..Default::default() }
}

fn ctx_pipeline(id: &str) -> AuthzContext {
    AuthzContext { pipeline_id: Some(id.to_owned()), ..Default::default() }
}

fn ctx_action(id: &str) -> AuthzContext {
    AuthzContext { action_id: Some(id.to_owned()), ..Default::default() }
}

fn view_bundle(b: &Bundle) -> Value {
    json!({
        "id": b.id, "name": b.name, "isEnabled": b.is_enabled,
        "checksum": b.checksum, "bundleDigest": b.bundle_digest, "size": b.size,
        "createdAt": b.created_at, "updatedAt": b.updated_at,
    })
}

fn view_pipeline(p: &Pipeline) -> Value {
    json!({ "id": p.id, "name": p.name, "isEnabled": p.is_enabled })
}

fn view_user(u: &User) -> Value {
    json!({
        "id": u.id, "email": u.email, "role": u.role.to_string(), "isActive": u.is_active,
        "mfaEnabled": u.mfa_enabled, "permissionPresetId": u.permission_preset_id,
        "directPermissions": u.direct_permissions,
    })
}

fn view_preset(p: &PermissionPreset) -> Value {
    json!({ "id": p.id, "name": p.name, "version": p.version, "rules": p.rules })
}

fn view_trigger(t: &TriggerDefinition) -> Value {
    json!({ "id": t.id, "pipelineId": t.pipeline_id, "kind": t.kind, "config": t.config, "isEnabled": t.is_enabled })
}

fn view_action(a: &ActionDefinitionRow) -> Value {
    json!({ "id": a.id, "pipelineId": a.pipeline_id, "capabilityId": a.capability_id, "config": a.config, "isEnabled": a.is_enabled })
}

fn view_recipient(r: &Recipient) -> Value {
    json!({
        "id": r.id, "email": r.email, "isEnabled": r.is_enabled, "tags": r.tags,
        "verificationRequired": r.verification_required, "verifiedAt": r.verified_at,
    })
}

// ---------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------

async fn health(State(state): State<AppState>) -> AxumResponse {
    json_ok(
        200,
        json!({
            "status": "ok",
            "queue": "memory",
            "storage": if state.storage.head_file("__healthcheck__").await.is_err() { "error" } else { "ok" },
        }),
    )
}

// ---------------------------------------------------------------------
// Entity parsing
// ---------------------------------------------------------------------

fn parse_bundle(id: String, body: &Value, existing: Option<&Bundle>) -> Result<Bundle, ApiError> {
    let now = Utc::now();
    Ok(Bundle {
        id,
        name: s(body, "name").or_else(|| existing.map(|b| b.name.clone())).ok_or_else(|| ApiError::bad_request("name is required"))?,
        is_enabled: b_or(body, "isEnabled", existing.map_or(true, |b| b.is_enabled)),
        storage_key: existing.and_then(|b| b.storage_key.clone()),
        checksum: existing.and_then(|b| b.checksum.clone()),
        bundle_digest: existing.and_then(|b| b.bundle_digest.clone()),
        size: existing.and_then(|b| b.size),
        created_at: existing.map_or(now, |b| b.created_at),
        updated_at: now,
    })
}

fn parse_pipeline(id: String, body: &Value, existing: Option<&Pipeline>) -> Result<Pipeline, ApiError> {
    Ok(Pipeline {
        id,
        name: s(body, "name").or_else(|| existing.map(|p| p.name.clone())).ok_or_else(|| ApiError::bad_request("name is required"))?,
        is_enabled: b_or(body, "isEnabled", existing.map_or(true, |p| p.is_enabled)),
    })
}

fn parse_user(id: String, body: &Value, existing: Option<&User>) -> Result<User, ApiError> {
    let role = match s(body, "role").or_else(|| existing.map(|u| u.role.to_string())) {
        Some(raw) => match raw.as_str() {
            "ADMIN" => latchflow_core::Role::Admin,
            "EXECUTOR" => latchflow_core::Role::Executor,
            _ => latchflow_core::Role::Unknown,
        },
        None => latchflow_core::Role::Unknown,
    };

    let direct_permissions = match body.get("directPermissions") {
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| ApiError::bad_request(e.to_string()))?,
        None => existing.map(|u| u.direct_permissions.clone()).unwrap_or_default(),
    };
    let permission_preset_id = s(body, "permissionPresetId").or_else(|| existing.and_then(|u| u.permission_preset_id.clone()));
    let permissions_hash = Some(latchflow_authz::compile(&direct_permissions).rules_hash);

    Ok(User {
        id,
        email: s_req(body, "email").or_else(|_| existing.map(|u| u.email.clone()).ok_or_else(|| ApiError::bad_request("email is required")))?,
        role,
        is_active: b_or(body, "isActive", existing.map_or(true, |u| u.is_active)),
        mfa_enabled: b_or(body, "mfaEnabled", existing.map_or(false, |u| u.mfa_enabled)),
        permissions_hash,
        direct_permissions,
        permission_preset_id,
    })
}

fn parse_preset(id: String, body: &Value, existing: Option<&PermissionPreset>) -> Result<PermissionPreset, ApiError> {
    let rules = match body.get("rules") {
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| ApiError::bad_request(e.to_string()))?,
        None => existing.map(|p| p.rules.clone()).unwrap_or_default(),
    };
    Ok(PermissionPreset {
        id,
        name: s(body, "name").or_else(|| existing.map(|p| p.name.clone())).ok_or_else(|| ApiError::bad_request("name is required"))?,
        version: existing.map_or(1, |p| p.version) + u32::from(existing.is_some()),
        rules,
    })
}

fn parse_trigger(id: String, body: &Value, existing: Option<&TriggerDefinition>) -> Result<TriggerDefinition, ApiError> {
    Ok(TriggerDefinition {
        id,
        pipeline_id: s(body, "pipelineId").or_else(|| existing.and_then(|t| t.pipeline_id.clone())),
        kind: s(body, "kind").or_else(|| existing.map(|t| t.kind.clone())).ok_or_else(|| ApiError::bad_request("kind is required"))?,
        config: body.get("config").cloned().or_else(|| existing.map(|t| t.config.clone())).unwrap_or(Value::Null),
        is_enabled: b_or(body, "isEnabled", existing.map_or(true, |t| t.is_enabled)),
    })
}

fn parse_action(id: String, body: &Value, existing: Option<&ActionDefinitionRow>) -> Result<ActionDefinitionRow, ApiError> {
    Ok(ActionDefinitionRow {
        id,
        pipeline_id: s(body, "pipelineId").or_else(|| existing.and_then(|a| a.pipeline_id.clone())),
        capability_id: s(body, "capabilityId")
            .or_else(|| existing.map(|a| a.capability_id.clone()))
            .ok_or_else(|| ApiError::bad_request("capabilityId is required"))?,
        config: body.get("config").cloned().or_else(|| existing.map(|a| a.config.clone())).unwrap_or(Value::Null),
        is_enabled: b_or(body, "isEnabled", existing.map_or(true, |a| a.is_enabled)),
    })
}

fn parse_recipient(id: String, body: &Value, existing: Option<&Recipient>) -> Result<Recipient, ApiError> {
    Ok(Recipient {
        id,
        email: s(body, "email").or_else(|| existing.map(|r| r.email.clone())).ok_or_else(|| ApiError::bad_request("email is required"))?,
        is_enabled: b_or(body, "isEnabled", existing.map_or(true, |r| r.is_enabled)),
        tags: if body.get("tags").is_some() { strs(body, "tags") } else { existing.map(|r| r.tags.clone()).unwrap_or_default() },
        verification_required: b_or(body, "verificationRequired", existing.map_or(false, |r| r.verification_required)),
        verified_at: existing.and_then(|r| r.verified_at),
    })
}

fn parse_assignment(id: String, body: &Value, existing: Option<&Assignment>) -> Result<Assignment, ApiError> {
    Ok(Assignment {
        id,
        recipient_id: s(body, "recipientId").or_else(|| existing.map(|a| a.recipient_id.clone())).ok_or_else(|| ApiError::bad_request("recipientId is required"))?,
        bundle_id: s(body, "bundleId").or_else(|| existing.map(|a| a.bundle_id.clone())).ok_or_else(|| ApiError::bad_request("bundleId is required"))?,
        is_enabled: b_or(body, "isEnabled", existing.map_or(true, |a| a.is_enabled)),
        max_downloads: body.get("maxDownloads").and_then(Value::as_u64).map(|v| v as u32).or_else(|| existing.and_then(|a| a.max_downloads)),
        downloads_used: existing.map_or(0, |a| a.downloads_used),
        cooldown_seconds: body.get("cooldownSeconds").and_then(Value::as_i64).or_else(|| existing.and_then(|a| a.cooldown_seconds)),
        last_download_at: existing.and_then(|a| a.last_download_at),
    })
}

fn parse_file(id: String, body: &Value, existing: Option<&StoredFile>) -> Result<StoredFile, ApiError> {
    Ok(StoredFile {
        id,
        key: s(body, "key").or_else(|| existing.and_then(|f| f.key.clone())),
        storage_key: s(body, "storageKey").or_else(|| existing.and_then(|f| f.storage_key.clone())),
        content_hash: s(body, "contentHash").or_else(|| existing.and_then(|f| f.content_hash.clone())),
        size: body.get("size").and_then(Value::as_u64).unwrap_or_else(|| existing.map_or(0, |f| f.size)),
        content_type: s(body, "contentType").unwrap_or_else(|| existing.map_or_else(|| "application/octet-stream".to_owned(), |f| f.content_type.clone())),
    })
}

fn parse_bundle_object(id: String, bundle_id: &str, body: &Value, existing: Option<&BundleObject>) -> Result<BundleObject, ApiError> {
    Ok(BundleObject {
        id,
        bundle_id: bundle_id.to_owned(),
        file_id: s(body, "fileId").or_else(|| existing.map(|o| o.file_id.clone())).ok_or_else(|| ApiError::bad_request("fileId is required"))?,
        path: s(body, "path").or_else(|| existing.and_then(|o| o.path.clone())),
        required: b_or(body, "required", existing.map_or(false, |o| o.required)),
        sort_order: i64_or(body, "sortOrder", existing.map_or(0, |o| o.sort_order)),
        is_enabled: b_or(body, "isEnabled", existing.map_or(true, |o| o.is_enabled)),
    })
}

fn parse_trigger_mapping(id: String, body: &Value, existing: Option<&TriggerMapping>) -> Result<TriggerMapping, ApiError> {
    Ok(TriggerMapping {
        id,
        trigger_definition_id: s(body, "triggerDefinitionId")
            .or_else(|| existing.map(|m| m.trigger_definition_id.clone()))
            .ok_or_else(|| ApiError::bad_request("triggerDefinitionId is required"))?,
        action_definition_id: s(body, "actionDefinitionId")
            .or_else(|| existing.map(|m| m.action_definition_id.clone()))
            .ok_or_else(|| ApiError::bad_request("actionDefinitionId is required"))?,
        sort_order: i64_or(body, "sortOrder", existing.map_or(0, |m| m.sort_order)),
        is_enabled: b_or(body, "isEnabled", existing.map_or(true, |m| m.is_enabled)),
    })
}

// ---------------------------------------------------------------------
// A generic admin-route guard: resolves the policy entry for this
// signature, authenticates/authorizes, and hands back the acting user.
// ---------------------------------------------------------------------

async fn guard(
    state: &AppState,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    method: &str,
    path_template: &str,
    path: &str,
    params: HashMap<String, String>,
    query: HashMap<String, String>,
    body: Option<Value>,
    ids: AuthzContext,
) -> Result<(User, latchflow_http::Request), ApiError> {
    let req = build_request(method, path, params, query, headers, body, peer);
    let user = authorize_admin(state, &req, method, path_template, ids, &["core:read", "core:write"], Utc::now()).await?;
    Ok((user, req))
}

macro_rules! admin_crud {
    ($list_fn:ident, $get_fn:ident, $post_fn:ident, $put_fn:ident, $delete_fn:ident, $module:ident, $path_base:literal, $parse:ident, $view:ident, $ctx_fn:ident) => {
        async fn $list_fn(
            State(state): State<AppState>,
            ConnectInfo(peer): ConnectInfo<SocketAddr>,
            headers: HeaderMap,
            Query(query): Query<HashMap<String, String>>,
        ) -> AxumResponse {
            let method = "GET";
            let path_template = concat!("/admin/", $path_base);
            match guard(&state, &headers, Some(peer), method, path_template, path_template, HashMap::new(), query.clone(), None, AuthzContext::default()).await {
                Ok(_) => {
                    let (offset, limit) = page_params(&query);
                    match admin::$module::list(&state, offset, limit).await {
                        Ok(items) => json_ok(200, json!(items.iter().map($view).collect::<Vec<_>>())),
                        Err(e) => api_error_response(&e),
                    }
                }
                Err(e) => api_error_response(&e),
            }
        }

        async fn $get_fn(
            State(state): State<AppState>,
            ConnectInfo(peer): ConnectInfo<SocketAddr>,
            headers: HeaderMap,
            Path(id): Path<String>,
        ) -> AxumResponse {
            let method = "GET";
            let path_template = concat!("/admin/", $path_base, "/:id");
            let mut params = HashMap::new();
            params.insert("id".to_owned(), id.clone());
            match guard(&state, &headers, Some(peer), method, path_template, path_template, params, HashMap::new(), None, $ctx_fn(&id)).await {
                Ok(_) => match admin::$module::get(&state, &id).await {
                    Ok(item) => json_ok(200, $view(&item)),
                    Err(e) => api_error_response(&e),
                },
                Err(e) => api_error_response(&e),
            }
        }

        async fn $post_fn(
            State(state): State<AppState>,
            ConnectInfo(peer): ConnectInfo<SocketAddr>,
            headers: HeaderMap,
            Json(body): Json<Value>,
        ) -> AxumResponse {
            let method = "POST";
            let path_template = concat!("/admin/", $path_base);
            match guard(&state, &headers, Some(peer), method, path_template, path_template, HashMap::new(), HashMap::new(), Some(body.clone()), AuthzContext::default()).await {
                Ok((user, _)) => {
                    let entity = match $parse(latchflow_core::generate_token(), &body, None) {
                        Ok(e) => e,
                        Err(e) => return api_error_response(&e),
                    };
                    match admin::$module::upsert(&state, actor_for(&user), entity).await {
                        Ok(item) => json_ok(201, $view(&item)),
                        Err(e) => api_error_response(&e),
                    }
                }
                Err(e) => api_error_response(&e),
            }
        }

        async fn $put_fn(
            State(state): State<AppState>,
            ConnectInfo(peer): ConnectInfo<SocketAddr>,
            headers: HeaderMap,
            Path(id): Path<String>,
            Json(body): Json<Value>,
        ) -> AxumResponse {
            let method = "PUT";
            let path_template = concat!("/admin/", $path_base, "/:id");
            let mut params = HashMap::new();
            params.insert("id".to_owned(), id.clone());
            match guard(&state, &headers, Some(peer), method, path_template, path_template, params, HashMap::new(), Some(body.clone()), $ctx_fn(&id)).await {
                Ok((user, _)) => {
                    let existing = match admin::$module::get(&state, &id).await {
                        Ok(e) => e,
                        Err(e) => return api_error_response(&e),
                    };
                    let entity = match $parse(id, &body, Some(&existing)) {
                        Ok(e) => e,
                        Err(e) => return api_error_response(&e),
                    };
                    match admin::$module::upsert(&state, actor_for(&user), entity).await {
                        Ok(item) => json_ok(200, $view(&item)),
                        Err(e) => api_error_response(&e),
                    }
                }
                Err(e) => api_error_response(&e),
            }
        }

        async fn $delete_fn(
            State(state): State<AppState>,
            ConnectInfo(peer): ConnectInfo<SocketAddr>,
            headers: HeaderMap,
            Path(id): Path<String>,
        ) -> AxumResponse {
            let method = "DELETE";
            let path_template = concat!("/admin/", $path_base, "/:id");
            let mut params = HashMap::new();
            params.insert("id".to_owned(), id.clone());
            match guard(&state, &headers, Some(peer), method, path_template, path_template, params, HashMap::new(), None, $ctx_fn(&id)).await {
                Ok((user, _)) => match admin::$module::delete(&state, actor_for(&user), &id).await {
                    Ok(()) => empty(204),
                    Err(e) => api_error_response(&e),
                },
                Err(e) => api_error_response(&e),
            }
        }
    };
}

admin_crud!(list_bundles, get_bundle, create_bundle, update_bundle, delete_bundle, bundles, "bundles", parse_bundle, view_bundle, ctx_bundle);
admin_crud!(list_pipelines, get_pipeline, create_pipeline, update_pipeline, delete_pipeline, pipelines, "pipelines", parse_pipeline, view_pipeline, ctx_pipeline);
admin_crud!(list_users, get_user, create_user, update_user, delete_user, users, "users", parse_user, view_user, ctx_none);
admin_crud!(list_presets, get_preset, create_preset, update_preset, delete_preset, presets, "presets", parse_preset, view_preset, ctx_none);
admin_crud!(list_triggers, get_trigger, create_trigger, update_trigger, delete_trigger, triggers, "triggers", parse_trigger, view_trigger, ctx_none);
admin_crud!(list_actions, get_action, create_action, update_action, delete_action, actions, "actions", parse_action, view_action, ctx_action);
admin_crud!(list_recipients, get_recipient, create_recipient, update_recipient, delete_recipient, recipients, "recipients", parse_recipient, view_recipient, ctx_none);

// ---------------------------------------------------------------------
// Hand-written admin routes (bundle objects, assignments, files,
// trigger mappings, build, simulate): none fit the CRUD macro's shape.
// ---------------------------------------------------------------------

async fn list_bundle_objects(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(bundle_id): Path<String>,
) -> AxumResponse {
    let path_template = "/admin/bundles/:id/objects";
    let mut params = HashMap::new();
    params.insert("id".to_owned(), bundle_id.clone());
    match guard(&state, &headers, Some(peer), "GET", path_template, path_template, params, HashMap::new(), None, AuthzContext { bundle_id: Some(bundle_id.clone()), ..Default::default() }).await {
        Ok(_) => match admin::bundle_objects::list(&state, &bundle_id).await {
            Ok(items) => json_ok(200, json!(items.into_iter().map(|o| json!({
                "id": o.id, "bundleId": o.bundle_id, "fileId": o.file_id, "path": o.path,
                "required": o.required, "sortOrder": o.sort_order, "isEnabled": o.is_enabled,
            })).collect::<Vec<_>>())),
            Err(e) => api_error_response(&e),
        },
        Err(e) => api_error_response(&e),
    }
}

async fn upsert_bundle_object(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(bundle_id): Path<String>,
    Json(body): Json<Value>,
) -> AxumResponse {
    let path_template = "/admin/bundles/:id/objects";
    let mut params = HashMap::new();
    params.insert("id".to_owned(), bundle_id.clone());
    match guard(&state, &headers, Some(peer), "POST", path_template, path_template, params, HashMap::new(), Some(body.clone()), AuthzContext { bundle_id: Some(bundle_id.clone()), ..Default::default() }).await {
        Ok((user, _)) => {
            let id = s(&body, "id").unwrap_or_else(latchflow_core::generate_token);
            let object = match parse_bundle_object(id, &bundle_id, &body, None) {
                Ok(o) => o,
                Err(e) => return api_error_response(&e),
            };
            match admin::bundle_objects::upsert(&state, actor_for(&user), &bundle_id, object).await {
                Ok(o) => json_ok(200, json!({ "id": o.id, "bundleId": o.bundle_id, "fileId": o.file_id })),
                Err(e) => api_error_response(&e),
            }
        }
        Err(e) => api_error_response(&e),
    }
}

async fn delete_bundle_object(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path((bundle_id, object_id)): Path<(String, String)>,
) -> AxumResponse {
    let path_template = "/admin/bundles/:id/objects/:objectId";
    let mut params = HashMap::new();
    params.insert("id".to_owned(), bundle_id.clone());
    params.insert("objectId".to_owned(), object_id.clone());
    match guard(&state, &headers, Some(peer), "DELETE", path_template, path_template, params, HashMap::new(), None, AuthzContext { bundle_id: Some(bundle_id.clone()), ..Default::default() }).await {
        Ok((user, _)) => match admin::bundle_objects::delete(&state, actor_for(&user), &bundle_id, &object_id).await {
            Ok(()) => empty(204),
            Err(e) => api_error_response(&e),
        },
        Err(e) => api_error_response(&e),
    }
}

/// `Store` has no flat file listing (files are addressed by id or via a
/// bundle's objects, §3); this always returns an empty page.
async fn list_files(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, headers: HeaderMap, Query(query): Query<HashMap<String, String>>) -> AxumResponse {
    let path_template = "/admin/files";
    match guard(&state, &headers, Some(peer), "GET", path_template, path_template, HashMap::new(), query, None, AuthzContext::default()).await {
        Ok(_) => json_ok(200, json!([])),
        Err(e) => api_error_response(&e),
    }
}

async fn get_file(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, headers: HeaderMap, Path(id): Path<String>) -> AxumResponse {
    let path_template = "/admin/files/:id";
    let mut params = HashMap::new();
    params.insert("id".to_owned(), id.clone());
    match guard(&state, &headers, Some(peer), "GET", path_template, path_template, params, HashMap::new(), None, AuthzContext::default()).await {
        Ok(_) => match admin::files::get(&state, &id).await {
            Ok(f) => json_ok(200, json!({ "id": f.id, "key": f.key, "contentHash": f.content_hash, "size": f.size, "contentType": f.content_type })),
            Err(e) => api_error_response(&e),
        },
        Err(e) => api_error_response(&e),
    }
}

async fn create_file(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, headers: HeaderMap, Json(body): Json<Value>) -> AxumResponse {
    let path_template = "/admin/files";
    match guard(&state, &headers, Some(peer), "POST", path_template, path_template, HashMap::new(), HashMap::new(), Some(body.clone()), AuthzContext::default()).await {
        Ok((user, _)) => {
            let id = latchflow_core::generate_token();
            let file = match parse_file(id, &body, None) {
                Ok(f) => f,
                Err(e) => return api_error_response(&e),
            };
            match admin::files::upsert(&state, actor_for(&user), file).await {
                Ok(f) => json_ok(201, json!({ "id": f.id, "contentHash": f.content_hash, "size": f.size })),
                Err(e) => api_error_response(&e),
            }
        }
        Err(e) => api_error_response(&e),
    }
}

async fn delete_file(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, headers: HeaderMap, Path(id): Path<String>) -> AxumResponse {
    let path_template = "/admin/files/:id";
    let mut params = HashMap::new();
    params.insert("id".to_owned(), id.clone());
    match guard(&state, &headers, Some(peer), "DELETE", path_template, path_template, params, HashMap::new(), None, AuthzContext::default()).await {
        Ok((user, _)) => match admin::files::delete(&state, actor_for(&user), &id).await {
            Ok(()) => empty(204),
            Err(e) => api_error_response(&e),
        },
        Err(e) => api_error_response(&e),
    }
}

async fn list_assignments(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, headers: HeaderMap, Query(query): Query<HashMap<String, String>>) -> AxumResponse {
    let path_template = "/admin/assignments";
    let Some(recipient_id) = query.get("recipientId").cloned() else {
        return api_error_response(&ApiError::bad_request("recipientId query param is required"));
    };
    let (offset, limit) = page_params(&query);
    match guard(&state, &headers, Some(peer), "GET", path_template, path_template, HashMap::new(), query.clone(), None, AuthzContext::default()).await {
        Ok(_) => match admin::assignments::list_for_recipient(&state, &recipient_id, offset, limit).await {
            Ok(items) => json_ok(200, json!(items.into_iter().map(assignment_view).collect::<Vec<_>>())),
            Err(e) => api_error_response(&e),
        },
        Err(e) => api_error_response(&e),
    }
}

fn assignment_view(a: Assignment) -> Value {
    json!({
        "id": a.id, "recipientId": a.recipient_id, "bundleId": a.bundle_id, "isEnabled": a.is_enabled,
        "maxDownloads": a.max_downloads, "downloadsUsed": a.downloads_used,
        "downloadsRemaining": a.downloads_remaining(), "cooldownSeconds": a.cooldown_seconds,
        "lastDownloadAt": a.last_download_at, "nextAvailableAt": a.next_available_at(),
        "cooldownRemainingSeconds": a.cooldown_remaining_seconds(Utc::now()),
    })
}

async fn get_assignment(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, headers: HeaderMap, Path(id): Path<String>) -> AxumResponse {
    let path_template = "/admin/assignments/:id";
    let mut params = HashMap::new();
    params.insert("id".to_owned(), id.clone());
    match guard(&state, &headers, Some(peer), "GET", path_template, path_template, params, HashMap::new(), None, AuthzContext::default()).await {
        Ok(_) => match admin::assignments::get(&state, &id).await {
            Ok(a) => json_ok(200, assignment_view(a)),
            Err(e) => api_error_response(&e),
        },
        Err(e) => api_error_response(&e),
    }
}

async fn create_assignment(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, headers: HeaderMap, Json(body): Json<Value>) -> AxumResponse {
    let path_template = "/admin/assignments";
    match guard(&state, &headers, Some(peer), "POST", path_template, path_template, HashMap::new(), HashMap::new(), Some(body.clone()), AuthzContext::default()).await {
        Ok((user, _)) => {
            let id = latchflow_core::generate_token();
            let assignment = match parse_assignment(id, &body, None) {
                Ok(a) => a,
                Err(e) => return api_error_response(&e),
            };
            match admin::assignments::upsert(&state, actor_for(&user), assignment).await {
                Ok(a) => json_ok(201, assignment_view(a)),
                Err(e) => api_error_response(&e),
            }
        }
        Err(e) => api_error_response(&e),
    }
}

async fn update_assignment(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, headers: HeaderMap, Path(id): Path<String>, Json(body): Json<Value>) -> AxumResponse {
    let path_template = "/admin/assignments/:id";
    let mut params = HashMap::new();
    params.insert("id".to_owned(), id.clone());
    match guard(&state, &headers, Some(peer), "PUT", path_template, path_template, params, HashMap::new(), Some(body.clone()), AuthzContext::default()).await {
        Ok((user, _)) => {
            let existing = match admin::assignments::get(&state, &id).await {
                Ok(a) => a,
                Err(e) => return api_error_response(&e),
            };
            let assignment = match parse_assignment(id, &body, Some(&existing)) {
                Ok(a) => a,
                Err(e) => return api_error_response(&e),
            };
            match admin::assignments::upsert(&state, actor_for(&user), assignment).await {
                Ok(a) => json_ok(200, assignment_view(a)),
                Err(e) => api_error_response(&e),
            }
        }
        Err(e) => api_error_response(&e),
    }
}

async fn delete_assignment(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, headers: HeaderMap, Path(id): Path<String>) -> AxumResponse {
    let path_template = "/admin/assignments/:id";
    let mut params = HashMap::new();
    params.insert("id".to_owned(), id.clone());
    match guard(&state, &headers, Some(peer), "DELETE", path_template, path_template, params, HashMap::new(), None, AuthzContext::default()).await {
        Ok((user, _)) => match admin::assignments::delete(&state, actor_for(&user), &id).await {
            Ok(()) => empty(204),
            Err(e) => api_error_response(&e),
        },
        Err(e) => api_error_response(&e),
    }
}

async fn create_trigger_mapping(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, headers: HeaderMap, Json(body): Json<Value>) -> AxumResponse {
    let path_template = "/admin/trigger-mappings";
    match guard(&state, &headers, Some(peer), "POST", path_template, path_template, HashMap::new(), HashMap::new(), Some(body.clone()), AuthzContext::default()).await {
        Ok((user, _)) => {
            let id = latchflow_core::generate_token();
            let mapping = match parse_trigger_mapping(id, &body, None) {
                Ok(m) => m,
                Err(e) => return api_error_response(&e),
            };
            match admin::trigger_mappings::upsert(&state, actor_for(&user), mapping).await {
                Ok(m) => json_ok(201, json!({ "id": m.id, "triggerDefinitionId": m.trigger_definition_id, "actionDefinitionId": m.action_definition_id })),
                Err(e) => api_error_response(&e),
            }
        }
        Err(e) => api_error_response(&e),
    }
}

async fn delete_trigger_mapping(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, headers: HeaderMap, Path(id): Path<String>) -> AxumResponse {
    let path_template = "/admin/trigger-mappings/:id";
    let mut params = HashMap::new();
    params.insert("id".to_owned(), id.clone());
    match guard(&state, &headers, Some(peer), "DELETE", path_template, path_template, params, HashMap::new(), None, AuthzContext::default()).await {
        Ok((user, _)) => match admin::trigger_mappings::delete(&state, actor_for(&user), &id).await {
            Ok(()) => empty(204),
            Err(e) => api_error_response(&e),
        },
        Err(e) => api_error_response(&e),
    }
}

async fn build_bundle(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, headers: HeaderMap, Path(bundle_id): Path<String>, Json(body): Json<Value>) -> AxumResponse {
    let path_template = "/admin/bundles/:id/build";
    let mut params = HashMap::new();
    params.insert("id".to_owned(), bundle_id.clone());
    match guard(&state, &headers, Some(peer), "POST", path_template, path_template, params, HashMap::new(), Some(body.clone()), AuthzContext { bundle_id: Some(bundle_id.clone()), ..Default::default() }).await {
        Ok(_) => {
            let force = b_or(&body, "force", false);
            state.rebuild_scheduler.schedule(&bundle_id, force).await;
            json_ok(202, json!({ "status": "queued" }))
        }
        Err(e) => api_error_response(&e),
    }
}

async fn build_status(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, headers: HeaderMap, Path(bundle_id): Path<String>) -> AxumResponse {
    let path_template = "/admin/bundles/:id/build/status";
    let mut params = HashMap::new();
    params.insert("id".to_owned(), bundle_id.clone());
    match guard(&state, &headers, Some(peer), "GET", path_template, path_template, params, HashMap::new(), None, AuthzContext { bundle_id: Some(bundle_id.clone()), ..Default::default() }).await {
        Ok(_) => {
            let status = state.rebuild_scheduler.status(&bundle_id);
            let bundle = state.store.get_bundle(&bundle_id).await.ok().flatten();
            json_ok(
                200,
                json!({
                    "state": format!("{:?}", status.state).to_lowercase(),
                    "last": status.last.map(|l| json!({ "when": l.when, "status": format!("{:?}", l.status).to_lowercase() })),
                    "bundleDigest": bundle.as_ref().and_then(|b| b.bundle_digest.clone()),
                    "checksum": bundle.as_ref().and_then(|b| b.checksum.clone()),
                }),
            )
        }
        Err(e) => api_error_response(&e),
    }
}

async fn simulate_permissions(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, headers: HeaderMap, Json(body): Json<Value>) -> AxumResponse {
    let path_template = "/admin/permissions/simulate";
    match guard(&state, &headers, Some(peer), "POST", path_template, path_template, HashMap::new(), HashMap::new(), Some(body.clone()), AuthzContext::default()).await {
        Ok(_) => {
            let Some(user_id) = s(&body, "userId") else {
                return api_error_response(&ApiError::bad_request("userId is required"));
            };
            let Some(method) = s(&body, "method") else {
                return api_error_response(&ApiError::bad_request("method is required"));
            };
            let Some(path) = s(&body, "path") else {
                return api_error_response(&ApiError::bad_request("path is required"));
            };
            let ctx = AuthzContext {
                user_id: user_id.clone(),
                role: latchflow_core::Role::Unknown,
                is_active: true,
                bundle_id: s(&body, "bundleId"),
                pipeline_id: s(&body, "pipelineId"),
                action_id: s(&body, "actionId"),
            };
            match admin::permissions::simulate(&state, admin::permissions::SimulateRequest { method, path_template: path, ctx, user_id }).await {
                Ok(result) => json_ok(200, json!({ "allowed": result.allowed, "reason": result.reason })),
                Err(e) => api_error_response(&e),
            }
        }
        Err(e) => api_error_response(&e),
    }
}

// ---------------------------------------------------------------------
// Auth flows (§4.18)
// ---------------------------------------------------------------------

async fn auth_admin_start(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, Json(body): Json<Value>) -> AxumResponse {
    let Some(email) = s(&body, "email") else {
        return api_error_response(&ApiError::bad_request("email is required"));
    };
    match auth_flows::admin_start(&state, &peer.ip().to_string(), auth_flows::MagicLinkStart { email }).await {
        Ok(()) => empty(204),
        Err(e) => api_error_response(&e),
    }
}

async fn auth_admin_callback(State(state): State<AppState>, headers: HeaderMap, Query(query): Query<HashMap<String, String>>) -> AxumResponse {
    let Some(token) = query.get("token") else {
        return api_error_response(&ApiError::bad_request("token query param is required"));
    };
    let user_agent = headers.get("user-agent").and_then(|v| v.to_str().ok()).map(str::to_owned);
    match auth_flows::admin_callback(&state, auth_flows::MagicLinkCallback { token: token.as_str(), ip: None, user_agent }).await {
        Ok(jti) => {
            let mut resp = empty(204);
            resp.headers_mut().insert(axum::http::header::SET_COOKIE, admin_cookie(&state, &jti).parse().unwrap());
            resp
        }
        Err(e) => api_error_response(&e),
    }
}

fn admin_cookie(state: &AppState, jti: &str) -> String {
    let max_age = state.config.auth.admin_session_ttl.as_secs();
    let mut cookie = format!("lf_admin_sess={jti}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age}");
    if state.config.auth.cookie_secure {
        cookie.push_str("; Secure");
    }
    if let Some(domain) = &state.config.auth.cookie_domain {
        cookie.push_str(&format!("; Domain={domain}"));
    }
    cookie
}

fn recipient_cookie(state: &AppState, jti: &str) -> String {
    let max_age = state.config.auth.recipient_session_ttl.as_secs();
    let mut cookie = format!("lf_recipient_sess={jti}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age}");
    if state.config.auth.cookie_secure {
        cookie.push_str("; Secure");
    }
    if let Some(domain) = &state.config.auth.cookie_domain {
        cookie.push_str(&format!("; Domain={domain}"));
    }
    cookie
}

async fn auth_admin_logout(State(state): State<AppState>, headers: HeaderMap, ConnectInfo(peer): ConnectInfo<SocketAddr>) -> AxumResponse {
    let req = build_request("POST", "/auth/admin/logout", HashMap::new(), HashMap::new(), &headers, None, Some(peer));
    let Some(jti) = req.cookie("lf_admin_sess").map(str::to_owned) else {
        return api_error_response(&ApiError::unauthorized("missing admin session cookie"));
    };
    match auth_flows::admin_logout(&state, &jti).await {
        Ok(()) => {
            let mut resp = empty(204);
            resp.headers_mut().insert(
                axum::http::header::SET_COOKIE,
                "lf_admin_sess=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0".parse().unwrap(),
            );
            resp
        }
        Err(e) => api_error_response(&e),
    }
}

async fn auth_recipient_start(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, Json(body): Json<Value>) -> AxumResponse {
    let req = auth_flows::OtpStart { recipient_id: s(&body, "recipientId"), email: s(&body, "email") };
    match auth_flows::recipient_start(&state, &peer.ip().to_string(), req).await {
        Ok(()) => empty(204),
        Err(e) => api_error_response(&e),
    }
}

async fn auth_recipient_resend(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, Json(body): Json<Value>) -> AxumResponse {
    let req = auth_flows::OtpStart { recipient_id: s(&body, "recipientId"), email: s(&body, "email") };
    auth_flows::recipient_resend(&state, &peer.ip().to_string(), req).await;
    empty(204)
}

async fn auth_recipient_verify(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, Json(body): Json<Value>) -> AxumResponse {
    let Some(otp) = s(&body, "otp") else {
        return api_error_response(&ApiError::bad_request("otp is required"));
    };
    let req = auth_flows::OtpVerify { recipient_id: s(&body, "recipientId"), email: s(&body, "email"), otp };
    match auth_flows::recipient_verify(&state, &peer.ip().to_string(), req).await {
        Ok(jti) => {
            let mut resp = empty(204);
            resp.headers_mut().insert(axum::http::header::SET_COOKIE, recipient_cookie(&state, &jti).parse().unwrap());
            resp
        }
        Err(e) => api_error_response(&e),
    }
}

async fn auth_cli_device_start(State(state): State<AppState>, Json(body): Json<Value>) -> AxumResponse {
    let _ = body;
    let verification_uri = format!("http://localhost:{}/auth/cli/device", state.config.port);
    match auth_flows::device_start(&state, &verification_uri).await {
        Ok(r) => json_ok(
            200,
            json!({
                "device_code": r.device_code, "user_code": r.user_code,
                "verification_uri": r.verification_uri, "expires_in": r.expires_in, "interval": r.interval,
            }),
        ),
        Err(e) => api_error_response(&e),
    }
}

async fn auth_cli_device_approve(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, headers: HeaderMap, Json(body): Json<Value>) -> AxumResponse {
    let req = build_request("POST", "/auth/cli/device/approve", HashMap::new(), HashMap::new(), &headers, Some(body.clone()), Some(peer));
    match require_admin_session(&state, &req, Utc::now()).await {
        Ok((_, user)) => {
            let Some(user_code) = s(&body, "userCode") else {
                return api_error_response(&ApiError::bad_request("userCode is required"));
            };
            match auth_flows::device_approve(&state, &user.id, &user_code).await {
                Ok(()) => empty(204),
                Err(e) => api_error_response(&e),
            }
        }
        Err(e) => api_error_response(&e),
    }
}

async fn auth_cli_device_poll(State(state): State<AppState>, ConnectInfo(peer): ConnectInfo<SocketAddr>, Json(body): Json<Value>) -> AxumResponse {
    let Some(device_code) = s(&body, "deviceCode") else {
        return api_error_response(&ApiError::bad_request("deviceCode is required"));
    };
    match auth_flows::device_poll(&state, &peer.ip().to_string(), &device_code).await {
        Ok(auth_flows::DevicePollOutcome::Pending) => json_ok(202, json!({ "status": "pending" })),
        Ok(auth_flows::DevicePollOutcome::Approved { token }) => json_ok(
            200,
            json!({ "access_token": token, "token_type": "Bearer", "scopes": state.config.auth.api_token_scopes_default, "expires_at": Value::Null }),
        ),
        Err(e) => api_error_response(&e),
    }
}

// ---------------------------------------------------------------------
// Recipient portal (§4.17)
// ---------------------------------------------------------------------

async fn portal_me(State(state): State<AppState>, headers: HeaderMap, ConnectInfo(peer): ConnectInfo<SocketAddr>) -> AxumResponse {
    let req = build_request("GET", "/portal/me", HashMap::new(), HashMap::new(), &headers, None, Some(peer));
    match require_recipient_session(&state, &req, false, None, Utc::now()).await {
        Ok(session) => match portal::me(&state, &session.recipient_id).await {
            Ok(me) => json_ok(
                200,
                json!({
                    "recipient": { "id": me.recipient.id, "email": me.recipient.email },
                    "bundles": me.bundles.into_iter().map(|(id, name)| json!({ "id": id, "name": name })).collect::<Vec<_>>(),
                }),
            ),
            Err(e) => api_error_response(&e),
        },
        Err(e) => api_error_response(&e),
    }
}

async fn portal_bundles(State(state): State<AppState>, headers: HeaderMap, ConnectInfo(peer): ConnectInfo<SocketAddr>, Query(query): Query<HashMap<String, String>>) -> AxumResponse {
    let req = build_request("GET", "/portal/bundles", HashMap::new(), query.clone(), &headers, None, Some(peer));
    let (offset, limit) = page_params(&query);
    match require_recipient_session(&state, &req, false, None, Utc::now()).await {
        Ok(session) => match portal::list_bundles(&state, &session.recipient_id, offset, limit).await {
            Ok(items) => json_ok(
                200,
                json!(items
                    .into_iter()
                    .map(|e| json!({
                        "assignmentId": e.assignment.id,
                        "summary": assignment_view(e.assignment),
                        "bundle": { "id": e.bundle.id, "name": e.bundle.name },
                    }))
                    .collect::<Vec<_>>()),
            ),
            Err(e) => api_error_response(&e),
        },
        Err(e) => api_error_response(&e),
    }
}

async fn portal_bundle_objects(State(state): State<AppState>, headers: HeaderMap, ConnectInfo(peer): ConnectInfo<SocketAddr>, Path(bundle_id): Path<String>) -> AxumResponse {
    let req = build_request("GET", "/portal/bundles/:bundleId/objects", HashMap::new(), HashMap::new(), &headers, None, Some(peer));
    match require_recipient_session(&state, &req, true, Some(&bundle_id), Utc::now()).await {
        Ok(_) => match portal::bundle_objects(&state, &bundle_id).await {
            Ok(items) => json_ok(200, json!(items.into_iter().map(|o| json!({ "fileId": o.file_id, "path": o.path, "required": o.required })).collect::<Vec<_>>())),
            Err(e) => api_error_response(&e),
        },
        Err(e) => api_error_response(&e),
    }
}

async fn portal_download(State(state): State<AppState>, headers: HeaderMap, ConnectInfo(peer): ConnectInfo<SocketAddr>, Path(bundle_id): Path<String>) -> AxumResponse {
    let req = build_request("GET", "/portal/bundles/:bundleId", HashMap::new(), HashMap::new(), &headers, None, Some(peer));
    let session = match require_recipient_session(&state, &req, true, Some(&bundle_id), Utc::now()).await {
        Ok(s) => s,
        Err(e) => return api_error_response(&e),
    };
    let ready = match portal::prepare_download(&state, &session.recipient_id, &bundle_id).await {
        Ok(r) => r,
        Err(e) => return api_error_response(&e),
    };
    match state.storage.get_file_stream(&ready.storage_key).await {
        Ok(bytes) => buffer(200, bytes, "application/octet-stream", &[("etag", &ready.checksum)]),
        Err(e) => api_error_response(&ApiError::internal(e.to_string())),
    }
}

// ---------------------------------------------------------------------
// Router assembly
// ---------------------------------------------------------------------

#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/admin/start", post(auth_admin_start))
        .route("/auth/admin/callback", get(auth_admin_callback))
        .route("/auth/admin/logout", post(auth_admin_logout))
        .route("/auth/recipient/start", post(auth_recipient_start))
        .route("/auth/recipient/verify", post(auth_recipient_verify))
        .route("/auth/recipient/resend", post(auth_recipient_resend))
        .route("/auth/cli/device/start", post(auth_cli_device_start))
        .route("/auth/cli/device/approve", post(auth_cli_device_approve))
        .route("/auth/cli/device/poll", post(auth_cli_device_poll))
        .route("/portal/me", get(portal_me))
        .route("/portal/bundles", get(portal_bundles))
        .route("/portal/bundles/{bundleId}/objects", get(portal_bundle_objects))
        .route("/portal/bundles/{bundleId}", get(portal_download))
        .route("/admin/bundles", get(list_bundles).post(create_bundle))
        .route("/admin/bundles/{id}", get(get_bundle).put(update_bundle).delete(delete_bundle))
        .route("/admin/bundles/{id}/objects", get(list_bundle_objects).post(upsert_bundle_object))
        .route("/admin/bundles/{id}/objects/{objectId}", axum::routing::delete(delete_bundle_object))
        .route("/admin/bundles/{id}/build", post(build_bundle))
        .route("/admin/bundles/{id}/build/status", get(build_status))
        .route("/admin/pipelines", get(list_pipelines).post(create_pipeline))
        .route("/admin/pipelines/{id}", get(get_pipeline).put(update_pipeline).delete(delete_pipeline))
        .route("/admin/users", get(list_users).post(create_user))
        .route("/admin/users/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/admin/presets", get(list_presets).post(create_preset))
        .route("/admin/presets/{id}", get(get_preset).put(update_preset).delete(delete_preset))
        .route("/admin/presets/{id}/activate", post(update_preset))
        .route("/admin/triggers", get(list_triggers).post(create_trigger))
        .route("/admin/triggers/{id}", get(get_trigger).put(update_trigger).delete(delete_trigger))
        .route("/admin/actions", get(list_actions).post(create_action))
        .route("/admin/actions/{id}", get(get_action).put(update_action).delete(delete_action))
        .route("/admin/assignments", get(list_assignments).post(create_assignment))
        .route("/admin/assignments/{id}", get(get_assignment).put(update_assignment).delete(delete_assignment))
        .route("/admin/recipients", get(list_recipients).post(create_recipient))
        .route("/admin/recipients/{id}", get(get_recipient).put(update_recipient).delete(delete_recipient))
        .route("/admin/files", get(list_files).post(create_file))
        .route("/admin/files/{id}", get(get_file).delete(delete_file))
        .route("/admin/trigger-mappings", post(create_trigger_mapping))
        .route("/admin/trigger-mappings/{id}", axum::routing::delete(delete_trigger_mapping))
        .route("/admin/permissions/simulate", post(simulate_permissions))
        .with_state(state)
}
