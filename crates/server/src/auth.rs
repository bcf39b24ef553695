//! Binds the framework-agnostic session/token middleware bodies
//! (`latchflow-http::auth`) to this crate's `Store`, and layers on the
//! policy check (`requirePermission`, §4.6/§4.16) for admin routes.
//!
//! `requireAdminOrApiToken`: when an `Authorization: Bearer` header is
//! present, authenticate via the API token path and skip the rule
//! evaluator (a valid scoped token is its own authorization); otherwise
//! fall through to the cookie session plus the full authorizer.

use chrono::{DateTime, Utc};
use latchflow_authz::{AuthzContext, AuthzPreset, AuthzUser, SessionFreshness};
use latchflow_http::{
    require_api_token, require_recipient, require_session, ApiError, ApiTokenLookup, ApiTokenRow,
    AdminSessionLookup, AdminSessionRow, BundleAssignmentRow, PolicyConfig, Request,
    RecipientSessionLookup, RecipientSessionRow,
};
use tracing::info;

use crate::error::from_store_error;
use crate::routes;
use crate::state::AppState;
use crate::store::{Store, User};

pub struct StoreSessions<'a> {
    pub store: &'a dyn Store,
}

#[async_trait::async_trait]
impl AdminSessionLookup for StoreSessions<'_> {
    async fn find_by_jti(&self, jti: &str) -> Result<Option<AdminSessionRow>, ApiError> {
        let Some(session) = self.store.find_admin_session(jti).await.map_err(from_store_error)? else {
            return Ok(None);
        };
        let Some(user) = self.store.get_user(&session.user_id).await.map_err(from_store_error)? else {
            return Ok(None);
        };
        Ok(Some(AdminSessionRow {
            jti: session.jti,
            user_id: session.user_id,
            role: user.role,
            is_active: user.is_active,
            expires_at: session.expires_at,
            revoked_at: session.revoked_at,
            reauthenticated_at: session.reauthenticated_at,
            mfa_verified_at: session.mfa_verified_at,
            created_at: session.created_at,
            mfa_enabled: user.mfa_enabled,
        }))
    }
}

pub struct StoreApiTokens<'a> {
    pub store: &'a dyn Store,
}

#[async_trait::async_trait]
impl ApiTokenLookup for StoreApiTokens<'_> {
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ApiTokenRow>, ApiError> {
        let Some(token) = self.store.find_api_token(token_hash).await.map_err(from_store_error)? else {
            return Ok(None);
        };
        let user_is_active = self
            .store
            .get_user(&token.user_id)
            .await
            .map_err(from_store_error)?
            .is_some_and(|u| u.is_active);
        Ok(Some(ApiTokenRow {
            token_hash: token.token_hash,
            user_id: token.user_id,
            scopes: token.scopes,
            expires_at: token.expires_at,
            revoked_at: token.revoked_at,
            user_is_active,
        }))
    }

    async fn mark_used(&self, token_hash: &str, at: DateTime<Utc>) -> Result<(), ApiError> {
        self.store.mark_api_token_used(token_hash, at).await.map_err(from_store_error)
    }
}

pub struct StoreRecipients<'a> {
    pub store: &'a dyn Store,
}

#[async_trait::async_trait]
impl RecipientSessionLookup for StoreRecipients<'_> {
    async fn find_by_jti(&self, jti: &str) -> Result<Option<RecipientSessionRow>, ApiError> {
        let Some(session) = self.store.find_recipient_session(jti).await.map_err(from_store_error)? else {
            return Ok(None);
        };
        let recipient_is_enabled = self
            .store
            .get_recipient(&session.recipient_id)
            .await
            .map_err(from_store_error)?
            .is_some_and(|r| r.is_enabled);
        Ok(Some(RecipientSessionRow {
            jti: session.jti,
            recipient_id: session.recipient_id,
            expires_at: session.expires_at,
            revoked_at: session.revoked_at,
            recipient_is_enabled,
        }))
    }

    async fn find_assignment(&self, recipient_id: &str, bundle_id: &str) -> Result<Option<BundleAssignmentRow>, ApiError> {
        let Some(assignment) = self.store.find_assignment(recipient_id, bundle_id).await.map_err(from_store_error)? else {
            return Ok(None);
        };
        let bundle_is_enabled = self
            .store
            .get_bundle(bundle_id)
            .await
            .map_err(from_store_error)?
            .is_some_and(|b| b.is_enabled);
        Ok(Some(BundleAssignmentRow {
            is_enabled: assignment.is_enabled,
            bundle_is_enabled,
        }))
    }
}

/// `requireSession`: resolve the admin cookie and load the owning user row.
pub async fn require_admin_session(state: &AppState, req: &Request, now: DateTime<Utc>) -> Result<(AdminSessionRow, User), ApiError> {
    let sessions = StoreSessions { store: &*state.store };
    let session = require_session(req, &sessions, now).await?;
    let user = state
        .store
        .get_user(&session.user_id)
        .await
        .map_err(from_store_error)?
        .ok_or_else(|| ApiError::unauthorized("session user no longer exists"))?;
    Ok((session, user))
}

/// `requireRecipient`: resolve the recipient cookie, optionally bundle-scoped.
pub async fn require_recipient_session(
    state: &AppState,
    req: &Request,
    bundle_scoped: bool,
    route_bundle_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<RecipientSessionRow, ApiError> {
    let recipients = StoreRecipients { store: &*state.store };
    require_recipient(req, &recipients, bundle_scoped, route_bundle_id, now).await
}

/// `requireAdminOrApiToken({policySignature, scopes})` (§4.16): bearer
/// token present → authenticate via token and log an `API_TOKEN` decision,
/// skipping the rule evaluator; otherwise fall through to the session plus
/// the full authorizer against the resolved policy entry.
pub async fn authorize_admin(
    state: &AppState,
    req: &Request,
    method: &str,
    path_template: &str,
    ctx_ids: AuthzContext,
    scopes: &[&str],
    now: DateTime<Utc>,
) -> Result<User, ApiError> {
    if req.bearer_token().is_some() {
        let tokens = StoreApiTokens { store: &*state.store };
        let token = require_api_token(req, &tokens, scopes, now).await?;
        let user = state
            .store
            .get_user(&token.user_id)
            .await
            .map_err(from_store_error)?
            .ok_or_else(|| ApiError::unauthorized("token user no longer exists"))?;
        info!(
            decision = "allow",
            reason = "API_TOKEN",
            user_id = %user.id,
            signature = %format!("{method} {path_template}"),
            "authz_decision"
        );
        return Ok(user);
    }

    let (session, user) = require_admin_session(state, req, now).await?;

    let entry = routes::resolve(method, path_template);
    let preset = match &user.permission_preset_id {
        Some(id) => state.store.get_preset(id).await.map_err(from_store_error)?,
        None => None,
    };
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

    let ctx = AuthzContext {
        user_id: user.id.clone(),
        role: user.role,
        is_active: user.is_active,
        bundle_id: ctx_ids.bundle_id,
        pipeline_id: ctx_ids.pipeline_id,
        action_id: ctx_ids.action_id,
    };

    let session_freshness = SessionFreshness {
        reauthenticated_at: session.reauthenticated_at,
        mfa_verified_at: session.mfa_verified_at,
        created_at: session.created_at,
    };

    let policy_config = PolicyConfig {
        cache: &state.rule_cache,
        limiter: &state.rate_limiter,
        evaluation_mode: state.config.evaluation_mode(),
        system_user_id: &state.config.history.system_user_id,
        admin_mfa_required: state.config.authz.require_admin_2fa,
        reauth_window: chrono::Duration::from_std(state.config.authz.reauth_window).unwrap_or(chrono::Duration::zero()),
    };

    latchflow_http::require_permission(
        entry,
        &req.to_authz_snapshot(),
        &ctx,
        &authz_user,
        &policy_config,
        now,
        Some(&session_freshness),
    )?;

    Ok(user)
}
