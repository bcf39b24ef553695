//! Session/token/recipient authentication middleware (§4.16).
//!
//! Each `require_*` function is the body of one of the spec's named
//! middleware; they're plain async functions rather than tower layers so
//! they stay testable without an HTTP server, and so `requireAdminOrApiToken`
//! can compose them directly. The server crate's axum extractors call
//! these and turn the `Result` into a response.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use latchflow_core::Role;

use crate::error::ApiError;
use crate::request::{AuthenticatedUser, Request};

/// A resolved admin session row, as the server's persistence layer would
/// load it by `jti`.
#[derive(Debug, Clone)]
pub struct AdminSessionRow {
    pub jti: String,
    pub user_id: String,
    pub role: Role,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub reauthenticated_at: Option<DateTime<Utc>>,
    pub mfa_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub mfa_enabled: bool,
}

#[async_trait]
pub trait AdminSessionLookup: Send + Sync {
    async fn find_by_jti(&self, jti: &str) -> Result<Option<AdminSessionRow>, ApiError>;
}

/// `requireSession`: resolve `lf_admin_sess`, reject on missing/expired/
/// revoked, and attach `{user, session}`.
pub async fn require_session(
    req: &Request,
    sessions: &dyn AdminSessionLookup,
    now: DateTime<Utc>,
) -> Result<AdminSessionRow, ApiError> {
    let jti = req
        .cookie("lf_admin_sess")
        .ok_or_else(|| ApiError::unauthorized("missing admin session cookie"))?;

    let session = sessions
        .find_by_jti(jti)
        .await?
        .ok_or_else(|| ApiError::unauthorized("unknown session"))?;

    if session.revoked_at.is_some() {
        return Err(ApiError::unauthorized("session revoked"));
    }
    if session.expires_at <= now {
        return Err(ApiError::unauthorized("session expired"));
    }

    Ok(session)
}

/// A resolved API token row.
#[derive(Debug, Clone)]
pub struct ApiTokenRow {
    pub token_hash: String,
    pub user_id: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub user_is_active: bool,
}

#[async_trait]
pub trait ApiTokenLookup: Send + Sync {
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ApiTokenRow>, ApiError>;
    async fn mark_used(&self, token_hash: &str, at: DateTime<Utc>) -> Result<(), ApiError>;
}

/// `requireApiToken(requiredScopes[])`: parse `Authorization: Bearer`,
/// strip any prefix ending in `_` (the `API_TOKEN_PREFIX` convention)
/// before hashing, and enforce revocation/expiry/scope/active-user checks.
pub async fn require_api_token(
    req: &Request,
    tokens: &dyn ApiTokenLookup,
    required_scopes: &[&str],
    now: DateTime<Utc>,
) -> Result<ApiTokenRow, ApiError> {
    let raw = req
        .bearer_token()
        .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
    let stripped = strip_token_prefix(raw);
    let token_hash = latchflow_core::sha256_hex(stripped.as_bytes());

    let token = tokens
        .find_by_hash(&token_hash)
        .await?
        .ok_or_else(|| ApiError::unauthorized("unknown API token"))?;

    if token.revoked_at.is_some() {
        return Err(ApiError::unauthorized("token revoked"));
    }
    if token.expires_at.is_some_and(|exp| exp <= now) {
        return Err(ApiError::unauthorized("token expired"));
    }
    if !token.user_is_active {
        return Err(ApiError::forbidden("owning user is inactive"));
    }
    if !required_scopes.iter().all(|s| token.scopes.iter().any(|owned| owned == s)) {
        return Err(ApiError::forbidden("insufficient token scopes"));
    }

    tokens.mark_used(&token_hash, now).await?;
    Ok(token)
}

/// Strip any prefix ending in `_` (e.g. `lfk_`) before hashing a bearer
/// token, per §4.16. Splits on the FIRST `_`: the token body is base64url
/// and often contains `_` itself, so splitting on the last one would chop
/// into the body instead of the prefix.
#[must_use]
pub fn strip_token_prefix(raw: &str) -> &str {
    match raw.split_once('_') {
        Some((_, rest)) => rest,
        None => raw,
    }
}

/// A resolved recipient session + (optionally) its bundle assignment.
#[derive(Debug, Clone)]
pub struct RecipientSessionRow {
    pub jti: String,
    pub recipient_id: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub recipient_is_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct BundleAssignmentRow {
    pub is_enabled: bool,
    pub bundle_is_enabled: bool,
}

#[async_trait]
pub trait RecipientSessionLookup: Send + Sync {
    async fn find_by_jti(&self, jti: &str) -> Result<Option<RecipientSessionRow>, ApiError>;
    async fn find_assignment(&self, recipient_id: &str, bundle_id: &str) -> Result<Option<BundleAssignmentRow>, ApiError>;
}

/// `requireRecipient`: resolve `lf_recipient_sess`, check recipient is
/// enabled, and (when bundle-scoped) require an active assignment whose
/// bundle is also enabled.
pub async fn require_recipient(
    req: &Request,
    recipients: &dyn RecipientSessionLookup,
    bundle_scoped: bool,
    route_bundle_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<RecipientSessionRow, ApiError> {
    let jti = req
        .cookie("lf_recipient_sess")
        .ok_or_else(|| ApiError::unauthorized("missing recipient session cookie"))?;

    let session = recipients
        .find_by_jti(jti)
        .await?
        .ok_or_else(|| ApiError::unauthorized("unknown session"))?;

    if session.revoked_at.is_some() || session.expires_at <= now {
        return Err(ApiError::unauthorized("session expired or revoked"));
    }
    if !session.recipient_is_enabled {
        return Err(ApiError::forbidden("recipient is disabled"));
    }

    if bundle_scoped {
        let bundle_id = route_bundle_id.ok_or_else(|| ApiError::bad_request("missing bundle id"))?;
        let assignment = recipients
            .find_assignment(&session.recipient_id, bundle_id)
            .await?
            .ok_or_else(|| ApiError::not_found("no assignment for this bundle"))?;
        if !assignment.is_enabled || !assignment.bundle_is_enabled {
            return Err(ApiError::forbidden("assignment or bundle disabled"));
        }
    }

    Ok(session)
}

impl From<AdminSessionRow> for AuthenticatedUser {
    fn from(row: AdminSessionRow) -> Self {
        Self {
            user_id: row.user_id,
            role: row.role,
            is_active: row.is_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(overrides: impl FnOnce(&mut AdminSessionRow)) -> AdminSessionRow {
        let mut row = AdminSessionRow {
            jti: "jti-1".into(),
            user_id: "u-1".into(),
            role: Role::Admin,
            is_active: true,
            expires_at: Utc::now() + chrono::Duration::hours(1),
            revoked_at: None,
            reauthenticated_at: None,
            mfa_verified_at: None,
            created_at: Utc::now(),
            mfa_enabled: false,
        };
        overrides(&mut row);
        row
    }

    struct FakeSessions(Option<AdminSessionRow>);
    #[async_trait]
    impl AdminSessionLookup for FakeSessions {
        async fn find_by_jti(&self, _jti: &str) -> Result<Option<AdminSessionRow>, ApiError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn missing_cookie_is_unauthorized() {
        let req = Request::default();
        let err = require_session(&req, &FakeSessions(None), Utc::now()).await.unwrap_err();
        assert_eq!(err.code, "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn revoked_session_is_unauthorized() {
        let mut req = Request::default();
        req.cookies.insert("lf_admin_sess".into(), "jti-1".into());
        let row = session(|s| s.revoked_at = Some(Utc::now()));
        let err = require_session(&req, &FakeSessions(Some(row)), Utc::now()).await.unwrap_err();
        assert_eq!(err.code, "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn valid_session_is_accepted() {
        let mut req = Request::default();
        req.cookies.insert("lf_admin_sess".into(), "jti-1".into());
        let row = session(|_| {});
        let result = require_session(&req, &FakeSessions(Some(row)), Utc::now()).await;
        assert!(result.is_ok());
    }

    #[test]
    fn token_prefix_is_stripped_before_hashing() {
        assert_eq!(strip_token_prefix("lfk_abc123"), "abc123");
        assert_eq!(strip_token_prefix("noprefix"), "noprefix");
    }

    #[test]
    fn token_prefix_strip_keeps_underscores_in_the_body() {
        assert_eq!(strip_token_prefix("lfk_abc_123_xyz"), "abc_123_xyz");
    }
}
