//! Authentication flows (§4.18 / C18): admin magic link, recipient OTP,
//! and CLI device code. All three auth-start/verify endpoints share one
//! sliding-window rate limiter keyed by `(route, ip, subject)` at 10/min.

use std::time::Instant;

use chrono::Utc;
use latchflow_core::{generate_otp, generate_token, sha256_hex, Actor, Role};
use latchflow_http::ApiError;

use crate::history::record_change;
use crate::state::AppState;
use crate::store::{AdminSession, DeviceAuth, MagicLink, RecipientOtp, RecipientSession, StoreError, User};

const RATE_LIMIT_PER_MIN: u32 = 10;

fn rate_limit_key(route: &str, ip: &str, subject: &str) -> String {
    format!("{route}:{ip}:{subject}")
}

fn check_rate_limit(state: &AppState, route: &str, ip: &str, subject: &str) -> Result<(), ApiError> {
    let key = rate_limit_key(route, ip, subject);
    if state.rate_limiter.check_per_minute(&key, Instant::now(), RATE_LIMIT_PER_MIN) {
        return Err(ApiError::rate_limited());
    }
    Ok(())
}

fn store_err(e: StoreError) -> ApiError {
    crate::error::from_store_error(e)
}

// ---------------------------------------------------------------------
// Admin magic link
// ---------------------------------------------------------------------

pub struct MagicLinkStart {
    pub email: String,
}

pub async fn admin_start(state: &AppState, ip: &str, req: MagicLinkStart) -> Result<(), ApiError> {
    check_rate_limit(state, "POST /auth/admin/start", ip, &req.email)?;

    let user = match state.store.get_user_by_email(&req.email).await.map_err(store_err)? {
        Some(user) => user,
        None => {
            let user = User {
                id: generate_token(),
                email: req.email.clone(),
                role: Role::Unknown,
                is_active: true,
                mfa_enabled: false,
                permissions_hash: None,
                direct_permissions: Vec::new(),
                permission_preset_id: None,
            };
            state.store.put_user(user.clone()).await.map_err(store_err)?;
            record_change(
                state,
                "user",
                &user.id,
                serde_json::json!({ "email": user.email, "role": "UNKNOWN", "isActive": true }),
                Actor::system(),
                "create",
            )
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
            user
        }
    };

    let token = generate_token();
    let token_hash = sha256_hex(token.as_bytes());
    let now = Utc::now();
    state
        .store
        .put_magic_link(MagicLink {
            token_hash,
            user_id: user.id,
            expires_at: now + state.config.auth.admin_magiclink_ttl,
            consumed_at: None,
        })
        .await
        .map_err(store_err)?;

    // Delivery (email/log) is an external collaborator (§1 Non-goals);
    // in a reference deployment the link is simply logged.
    tracing::info!(email = %req.email, token = %token, "admin magic link issued");
    Ok(())
}

pub struct MagicLinkCallback<'a> {
    pub token: &'a str,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

pub async fn admin_callback(state: &AppState, req: MagicLinkCallback<'_>) -> Result<String, ApiError> {
    let token_hash = sha256_hex(req.token.as_bytes());
    let link = state
        .store
        .find_magic_link(&token_hash)
        .await
        .map_err(store_err)?
        .ok_or_else(|| ApiError::invalid_token("unknown magic link"))?;

    let now = Utc::now();
    if link.consumed_at.is_some() {
        return Err(ApiError::invalid_token("magic link already used"));
    }
    if link.expires_at < now {
        return Err(ApiError::invalid_token("magic link expired"));
    }

    state.store.consume_magic_link(&token_hash, now).await.map_err(store_err)?;

    let jti = generate_token();
    state
        .store
        .put_admin_session(AdminSession {
            jti: jti.clone(),
            user_id: link.user_id,
            created_at: now,
            expires_at: now + state.config.auth.admin_session_ttl,
            revoked_at: None,
            reauthenticated_at: None,
            mfa_verified_at: None,
            ip: req.ip,
            user_agent: req.user_agent,
        })
        .await
        .map_err(store_err)?;

    Ok(jti)
}

pub async fn admin_logout(state: &AppState, jti: &str) -> Result<(), ApiError> {
    state
        .store
        .revoke_admin_session(jti, Utc::now())
        .await
        .map_err(store_err)
}

// ---------------------------------------------------------------------
// Recipient OTP
// ---------------------------------------------------------------------

pub struct OtpStart {
    pub recipient_id: Option<String>,
    pub email: Option<String>,
}

async fn resolve_recipient(
    state: &AppState,
    recipient_id: Option<&str>,
    email: Option<&str>,
) -> Result<Option<crate::store::Recipient>, ApiError> {
    if let Some(id) = recipient_id {
        return state.store.get_recipient(id).await.map_err(store_err);
    }
    if let Some(email) = email {
        return state.store.get_recipient_by_email(email).await.map_err(store_err);
    }
    Err(ApiError::bad_request("recipientId or email is required"))
}

pub async fn recipient_start(state: &AppState, ip: &str, req: OtpStart) -> Result<(), ApiError> {
    let subject = req.recipient_id.clone().or_else(|| req.email.clone()).unwrap_or_default();
    check_rate_limit(state, "POST /auth/recipient/start", ip, &subject)?;

    let Some(recipient) = resolve_recipient(state, req.recipient_id.as_deref(), req.email.as_deref()).await? else {
        // Anti-enumeration: behave as if the OTP was sent either way.
        return Ok(());
    };

    state.store.clear_recipient_otps(&recipient.id).await.map_err(store_err)?;

    let otp = generate_otp(state.config.auth.recipient_otp_length);
    let code_hash = sha256_hex(otp.as_bytes());
    let now = Utc::now();
    state
        .store
        .put_recipient_otp(RecipientOtp {
            recipient_id: recipient.id.clone(),
            code_hash,
            attempts: 0,
            expires_at: now + state.config.auth.recipient_otp_ttl,
        })
        .await
        .map_err(store_err)?;

    tracing::info!(recipient_id = %recipient.id, otp = %otp, "recipient otp issued");
    Ok(())
}

pub struct OtpVerify {
    pub recipient_id: Option<String>,
    pub email: Option<String>,
    pub otp: String,
}

pub async fn recipient_verify(state: &AppState, ip: &str, req: OtpVerify) -> Result<String, ApiError> {
    let subject = req.recipient_id.clone().or_else(|| req.email.clone()).unwrap_or_default();
    check_rate_limit(state, "POST /auth/recipient/verify", ip, &subject)?;

    let recipient = resolve_recipient(state, req.recipient_id.as_deref(), req.email.as_deref())
        .await?
        .ok_or_else(|| ApiError::invalid_otp("unknown recipient"))?;

    let otp_row = state
        .store
        .latest_recipient_otp(&recipient.id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| ApiError::invalid_otp("no otp pending"))?;

    let now = Utc::now();
    if otp_row.expires_at < now {
        return Err(ApiError::invalid_otp("otp expired"));
    }
    if otp_row.attempts >= 5 {
        return Err(ApiError::too_many_attempts());
    }

    let given_hash = sha256_hex(req.otp.as_bytes());
    if given_hash != otp_row.code_hash {
        state
            .store
            .increment_otp_attempts(&recipient.id)
            .await
            .map_err(store_err)?;
        return Err(ApiError::invalid_otp("otp mismatch"));
    }

    state.store.delete_recipient_otp(&recipient.id).await.map_err(store_err)?;

    let jti = generate_token();
    state
        .store
        .put_recipient_session(RecipientSession {
            jti: jti.clone(),
            recipient_id: recipient.id,
            created_at: now,
            expires_at: now + state.config.auth.recipient_session_ttl,
            revoked_at: None,
        })
        .await
        .map_err(store_err)?;

    Ok(jti)
}

pub async fn recipient_resend(state: &AppState, ip: &str, req: OtpStart) {
    // 204 regardless of outcome (anti-enumeration); errors are swallowed.
    let _ = recipient_start(state, ip, req).await;
}

// ---------------------------------------------------------------------
// CLI device code
// ---------------------------------------------------------------------

pub struct DeviceStartResult {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: i64,
    pub interval: u32,
}

pub async fn device_start(state: &AppState, verification_uri: &str) -> Result<DeviceStartResult, ApiError> {
    let device_code = generate_token();
    let user_code = generate_otp(8);
    let now = Utc::now();
    let interval = u32::try_from(state.config.auth.device_code_interval.as_secs()).unwrap_or(5);

    state
        .store
        .put_device_auth(DeviceAuth {
            device_code_hash: sha256_hex(device_code.as_bytes()),
            user_code_hash: sha256_hex(user_code.as_bytes()),
            user_code: user_code.clone(),
            interval_sec: interval,
            expires_at: now + state.config.auth.device_code_ttl,
            approved_at: None,
            token_id: None,
            last_polled_at: None,
            last_polled_ip: None,
            plaintext_token: None,
        })
        .await
        .map_err(store_err)?;

    Ok(DeviceStartResult {
        device_code,
        user_code,
        verification_uri: verification_uri.to_owned(),
        expires_in: state.config.auth.device_code_ttl.as_secs() as i64,
        interval,
    })
}

pub async fn device_approve(state: &AppState, admin_user_id: &str, user_code: &str) -> Result<(), ApiError> {
    let mut device = state
        .store
        .find_device_auth_by_user_code(user_code)
        .await
        .map_err(store_err)?
        .ok_or_else(ApiError::invalid_code)?;

    let now = Utc::now();
    if device.expires_at < now {
        return Err(ApiError::expired());
    }

    let token = generate_token();
    let token_hash = sha256_hex(token.as_bytes());
    state
        .store
        .put_api_token(crate::store::ApiToken {
            token_hash: token_hash.clone(),
            user_id: admin_user_id.to_owned(),
            scopes: state.config.auth.api_token_scopes_default.clone(),
            expires_at: state.config.auth.api_token_ttl.map(|d| now + d),
            revoked_at: None,
            last_used_at: None,
        })
        .await
        .map_err(store_err)?;

    device.approved_at = Some(now);
    // `token_id` doubles as the api token's hash so `device_poll` can check
    // revocation without a separate id->hash index.
    device.token_id = Some(token_hash);
    device.plaintext_token = Some(format!("{}{token}", state.config.auth.api_token_prefix));
    state.store.update_device_auth(device.clone()).await.map_err(store_err)?;

    if let Some(plaintext) = &device.plaintext_token {
        state.device_token_cache.insert(device.device_code_hash.clone(), plaintext.clone());
    }

    Ok(())
}

pub enum DevicePollOutcome {
    Pending,
    Approved { token: String },
}

pub async fn device_poll(state: &AppState, ip: &str, device_code: &str) -> Result<DevicePollOutcome, ApiError> {
    let hash = sha256_hex(device_code.as_bytes());
    let mut device = state
        .store
        .find_device_auth_by_device_code(&hash)
        .await
        .map_err(store_err)?
        .ok_or_else(ApiError::invalid_code)?;

    let now = Utc::now();
    if device.expires_at < now {
        return Err(ApiError::expired());
    }

    if let Some(last_polled_at) = device.last_polled_at {
        if let Some(last_ip) = &device.last_polled_ip {
            if last_ip == ip {
                let min_gap = chrono::Duration::seconds(i64::from(device.interval_sec));
                if now - last_polled_at < min_gap {
                    return Err(ApiError::slow_down());
                }
            }
        }
    }
    device.last_polled_at = Some(now);
    device.last_polled_ip = Some(ip.to_owned());
    state.store.update_device_auth(device.clone()).await.map_err(store_err)?;

    if device.approved_at.is_none() {
        return Ok(DevicePollOutcome::Pending);
    }

    if let Some(token_hash) = &device.token_id {
        if let Some(api_token) = state.store.find_api_token(token_hash).await.map_err(store_err)? {
            if api_token.revoked_at.is_some() {
                return Err(ApiError::revoked());
            }
        }
    }

    match state.device_token_cache.remove(&device.device_code_hash) {
        Some((_, token)) => Ok(DevicePollOutcome::Approved { token }),
        None => Err(ApiError::unavailable()),
    }
}
