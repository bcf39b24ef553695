//! The §7 error taxonomy: every error the core can raise maps to a fixed
//! `{status, code, message}` triple. `ApiError` is the shape; the HTTP
//! adapter in `latchflow-server` is the only place that turns it into an
//! actual response body (this crate stays response-framework-agnostic).

use serde::Serialize;

/// One error as surfaced over HTTP: status code, a machine-readable
/// `code`, and a human `message`. Mirrors the `{status:"error", code,
/// message}` body shape from §6.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: u16,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn new(status: u16, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, "BAD_REQUEST", message)
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(401, "UNAUTHORIZED", message)
    }

    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(401, "INVALID_TOKEN", message)
    }

    #[must_use]
    pub fn invalid_otp(message: impl Into<String>) -> Self {
        Self::new(401, "INVALID_OTP", message)
    }

    #[must_use]
    pub fn invalid_code() -> Self {
        Self::new(400, "INVALID_CODE", "unknown device code")
    }

    #[must_use]
    pub fn mfa_required() -> Self {
        Self::new(401, "MFA_REQUIRED", "two-factor authentication required")
    }

    #[must_use]
    pub fn inactive() -> Self {
        Self::new(403, "INACTIVE", "principal is inactive")
    }

    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(403, "FORBIDDEN", message)
    }

    #[must_use]
    pub fn no_policy() -> Self {
        Self::new(403, "NO_POLICY", "no policy defined for this route")
    }

    #[must_use]
    pub fn insufficient_permission() -> Self {
        Self::new(403, "FORBIDDEN", "Insufficient permission")
    }

    #[must_use]
    pub fn max_downloads_exceeded() -> Self {
        Self::new(403, "MAX_DOWNLOADS_EXCEEDED", "maximum downloads reached")
    }

    #[must_use]
    pub fn verification_required() -> Self {
        Self::new(403, "VERIFICATION_REQUIRED", "recipient verification required")
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, "NOT_FOUND", message)
    }

    #[must_use]
    pub fn in_use(message: impl Into<String>) -> Self {
        Self::new(409, "IN_USE", message)
    }

    #[must_use]
    pub fn no_storage_path() -> Self {
        Self::new(409, "NO_STORAGE_PATH", "bundle has no stored artifact")
    }

    #[must_use]
    pub fn cooldown_active(remaining_seconds: i64) -> Self {
        Self::new(
            429,
            "COOLDOWN_ACTIVE",
            format!("next download available in {remaining_seconds}s"),
        )
    }

    #[must_use]
    pub fn rate_limited() -> Self {
        Self::new(429, "RATE_LIMITED", "rate limit exceeded")
    }

    #[must_use]
    pub fn rate_limit() -> Self {
        Self::new(429, "RATE_LIMIT", "rate limit exceeded")
    }

    #[must_use]
    pub fn too_many_attempts() -> Self {
        Self::new(429, "TOO_MANY_ATTEMPTS", "too many attempts")
    }

    #[must_use]
    pub fn slow_down() -> Self {
        Self::new(429, "SLOW_DOWN", "polling too fast")
    }

    #[must_use]
    pub fn expired() -> Self {
        Self::new(410, "EXPIRED", "expired")
    }

    #[must_use]
    pub fn revoked() -> Self {
        Self::new(410, "REVOKED", "revoked")
    }

    #[must_use]
    pub fn unavailable() -> Self {
        Self::new(410, "UNAVAILABLE", "no longer available")
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, "INTERNAL", message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Translate an authorizer deny reason (§4.6) into the matching
/// `ApiError`, per §7's "Policy miss"/"2FA required"/rate-limit rows.
#[must_use]
pub fn from_authz_error(err: &latchflow_authz::AuthzError) -> ApiError {
    ApiError::new(err.http_status(), err.code(), err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_bodies_omit_status_from_serialization() {
        let err = ApiError::not_found("bundle missing");
        let json = serde_json::to_value(&err).unwrap();
        assert!(json.get("status").is_none());
        assert_eq!(json["code"], "NOT_FOUND");
    }
}
