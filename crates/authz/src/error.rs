use thiserror::Error;

/// Errors surfaced by rule compilation and request authorization.
///
/// Variants map to the HTTP status/body-code table for the authorization
/// surface; `AuthzError::http_code` gives the stable body `code`.
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("no policy registered for this route")]
    NoPolicy,

    #[error("principal is inactive")]
    Inactive,

    #[error("admin two-factor authentication required")]
    MfaRequired,

    #[error("input guard rejected the request: {0}")]
    InputGuard(String),

    #[error("request rate limited")]
    RateLimit,

    #[error("no rule matched and no where-clause candidates were present")]
    WhereMiss,

    #[error("no rule matched")]
    NoMatch,

    #[error("invalid regular expression in value rule: {0}")]
    InvalidRegex(String),
}

impl AuthzError {
    /// Stable machine-readable code for the JSON error envelope.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoPolicy => "NO_POLICY",
            Self::Inactive => "INACTIVE",
            Self::MfaRequired => "MFA_REQUIRED",
            Self::InputGuard(_) => "INPUT_GUARD",
            Self::RateLimit => "RATE_LIMIT",
            Self::WhereMiss => "WHERE_MISS",
            Self::NoMatch => "NO_MATCH",
            Self::InvalidRegex(_) => "BAD_REQUEST",
        }
    }

    /// HTTP status this error maps to.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NoPolicy
            | Self::InputGuard(_)
            | Self::WhereMiss
            | Self::NoMatch
            | Self::Inactive => 403,
            Self::MfaRequired => 401,
            Self::RateLimit => 429,
            Self::InvalidRegex(_) => 400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_spec_table() {
        assert_eq!(AuthzError::NoPolicy.code(), "NO_POLICY");
        assert_eq!(AuthzError::RateLimit.code(), "RATE_LIMIT");
        assert_eq!(AuthzError::MfaRequired.http_status(), 401);
        assert_eq!(AuthzError::RateLimit.http_status(), 429);
    }
}
