//! The framework-agnostic `Request` shape middleware and handlers operate
//! on (§4.16). The HTTP adapter in `latchflow-server` builds one of these
//! per inbound axum request; nothing downstream of this type knows axum
//! exists, which is what keeps the authorizer and its guards testable
//! without spinning up a server (§1 Non-goals: "only an adapter shape").

use std::collections::HashMap;

use serde_json::Value;

use latchflow_authz::RequestSnapshot;

/// An authenticated caller attached to the request after a session/token
/// middleware succeeds.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub role: latchflow_core::Role,
    pub is_active: bool,
}

/// A small uploaded-file descriptor (multipart bodies), mirroring the
/// optional `req.file` slot in §4.16.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field_name: String,
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: bytes_shim::Bytes,
}

// `latchflow-http` avoids a hard dependency on the `bytes` crate's exact
// version pin used elsewhere in the workspace; this module re-exports the
// one type it needs so callers don't have to add the dependency twice.
pub mod bytes_shim {
    pub use bytes::Bytes;
}

#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub user: Option<AuthenticatedUser>,
    pub file: Option<UploadedFile>,
    pub cookies: HashMap<String, String>,
}

impl Request {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.header("authorization")?.strip_prefix("Bearer ")
    }

    /// Narrow this request to the `RequestSnapshot` the authz crate's
    /// matchers and guards need, leaving out everything HTTP-specific.
    #[must_use]
    pub fn to_authz_snapshot(&self) -> RequestSnapshot {
        let mut params = self.params.clone();
        params.extend(self.query.clone());
        RequestSnapshot {
            params,
            query: self.query.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

/// Parse a `Cookie:` request header value into a name→value map. Handles
/// the common `name=value; name2=value2` shape; values are taken verbatim
/// (no percent-decoding — Latchflow's own cookies never need it).
#[must_use]
pub fn parse_cookie_header(header_value: &str) -> HashMap<String, String> {
    header_value
        .split(';')
        .filter_map(|pair| {
            let pair = pair.trim();
            let (name, value) = pair.split_once('=')?;
            Some((name.trim().to_owned(), value.trim().to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_header_parses_multiple_pairs() {
        let cookies = parse_cookie_header("lf_admin_sess=abc123; other=xyz");
        assert_eq!(cookies.get("lf_admin_sess").map(String::as_str), Some("abc123"));
        assert_eq!(cookies.get("other").map(String::as_str), Some("xyz"));
    }

    #[test]
    fn bearer_token_strips_prefix() {
        let mut req = Request::default();
        req.headers.insert("authorization".into(), "Bearer abc.def".into());
        assert_eq!(req.bearer_token(), Some("abc.def"));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut req = Request::default();
        req.headers.insert("X-Latchflow-Dry-Run".into(), "1".into());
        assert_eq!(req.header("x-latchflow-dry-run"), Some("1"));
    }
}
