//! The framework-agnostic response shape handlers build and return (§4.16).
//! The HTTP adapter in `latchflow-server` is the only place that turns one
//! of these into an actual axum response.

use std::collections::HashMap;

use serde_json::Value;

use crate::request::bytes_shim::Bytes;

/// A response body: either a JSON value, a fixed in-memory buffer (file
/// downloads), or a named stream the adapter resolves against its own
/// storage service.
#[derive(Debug, Clone)]
pub enum ResponseBody {
    Json(Value),
    Buffer { bytes: Bytes, content_type: String },
    Stream { object_key: String, content_type: String },
    Empty,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: ResponseBody,
}

impl Response {
    #[must_use]
    pub fn json(status: u16, value: Value) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: ResponseBody::Json(value),
        }
    }

    #[must_use]
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: ResponseBody::Empty,
        }
    }

    #[must_use]
    pub fn redirect(location: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("location".to_owned(), location.into());
        Self {
            status: 302,
            headers,
            body: ResponseBody::Empty,
        }
    }

    #[must_use]
    pub fn send_buffer(bytes: Bytes, content_type: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: ResponseBody::Buffer { bytes, content_type: content_type.into() },
        }
    }

    #[must_use]
    pub fn send_stream(object_key: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: ResponseBody::Stream { object_key: object_key.into(), content_type: content_type.into() },
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

impl From<crate::error::ApiError> for Response {
    fn from(err: crate::error::ApiError) -> Self {
        Response::json(
            err.status,
            serde_json::json!({ "status": "error", "code": err.code, "message": err.message }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_sets_location_header_and_302() {
        let resp = Response::redirect("/portal/bundles");
        assert_eq!(resp.status, 302);
        assert_eq!(resp.headers.get("location").map(String::as_str), Some("/portal/bundles"));
    }

    #[test]
    fn api_error_converts_to_json_envelope() {
        let resp: Response = crate::error::ApiError::not_found("nope").into();
        assert_eq!(resp.status, 404);
        match resp.body {
            ResponseBody::Json(v) => assert_eq!(v["code"], "NOT_FOUND"),
            _ => panic!("expected json body"),
        }
    }
}
