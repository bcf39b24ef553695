//! The actual HTTP↔core translation (§4.16 "only an adapter shape"):
//! builds a framework-agnostic `latchflow_http::Request` from an inbound
//! axum request, and turns a `latchflow_http::Response`/`ApiError` back
//! into an axum response. Nothing outside this module and `router.rs`
//! knows axum exists.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response as AxumResponse};
use serde_json::Value;

use latchflow_http::request::bytes_shim::Bytes;
use latchflow_http::{parse_cookie_header, ApiError, Request, Response, ResponseBody};
use latchflow_storage::StorageService;

/// Build a `Request` from the pieces axum hands a handler: path params
/// (already matched by the router), the parsed query string, headers, an
/// optional JSON body, and the peer address.
#[must_use]
pub fn build_request(
    method: &str,
    path: &str,
    params: HashMap<String, String>,
    query: HashMap<String, String>,
    headers: &HeaderMap,
    body: Option<Value>,
    peer: Option<SocketAddr>,
) -> Request {
    let mut header_map = HashMap::new();
    for (name, value) in headers {
        if let Ok(v) = value.to_str() {
            header_map.insert(name.as_str().to_owned(), v.to_owned());
        }
    }

    let cookies = header_map
        .get("cookie")
        .map(|raw| parse_cookie_header(raw))
        .unwrap_or_default();

    let ip = header_map
        .get("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .map(str::to_owned)
        .or_else(|| peer.map(|a| a.ip().to_string()));

    let user_agent = header_map.get("user-agent").cloned();

    Request {
        method: method.to_owned(),
        path: path.to_owned(),
        params,
        query,
        headers: header_map,
        body,
        ip,
        user_agent,
        user: None,
        file: None,
        cookies,
    }
}

/// Turn a framework-agnostic `Response` into an axum one. `Stream` bodies
/// are resolved against the storage service here — the one place that
/// knows both "axum" and "storage" at once.
pub async fn into_axum_response(resp: Response, storage: &dyn StorageService) -> AxumResponse {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = AxumResponse::builder().status(status);
    for (name, value) in &resp.headers {
        builder = builder.header(name, value);
    }

    match resp.body {
        ResponseBody::Json(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&value).unwrap_or_default()))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        ResponseBody::Buffer { bytes, content_type } => builder
            .header("content-type", content_type)
            .body(Body::from(bytes))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        ResponseBody::Stream { object_key, content_type } => match storage.get_file_stream(&object_key).await {
            Ok(bytes) => builder
                .header("content-type", content_type)
                .body(Body::from(bytes))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
            Err(err) => api_error_response(&ApiError::internal(err.to_string())),
        },
        ResponseBody::Empty => builder.body(Body::empty()).unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
    }
}

#[must_use]
pub fn api_error_response(err: &ApiError) -> AxumResponse {
    let body = serde_json::json!({ "status": "error", "code": err.code, "message": err.message });
    (
        StatusCode::from_u16(err.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        axum::Json(body),
    )
        .into_response()
}

#[must_use]
pub fn json_ok(status: u16, value: Value) -> AxumResponse {
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::OK),
        axum::Json(value),
    )
        .into_response()
}

#[must_use]
pub fn empty(status: u16) -> AxumResponse {
    StatusCode::from_u16(status).unwrap_or(StatusCode::NO_CONTENT).into_response()
}

#[must_use]
pub fn buffer(status: u16, bytes: Bytes, content_type: &str, extra_headers: &[(&str, &str)]) -> AxumResponse {
    let mut builder = AxumResponse::builder()
        .status(StatusCode::from_u16(status).unwrap_or(StatusCode::OK))
        .header("content-type", content_type);
    for (name, value) in extra_headers {
        builder = builder.header(*name, *value);
    }
    builder
        .body(Body::from(bytes))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_header_is_parsed_into_request_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", "lf_admin_sess=abc123".parse().unwrap());
        let req = build_request("GET", "/portal/me", HashMap::new(), HashMap::new(), &headers, None, None);
        assert_eq!(req.cookie("lf_admin_sess"), Some("abc123"));
    }

    #[test]
    fn forwarded_for_takes_priority_over_peer_addr() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let req = build_request("GET", "/health", HashMap::new(), HashMap::new(), &headers, None, Some(peer));
        assert_eq!(req.ip.as_deref(), Some("203.0.113.9"));
    }
}
