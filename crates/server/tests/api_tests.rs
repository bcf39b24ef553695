use axum::body::Body;
use axum::http::{self, Request, StatusCode};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use latchflow_authz::{PermissionRule, RuleSource};
use latchflow_core::{sha256_hex, Role};
use latchflow_server::config::Config;
use latchflow_server::state::AppState;
use latchflow_server::store::{AdminSession, Assignment, Bundle, MagicLink, Recipient, RecipientOtp, RecipientSession, Store, User};
use latchflow_storage::StorageService;

fn test_config() -> Config {
    let mut config = Config::from_env().unwrap_or_else(|_| panic!("default config should always parse"));
    config.port = 0;
    config
}

/// v2 enforcement off by default (§4.6 legacy fallback lets any active user
/// through on `v1_allow_executor` routes) — tests of the rule evaluator
/// itself need it turned on to exercise real deny/allow decisions.
fn enforced_config() -> Config {
    let mut config = test_config();
    config.authz.v2_enabled = true;
    config
}

async fn admin_user(state: &AppState, role: Role) -> User {
    let user = User {
        id: format!("user-{}", uuid::Uuid::new_v4()),
        email: format!("{}@example.com", uuid::Uuid::new_v4()),
        role,
        is_active: true,
        mfa_enabled: false,
        permissions_hash: None,
        direct_permissions: Vec::new(),
        permission_preset_id: None,
    };
    state.store.put_user(user.clone()).await.expect("seed user");
    user
}

async fn admin_session_cookie(state: &AppState, user: &User) -> String {
    let jti = format!("sess-{}", uuid::Uuid::new_v4());
    let now = Utc::now();
    state
        .store
        .put_admin_session(AdminSession {
            jti: jti.clone(),
            user_id: user.id.clone(),
            created_at: now,
            expires_at: now + chrono::Duration::hours(1),
            revoked_at: None,
            reauthenticated_at: Some(now),
            mfa_verified_at: Some(now),
            ip: None,
            user_agent: None,
        })
        .await
        .expect("seed admin session");
    format!("lf_admin_sess={jti}")
}

async fn json_request(app: &axum::Router, method: &str, path: &str, cookie: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path).header(http::header::CONTENT_TYPE, "application/json");
    if let Some(c) = cookie {
        builder = builder.header(http::header::COOKIE, c);
    }
    let body = match body {
        Some(v) => Body::from(serde_json::to_vec(&v).unwrap()),
        None => Body::empty(),
    };
    let request = builder.body(body).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, value)
}

fn build_app(state: AppState) -> axum::Router {
    latchflow_server::build_router(state)
}

#[tokio::test]
async fn health_check_is_public() {
    let state = AppState::new(test_config());
    let app = build_app(state);
    let (status, _) = json_request(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn admin_routes_require_a_session() {
    let state = AppState::new(test_config());
    let app = build_app(state);
    let (status, _) = json_request(&app, "GET", "/admin/bundles", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_can_crud_a_bundle() {
    let state = AppState::new(test_config());
    let admin = admin_user(&state, Role::Admin).await;
    let cookie = admin_session_cookie(&state, &admin).await;
    let app = build_app(state);

    let (status, created) = json_request(&app, "POST", "/admin/bundles", Some(&cookie), Some(json!({ "name": "release-bundle" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().expect("created bundle has an id").to_owned();
    assert_eq!(created["name"], "release-bundle");

    let (status, fetched) = json_request(&app, "GET", &format!("/admin/bundles/{id}"), Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], id);

    let (status, listed) = json_request(&app, "GET", "/admin/bundles", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(listed.as_array().unwrap().iter().any(|b| b["id"] == id));

    let (status, updated) = json_request(&app, "PUT", &format!("/admin/bundles/{id}"), Some(&cookie), Some(json!({ "name": "release-bundle-v2", "isEnabled": false }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "release-bundle-v2");
    assert_eq!(updated["isEnabled"], false);

    let (status, _) = json_request(&app, "DELETE", &format!("/admin/bundles/{id}"), Some(&cookie), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = json_request(&app, "GET", &format!("/admin/bundles/{id}"), Some(&cookie), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn executor_role_is_read_only_on_v1_allowed_routes() {
    let state = AppState::new(test_config());
    let executor = admin_user(&state, Role::Executor).await;
    let cookie = admin_session_cookie(&state, &executor).await;
    let app = build_app(state);

    let (status, _) = json_request(&app, "GET", "/admin/bundles", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = json_request(&app, "POST", "/admin/bundles", Some(&cookie), Some(json!({ "name": "nope" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_role_without_direct_permissions_is_forbidden() {
    let state = AppState::new(enforced_config());
    let user = admin_user(&state, Role::Unknown).await;
    let cookie = admin_session_cookie(&state, &user).await;
    let app = build_app(state);

    let (status, _) = json_request(&app, "GET", "/admin/bundles", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn direct_permission_rule_grants_read_access_to_an_unknown_role_user() {
    let state = AppState::new(enforced_config());
    let rule = PermissionRule {
        id: None,
        source: RuleSource::Direct,
        action: "read".into(),
        resource: "bundle".into(),
        r#where: None,
        input: None,
    };
    let compiled = latchflow_authz::compile(std::slice::from_ref(&rule));
    let user = User {
        id: format!("user-{}", uuid::Uuid::new_v4()),
        email: format!("{}@example.com", uuid::Uuid::new_v4()),
        role: Role::Unknown,
        is_active: true,
        mfa_enabled: false,
        permissions_hash: Some(compiled.rules_hash),
        direct_permissions: vec![rule],
        permission_preset_id: None,
    };
    state.store.put_user(user.clone()).await.expect("seed user");
    let cookie = admin_session_cookie(&state, &user).await;
    let app = build_app(state);

    let (status, _) = json_request(&app, "GET", "/admin/bundles", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn admin_magic_link_round_trip_sets_a_session_cookie() {
    let state = AppState::new(test_config());
    let user = admin_user(&state, Role::Admin).await;
    let plaintext_token = "a-test-magic-link-token";
    state
        .store
        .put_magic_link(MagicLink {
            token_hash: sha256_hex(plaintext_token.as_bytes()),
            user_id: user.id.clone(),
            expires_at: Utc::now() + chrono::Duration::minutes(10),
            consumed_at: None,
        })
        .await
        .expect("seed magic link");
    let app = build_app(state);

    let request = Request::builder()
        .method("GET")
        .uri(format!("/auth/admin/callback?token={plaintext_token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let set_cookie = response.headers().get(http::header::SET_COOKIE).expect("session cookie set");
    assert!(set_cookie.to_str().unwrap().starts_with("lf_admin_sess="));

    // A second attempt reuses the already-consumed token and must fail.
    let request = Request::builder()
        .method("GET")
        .uri(format!("/auth/admin/callback?token={plaintext_token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn recipient_otp_round_trip_sets_a_session_cookie() {
    let state = AppState::new(test_config());
    let recipient = Recipient {
        id: format!("recipient-{}", uuid::Uuid::new_v4()),
        email: "recipient@example.com".into(),
        is_enabled: true,
        tags: Vec::new(),
        verification_required: false,
        verified_at: None,
    };
    state.store.put_recipient(recipient.clone()).await.expect("seed recipient");
    state
        .store
        .put_recipient_otp(RecipientOtp {
            recipient_id: recipient.id.clone(),
            code_hash: sha256_hex(b"123456"),
            attempts: 0,
            expires_at: Utc::now() + chrono::Duration::minutes(5),
        })
        .await
        .expect("seed otp");
    let app = build_app(state);

    let (status, _) = json_request(
        &app,
        "POST",
        "/auth/recipient/verify",
        None,
        Some(json!({ "recipientId": recipient.id, "otp": "000000" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/auth/recipient/verify")
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&json!({ "recipientId": recipient.id, "otp": "123456" })).unwrap()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let set_cookie = response.headers().get(http::header::SET_COOKIE).expect("session cookie set");
    assert!(set_cookie.to_str().unwrap().starts_with("lf_recipient_sess="));
}

#[tokio::test]
async fn recipient_can_list_and_download_an_assigned_bundle() {
    let state = AppState::new(test_config());

    let put_result = state
        .storage
        .put_file(bytes::Bytes::from_static(b"bundle contents"), "application/octet-stream")
        .await
        .expect("seed blob");

    let bundle = Bundle {
        id: format!("bundle-{}", uuid::Uuid::new_v4()),
        name: "signed-release".into(),
        is_enabled: true,
        storage_key: Some(put_result.storage_key.clone()),
        checksum: Some(put_result.sha256.clone()),
        bundle_digest: Some(put_result.sha256.clone()),
        size: Some(put_result.size),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    state.store.put_bundle(bundle.clone()).await.expect("seed bundle");

    let recipient = Recipient {
        id: format!("recipient-{}", uuid::Uuid::new_v4()),
        email: "download@example.com".into(),
        is_enabled: true,
        tags: Vec::new(),
        verification_required: false,
        verified_at: None,
    };
    state.store.put_recipient(recipient.clone()).await.expect("seed recipient");

    state
        .store
        .put_assignment(Assignment {
            id: format!("assignment-{}", uuid::Uuid::new_v4()),
            recipient_id: recipient.id.clone(),
            bundle_id: bundle.id.clone(),
            is_enabled: true,
            max_downloads: None,
            downloads_used: 0,
            cooldown_seconds: None,
            last_download_at: None,
        })
        .await
        .expect("seed assignment");

    let jti = format!("rsess-{}", uuid::Uuid::new_v4());
    let now = Utc::now();
    state
        .store
        .put_recipient_session(RecipientSession {
            jti: jti.clone(),
            recipient_id: recipient.id.clone(),
            created_at: now,
            expires_at: now + chrono::Duration::hours(1),
            revoked_at: None,
        })
        .await
        .expect("seed recipient session");
    let cookie = format!("lf_recipient_sess={jti}");

    let app = build_app(state);

    let (status, bundles) = json_request(&app, "GET", "/portal/bundles", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(bundles.as_array().unwrap().iter().any(|b| b["id"] == bundle.id));

    let request = Request::builder()
        .method("GET")
        .uri(format!("/portal/bundles/{}", bundle.id))
        .header(http::header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let etag = response.headers().get("etag").expect("etag header present").clone();
    assert_eq!(etag.to_str().unwrap(), put_result.sha256);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"bundle contents");
}

#[tokio::test]
async fn bundle_rebuild_can_be_scheduled_and_polled() {
    let state = AppState::new(test_config());
    let admin = admin_user(&state, Role::Admin).await;
    let cookie = admin_session_cookie(&state, &admin).await;
    let bundle = Bundle {
        id: format!("bundle-{}", uuid::Uuid::new_v4()),
        name: "rebuildable".into(),
        is_enabled: true,
        storage_key: None,
        checksum: None,
        bundle_digest: None,
        size: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let bundle_id = bundle.id.clone();
    state.store.put_bundle(bundle).await.expect("seed bundle");
    let app = build_app(state);

    let (status, _) = json_request(&app, "POST", &format!("/admin/bundles/{bundle_id}/build"), Some(&cookie), Some(json!({ "force": true }))).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = json_request(&app, "GET", &format!("/admin/bundles/{bundle_id}/build/status"), Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["state"].is_string());
}

#[tokio::test]
async fn permission_simulation_reports_the_matched_decision() {
    let state = AppState::new(test_config());
    let admin = admin_user(&state, Role::Admin).await;
    let cookie = admin_session_cookie(&state, &admin).await;
    let target = admin_user(&state, Role::Executor).await;
    let app = build_app(state);

    let (status, result) = json_request(
        &app,
        "POST",
        "/admin/permissions/simulate",
        Some(&cookie),
        Some(json!({ "method": "GET", "path": "/admin/bundles", "userId": target.id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["allowed"], true);
}
