//! End-to-end tests of the reqwest-backed client against an in-process server.
//!
//! The server issues sequential tokens, keeps only the latest one valid and
//! authenticates refresh calls with a cookie set at login.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Json, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::tempdir;

use tokenrelay_application::AuthClient;
use tokenrelay_domain::{ApiRequest, AuthError, AuthSettings, RequestBody};
use tokenrelay_infrastructure::build_client;

struct FakeApi {
    valid: Mutex<String>,
    issued: AtomicUsize,
    refresh_calls: AtomicUsize,
    refresh_open: AtomicBool,
}

impl FakeApi {
    fn new() -> Self {
        Self {
            valid: Mutex::new(String::new()),
            issued: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            refresh_open: AtomicBool::new(true),
        }
    }

    fn issue(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("token-{n}");
        *self.valid.lock() = token.clone();
        token
    }

    fn revoke(&self) {
        *self.valid.lock() = "revoked".to_string();
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {}", self.valid.lock());
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected)
    }
}

type Api = Arc<FakeApi>;

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": message }))).into_response()
}

async fn login(State(api): State<Api>, Json(body): Json<Value>) -> Response {
    if body["password"] != "secret" {
        return unauthorized("bad credentials");
    }
    let token = api.issue();
    (
        [(header::SET_COOKIE, "refresh=rt-1; Path=/; HttpOnly")],
        Json(json!({
            "token": token,
            "user": { "username": body["username"], "roles": ["ROLE_ADMIN"] }
        })),
    )
        .into_response()
}

async fn refresh(State(api): State<Api>, headers: HeaderMap) -> Response {
    api.refresh_calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(150)).await;
    let has_cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|c| c.contains("refresh=rt-1"));
    if !has_cookie || !api.refresh_open.load(Ordering::SeqCst) {
        return unauthorized("refresh token expired");
    }
    Json(json!({ "accessToken": api.issue() })).into_response()
}

async fn news(State(api): State<Api>, headers: HeaderMap) -> Response {
    if !api.authorized(&headers) {
        return unauthorized("token expired");
    }
    Json(json!({ "items": ["first", "second"] })).into_response()
}

async fn create_news(State(api): State<Api>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !api.authorized(&headers) {
        return unauthorized("token expired");
    }
    (StatusCode::CREATED, Json(json!({ "created": body }))).into_response()
}

async fn start_server() -> (AuthSettings, Api) {
    let api = Arc::new(FakeApi::new());
    let app = Router::new()
        .route("/api/user/login", post(login))
        .route("/api/user/refresh", post(refresh))
        .route("/api/news", get(news).post(create_news))
        .with_state(Arc::clone(&api));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let settings = AuthSettings {
        base_url: format!("http://{addr}"),
        timeout_ms: 5_000,
        ..AuthSettings::default()
    };
    (settings, api)
}

async fn logged_in_client() -> (AuthClient, Api) {
    let (settings, api) = start_server().await;
    let client = build_client(settings, None).unwrap();
    client.login("alice", "secret").await.unwrap();
    (client, api)
}

#[tokio::test]
async fn test_login_and_fetch() {
    let (client, _api) = logged_in_client().await;

    let response = client.send(ApiRequest::get("/api/news")).await.unwrap();

    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.json_object().unwrap()["items"], json!(["first", "second"]));
    assert!(client.has_allowed_role());
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let (settings, _api) = start_server().await;
    let client = build_client(settings, None).unwrap();

    let error = client.login("alice", "nope").await.unwrap_err();

    assert_eq!(
        error,
        AuthError::LoginRejected {
            status: 401,
            message: "bad credentials".to_string()
        }
    );
    assert!(client.credential().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_expiry_refreshes_once() {
    let (client, api) = logged_in_client().await;
    api.revoke();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                let request = if i % 2 == 0 {
                    ApiRequest::get("/api/news")
                } else {
                    ApiRequest::post("/api/news")
                        .with_body(RequestBody::json(format!(r#"{{"title":"story {i}"}}"#)))
                };
                client.send(request).await
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let response = handle.await.unwrap().unwrap();
        if i % 2 == 0 {
            assert_eq!(response.status.as_u16(), 200);
        } else {
            assert_eq!(response.status.as_u16(), 201);
            let body = response.json_object().unwrap();
            assert_eq!(body["created"]["title"], format!("story {i}"));
        }
    }

    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.credential().unwrap().token, "token-2");
}

#[tokio::test]
async fn test_rejected_refresh_logs_out() {
    let (client, api) = logged_in_client().await;
    api.revoke();
    api.refresh_open.store(false, Ordering::SeqCst);

    let error = client.send(ApiRequest::get("/api/news")).await.unwrap_err();

    assert_eq!(
        error,
        AuthError::RefreshFailed {
            message: "refresh token expired".to_string()
        }
    );
    assert!(client.credential().is_none());
}

#[tokio::test]
async fn test_session_survives_restart() {
    let (settings, _api) = start_server().await;
    let dir = tempdir().unwrap();
    let path = dir.path().join("credentials.json");

    let first = build_client(settings.clone(), Some(&path)).unwrap();
    first.login("alice", "secret").await.unwrap();
    drop(first);

    let second = build_client(settings, Some(&path)).unwrap();
    assert_eq!(second.credential().unwrap().token, "token-1");
    let response = second.send(ApiRequest::get("/api/news")).await.unwrap();
    assert_eq!(response.status.as_u16(), 200);
}
