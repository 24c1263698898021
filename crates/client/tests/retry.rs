//! Client behaviour against a scripted local server.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use client::{ApiClient, ClientConfig, ClientError, RetryPolicy};
use serde_json::{Value, json};

#[derive(Clone, Default)]
struct Counters {
    flaky: Arc<AtomicUsize>,
    limited: Arc<AtomicUsize>,
    failing: Arc<AtomicUsize>,
    missing: Arc<AtomicUsize>,
    csrf: Arc<AtomicUsize>,
    stale: Arc<AtomicUsize>,
}

fn envelope_error(status: StatusCode, message: &str, code: &str) -> Response {
    (
        status,
        Json(json!({"success": false, "error": message, "code": code})),
    )
        .into_response()
}

fn envelope(data: Value) -> Response {
    Json(json!({"success": true, "data": data})).into_response()
}

fn csrf_matches(jar: &CookieJar, headers: &HeaderMap) -> bool {
    let cookie = jar.get("csrf-token").map(|c| c.value().to_string());
    let header = headers
        .get("x-csrf-token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    cookie.is_some() && cookie == header
}

async fn flaky(State(c): State<Counters>) -> Response {
    if c.flaky.fetch_add(1, Ordering::SeqCst) < 2 {
        return envelope_error(StatusCode::SERVICE_UNAVAILABLE, "", "UNAVAILABLE");
    }
    envelope(json!(["ok"]))
}

async fn limited(State(c): State<Counters>) -> Response {
    if c.limited.fetch_add(1, Ordering::SeqCst) == 0 {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }
    envelope(json!(1))
}

async fn failing(State(c): State<Counters>) -> Response {
    c.failing.fetch_add(1, Ordering::SeqCst);
    envelope_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Внутренняя ошибка сервера",
        "INTERNAL_ERROR",
    )
}

async fn missing(State(c): State<Counters>) -> Response {
    c.missing.fetch_add(1, Ordering::SeqCst);
    StatusCode::NOT_FOUND.into_response()
}

async fn unauthorized() -> Response {
    StatusCode::UNAUTHORIZED.into_response()
}

async fn issue_csrf(State(c): State<Counters>) -> Response {
    let n = c.csrf.fetch_add(1, Ordering::SeqCst) + 1;
    let token = format!("token-{n}");
    (
        [(header::SET_COOKIE, format!("csrf-token={token}; Path=/"))],
        Json(json!({"success": true, "data": {"token": token}})),
    )
        .into_response()
}

async fn echo(jar: CookieJar, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !csrf_matches(&jar, &headers) {
        return envelope_error(StatusCode::FORBIDDEN, "CSRF", "CSRF_TOKEN_INVALID");
    }
    (StatusCode::CREATED, Json(json!({"success": true, "data": body}))).into_response()
}

/// Rejects the first token it sees, as a server restart would.
async fn stale(State(c): State<Counters>, jar: CookieJar, headers: HeaderMap) -> Response {
    if c.stale.fetch_add(1, Ordering::SeqCst) == 0 || !csrf_matches(&jar, &headers) {
        return envelope_error(StatusCode::FORBIDDEN, "CSRF", "CSRF_TOKEN_INVALID");
    }
    envelope(Value::Null)
}

async fn spawn_server() -> (String, Counters) {
    let counters = Counters::default();
    let app = Router::new()
        .route("/api/flaky", get(flaky))
        .route("/api/limited", get(limited))
        .route("/api/failing", get(failing))
        .route("/api/missing", get(missing))
        .route("/api/unauthorized", get(unauthorized))
        .route("/api/csrf", get(issue_csrf))
        .route("/api/echo", post(echo))
        .route("/api/stale", post(stale))
        .with_state(counters.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), counters)
}

fn client(base_url: &str) -> ApiClient {
    let retry = RetryPolicy {
        max_retries: 3,
        min_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    };
    ApiClient::new(ClientConfig::new(base_url).with_retry(retry)).unwrap()
}

#[tokio::test]
async fn test_retries_server_errors_until_success() {
    let (url, counters) = spawn_server().await;
    let data: Vec<String> = client(&url).get("/flaky").await.unwrap();
    assert_eq!(data, vec!["ok".to_string()]);
    assert_eq!(counters.flaky.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retries_rate_limit() {
    let (url, counters) = spawn_server().await;
    let data: i64 = client(&url).get("/limited").await.unwrap();
    assert_eq!(data, 1);
    assert_eq!(counters.limited.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_gives_up_after_max_retries() {
    let (url, counters) = spawn_server().await;
    let err = client(&url).get::<Value>("/failing").await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.code(), Some("INTERNAL_ERROR"));
    assert_eq!(err.to_string(), "Внутренняя ошибка сервера");
    assert_eq!(counters.failing.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let (url, counters) = spawn_server().await;
    let err = client(&url).get::<Value>("/missing").await.unwrap_err();
    match err {
        ClientError::Api {
            status,
            code,
            message,
        } => {
            assert_eq!(status, 404);
            assert_eq!(code, "HTTP_404");
            assert_eq!(message, "Запрашиваемый ресурс не найден");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(counters.missing.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unauthorized_uses_russian_fallback() {
    let (url, _) = spawn_server().await;
    let err = client(&url).get::<Value>("/unauthorized").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(err.to_string().starts_with("Сессия истекла"));
}

#[tokio::test]
async fn test_mutations_fetch_and_reuse_csrf_token() {
    let (url, counters) = spawn_server().await;
    let client = client(&url);

    let echoed: Value = client.post("/echo", &json!({"n": 1})).await.unwrap();
    assert_eq!(echoed, json!({"n": 1}));
    let echoed: Value = client.post("/echo", &json!({"n": 2})).await.unwrap();
    assert_eq!(echoed, json!({"n": 2}));

    assert_eq!(counters.csrf.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_safe_requests_skip_csrf() {
    let (url, counters) = spawn_server().await;
    let _: Vec<String> = client(&url).get("/flaky").await.unwrap();
    assert_eq!(counters.csrf.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rejected_csrf_token_is_refreshed_once() {
    let (url, counters) = spawn_server().await;
    let client = client(&url);

    client.post::<(), _>("/stale", &json!({})).await.unwrap();
    assert_eq!(counters.stale.load(Ordering::SeqCst), 2);
    assert_eq!(counters.csrf.load(Ordering::SeqCst), 2);
}
