//! End-to-end tests driving the router over the in-memory stores.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use db::{Stores, memory::MemoryStore};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use server::{AppState, build_router, config::ServerConfig};
use services::services::{ServiceConfig, cache::CacheConfig};
use tower::ServiceExt;
use uuid::Uuid;

const CSRF: &str = "test-csrf-token";

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
}

struct Session {
    user_id: Uuid,
    token: String,
}

fn app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let config = ServerConfig {
        services: ServiceConfig {
            password_iterations: 1,
            cache: CacheConfig::disabled(),
            ..ServiceConfig::default()
        },
        ..ServerConfig::default()
    };
    let state = AppState::new(Stores::from_memory(store.clone()), config);
    TestApp {
        router: build_router(state),
        store,
    }
}

impl TestApp {
    async fn raw(&self, request: Request<Body>) -> (StatusCode, Value, header::HeaderMap) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body, headers)
    }

    /// Sends a request carrying a matching CSRF cookie/header pair.
    async fn send(
        &self,
        method: Method,
        uri: &str,
        session: Option<&Session>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut cookies = format!("csrf-token={CSRF}");
        if let Some(session) = session {
            cookies.push_str(&format!("; session_token={}", session.token));
        }
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, cookies)
            .header("x-csrf-token", CSRF);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();
        let (status, body, _) = self.raw(request).await;
        (status, body)
    }

    async fn register_and_login(&self, name: &str) -> Session {
        let email = format!("{}@example.com", name.to_lowercase());
        let (status, body) = self
            .send(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({"name": name, "email": email, "password": "password123"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        let (status, body) = self
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({"email": email, "password": "password123"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        Session {
            user_id: body["data"]["user"]["id"].as_str().unwrap().parse().unwrap(),
            token: body["data"]["token"].as_str().unwrap().to_string(),
        }
    }

    async fn create_project(&self, session: &Session, name: &str) -> Value {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/projects",
                Some(session),
                Some(json!({"name": name})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"].clone()
    }

    async fn create_board(&self, session: &Session, project_id: &str, defaults: bool) -> Value {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/boards",
                Some(session),
                Some(json!({
                    "project_id": project_id,
                    "name": "Разработка",
                    "create_default_columns": defaults,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"].clone()
    }
}

#[tokio::test]
async fn test_health_is_public() {
    let app = app();
    let request = Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();
    let (status, body, headers) = app.raw(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_csrf_endpoint_sets_cookie() {
    let app = app();
    let request = Request::builder()
        .uri("/api/csrf")
        .body(Body::empty())
        .unwrap();
    let (status, body, headers) = app.raw(request).await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["token"].as_str().unwrap();
    assert_eq!(token.len(), 64);
    let cookie = headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(cookie.starts_with(&format!("csrf-token={token}")));
}

#[tokio::test]
async fn test_create_project_returns_201_with_owner() {
    let app = app();
    let alice = app.register_and_login("Alice").await;

    let project = app.create_project(&alice, "Encore").await;
    assert_eq!(project["name"], "Encore");
    assert_eq!(project["owner_id"], alice.user_id.to_string());
    assert_eq!(project["color"], "#3b82f6");

    let (status, body) = app
        .send(
            Method::GET,
            &format!("/api/projects/{}/members", project["id"].as_str().unwrap()),
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["role"], "owner");
}

#[tokio::test]
async fn test_invalid_project_is_422_with_details() {
    let app = app();
    let alice = app.register_and_login("Alice").await;
    let (status, body) = app
        .send(
            Method::POST,
            "/api/projects",
            Some(&alice),
            Some(json!({"name": "   "})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["details"][0]["field"], "name");
}

#[tokio::test]
async fn test_deleting_last_column_is_422() {
    let app = app();
    let alice = app.register_and_login("Alice").await;
    let project = app.create_project(&alice, "Encore").await;
    let board = app
        .create_board(&alice, project["id"].as_str().unwrap(), false)
        .await;
    let columns = board["columns"].as_array().unwrap();
    assert_eq!(columns.len(), 1);

    let (status, body) = app
        .send(
            Method::DELETE,
            &format!("/api/columns/{}", columns[0]["id"].as_str().unwrap()),
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "LAST_COLUMN");
}

#[tokio::test]
async fn test_duplicate_column_title_is_409() {
    let app = app();
    let alice = app.register_and_login("Alice").await;
    let project = app.create_project(&alice, "Encore").await;
    let board = app
        .create_board(&alice, project["id"].as_str().unwrap(), true)
        .await;
    let board_id = board["id"].as_str().unwrap();
    let existing = board["columns"][0]["title"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(
            Method::POST,
            "/api/columns",
            Some(&alice),
            Some(json!({"board_id": board_id, "title": format!("  {} ", existing.to_uppercase())})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "COLUMN_TITLE_EXISTS");

    let (status, _) = app
        .send(
            Method::POST,
            "/api/columns",
            Some(&alice),
            Some(json!({"board_id": board_id, "title": "Ревью"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_mutations_without_csrf_pair_are_403() {
    let app = app();
    let alice = app.register_and_login("Alice").await;
    let cookie = format!("session_token={}", alice.token);

    let cases = [
        (None, None),
        (Some(format!("{cookie}; csrf-token=abc")), None),
        (Some(cookie.clone()), Some("abc")),
        (Some(format!("{cookie}; csrf-token=abc")), Some("abd")),
    ];
    for (cookies, header_value) in cases {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/projects")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookies) = cookies {
            builder = builder.header(header::COOKIE, cookies);
        }
        if let Some(value) = header_value {
            builder = builder.header("x-csrf-token", value);
        }
        let request = builder
            .body(Body::from(json!({"name": "Nope"}).to_string()))
            .unwrap();
        let (status, body, _) = app.raw(request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "CSRF_TOKEN_INVALID");
    }

    let (status, body) = app.send(Method::GET, "/api/projects", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_session_is_401() {
    let app = app();
    let alice = app.register_and_login("Alice").await;

    let (status, _) = app.send(Method::GET, "/api/auth/me", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);

    app.store.expire_sessions(alice.user_id).await;
    let (status, body) = app.send(Method::GET, "/api/auth/me", Some(&alice), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "SESSION_EXPIRED");

    let (status, body) = app.send(Method::GET, "/api/auth/me", Some(&alice), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "SESSION_INVALID");
}

#[tokio::test]
async fn test_missing_session_is_401_and_bearer_works() {
    let app = app();
    let alice = app.register_and_login("Alice").await;

    let (status, body) = app.send(Method::GET, "/api/projects", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTH_REQUIRED");

    let request = Request::builder()
        .uri("/api/auth/me")
        .header(header::AUTHORIZATION, format!("Bearer {}", alice.token))
        .body(Body::empty())
        .unwrap();
    let (status, body, _) = app.raw(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "alice@example.com");
    assert!(body["data"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_logout_revokes_session() {
    let app = app();
    let alice = app.register_and_login("Alice").await;
    assert_eq!(app.store.session_count().await, 1);

    let (status, _) = app.send(Method::POST, "/api/auth/logout", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.session_count().await, 0);

    let (status, _) = app.send(Method::GET, "/api/auth/me", Some(&alice), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_task_flow() {
    let app = app();
    let alice = app.register_and_login("Alice").await;
    let project = app.create_project(&alice, "Encore").await;
    let board = app
        .create_board(&alice, project["id"].as_str().unwrap(), true)
        .await;
    let todo = board["columns"][0]["id"].as_str().unwrap();
    let done = board["columns"][3]["id"].as_str().unwrap();

    let (status, body) = app
        .send(
            Method::POST,
            "/api/tasks",
            Some(&alice),
            Some(json!({"column_id": todo, "title": "Написать тесты", "priority": "high"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let task_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["board_id"], board["id"]);

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/tasks/{task_id}/move"),
            Some(&alice),
            Some(json!({"column_id": done})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["column_id"], done);

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/tasks/{task_id}/comments"),
            Some(&alice),
            Some(json!({"content": "Готово"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/tasks/{task_id}/timer/start"),
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/tasks/{task_id}/timer/start"),
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "TIMER_ALREADY_RUNNING");

    let (status, body) = app
        .send(
            Method::GET,
            &format!("/api/tasks?board_id={}", board["id"].as_str().unwrap()),
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_bad_path_and_unknown_route() {
    let app = app();
    let alice = app.register_and_login("Alice").await;

    let (status, body) = app
        .send(Method::GET, "/api/projects/not-a-uuid", Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_PATH");

    let (status, body) = app
        .send(
            Method::GET,
            &format!("/api/projects/{}", Uuid::new_v4()),
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "PROJECT_NOT_FOUND");

    let (status, body) = app.send(Method::GET, "/api/nowhere", Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "ROUTE_NOT_FOUND");
}
