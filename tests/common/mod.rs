#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use rotor::clock::ManualClock;
use rotor::db::{Database, NewUser, User};
use rotor::password::hash_password;
use rotor::{ServerConfig, create_app};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const JWT_SECRET: &[u8] = b"integration-test-secret-at-least-32-bytes";

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub clock: Arc<ManualClock>,
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with_proxies(0).await
}

pub async fn create_test_app_with_proxies(num_proxies: usize) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let clock = Arc::new(ManualClock::starting_now());

    let mut config = ServerConfig::new(db.clone(), JWT_SECRET.to_vec());
    config.clock = clock.clone();
    config.num_proxies = num_proxies;

    TestApp {
        app: create_app(&config),
        db,
        clock,
    }
}

/// Insert a user directly with a real password hash.
pub async fn create_user(db: &Database, username: &str, password: &str) -> User {
    create_user_with_flags(db, username, password, false, false).await
}

pub async fn create_user_with_flags(
    db: &Database,
    username: &str,
    password: &str,
    is_staff: bool,
    is_superuser: bool,
) -> User {
    let password_hash = hash_password(password).unwrap();
    db.users()
        .create(&NewUser {
            username,
            email: &format!("{}@example.com", username),
            first_name: "",
            last_name: "",
            password_hash: &password_hash,
            is_staff,
            is_superuser,
        })
        .await
        .unwrap()
}

pub fn post_json(uri: &str, body: Value, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

/// Send a request and parse the body as JSON (`Value::Null` when empty).
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

/// Log in and return `(access_token, refresh_token)`.
pub async fn login(app: &Router, username: &str, password: &str) -> (String, String) {
    let (status, json) = send(
        app,
        post_json(
            "/v1/users/me/token",
            serde_json::json!({ "username": username, "password": password }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", json);
    (
        json["access_token"].as_str().unwrap().to_string(),
        json["refresh_token"].as_str().unwrap().to_string(),
    )
}
