mod common;

use axum::http::StatusCode;
use common::{create_test_app, create_user, create_user_with_flags, get, login, post_json, send};
use serde_json::json;

#[tokio::test]
async fn test_register_and_log_in() {
    let t = create_test_app().await;

    let (status, json) = send(
        &t.app,
        post_json(
            "/v1/users/",
            json!({
                "username": "alice",
                "email": "alice@example.com",
                "password": "correct-horse",
                "first_name": "Alice"
            }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["username"], "alice");
    assert_eq!(json["first_name"], "Alice");
    assert_eq!(json["is_staff"], false);
    assert!(json.get("password_hash").is_none());

    let (access, _) = login(&t.app, "alice", "correct-horse").await;
    let (status, me) = send(&t.app, get("/v1/users/me", Some(access.as_str()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], json["id"]);
    assert_eq!(me["email"], "alice@example.com");
}

#[tokio::test]
async fn test_register_without_trailing_slash() {
    let t = create_test_app().await;
    let (status, _) = send(
        &t.app,
        post_json(
            "/v1/users",
            json!({ "username": "bob", "email": "bob@example.com", "password": "s3cure-pass" }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_register_validation() {
    let t = create_test_app().await;
    create_user(&t.db, "alice", "correct-horse").await;

    let cases = [
        (
            json!({ "username": "alice", "email": "other@example.com", "password": "s3cure-pass" }),
            "Username already exists",
        ),
        (
            json!({ "username": "bob", "email": "alice@example.com", "password": "s3cure-pass" }),
            "Email already exists",
        ),
        (
            json!({ "username": "bob smith", "email": "bob@example.com", "password": "s3cure-pass" }),
            "Username can only contain letters, numbers and @/./+/-/_ characters",
        ),
        (
            json!({ "username": "bob", "email": "bob@example.com", "password": "12345678" }),
            "Password cannot be entirely numeric",
        ),
        (
            json!({ "username": "bob", "email": "not-an-email", "password": "s3cure-pass" }),
            "Enter a valid email address",
        ),
    ];

    for (body, message) in cases {
        let (status, json) = send(&t.app, post_json("/v1/users/", body, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], message);
    }
}

#[tokio::test]
async fn test_me_requires_bearer() {
    let t = create_test_app().await;

    let (status, json) = send(&t.app, get("/v1/users/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "Not authenticated");

    let (status, json) = send(&t.app, get("/v1/users/me", Some("garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "Invalid token");
}

#[tokio::test]
async fn test_deleted_user_token_rejected() {
    let t = create_test_app().await;
    let user = create_user(&t.db, "alice", "correct-horse").await;
    let (access, _) = login(&t.app, "alice", "correct-horse").await;

    t.db.users().delete(user.id).await.unwrap();

    let (status, json) = send(&t.app, get("/v1/users/me", Some(access.as_str()))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "User not found");
}

#[tokio::test]
async fn test_list_and_revoke_all_sessions() {
    let t = create_test_app().await;
    create_user(&t.db, "alice", "correct-horse").await;
    let (access, refresh) = login(&t.app, "alice", "correct-horse").await;
    login(&t.app, "alice", "correct-horse").await;

    let (status, json) = send(&t.app, get("/v1/users/me/sessions", Some(access.as_str()))).await;
    assert_eq!(status, StatusCode::OK);
    let sessions = json["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions[0].get("refresh_token_hash").is_none());
    assert_eq!(sessions[0]["rotation_counter"], 0);

    let (status, json) = send(
        &t.app,
        post_json(
            "/v1/users/me/sessions/revoke-all",
            json!({}),
            Some(access.as_str()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["revoked"], 2);

    let (status, _) = send(
        &t.app,
        post_json(
            "/v1/users/me/token/refresh",
            json!({ "refresh_token": refresh }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, json) = send(&t.app, get("/v1/users/me/sessions", Some(access.as_str()))).await;
    assert!(json["sessions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_user_list_is_superuser_only() {
    let t = create_test_app().await;
    create_user(&t.db, "alice", "correct-horse").await;
    create_user_with_flags(&t.db, "staff", "staff-password", true, false).await;
    create_user_with_flags(&t.db, "root", "root-password", true, true).await;

    let (alice, _) = login(&t.app, "alice", "correct-horse").await;
    let (staff, _) = login(&t.app, "staff", "staff-password").await;
    let (root, _) = login(&t.app, "root", "root-password").await;

    for token in [&alice, &staff] {
        let (status, json) = send(&t.app, get("/v1/users/", Some(token.as_str()))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"], "Superuser access required");
    }

    let (status, json) = send(&t.app, get("/v1/users/", Some(root.as_str()))).await;
    assert_eq!(status, StatusCode::OK);
    let usernames: Vec<&str> = json["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(usernames, ["alice", "staff", "root"]);
}

#[tokio::test]
async fn test_health() {
    let t = create_test_app().await;
    let (status, json) = send(&t.app, get("/v1/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}
