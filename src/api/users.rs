use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use super::error::{ApiError, ApiJson, ResultExt};
use crate::auth::{Auth, SuperuserOnly};
use crate::db::{Database, NewUser, RefreshSession, User};
use crate::impl_has_auth_backend;
use crate::jwt::JwtService;
use crate::password::{hash_password, validate_password, validate_username};
use crate::session::RefreshSessionService;

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub jwt: Arc<JwtService>,
    pub sessions: RefreshSessionService,
}

impl_has_auth_backend!(UsersState);

pub fn router(state: UsersState) -> Router {
    Router::new()
        .route("/users", post(create_user).get(list_users))
        .route("/users/", post(create_user).get(list_users))
        .route("/users/me", get(me))
        .route("/users/me/sessions", get(list_sessions))
        .route("/users/me/sessions/revoke-all", post(revoke_all_sessions))
        .with_state(state)
}

#[derive(Serialize)]
struct UserResponse {
    id: i64,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    is_staff: bool,
    is_superuser: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
        }
    }
}

#[derive(Deserialize)]
struct CreateUserRequest {
    username: String,
    email: String,
    password: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

async fn create_user(
    State(state): State<UsersState>,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = payload.username.trim();
    let email = payload.email.trim();

    validate_username(username).map_err(ApiError::bad_request)?;

    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("Enter a valid email address"));
    }

    validate_password(&payload.password, username).map_err(ApiError::bad_request)?;

    let users = state.db.users();

    if users
        .username_exists(username)
        .await
        .db_err("Failed to check username")?
    {
        return Err(ApiError::bad_request("Username already exists"));
    }

    if users
        .email_exists(email)
        .await
        .db_err("Failed to check email")?
    {
        return Err(ApiError::bad_request("Email already exists"));
    }

    let password_hash = hash_password(&payload.password).map_err(|e| {
        error!("Failed to hash password: {}", e);
        ApiError::internal("Failed to create user")
    })?;

    let user = users
        .create(&NewUser {
            username,
            email,
            first_name: payload.first_name.trim(),
            last_name: payload.last_name.trim(),
            password_hash: &password_hash,
            is_staff: false,
            is_superuser: false,
        })
        .await
        .map_err(create_user_error)?;

    info!(user_id = user.id, "User registered");
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// A registration that lost a race still gets the duplicate message.
fn create_user_error(e: sqlx::Error) -> ApiError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            if db_err.message().contains("users.email") {
                ApiError::bad_request("Email already exists")
            } else {
                ApiError::bad_request("Username already exists")
            }
        }
        e => ApiError::db_error("Failed to create user", e),
    }
}

async fn me(Auth(auth, _): Auth) -> Json<UserResponse> {
    Json(auth.user.into())
}

#[derive(Serialize)]
struct SessionInfo {
    id: String,
    user_agent: Option<String>,
    ip_address: Option<String>,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
    rotation_counter: i64,
}

impl From<RefreshSession> for SessionInfo {
    fn from(session: RefreshSession) -> Self {
        Self {
            id: session.id,
            user_agent: session.user_agent,
            ip_address: session.ip_address,
            created_at: session.created_at,
            last_used_at: session.last_used_at,
            expires_at: session.expires_at,
            rotation_counter: session.rotation_counter,
        }
    }
}

#[derive(Serialize)]
struct ListSessionsResponse {
    sessions: Vec<SessionInfo>,
}

async fn list_sessions(
    State(state): State<UsersState>,
    Auth(auth, _): Auth,
) -> Result<Json<ListSessionsResponse>, ApiError> {
    let sessions = state.sessions.list_sessions(auth.id()).await?;
    Ok(Json(ListSessionsResponse {
        sessions: sessions.into_iter().map(SessionInfo::from).collect(),
    }))
}

#[derive(Serialize)]
struct RevokeAllResponse {
    revoked: u64,
}

async fn revoke_all_sessions(
    State(state): State<UsersState>,
    Auth(auth, _): Auth,
) -> Result<Json<RevokeAllResponse>, ApiError> {
    let revoked = state.sessions.revoke_all_sessions(auth.id()).await?;
    Ok(Json(RevokeAllResponse { revoked }))
}

#[derive(Serialize)]
struct ListUsersResponse {
    users: Vec<UserResponse>,
}

async fn list_users(
    State(state): State<UsersState>,
    _auth: Auth<SuperuserOnly>,
) -> Result<Json<ListUsersResponse>, ApiError> {
    let users = state.db.users().list().await.db_err("Failed to list users")?;
    Ok(Json(ListUsersResponse {
        users: users.into_iter().map(UserResponse::from).collect(),
    }))
}
