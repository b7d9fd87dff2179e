//! Token endpoints.
//!
//! - POST `/users/me/token` - Exchange username and password for a token pair
//! - POST `/users/me/token/refresh` - Rotate a refresh token
//! - POST `/users/me/token/revoke` - Revoke one of the caller's refresh tokens

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use super::error::{ApiError, ApiJson, ResultExt};
use crate::auth::{Auth, ClientContext, HasProxySettings};
use crate::db::Database;
use crate::impl_has_auth_backend;
use crate::jwt::JwtService;
use crate::password::{verify_dummy, verify_password};
use crate::session::RefreshSessionService;

#[derive(Clone)]
pub struct TokensState {
    pub db: Database,
    pub jwt: Arc<JwtService>,
    pub sessions: RefreshSessionService,
    pub num_proxies: usize,
}

impl_has_auth_backend!(TokensState);

impl HasProxySettings for TokensState {
    fn num_proxies(&self) -> usize {
        self.num_proxies
    }
}

pub fn router(state: TokensState) -> Router {
    Router::new()
        .route("/users/me/token", post(obtain_token))
        .route("/users/me/token/refresh", post(refresh_token))
        .route("/users/me/token/revoke", post(revoke_token))
        .with_state(state)
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct RefreshTokenRequest {
    refresh_token: String,
}

#[derive(Serialize)]
struct TokenPairResponse {
    access_token: String,
    refresh_token: String,
}

async fn obtain_token(
    State(state): State<TokensState>,
    ClientContext(context): ClientContext,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<TokenPairResponse>, ApiError> {
    let user = state
        .db
        .users()
        .get_by_username(&payload.username)
        .await
        .db_err("Failed to look up user")?;

    let Some(user) = user.filter(|u| u.is_active) else {
        verify_dummy(&payload.password);
        return Err(ApiError::invalid_credentials());
    };

    let verified = verify_password(&payload.password, &user.password_hash).unwrap_or_else(|e| {
        error!(user_id = user.id, "Stored password hash is unreadable: {}", e);
        false
    });
    if !verified {
        return Err(ApiError::invalid_credentials());
    }

    let pair = state.sessions.issue_token_pair(user.id, &context).await?;
    info!(user_id = user.id, session_id = %pair.session.id, "User logged in");

    Ok(Json(TokenPairResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

async fn refresh_token(
    State(state): State<TokensState>,
    ApiJson(payload): ApiJson<RefreshTokenRequest>,
) -> Result<Json<TokenPairResponse>, ApiError> {
    let rotated = state
        .sessions
        .rotate_refresh_token(&payload.refresh_token)
        .await?;

    Ok(Json(TokenPairResponse {
        access_token: rotated.access_token,
        refresh_token: rotated.refresh_token,
    }))
}

async fn revoke_token(
    State(state): State<TokensState>,
    Auth(auth, _): Auth,
    ApiJson(payload): ApiJson<RefreshTokenRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .revoke_refresh_token(&payload.refresh_token, auth.id())
        .await?;
    Ok(StatusCode::OK)
}
