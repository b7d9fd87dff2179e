mod error;
mod health;
mod tokens;
mod users;

use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::jwt::JwtService;
use crate::session::RefreshSessionService;

pub use error::{ApiError, ApiJson};

/// Create the API router. Paths are relative to the version prefix.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtService>,
    sessions: RefreshSessionService,
    num_proxies: usize,
) -> Router {
    let tokens_state = tokens::TokensState {
        db: db.clone(),
        jwt: jwt.clone(),
        sessions: sessions.clone(),
        num_proxies,
    };

    let health_state = health::HealthState { db: db.clone() };

    let users_state = users::UsersState { db, jwt, sessions };

    Router::new()
        .merge(tokens::router(tokens_state))
        .merge(users::router(users_state))
        .merge(health::router(health_state))
}
