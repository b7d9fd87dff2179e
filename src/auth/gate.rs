//! Per-request bearer token verification.

use std::sync::Arc;
use tracing::error;

use super::errors::{AuthError, AuthErrorKind};
use super::types::AuthenticatedUser;
use crate::db::UserStore;
use crate::jwt::{JwtService, TokenError};

/// Verifies access tokens and resolves them to users.
///
/// Role predicates are fixed at construction. The gate keeps no state between
/// requests and never touches the refresh session table.
#[derive(Clone)]
pub struct JwtAuth {
    jwt: Arc<JwtService>,
    users: UserStore,
    require_staff: bool,
    require_superuser: bool,
}

impl JwtAuth {
    pub fn new(jwt: Arc<JwtService>, users: UserStore) -> Self {
        Self {
            jwt,
            users,
            require_staff: false,
            require_superuser: false,
        }
    }

    pub fn require_staff(mut self, required: bool) -> Self {
        self.require_staff = required;
        self
    }

    pub fn require_superuser(mut self, required: bool) -> Self {
        self.require_superuser = required;
        self
    }

    pub async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = self.jwt.decode_token(token).map_err(|e| match e {
            TokenError::Expired => AuthError::new(AuthErrorKind::TokenExpired),
            _ => AuthError::new(AuthErrorKind::InvalidToken),
        })?;

        let sub = claims
            .sub
            .as_deref()
            .ok_or(AuthError::new(AuthErrorKind::MissingSubject))?;

        // Every subject we issue is a numeric user id
        let user_id: i64 = sub
            .parse()
            .map_err(|_| AuthError::new(AuthErrorKind::InvalidToken))?;

        let user = self
            .users
            .get_active_by_id(user_id)
            .await
            .map_err(|e| {
                error!("Failed to look up user: {}", e);
                AuthError::new(AuthErrorKind::DatabaseError)
            })?
            .ok_or(AuthError::new(AuthErrorKind::UserNotFound))?;

        if self.require_staff && !user.is_staff {
            return Err(AuthError::new(AuthErrorKind::StaffRequired));
        }

        if self.require_superuser && !user.is_superuser {
            return Err(AuthError::new(AuthErrorKind::SuperuserRequired));
        }

        Ok(AuthenticatedUser { claims, user })
    }
}
