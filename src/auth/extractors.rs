//! Axum extractors for authentication.

use std::marker::PhantomData;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};

use super::errors::{AuthError, AuthErrorKind};
use super::gate::JwtAuth;
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;

/// Role requirement checked by the [`Auth`] extractor.
pub trait RoleConstraint {
    const REQUIRE_STAFF: bool = false;
    const REQUIRE_SUPERUSER: bool = false;
}

/// Any active user.
pub struct AnyUser;
impl RoleConstraint for AnyUser {}

/// Users with `is_staff`.
pub struct StaffOnly;
impl RoleConstraint for StaffOnly {
    const REQUIRE_STAFF: bool = true;
}

/// Users with `is_superuser`.
pub struct SuperuserOnly;
impl RoleConstraint for SuperuserOnly {
    const REQUIRE_SUPERUSER: bool = true;
}

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token)
}

/// Extractor for endpoints that require a bearer access token.
///
/// ```ignore
/// async fn handler(Auth(user, _): Auth<SuperuserOnly>) { ... }
/// ```
pub struct Auth<R: RoleConstraint = AnyUser>(pub AuthenticatedUser, pub PhantomData<R>);

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token =
            bearer_token(&parts.headers).ok_or(AuthError::new(AuthErrorKind::NotAuthenticated))?;

        let user = JwtAuth::new(state.jwt().clone(), state.db().users())
            .require_staff(R::REQUIRE_STAFF)
            .require_superuser(R::REQUIRE_SUPERUSER)
            .authenticate(token)
            .await?;

        Ok(Auth(user, PhantomData))
    }
}
