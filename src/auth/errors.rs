//! Authentication error types.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    NotAuthenticated,
    TokenExpired,
    InvalidToken,
    MissingSubject,
    UserNotFound,
    StaffRequired,
    SuperuserRequired,
    DatabaseError,
}

/// Rejection produced by the authentication gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthError {
    kind: AuthErrorKind,
}

impl AuthError {
    pub(super) fn new(kind: AuthErrorKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> AuthErrorKind {
        self.kind
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind {
            AuthErrorKind::NotAuthenticated
            | AuthErrorKind::TokenExpired
            | AuthErrorKind::InvalidToken
            | AuthErrorKind::MissingSubject
            | AuthErrorKind::UserNotFound => StatusCode::UNAUTHORIZED,
            AuthErrorKind::StaffRequired | AuthErrorKind::SuperuserRequired => {
                StatusCode::FORBIDDEN
            }
            AuthErrorKind::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::NotAuthenticated => "Not authenticated",
            AuthErrorKind::TokenExpired => "Token has expired",
            AuthErrorKind::InvalidToken => "Invalid token",
            AuthErrorKind::MissingSubject => "Token payload missing 'sub' field",
            AuthErrorKind::UserNotFound => "User not found",
            AuthErrorKind::StaffRequired => "Staff access required",
            AuthErrorKind::SuperuserRequired => "Superuser access required",
            AuthErrorKind::DatabaseError => "Database error",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let status = self.status_code();
        let mut response = (
            status,
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response();

        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        response
    }
}
