//! Authentication user types.

use crate::db::User;
use crate::jwt::AccessClaims;

/// A request whose bearer token verified and whose subject is an active user.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Claims from the access token
    pub claims: AccessClaims,
    /// The user named by `sub`, loaded fresh for this request
    pub user: User,
}

impl AuthenticatedUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }
}
