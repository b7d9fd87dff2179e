//! Authentication state traits and macro.

use std::sync::Arc;

use crate::db::Database;
use crate::jwt::JwtService;

/// Trait for state types that can back the authentication gate.
pub trait HasAuthBackend {
    fn jwt(&self) -> &Arc<JwtService>;
    fn db(&self) -> &Database;
}

/// Trait for state types that know how many reverse proxies sit in front of
/// the server.
pub trait HasProxySettings {
    fn num_proxies(&self) -> usize;
}

/// Implement `HasAuthBackend` for a state struct with the standard fields.
///
/// The struct must have these fields:
/// - `jwt: Arc<JwtService>`
/// - `db: Database`
///
/// # Example
/// ```ignore
/// #[derive(Clone)]
/// pub struct MyState {
///     pub db: Database,
///     pub jwt: Arc<JwtService>,
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn jwt(&self) -> &::std::sync::Arc<$crate::jwt::JwtService> {
                &self.jwt
            }
            fn db(&self) -> &$crate::db::Database {
                &self.db
            }
        }
    };
}
