//! Bearer authentication with role predicates.
//!
//! Access tokens are stateless; the gate only verifies the signature and
//! expiry, then loads the user named by `sub` so that deleted or deactivated
//! accounts are locked out even while their tokens are still valid.

mod errors;
mod extractors;
mod gate;
mod ip;
mod state;
mod types;

pub use errors::{AuthError, AuthErrorKind};
pub use extractors::{AnyUser, Auth, RoleConstraint, StaffOnly, SuperuserOnly, bearer_token};
pub use gate::JwtAuth;
pub use ip::{ClientContext, HasHeadersAndExtensions, extract_client_ip};
pub use state::{HasAuthBackend, HasProxySettings};
pub use types::AuthenticatedUser;
