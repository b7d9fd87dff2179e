//! Refresh session lifecycle: issue, rotate, revoke.
//!
//! A refresh token is an opaque random string handed to the client exactly
//! once. Only its SHA-256 digest is stored. Rotation swaps the stored digest
//! for the digest of a fresh token inside a single transaction, so the old
//! token stops matching the moment the swap commits.
//!
//! ```text
//! ACTIVE --rotate--> ACTIVE (same row, new hash, counter + 1)
//! ACTIVE --revoke--> REVOKED
//! ACTIVE --time----> EXPIRED
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Duration;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::db::{Database, NewRefreshSession, RefreshSession};
use crate::jwt::{JwtService, TokenError};

pub const DEFAULT_REFRESH_TOKEN_TTL_DAYS: i64 = 30;
pub const DEFAULT_REFRESH_TOKEN_NBYTES: usize = 32;

/// Shortest refresh token accepted in configuration.
pub const MIN_REFRESH_TOKEN_NBYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct RefreshSessionSettings {
    /// Number of random bytes in a refresh token before encoding
    pub refresh_token_nbytes: usize,
    /// Absolute lifetime of a session, counted from creation
    pub refresh_token_ttl: Duration,
}

impl Default for RefreshSessionSettings {
    fn default() -> Self {
        Self {
            refresh_token_nbytes: DEFAULT_REFRESH_TOKEN_NBYTES,
            refresh_token_ttl: Duration::days(DEFAULT_REFRESH_TOKEN_TTL_DAYS),
        }
    }
}

/// Client details recorded on a new session for auditing.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Result of a successful rotation.
#[derive(Debug, Clone)]
pub struct RotatedTokens {
    pub refresh_token: String,
    pub session: RefreshSession,
    pub access_token: String,
}

/// Access and refresh token issued together at login.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub session: RefreshSession,
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshSessionError {
    /// No session holds this token: never issued, already rotated, or not
    /// owned by the caller.
    #[error("invalid refresh token")]
    InvalidRefreshToken,
    /// The session exists but has expired or been revoked
    #[error("refresh token expired or revoked")]
    ExpiredRefreshToken,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct RefreshSessionService {
    db: Database,
    jwt: Arc<JwtService>,
    clock: Arc<dyn Clock>,
    settings: RefreshSessionSettings,
}

impl RefreshSessionService {
    pub fn new(
        db: Database,
        jwt: Arc<JwtService>,
        clock: Arc<dyn Clock>,
        settings: RefreshSessionSettings,
    ) -> Self {
        Self {
            db,
            jwt,
            clock,
            settings,
        }
    }

    /// Start a new session for a user. The returned token is the only copy of
    /// the secret.
    pub async fn create_refresh_session(
        &self,
        user_id: i64,
        context: &RequestContext,
    ) -> Result<(String, RefreshSession), RefreshSessionError> {
        let refresh_token = generate_refresh_token(self.settings.refresh_token_nbytes);
        let token_hash = hash_refresh_token(&refresh_token);
        let now = self.clock.now();

        let mut conn = self.db.pool().acquire().await?;
        let session = self
            .db
            .refresh_sessions()
            .create(
                &mut conn,
                &NewRefreshSession {
                    user_id,
                    refresh_token_hash: &token_hash,
                    user_agent: context.user_agent.as_deref(),
                    ip_address: context.ip_address.as_deref(),
                    created_at: now,
                    expires_at: now + self.settings.refresh_token_ttl,
                },
            )
            .await?;

        info!(session_id = %session.id, user_id, "Refresh session created");
        Ok((refresh_token, session))
    }

    /// Exchange a refresh token for a new refresh token and access token.
    ///
    /// The swap is a compare-and-swap on the stored hash. When two callers
    /// race with the same token, the second one blocks on the write lock and
    /// then finds the hash gone.
    pub async fn rotate_refresh_token(
        &self,
        old_token: &str,
    ) -> Result<RotatedTokens, RefreshSessionError> {
        let old_hash = hash_refresh_token(old_token);
        let refresh_token = generate_refresh_token(self.settings.refresh_token_nbytes);
        let new_hash = hash_refresh_token(&refresh_token);
        let now = self.clock.now();
        let store = self.db.refresh_sessions();

        let mut tx = self.db.begin().await?;

        let Some(session) = store
            .update_after_rotation(&mut tx, &old_hash, &new_hash, now)
            .await?
        else {
            let existing = store.find_by_hash(&mut tx, &old_hash).await?;
            tx.rollback().await?;

            return Err(match existing {
                None => {
                    warn!("Rotation rejected: unknown refresh token");
                    RefreshSessionError::InvalidRefreshToken
                }
                Some(session) => {
                    warn!(session_id = %session.id, "Rotation rejected: session inactive");
                    RefreshSessionError::ExpiredRefreshToken
                }
            });
        };

        let access_token = self.jwt.issue_access_token(session.user_id)?;
        tx.commit().await?;

        info!(
            session_id = %session.id,
            user_id = session.user_id,
            rotation_counter = session.rotation_counter,
            "Refresh token rotated"
        );

        Ok(RotatedTokens {
            refresh_token,
            session,
            access_token,
        })
    }

    /// Revoke the session holding `token`. Only its owner may do so.
    pub async fn revoke_refresh_token(
        &self,
        token: &str,
        caller_user_id: i64,
    ) -> Result<RefreshSession, RefreshSessionError> {
        let token_hash = hash_refresh_token(token);
        let now = self.clock.now();
        let store = self.db.refresh_sessions();

        let mut tx = self.db.begin().await?;

        let Some(session) = store
            .revoke(&mut tx, &token_hash, caller_user_id, now)
            .await?
        else {
            let existing = store.find_by_hash(&mut tx, &token_hash).await?;
            tx.rollback().await?;

            return Err(match existing {
                None => RefreshSessionError::InvalidRefreshToken,
                Some(session) if !session.is_active(now) => {
                    RefreshSessionError::ExpiredRefreshToken
                }
                Some(session) => {
                    warn!(
                        session_id = %session.id,
                        owner_id = session.user_id,
                        caller_id = caller_user_id,
                        "Revocation rejected: session owned by another user"
                    );
                    RefreshSessionError::InvalidRefreshToken
                }
            });
        };

        tx.commit().await?;

        info!(session_id = %session.id, user_id = caller_user_id, "Refresh session revoked");
        Ok(session)
    }

    /// Issue a fresh access token and a new session for a user who has just
    /// proven their credentials.
    pub async fn issue_token_pair(
        &self,
        user_id: i64,
        context: &RequestContext,
    ) -> Result<TokenPair, RefreshSessionError> {
        let access_token = self.jwt.issue_access_token(user_id)?;
        let (refresh_token, session) = self.create_refresh_session(user_id, context).await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            session,
        })
    }

    /// Active sessions of a user, newest first.
    pub async fn list_sessions(
        &self,
        user_id: i64,
    ) -> Result<Vec<RefreshSession>, RefreshSessionError> {
        let sessions = self
            .db
            .refresh_sessions()
            .list_active_by_user(user_id, self.clock.now())
            .await?;
        Ok(sessions)
    }

    /// Revoke every active session of a user. Returns how many were revoked.
    pub async fn revoke_all_sessions(&self, user_id: i64) -> Result<u64, RefreshSessionError> {
        let count = self
            .db
            .refresh_sessions()
            .revoke_all_for_user(user_id, self.clock.now())
            .await?;

        info!(user_id, count, "Revoked all refresh sessions");
        Ok(count)
    }
}

/// Random URL-safe token from `nbytes` bytes of the thread-local CSPRNG.
fn generate_refresh_token(nbytes: usize) -> String {
    let mut bytes = vec![0u8; nbytes];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex-encoded SHA-256 of a refresh token, as stored in the database.
pub fn hash_refresh_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}
