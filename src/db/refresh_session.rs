//! Refresh session storage.
//!
//! Rows are looked up only by token hash or id. The writes used by rotation and
//! revocation are conditional updates that take a connection, so the caller
//! runs them inside its own transaction. A write that finds no matching row
//! leaves the table untouched and returns `None`.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqlitePool};

use super::from_unix;

/// A persisted refresh session.
#[derive(Debug, Clone)]
pub struct RefreshSession {
    pub id: String,
    pub refresh_token_hash: String,
    pub user_id: i64,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub rotation_counter: i64,
}

impl RefreshSession {
    /// A session is usable until it is revoked or reaches `expires_at`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Values for a new session row.
#[derive(Debug, Clone)]
pub struct NewRefreshSession<'a> {
    pub user_id: i64,
    pub refresh_token_hash: &'a str,
    pub user_agent: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RefreshSessionRow {
    id: String,
    refresh_token_hash: String,
    user_id: i64,
    user_agent: Option<String>,
    ip_address: Option<String>,
    created_at: i64,
    last_used_at: Option<i64>,
    expires_at: i64,
    revoked_at: Option<i64>,
    rotation_counter: i64,
}

impl From<RefreshSessionRow> for RefreshSession {
    fn from(row: RefreshSessionRow) -> Self {
        Self {
            id: row.id,
            refresh_token_hash: row.refresh_token_hash,
            user_id: row.user_id,
            user_agent: row.user_agent,
            ip_address: row.ip_address,
            created_at: from_unix(row.created_at),
            last_used_at: row.last_used_at.map(from_unix),
            expires_at: from_unix(row.expires_at),
            revoked_at: row.revoked_at.map(from_unix),
            rotation_counter: row.rotation_counter,
        }
    }
}

const SESSION_COLUMNS: &str = "id, refresh_token_hash, user_id, user_agent, ip_address, created_at, last_used_at, expires_at, revoked_at, rotation_counter";

/// Store for refresh session rows.
#[derive(Clone)]
pub struct RefreshSessionStore {
    pool: SqlitePool,
}

impl RefreshSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new session. A hash collision surfaces as a unique constraint error.
    pub async fn create(
        &self,
        conn: &mut SqliteConnection,
        session: &NewRefreshSession<'_>,
    ) -> Result<RefreshSession, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();

        let row: RefreshSessionRow = sqlx::query_as(&format!(
            "INSERT INTO refresh_sessions (id, refresh_token_hash, user_id, user_agent, ip_address, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(&id)
        .bind(session.refresh_token_hash)
        .bind(session.user_id)
        .bind(session.user_agent)
        .bind(session.ip_address)
        .bind(session.created_at.timestamp())
        .bind(session.expires_at.timestamp())
        .fetch_one(conn)
        .await?;

        Ok(row.into())
    }

    /// Find a session by the hash of its current refresh token.
    pub async fn find_by_hash(
        &self,
        conn: &mut SqliteConnection,
        token_hash: &str,
    ) -> Result<Option<RefreshSession>, sqlx::Error> {
        let row: Option<RefreshSessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM refresh_sessions WHERE refresh_token_hash = ?",
            SESSION_COLUMNS
        ))
        .bind(token_hash)
        .fetch_optional(conn)
        .await?;
        Ok(row.map(RefreshSession::from))
    }

    /// Replace the token hash of an active session still holding `old_hash`,
    /// bump its rotation counter and stamp `last_used_at`.
    pub async fn update_after_rotation(
        &self,
        conn: &mut SqliteConnection,
        old_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, sqlx::Error> {
        let row: Option<RefreshSessionRow> = sqlx::query_as(&format!(
            "UPDATE refresh_sessions
             SET refresh_token_hash = ?, rotation_counter = rotation_counter + 1, last_used_at = ?
             WHERE refresh_token_hash = ? AND revoked_at IS NULL AND expires_at > ?
             RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(new_hash)
        .bind(now.timestamp())
        .bind(old_hash)
        .bind(now.timestamp())
        .fetch_optional(conn)
        .await?;
        Ok(row.map(RefreshSession::from))
    }

    /// Mark an active session owned by `user_id` as revoked.
    pub async fn revoke(
        &self,
        conn: &mut SqliteConnection,
        token_hash: &str,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, sqlx::Error> {
        let row: Option<RefreshSessionRow> = sqlx::query_as(&format!(
            "UPDATE refresh_sessions
             SET revoked_at = ?
             WHERE refresh_token_hash = ? AND user_id = ? AND revoked_at IS NULL AND expires_at > ?
             RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(now.timestamp())
        .bind(token_hash)
        .bind(user_id)
        .bind(now.timestamp())
        .fetch_optional(conn)
        .await?;
        Ok(row.map(RefreshSession::from))
    }

    /// Get a session by hash outside of any transaction.
    pub async fn get_by_hash(&self, token_hash: &str) -> Result<Option<RefreshSession>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        self.find_by_hash(&mut conn, token_hash).await
    }

    /// Get a session by its id.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<RefreshSession>, sqlx::Error> {
        let row: Option<RefreshSessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM refresh_sessions WHERE id = ?",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RefreshSession::from))
    }

    /// List a user's active sessions, newest first.
    pub async fn list_active_by_user(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshSession>, sqlx::Error> {
        let rows: Vec<RefreshSessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM refresh_sessions
             WHERE user_id = ? AND revoked_at IS NULL AND expires_at > ?
             ORDER BY created_at DESC, id",
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .bind(now.timestamp())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RefreshSession::from).collect())
    }

    /// Revoke every active session of a user (logout everywhere).
    pub async fn revoke_all_for_user(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE refresh_sessions SET revoked_at = ?
             WHERE user_id = ? AND revoked_at IS NULL AND expires_at > ?",
        )
        .bind(now.timestamp())
        .bind(user_id)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete sessions that expired before `now` or were revoked before
    /// `revoked_before`.
    pub async fn delete_inactive(
        &self,
        now: DateTime<Utc>,
        revoked_before: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM refresh_sessions WHERE expires_at <= ? OR revoked_at < ?",
        )
        .bind(now.timestamp())
        .bind(revoked_before.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
