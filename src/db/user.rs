use sqlx::sqlite::SqlitePool;

use super::from_unix;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: chrono::DateTime<chrono::Utc>,
}

/// Fields required to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub password_hash: &'a str,
    pub is_staff: bool,
    pub is_superuser: bool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    password_hash: String,
    is_active: i32,
    is_staff: i32,
    is_superuser: i32,
    date_joined: i64,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            password_hash: row.password_hash,
            is_active: row.is_active != 0,
            is_staff: row.is_staff != 0,
            is_superuser: row.is_superuser != 0,
            date_joined: from_unix(row.date_joined),
        }
    }
}

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, password_hash, is_active, is_staff, is_superuser, date_joined";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new active user and return it.
    pub async fn create(&self, user: &NewUser<'_>) -> Result<User, sqlx::Error> {
        let row: UserRow = sqlx::query_as(&format!(
            "INSERT INTO users (username, email, first_name, last_name, password_hash, is_staff, is_superuser, date_joined)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user.username)
        .bind(user.email)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.password_hash)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .bind(chrono::Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    /// Get a user by username (case-insensitive).
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE username = ?",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by ID, whether or not the account is active.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Get an active user by ID. Deactivated accounts are treated as missing.
    pub async fn get_active_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE id = ? AND is_active = 1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 > 0)
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 > 0)
    }

    /// Activate or deactivate an account.
    pub async fn set_active(&self, id: i64, active: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set the staff and superuser flags for a user.
    pub async fn set_flags(
        &self,
        id: i64,
        is_staff: bool,
        is_superuser: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET is_staff = ?, is_superuser = ? WHERE id = ?")
            .bind(is_staff)
            .bind(is_superuser)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a user by ID. Their refresh sessions go with them.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List all users ordered by join date.
    pub async fn list(&self) -> Result<Vec<User>, sqlx::Error> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users ORDER BY date_joined, id",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{Database, NewUser};

    fn new_user<'a>(username: &'a str, email: &'a str) -> NewUser<'a> {
        NewUser {
            username,
            email,
            first_name: "",
            last_name: "",
            password_hash: "hash",
            is_staff: false,
            is_superuser: false,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open(":memory:").await.unwrap();

        let created = db
            .users()
            .create(&new_user("alice", "alice@example.com"))
            .await
            .unwrap();
        assert!(created.is_active);
        assert!(!created.is_staff);

        let user = db.users().get_by_username("alice").await.unwrap().unwrap();
        assert_eq!(user.id, created.id);
        assert_eq!(user.email, "alice@example.com");

        let user = db.users().get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(user.username, "alice");
    }

    #[tokio::test]
    async fn test_username_lookup_is_case_insensitive() {
        let db = Database::open(":memory:").await.unwrap();
        db.users()
            .create(&new_user("Alice", "alice@example.com"))
            .await
            .unwrap();

        assert!(db.users().get_by_username("alice").await.unwrap().is_some());
        assert!(db.users().username_exists("ALICE").await.unwrap());
        assert!(!db.users().username_exists("bob").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_username_fails() {
        let db = Database::open(":memory:").await.unwrap();

        db.users()
            .create(&new_user("alice", "a1@example.com"))
            .await
            .unwrap();
        let result = db.users().create(&new_user("alice", "a2@example.com")).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_email_fails() {
        let db = Database::open(":memory:").await.unwrap();

        db.users()
            .create(&new_user("alice", "same@example.com"))
            .await
            .unwrap();
        assert!(db.users().email_exists("same@example.com").await.unwrap());

        let result = db.users().create(&new_user("bob", "same@example.com")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_inactive_user_hidden_from_active_lookup() {
        let db = Database::open(":memory:").await.unwrap();
        let user = db
            .users()
            .create(&new_user("alice", "alice@example.com"))
            .await
            .unwrap();

        assert!(db.users().get_active_by_id(user.id).await.unwrap().is_some());

        db.users().set_active(user.id, false).await.unwrap();
        assert!(db.users().get_active_by_id(user.id).await.unwrap().is_none());
        assert!(db.users().get_by_id(user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_set_flags() {
        let db = Database::open(":memory:").await.unwrap();
        let user = db
            .users()
            .create(&new_user("alice", "alice@example.com"))
            .await
            .unwrap();

        db.users().set_flags(user.id, true, false).await.unwrap();
        let user = db.users().get_by_id(user.id).await.unwrap().unwrap();
        assert!(user.is_staff);
        assert!(!user.is_superuser);
    }

    #[tokio::test]
    async fn test_delete_user() {
        let db = Database::open(":memory:").await.unwrap();
        let user = db
            .users()
            .create(&new_user("alice", "alice@example.com"))
            .await
            .unwrap();

        assert!(db.users().delete(user.id).await.unwrap());
        assert!(db.users().get_by_id(user.id).await.unwrap().is_none());
        assert!(!db.users().delete(user.id).await.unwrap());
    }
}
