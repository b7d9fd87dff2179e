//! Scheduled cleanup of dead refresh sessions.

use chrono::Utc;
use std::time::Duration;
use tracing::{error, info};

use crate::db::Database;

/// Revoked sessions are kept this long for auditing before deletion.
const REVOKED_SESSION_RETENTION_DAYS: i64 = 7;

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database) {
    let now = Utc::now();
    let revoked_before = now - chrono::Duration::days(REVOKED_SESSION_RETENTION_DAYS);

    match db
        .refresh_sessions()
        .delete_inactive(now, revoked_before)
        .await
    {
        Ok(count) if count > 0 => info!("Cleaned up {} inactive refresh sessions", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up refresh sessions: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        // The first tick completes immediately and startup already ran once
        interval.tick().await;

        loop {
            interval.tick().await;
            run_cleanup(&db).await;
        }
    })
}
