use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use super::models::KeyToDelete;

/// Default deferred-deletion grace period: `delete_after` defaults to
/// ~1 h after enqueue to tolerate in-flight readers of presigned GETs.
pub const DEFAULT_GRACE_PERIOD: chrono::Duration = chrono::Duration::hours(1);

pub async fn enqueue<'c>(exec: impl PgExecutor<'c>, presigned_delete_url: &str, delete_after: DateTime<Utc>) -> sqlx::Result<()> {
    sqlx::query("INSERT INTO keys_to_delete (presigned_delete_url, delete_after) VALUES ($1, $2)")
        .bind(presigned_delete_url)
        .bind(delete_after)
        .execute(exec)
        .await?;
    Ok(())
}

/// Fetches up to `batch_size` due rows whose `delete_after` has elapsed.
pub async fn fetch_due<'c>(exec: impl PgExecutor<'c>, now: DateTime<Utc>, batch_size: i64) -> sqlx::Result<Vec<KeyToDelete>> {
    sqlx::query_as::<_, KeyToDelete>(
        "SELECT id, presigned_delete_url, delete_after FROM keys_to_delete WHERE delete_after <= $1 ORDER BY delete_after LIMIT $2",
    )
    .bind(now)
    .bind(batch_size)
    .fetch_all(exec)
    .await
}

pub async fn delete_row<'c>(exec: impl PgExecutor<'c>, id: i64) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM keys_to_delete WHERE id = $1").bind(id).execute(exec).await?;
    Ok(result.rows_affected())
}

pub async fn count<'c>(exec: impl PgExecutor<'c>) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM keys_to_delete").fetch_one(exec).await
}
