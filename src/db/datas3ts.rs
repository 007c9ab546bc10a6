use sqlx::PgExecutor;

use super::models::Datas3t;

pub async fn insert<'c>(exec: impl PgExecutor<'c>, name: &str, bucket_name: &str) -> sqlx::Result<Datas3t> {
    sqlx::query_as::<_, Datas3t>(
        "INSERT INTO datas3ts (name, bucket_name, upload_counter) VALUES ($1, $2, 0) \
         RETURNING id, name, bucket_name, upload_counter",
    )
    .bind(name)
    .bind(bucket_name)
    .fetch_one(exec)
    .await
}

pub async fn get_by_name<'c>(exec: impl PgExecutor<'c>, name: &str) -> sqlx::Result<Option<Datas3t>> {
    sqlx::query_as::<_, Datas3t>("SELECT id, name, bucket_name, upload_counter FROM datas3ts WHERE name = $1")
        .bind(name)
        .fetch_optional(exec)
        .await
}

pub async fn get_by_id<'c>(exec: impl PgExecutor<'c>, id: i64) -> sqlx::Result<Option<Datas3t>> {
    sqlx::query_as::<_, Datas3t>("SELECT id, name, bucket_name, upload_counter FROM datas3ts WHERE id = $1")
        .bind(id)
        .fetch_optional(exec)
        .await
}

pub async fn list<'c>(exec: impl PgExecutor<'c>) -> sqlx::Result<Vec<Datas3t>> {
    sqlx::query_as::<_, Datas3t>("SELECT id, name, bucket_name, upload_counter FROM datas3ts ORDER BY name")
        .fetch_all(exec)
        .await
}

/// Increments `upload_counter` and returns the new value. Must run inside
/// the caller's transaction so the mint of a new object key and the
/// creation of the in-flight upload row are atomic.
pub async fn increment_upload_counter<'c>(exec: impl PgExecutor<'c>, datas3t_id: i64) -> sqlx::Result<i64> {
    sqlx::query_scalar("UPDATE datas3ts SET upload_counter = upload_counter + 1 WHERE id = $1 RETURNING upload_counter")
        .bind(datas3t_id)
        .fetch_one(exec)
        .await
}

/// Raises `upload_counter` to `max(current, at_least)`, used by the import
/// scanner so future uploads cannot collide with imported object keys.
pub async fn raise_upload_counter_to_at_least<'c>(exec: impl PgExecutor<'c>, datas3t_id: i64, at_least: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE datas3ts SET upload_counter = GREATEST(upload_counter, $2) WHERE id = $1")
        .bind(datas3t_id)
        .bind(at_least)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn delete_by_name<'c>(exec: impl PgExecutor<'c>, name: &str) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM datas3ts WHERE name = $1").bind(name).execute(exec).await?;
    Ok(result.rows_affected())
}
