use sqlx::PgExecutor;
use uuid::Uuid;

use super::models::AggregateUpload;

#[allow(clippy::too_many_arguments)]
pub async fn insert<'c>(
    exec: impl PgExecutor<'c>,
    datas3t_id: i64,
    upload_id: &str,
    data_object_key: &str,
    index_object_key: &str,
    first_idx: i64,
    last_idx: i64,
    total_data_size: i64,
    source_ids: &[i64],
) -> sqlx::Result<AggregateUpload> {
    sqlx::query_as::<_, AggregateUpload>(
        "INSERT INTO aggregate_uploads \
            (datas3t_id, upload_id, data_object_key, index_object_key, first_idx, last_idx, total_data_size, source_ids) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING id, datas3t_id, upload_id, data_object_key, index_object_key, first_idx, last_idx, total_data_size, source_ids, created_at",
    )
    .bind(datas3t_id)
    .bind(upload_id)
    .bind(data_object_key)
    .bind(index_object_key)
    .bind(first_idx)
    .bind(last_idx)
    .bind(total_data_size)
    .bind(source_ids)
    .fetch_one(exec)
    .await
}

pub async fn get<'c>(exec: impl PgExecutor<'c>, id: Uuid) -> sqlx::Result<Option<AggregateUpload>> {
    sqlx::query_as::<_, AggregateUpload>(
        "SELECT id, datas3t_id, upload_id, data_object_key, index_object_key, first_idx, last_idx, total_data_size, source_ids, created_at \
         FROM aggregate_uploads WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(exec)
    .await
}

pub async fn set_total_data_size<'c>(exec: impl PgExecutor<'c>, id: Uuid, total_data_size: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE aggregate_uploads SET total_data_size = $2 WHERE id = $1")
        .bind(id)
        .bind(total_data_size)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn delete<'c>(exec: impl PgExecutor<'c>, id: Uuid) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM aggregate_uploads WHERE id = $1").bind(id).execute(exec).await?;
    Ok(result.rows_affected())
}
