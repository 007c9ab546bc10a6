use sqlx::PgExecutor;
use uuid::Uuid;

use super::models::DatarangeUpload;

#[allow(clippy::too_many_arguments)]
pub async fn insert<'c>(
    exec: impl PgExecutor<'c>,
    datas3t_id: i64,
    upload_id: &str,
    data_object_key: &str,
    index_object_key: &str,
    first_idx: i64,
    num_points: i64,
    data_size: i64,
) -> sqlx::Result<DatarangeUpload> {
    sqlx::query_as::<_, DatarangeUpload>(
        "INSERT INTO datarange_uploads \
            (datas3t_id, upload_id, data_object_key, index_object_key, first_idx, num_points, data_size) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING id, datas3t_id, upload_id, data_object_key, index_object_key, first_idx, num_points, data_size, created_at",
    )
    .bind(datas3t_id)
    .bind(upload_id)
    .bind(data_object_key)
    .bind(index_object_key)
    .bind(first_idx)
    .bind(num_points)
    .bind(data_size)
    .fetch_one(exec)
    .await
}

pub async fn get<'c>(exec: impl PgExecutor<'c>, id: Uuid) -> sqlx::Result<Option<DatarangeUpload>> {
    sqlx::query_as::<_, DatarangeUpload>(
        "SELECT id, datas3t_id, upload_id, data_object_key, index_object_key, first_idx, num_points, data_size, created_at \
         FROM datarange_uploads WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(exec)
    .await
}

pub async fn delete<'c>(exec: impl PgExecutor<'c>, id: Uuid) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM datarange_uploads WHERE id = $1").bind(id).execute(exec).await?;
    Ok(result.rows_affected())
}

pub async fn count_for_datas3t<'c>(exec: impl PgExecutor<'c>, datas3t_id: i64) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM datarange_uploads WHERE datas3t_id = $1")
        .bind(datas3t_id)
        .fetch_one(exec)
        .await
}
