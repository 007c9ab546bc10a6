use sqlx::PgExecutor;

use super::models::Bucket;

pub async fn insert<'c>(
    exec: impl PgExecutor<'c>,
    name: &str,
    endpoint: &str,
    bucket: &str,
    access_key_ct: &[u8],
    secret_key_ct: &[u8],
    use_tls: bool,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO buckets (name, endpoint, bucket, access_key_ct, secret_key_ct, use_tls) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(name)
    .bind(endpoint)
    .bind(bucket)
    .bind(access_key_ct)
    .bind(secret_key_ct)
    .bind(use_tls)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn get<'c>(exec: impl PgExecutor<'c>, name: &str) -> sqlx::Result<Option<Bucket>> {
    sqlx::query_as::<_, Bucket>(
        "SELECT name, endpoint, bucket, access_key_ct, secret_key_ct, use_tls FROM buckets WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(exec)
    .await
}

pub async fn list<'c>(exec: impl PgExecutor<'c>) -> sqlx::Result<Vec<Bucket>> {
    sqlx::query_as::<_, Bucket>("SELECT name, endpoint, bucket, access_key_ct, secret_key_ct, use_tls FROM buckets ORDER BY name")
        .fetch_all(exec)
        .await
}
