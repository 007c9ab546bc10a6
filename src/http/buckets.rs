use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::AppResult;

#[derive(Serialize)]
pub struct BucketView {
    pub name: String,
    pub endpoint: String,
    pub bucket: String,
    pub use_tls: bool,
}

impl From<crate::db::models::Bucket> for BucketView {
    fn from(b: crate::db::models::Bucket) -> Self {
        Self {
            name: b.name,
            endpoint: b.endpoint,
            bucket: b.bucket,
            use_tls: b.use_tls,
        }
    }
}

pub async fn list(State(ctx): State<AppState>) -> AppResult<Json<Vec<BucketView>>> {
    let buckets = crate::db::buckets::list(ctx.catalog.pool()).await?;
    Ok(Json(buckets.into_iter().map(BucketView::from).collect()))
}

#[derive(Deserialize)]
pub struct CreateBucketRequest {
    pub name: String,
    pub endpoint: String,
    pub bucket: String,
    /// Plaintext at the HTTP boundary; sealed before it touches the
    /// catalog (see `crate::crypto`, explicitly out of production-grade
    /// scope).
    pub access_key: String,
    pub secret_key: String,
    pub use_tls: bool,
}

pub async fn create(State(ctx): State<AppState>, Json(req): Json<CreateBucketRequest>) -> AppResult<Json<BucketView>> {
    crate::validation::validate_name("bucket", &req.name)?;

    let access_key_ct = crate::crypto::seal(&ctx.cipher_key, &req.access_key);
    let secret_key_ct = crate::crypto::seal(&ctx.cipher_key, &req.secret_key);

    crate::db::buckets::insert(ctx.catalog.pool(), &req.name, &req.endpoint, &req.bucket, &access_key_ct, &secret_key_ct, req.use_tls).await?;

    Ok(Json(BucketView {
        name: req.name,
        endpoint: req.endpoint,
        bucket: req.bucket,
        use_tls: req.use_tls,
    }))
}
