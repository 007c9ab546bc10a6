use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Bucket: `{name, endpoint, bucket, access_key_ct, secret_key_ct, use_tls}`.
#[derive(Debug, Clone, FromRow)]
pub struct Bucket {
    pub name: String,
    pub endpoint: String,
    pub bucket: String,
    pub access_key_ct: Vec<u8>,
    pub secret_key_ct: Vec<u8>,
    pub use_tls: bool,
}

/// Datas3t: `{id, name, bucket_name, upload_counter}`.
#[derive(Debug, Clone, FromRow)]
pub struct Datas3t {
    pub id: i64,
    pub name: String,
    pub bucket_name: String,
    pub upload_counter: i64,
}

/// Datarange: `{id, datas3t_id, data_object_key, index_object_key, min_key, max_key, size_bytes}`.
#[derive(Debug, Clone, FromRow)]
pub struct Datarange {
    pub id: i64,
    pub datas3t_id: i64,
    pub data_object_key: String,
    pub index_object_key: String,
    pub min_key: i64,
    pub max_key: i64,
    pub size_bytes: i64,
}

impl Datarange {
    pub fn num_points(&self) -> i64 {
        self.max_key - self.min_key + 1
    }
}

/// An in-flight, not-yet-committed datarange upload.
#[derive(Debug, Clone, FromRow)]
pub struct DatarangeUpload {
    pub id: uuid::Uuid,
    pub datas3t_id: i64,
    pub upload_id: String,
    pub data_object_key: String,
    pub index_object_key: String,
    pub first_idx: i64,
    pub num_points: i64,
    pub data_size: i64,
    pub created_at: DateTime<Utc>,
}

impl DatarangeUpload {
    pub const DIRECT_PUT: &'static str = "DIRECT_PUT";

    pub fn is_direct_put(&self) -> bool {
        self.upload_id == Self::DIRECT_PUT
    }

    pub fn last_idx(&self) -> i64 {
        self.first_idx + self.num_points - 1
    }
}

/// An in-flight, not-yet-committed aggregate upload.
#[derive(Debug, Clone, FromRow)]
pub struct AggregateUpload {
    pub id: uuid::Uuid,
    pub datas3t_id: i64,
    pub upload_id: String,
    pub data_object_key: String,
    pub index_object_key: String,
    pub first_idx: i64,
    pub last_idx: i64,
    pub total_data_size: i64,
    pub source_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

impl AggregateUpload {
    pub const DIRECT_PUT: &'static str = "DIRECT_PUT";

    pub fn is_direct_put(&self) -> bool {
        self.upload_id == Self::DIRECT_PUT
    }
}

/// The deferred-deletion queue row.
#[derive(Debug, Clone, FromRow)]
pub struct KeyToDelete {
    pub id: i64,
    pub presigned_delete_url: String,
    pub delete_after: DateTime<Utc>,
}
