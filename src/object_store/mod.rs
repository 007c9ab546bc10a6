//! The object-store adapter: wraps an S3-compatible endpoint behind a
//! trait so production code talks to `aws-sdk-s3` (see `s3.rs`) while
//! tests substitute an in-memory double (see `fake.rs`).

pub mod fake;
pub mod s3;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

pub use s3::S3ObjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    /// Inclusive.
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// The `Range: bytes=A-B` header value.
    pub fn to_header(self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ObjectMeta {
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct CompletedPart {
    pub part_number: i32,
    pub e_tag: String,
}

/// TTL used for every presigned URL this crate mints.
pub const PRESIGN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// `None` if the object does not exist.
    async fn head(&self, key: &str) -> anyhow::Result<Option<ObjectMeta>>;

    /// Full-object GET.
    async fn get(&self, key: &str) -> anyhow::Result<Bytes>;

    /// Ranged GET.
    async fn get_range(&self, key: &str, range: ByteRange) -> anyhow::Result<Bytes>;

    /// Deletes an object. Idempotent: a missing object is not an error.
    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Lists every key under `prefix`, draining pagination internally.
    async fn list(&self, prefix: &str) -> anyhow::Result<Vec<String>>;

    async fn create_multipart_upload(&self, key: &str) -> anyhow::Result<String>;
    async fn complete_multipart_upload(&self, key: &str, upload_id: &str, parts: Vec<CompletedPart>) -> anyhow::Result<()>;
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> anyhow::Result<()>;

    async fn presign_get(&self, key: &str, range: Option<ByteRange>, ttl: Duration) -> anyhow::Result<String>;
    async fn presign_put(&self, key: &str, ttl: Duration) -> anyhow::Result<String>;
    async fn presign_delete(&self, key: &str, ttl: Duration) -> anyhow::Result<String>;
    async fn presign_upload_part(&self, key: &str, upload_id: &str, part_number: i32, ttl: Duration) -> anyhow::Result<String>;
}

/// Part-size selection: 5 MiB, doubled until `data_size/part_size ≤
/// 10000` or it reaches 100 MiB.
pub fn choose_part_size(data_size: u64) -> u64 {
    const MIN_PART: u64 = 5 * 1024 * 1024;
    const MAX_PART: u64 = 100 * 1024 * 1024;
    let mut part_size = MIN_PART;
    while data_size / part_size.max(1) > 10_000 && part_size < MAX_PART {
        part_size *= 2;
    }
    part_size.min(MAX_PART)
}

/// Number of parts for a multipart upload of `data_size` bytes at
/// `part_size`.
pub fn part_count(data_size: u64, part_size: u64) -> u64 {
    data_size.div_ceil(part_size).max(1)
}

/// Direct-PUT vs multipart threshold: direct-PUT when `data_size < 5 MiB`.
pub const DIRECT_PUT_THRESHOLD: u64 = 5 * 1024 * 1024;

pub fn is_direct_put(data_size: u64) -> bool {
    data_size < DIRECT_PUT_THRESHOLD
}

/// Builds a per-bucket object store, materializing credentials only for
/// the duration of the call. Production wires `S3ObjectStoreFactory`;
/// tests wire `fake::FakeObjectStoreFactory`.
#[async_trait]
pub trait ObjectStoreFactory: Send + Sync + 'static {
    async fn for_bucket(&self, bucket: &crate::db::models::Bucket, cipher_key: &[u8; 32]) -> anyhow::Result<std::sync::Arc<dyn ObjectStore>>;
}

pub struct S3ObjectStoreFactory;

#[async_trait]
impl ObjectStoreFactory for S3ObjectStoreFactory {
    async fn for_bucket(&self, bucket: &crate::db::models::Bucket, cipher_key: &[u8; 32]) -> anyhow::Result<std::sync::Arc<dyn ObjectStore>> {
        let store = S3ObjectStore::for_bucket(
            &bucket.endpoint,
            &bucket.bucket,
            &bucket.access_key_ct,
            &bucket.secret_key_ct,
            bucket.use_tls,
            cipher_key,
        )?;
        Ok(std::sync::Arc::new(store))
    }
}
