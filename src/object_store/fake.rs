//! In-memory `ObjectStore` double. Production wires `S3ObjectStore`
//! against a real S3-compatible endpoint; tests substitute this instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::{ByteRange, CompletedPart, ObjectMeta, ObjectStore, ObjectStoreFactory};

struct MultipartState {
    key: String,
    parts: HashMap<i32, Bytes>,
}

#[derive(Default)]
pub struct FakeObjectStore {
    objects: Mutex<HashMap<String, Bytes>>,
    multipart: Mutex<HashMap<String, MultipartState>>,
    next_upload_id: AtomicU64,
    base_url: String,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            multipart: Mutex::new(HashMap::new()),
            next_upload_id: AtomicU64::new(1),
            base_url: "https://fake-s3.test/bucket".to_owned(),
        }
    }

    /// Test helper: directly seed an object, as if a client had already
    /// PUT it via a presigned URL.
    pub fn seed(&self, key: &str, data: impl Into<Bytes>) {
        self.objects.lock().unwrap().insert(key.to_owned(), data.into());
    }

    /// Test helper: seed the bytes uploaded for a given part of an
    /// in-flight multipart upload, as if a client had PUT it.
    pub fn seed_part(&self, upload_id: &str, part_number: i32, data: impl Into<Bytes>) {
        let mut guard = self.multipart.lock().unwrap();
        let state = guard.get_mut(upload_id).expect("unknown upload id");
        state.parts.insert(part_number, data.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn head(&self, key: &str) -> anyhow::Result<Option<ObjectMeta>> {
        Ok(self.objects.lock().unwrap().get(key).map(|b| ObjectMeta { size: b.len() as u64 }))
    }

    async fn get(&self, key: &str) -> anyhow::Result<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such key: {key}"))
    }

    async fn get_range(&self, key: &str, range: ByteRange) -> anyhow::Result<Bytes> {
        let obj = self.get(key).await?;
        let start = range.start as usize;
        let end = (range.end as usize + 1).min(obj.len());
        anyhow::ensure!(start <= end, "invalid range {range:?} for object of length {}", obj.len());
        Ok(obj.slice(start..end))
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn create_multipart_upload(&self, key: &str) -> anyhow::Result<String> {
        let id = self.next_upload_id.fetch_add(1, Ordering::SeqCst);
        let upload_id = format!("fake-upload-{id}");
        self.multipart.lock().unwrap().insert(
            upload_id.clone(),
            MultipartState {
                key: key.to_owned(),
                parts: HashMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn complete_multipart_upload(&self, key: &str, upload_id: &str, parts: Vec<CompletedPart>) -> anyhow::Result<()> {
        let state = self
            .multipart
            .lock()
            .unwrap()
            .remove(upload_id)
            .ok_or_else(|| anyhow::anyhow!("unknown upload id: {upload_id}"))?;
        anyhow::ensure!(state.key == key, "upload id {upload_id} belongs to a different key");
        let mut assembled = Vec::new();
        for part in parts {
            let bytes = state
                .parts
                .get(&part.part_number)
                .ok_or_else(|| anyhow::anyhow!("part {} was never uploaded", part.part_number))?;
            assembled.extend_from_slice(bytes);
        }
        self.objects.lock().unwrap().insert(key.to_owned(), Bytes::from(assembled));
        Ok(())
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> anyhow::Result<()> {
        self.multipart.lock().unwrap().remove(upload_id);
        Ok(())
    }

    async fn presign_get(&self, key: &str, range: Option<ByteRange>, _ttl: Duration) -> anyhow::Result<String> {
        match range {
            Some(r) => Ok(format!("{}/{key}?range={}-{}", self.base_url, r.start, r.end)),
            None => Ok(format!("{}/{key}", self.base_url)),
        }
    }

    async fn presign_put(&self, key: &str, _ttl: Duration) -> anyhow::Result<String> {
        Ok(format!("{}/{key}?op=put", self.base_url))
    }

    async fn presign_delete(&self, key: &str, _ttl: Duration) -> anyhow::Result<String> {
        Ok(format!("{}/{key}?op=delete", self.base_url))
    }

    async fn presign_upload_part(&self, key: &str, upload_id: &str, part_number: i32, _ttl: Duration) -> anyhow::Result<String> {
        Ok(format!("{}/{key}?uploadId={upload_id}&partNumber={part_number}", self.base_url))
    }
}

/// Hands out the same in-memory store regardless of which catalog
/// `Bucket` row is requested -- adequate for the single-bucket scenarios
/// the coordinator test suites exercise.
#[derive(Clone)]
pub struct FakeObjectStoreFactory(pub Arc<FakeObjectStore>);

impl FakeObjectStoreFactory {
    pub fn new() -> Self {
        Self(Arc::new(FakeObjectStore::new()))
    }
}

impl Default for FakeObjectStoreFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStoreFactory for FakeObjectStoreFactory {
    async fn for_bucket(&self, _bucket: &crate::db::models::Bucket, _cipher_key: &[u8; 32]) -> anyhow::Result<Arc<dyn ObjectStore>> {
        Ok(self.0.clone() as Arc<dyn ObjectStore>)
    }
}
