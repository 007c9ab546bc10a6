use std::sync::Arc;

use crate::config::Settings;
use crate::db::Catalog;
use crate::index_cache::IndexCache;
use crate::object_store::ObjectStoreFactory;

/// Everything a coordinator or HTTP handler needs: the catalog pool, the
/// object-store factory (real S3 in production, in-memory in tests), and
/// resolved settings. Constructor-injected -- there is no process-wide mutable state
/// beyond the database pool, the download planner's index cache, and the
/// deletion worker's ticker.
#[derive(Clone)]
pub struct AppContext {
    pub catalog: Catalog,
    pub object_stores: Arc<dyn ObjectStoreFactory>,
    pub settings: Settings,
    pub cipher_key: [u8; 32],
    pub index_cache: IndexCache,
}

impl AppContext {
    pub fn new(catalog: Catalog, object_stores: Arc<dyn ObjectStoreFactory>, settings: Settings) -> anyhow::Result<Self> {
        let cipher_key = crate::crypto::decode_key(&settings.credential_cipher_key)?;
        let index_cache = IndexCache::new(settings.cache_budget_bytes);
        Ok(Self {
            catalog,
            object_stores,
            settings,
            cipher_key,
            index_cache,
        })
    }

    /// Resolves a datas3t's bucket row and builds an object store for it.
    pub async fn store_for_datas3t(&self, bucket_name: &str) -> anyhow::Result<Arc<dyn crate::object_store::ObjectStore>> {
        let bucket = crate::db::buckets::get(self.catalog.pool(), bucket_name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("bucket {bucket_name} not found"))?;
        self.object_stores.for_bucket(&bucket, &self.cipher_key).await
    }
}
