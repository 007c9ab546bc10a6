//! Shared scaffolding for the coordinator integration tests: a
//! `FakeObjectStore`-backed `AppContext` wired to a real (ephemeral,
//! `#[sqlx::test]`-provisioned) Postgres catalog, plus a helper to build
//! a TAR + index byte pair that `validate_uploaded_archive` accepts.

use std::sync::Arc;

use bytes::Bytes;
use sqlx::PgPool;

use datas3t::config::Settings;
use datas3t::context::AppContext;
use datas3t::db::models::Datas3t;
use datas3t::db::Catalog;
use datas3t::object_store::fake::FakeObjectStoreFactory;
use datas3t::tar_index::{IndexEntry, TarIndex};

/// Base64 of 32 arbitrary bytes; only used to satisfy `Settings`'s
/// length check, never a real credential key.
const TEST_CIPHER_KEY: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";

pub fn test_settings() -> Settings {
    Settings {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: String::new(),
        credential_cipher_key: TEST_CIPHER_KEY.to_owned(),
        cache_dir: std::env::temp_dir(),
        cache_budget_bytes: 1024 * 1024 * 1024,
        log_level: "error".to_owned(),
        deletion_worker_interval_secs: 30,
        s3_client_parallelism: 4,
        import_parallelism: 4,
    }
}

pub struct TestEnv {
    pub ctx: AppContext,
    pub store_factory: FakeObjectStoreFactory,
}

pub fn build_env(pool: PgPool) -> TestEnv {
    let catalog = Catalog::from_pool(pool);
    let store_factory = FakeObjectStoreFactory::new();
    let ctx = AppContext::new(catalog, Arc::new(store_factory.clone()), test_settings()).expect("test settings are valid");
    TestEnv { ctx, store_factory }
}

pub async fn create_bucket(ctx: &AppContext, name: &str) {
    let access_ct = datas3t::crypto::seal(&ctx.cipher_key, "AKIAFAKEACCESSKEY");
    let secret_ct = datas3t::crypto::seal(&ctx.cipher_key, "fakesecretkey");
    datas3t::db::buckets::insert(ctx.catalog.pool(), name, "fake-endpoint.test:9000", "fake-bucket", &access_ct, &secret_ct, false)
        .await
        .expect("insert bucket");
}

pub async fn create_datas3t(ctx: &AppContext, name: &str, bucket_name: &str) -> Datas3t {
    datas3t::db::datas3ts::insert(ctx.catalog.pool(), name, bucket_name).await.expect("insert datas3t")
}

/// Directly inserts a committed `Datarange` row, bypassing the upload
/// coordinator entirely -- useful for aggregate/delete/download tests
/// that only need pre-existing coverage, not a fresh upload flow.
pub async fn insert_committed(ctx: &AppContext, datas3t_id: i64, min_key: i64, max_key: i64) -> datas3t::db::models::Datarange {
    let keys = datas3t::keys::build("fixture", min_key, max_key, min_key.max(0) as u64);
    datas3t::db::dataranges::insert(ctx.catalog.pool(), datas3t_id, &keys.data, &keys.index, min_key, max_key, (max_key - min_key + 1) * 100)
        .await
        .expect("insert committed datarange")
}

pub struct BuiltArchive {
    pub data: Bytes,
    pub index: Bytes,
    pub data_size: i64,
}

/// Builds a byte-exact TAR archive (§4.1) and its matching index (§4.2)
/// for `sizes.len()` datapoints starting at `first_idx`, one entry per
/// size in `sizes`.
pub fn build_archive(first_idx: i64, sizes: &[usize]) -> BuiltArchive {
    let mut data = Vec::new();
    let mut entries = Vec::with_capacity(sizes.len());

    for (i, &size) in sizes.iter().enumerate() {
        let key = first_idx + i as i64;
        let start_offset = data.len() as u64;

        let mut header = tar::Header::new_gnu();
        header.set_path(format!("{key:020}.bin")).expect("path fits in a gnu header");
        header.set_size(size as u64);
        header.set_mode(0o644);
        header.set_cksum();
        data.extend_from_slice(header.as_bytes());

        data.extend(std::iter::repeat(0xABu8).take(size));
        let padded = datas3t::tar_header::padded_size(size as u64);
        data.extend(std::iter::repeat(0u8).take((padded - size as u64) as usize));

        entries.push(IndexEntry {
            start_offset,
            size: size as u64,
        });
    }

    data.extend_from_slice(&[0u8; 1024]); // two zero trailer blocks

    let index = TarIndex::new(entries);
    BuiltArchive {
        data_size: data.len() as i64,
        data: Bytes::from(data),
        index: Bytes::from(index.to_bytes()),
    }
}
