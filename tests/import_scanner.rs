//! Import-scanner scenarios: reconciling the catalog with a bucket's
//! actual contents.

mod common;

use sqlx::PgPool;

use common::{build_archive, build_env, create_bucket};

#[sqlx::test]
async fn import_discovers_objects_and_raises_the_upload_counter(pool: PgPool) {
    let env = build_env(pool);
    create_bucket(&env.ctx, "b1").await;

    // No `imported` datas3t exists in the catalog yet; two dataranges
    // already sit in the bucket under upload counters 3 and 7.
    let archive_a = build_archive(0, &[18; 10]);
    let keys_a = datas3t::keys::build("imported", 0, 9, 3);
    env.store_factory.0.seed(&keys_a.data, archive_a.data.clone());
    env.store_factory.0.seed(&keys_a.index, archive_a.index.clone());

    let archive_b = build_archive(10, &[18; 10]);
    let keys_b = datas3t::keys::build("imported", 10, 19, 7);
    env.store_factory.0.seed(&keys_b.data, archive_b.data.clone());
    env.store_factory.0.seed(&keys_b.index, archive_b.index.clone());

    let imported = datas3t::import::import(&env.ctx, "b1").await.unwrap();
    assert_eq!(imported, vec!["imported".to_owned()]);

    let ds = datas3t::db::datas3ts::get_by_name(env.ctx.catalog.pool(), "imported").await.unwrap().unwrap();
    assert_eq!(ds.bucket_name, "b1");
    assert_eq!(ds.upload_counter, 7);

    let mut bounds: Vec<(i64, i64)> = datas3t::db::dataranges::list_for_datas3t(env.ctx.catalog.pool(), ds.id)
        .await
        .unwrap()
        .into_iter()
        .map(|d| (d.min_key, d.max_key))
        .collect();
    bounds.sort();
    assert_eq!(bounds, vec![(0, 9), (10, 19)]);
}

#[sqlx::test]
async fn second_import_is_a_no_op(pool: PgPool) {
    let env = build_env(pool);
    create_bucket(&env.ctx, "b1").await;

    let archive = build_archive(0, &[18; 10]);
    let keys = datas3t::keys::build("imported", 0, 9, 1);
    env.store_factory.0.seed(&keys.data, archive.data.clone());
    env.store_factory.0.seed(&keys.index, archive.index.clone());

    let first = datas3t::import::import(&env.ctx, "b1").await.unwrap();
    assert_eq!(first, vec!["imported".to_owned()]);

    let second = datas3t::import::import(&env.ctx, "b1").await.unwrap();
    assert!(second.is_empty(), "second import should insert nothing new, got {second:?}");

    let ds = datas3t::db::datas3ts::get_by_name(env.ctx.catalog.pool(), "imported").await.unwrap().unwrap();
    let dataranges = datas3t::db::dataranges::list_for_datas3t(env.ctx.catalog.pool(), ds.id).await.unwrap();
    assert_eq!(dataranges.len(), 1);
}

#[sqlx::test]
async fn import_rejects_an_unknown_bucket(pool: PgPool) {
    let env = build_env(pool);
    let err = datas3t::import::import(&env.ctx, "nope").await.unwrap_err();
    assert!(matches!(err, datas3t::error::AppError::NotFound(_)));
}
