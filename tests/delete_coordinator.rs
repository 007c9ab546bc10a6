//! Delete-coordinator and clear-endpoint scenarios.

mod common;

use bytes::Bytes;
use sqlx::PgPool;

use datas3t::error::AppError;

use common::{build_env, create_bucket, create_datas3t, insert_committed};

#[sqlx::test]
async fn delete_removes_row_and_deletes_objects_immediately(pool: PgPool) {
    let env = build_env(pool);
    create_bucket(&env.ctx, "b1").await;
    let ds = create_datas3t(&env.ctx, "ds1", "b1").await;

    let dr = insert_committed(&env.ctx, ds.id, 0, 9).await;
    env.store_factory.0.seed(&dr.data_object_key, Bytes::from_static(b"tar-bytes"));
    env.store_factory.0.seed(&dr.index_object_key, Bytes::from_static(b"index-bytes"));

    datas3t::delete::delete(&env.ctx, "ds1", 0, 9).await.unwrap();

    let remaining = datas3t::db::dataranges::list_for_datas3t(env.ctx.catalog.pool(), ds.id).await.unwrap();
    assert!(remaining.is_empty());
    assert!(!env.store_factory.0.contains(&dr.data_object_key));
    assert!(!env.store_factory.0.contains(&dr.index_object_key));

    // Objects were deleted immediately; nothing should need the deferred queue.
    let queued = datas3t::db::deletions::count(env.ctx.catalog.pool()).await.unwrap();
    assert_eq!(queued, 0);
}

#[sqlx::test]
async fn delete_with_missing_objects_still_drops_the_row(pool: PgPool) {
    let env = build_env(pool);
    create_bucket(&env.ctx, "b1").await;
    let ds = create_datas3t(&env.ctx, "ds1", "b1").await;

    // Never seeded in the fake store -- HEAD reports absent, which §4.5
    // treats as a successful delete.
    insert_committed(&env.ctx, ds.id, 0, 9).await;

    datas3t::delete::delete(&env.ctx, "ds1", 0, 9).await.unwrap();

    let remaining = datas3t::db::dataranges::list_for_datas3t(env.ctx.catalog.pool(), ds.id).await.unwrap();
    assert!(remaining.is_empty());
}

#[sqlx::test]
async fn delete_rejects_bounds_that_do_not_match_a_committed_datarange(pool: PgPool) {
    let env = build_env(pool);
    create_bucket(&env.ctx, "b1").await;
    let ds = create_datas3t(&env.ctx, "ds1", "b1").await;
    insert_committed(&env.ctx, ds.id, 0, 9).await;

    let err = datas3t::delete::delete(&env.ctx, "ds1", 0, 8).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let remaining = datas3t::db::dataranges::list_for_datas3t(env.ctx.catalog.pool(), ds.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
}

#[sqlx::test]
async fn clear_schedules_every_datarange_for_deletion(pool: PgPool) {
    let env = build_env(pool);
    create_bucket(&env.ctx, "b1").await;
    let ds = create_datas3t(&env.ctx, "ds1", "b1").await;

    insert_committed(&env.ctx, ds.id, 0, 9).await;
    insert_committed(&env.ctx, ds.id, 10, 19).await;

    let deleted = datas3t::delete::clear(&env.ctx, "ds1").await.unwrap();
    assert_eq!(deleted, 2);

    let remaining = datas3t::db::dataranges::list_for_datas3t(env.ctx.catalog.pool(), ds.id).await.unwrap();
    assert!(remaining.is_empty());
}
