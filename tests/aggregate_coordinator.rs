//! End-to-end scenarios for the aggregate coordinator.

mod common;

use sqlx::PgPool;

use datas3t::aggregate::{self, CompleteAggregateRequest};
use datas3t::error::AppError;

use common::{build_archive, build_env, create_bucket, create_datas3t, insert_committed};

#[sqlx::test]
async fn aggregate_merges_two_of_three_sources(pool: PgPool) {
    let env = build_env(pool);
    create_bucket(&env.ctx, "b1").await;
    let ds = create_datas3t(&env.ctx, "ds1", "b1").await;

    insert_committed(&env.ctx, ds.id, 0, 9).await;
    insert_committed(&env.ctx, ds.id, 10, 19).await;
    insert_committed(&env.ctx, ds.id, 20, 29).await;

    let start = aggregate::start(&env.ctx, "ds1", 0, 19).await.unwrap();
    assert_eq!(start.sources.len(), 2);
    assert!(start.direct);

    let updated = datas3t::db::datas3ts::get_by_name(env.ctx.catalog.pool(), "ds1").await.unwrap().unwrap();
    let keys = datas3t::keys::build("ds1", 0, 19, updated.upload_counter as u64);

    let archive = build_archive(0, &[32; 20]);
    env.store_factory.0.seed(&keys.data, archive.data.clone());
    env.store_factory.0.seed(&keys.index, archive.index.clone());

    let merged = aggregate::complete(
        &env.ctx,
        CompleteAggregateRequest {
            aggregate_id: start.aggregate_id,
            part_etags: None,
            total_data_size: archive.data_size,
        },
    )
    .await
    .unwrap();

    assert_eq!((merged.min_key, merged.max_key), (0, 19));
    assert_eq!(merged.size_bytes, archive.data_size);

    let mut bounds: Vec<(i64, i64)> = datas3t::db::dataranges::list_for_datas3t(env.ctx.catalog.pool(), ds.id)
        .await
        .unwrap()
        .into_iter()
        .map(|d| (d.min_key, d.max_key))
        .collect();
    bounds.sort();
    assert_eq!(bounds, vec![(0, 19), (20, 29)]);

    let queued = datas3t::db::deletions::count(env.ctx.catalog.pool()).await.unwrap();
    assert!(queued >= 4, "expected at least 4 queued deletions, got {queued}");

    assert!(datas3t::db::aggregates::get(env.ctx.catalog.pool(), start.aggregate_id).await.unwrap().is_none());
}

#[sqlx::test]
async fn aggregate_start_rejects_a_gap(pool: PgPool) {
    let env = build_env(pool);
    create_bucket(&env.ctx, "b1").await;
    let ds = create_datas3t(&env.ctx, "ds1", "b1").await;

    insert_committed(&env.ctx, ds.id, 0, 9).await;
    insert_committed(&env.ctx, ds.id, 20, 29).await;

    let err = aggregate::start(&env.ctx, "ds1", 0, 29).await.unwrap_err();
    assert!(matches!(err, AppError::RangeNotFullyCovered(_)));

    let remaining = datas3t::db::dataranges::list_for_datas3t(env.ctx.catalog.pool(), ds.id).await.unwrap();
    assert_eq!(remaining.len(), 2);
}

#[sqlx::test]
async fn aggregate_start_rejects_a_single_source(pool: PgPool) {
    let env = build_env(pool);
    create_bucket(&env.ctx, "b1").await;
    let ds = create_datas3t(&env.ctx, "ds1", "b1").await;

    insert_committed(&env.ctx, ds.id, 0, 9).await;

    let err = aggregate::start(&env.ctx, "ds1", 0, 9).await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientDataranges(_)));
}

#[sqlx::test]
async fn aggregate_cancel_leaves_sources_untouched(pool: PgPool) {
    let env = build_env(pool);
    create_bucket(&env.ctx, "b1").await;
    let ds = create_datas3t(&env.ctx, "ds1", "b1").await;

    insert_committed(&env.ctx, ds.id, 0, 9).await;
    insert_committed(&env.ctx, ds.id, 10, 19).await;

    let start = aggregate::start(&env.ctx, "ds1", 0, 19).await.unwrap();
    aggregate::cancel(&env.ctx, start.aggregate_id).await.unwrap();

    assert!(datas3t::db::aggregates::get(env.ctx.catalog.pool(), start.aggregate_id).await.unwrap().is_none());
    let remaining = datas3t::db::dataranges::list_for_datas3t(env.ctx.catalog.pool(), ds.id).await.unwrap();
    assert_eq!(remaining.len(), 2);
}
