//! Download-planning and datapoints-bitmap scenarios.

mod common;

use sqlx::PgPool;

use datas3t::download;
use datas3t::error::AppError;

use common::{build_archive, build_env, create_bucket, create_datas3t, insert_committed};

#[sqlx::test]
async fn plan_download_spans_two_dataranges_with_one_segment_each(pool: PgPool) {
    let env = build_env(pool);
    create_bucket(&env.ctx, "b1").await;
    let ds = create_datas3t(&env.ctx, "ds1", "b1").await;

    let archive_a = build_archive(0, &[18; 10]); // [0,9]
    let keys_a = datas3t::keys::build("fixture", 0, 9, 0);
    env.store_factory.0.seed(&keys_a.data, archive_a.data.clone());
    env.store_factory.0.seed(&keys_a.index, archive_a.index.clone());
    datas3t::db::dataranges::insert(env.ctx.catalog.pool(), ds.id, &keys_a.data, &keys_a.index, 0, 9, archive_a.data_size)
        .await
        .unwrap();

    let archive_b = build_archive(10, &[18; 10]); // [10,19]
    let keys_b = datas3t::keys::build("fixture", 10, 19, 10);
    env.store_factory.0.seed(&keys_b.data, archive_b.data.clone());
    env.store_factory.0.seed(&keys_b.index, archive_b.index.clone());
    datas3t::db::dataranges::insert(env.ctx.catalog.pool(), ds.id, &keys_b.data, &keys_b.index, 10, 19, archive_b.data_size)
        .await
        .unwrap();

    // Request datapoints 5..=14: the last 5 of datarange A and the first
    // 5 of datarange B, one presigned ranged GET per datarange.
    let segments = download::plan_download(&env.ctx, "ds1", 5, 14).await.unwrap();
    assert_eq!(segments.len(), 2);

    let idx_a = datas3t::tar_index::TarIndex::parse(&archive_a.index).unwrap();
    let (start_a, end_a) = idx_a.byte_range(5, 9).unwrap();
    assert_eq!(segments[0].range, format!("bytes={start_a}-{end_a}"));
    assert!(segments[0].presigned_url.contains(&keys_a.data));

    let idx_b = datas3t::tar_index::TarIndex::parse(&archive_b.index).unwrap();
    let (start_b, end_b) = idx_b.byte_range(0, 4).unwrap();
    assert_eq!(segments[1].range, format!("bytes={start_b}-{end_b}"));
    assert!(segments[1].presigned_url.contains(&keys_b.data));
}

#[sqlx::test]
async fn plan_download_rejects_unknown_datas3t(pool: PgPool) {
    let env = build_env(pool);
    let err = download::plan_download(&env.ctx, "nope", 0, 9).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[sqlx::test]
async fn datapoints_bitmap_covers_every_committed_datapoint(pool: PgPool) {
    let env = build_env(pool);
    create_bucket(&env.ctx, "b1").await;
    let ds = create_datas3t(&env.ctx, "ds1", "b1").await;

    insert_committed(&env.ctx, ds.id, 0, 9).await;
    insert_committed(&env.ctx, ds.id, 20, 24).await;

    let bitmap = download::datapoints_bitmap(&env.ctx, "ds1").await.unwrap();
    assert_eq!(bitmap.len(), 15);
    assert!(bitmap.contains(0));
    assert!(bitmap.contains(9));
    assert!(!bitmap.contains(10));
    assert!(bitmap.contains(20));
    assert!(bitmap.contains(24));
    assert!(!bitmap.contains(25));
}
