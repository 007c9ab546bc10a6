//! End-to-end scenarios for the upload coordinator.

mod common;

use bytes::Bytes;
use sqlx::PgPool;

use datas3t::error::AppError;
use datas3t::object_store::{choose_part_size, CompletedPart, DIRECT_PUT_THRESHOLD};
use datas3t::upload::{self, CompleteUploadRequest};

use common::{build_archive, build_env, create_bucket, create_datas3t};

#[sqlx::test]
async fn direct_put_upload_commits_one_datarange(pool: PgPool) {
    let env = build_env(pool);
    create_bucket(&env.ctx, "b1").await;
    create_datas3t(&env.ctx, "ds1", "b1").await;

    let archive = build_archive(0, &[18; 5]);

    let start = upload::start(&env.ctx, "ds1", 0, 5, archive.data_size).await.unwrap();
    assert!(start.direct);
    assert!(start.data_put_url.is_some());
    assert!(start.part_upload_urls.is_empty());

    let keys = datas3t::keys::build("ds1", 0, 4, 1);
    env.store_factory.0.seed(&keys.data, archive.data.clone());
    env.store_factory.0.seed(&keys.index, archive.index.clone());

    let datarange = upload::complete(
        &env.ctx,
        CompleteUploadRequest {
            upload_id: start.upload_id,
            part_etags: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(datarange.min_key, 0);
    assert_eq!(datarange.max_key, 4);
    assert_eq!(datarange.size_bytes, archive.data_size);

    let listed = datas3t::db::dataranges::list_for_datas3t(env.ctx.catalog.pool(), datarange.datas3t_id).await.unwrap();
    assert_eq!(listed.len(), 1);

    let in_flight = datas3t::db::uploads::count_for_datas3t(env.ctx.catalog.pool(), datarange.datas3t_id).await.unwrap();
    assert_eq!(in_flight, 0);
}

#[sqlx::test]
async fn multipart_upload_commits_one_datarange(pool: PgPool) {
    let env = build_env(pool);
    create_bucket(&env.ctx, "b1").await;
    create_datas3t(&env.ctx, "ds1", "b1").await;

    // 100 points of 61440 bytes each -> archive just under 6 MiB, comfortably
    // over the 5 MiB direct-PUT threshold and splitting into exactly 2 parts.
    let archive = build_archive(0, &[61440; 100]);
    assert!(archive.data_size as u64 > DIRECT_PUT_THRESHOLD);

    let start = upload::start(&env.ctx, "ds1", 0, 100, archive.data_size).await.unwrap();
    assert!(!start.direct);
    assert!(!start.part_upload_urls.is_empty());

    let upload_row = datas3t::db::uploads::get(env.ctx.catalog.pool(), start.upload_id).await.unwrap().unwrap();
    let multipart_id = upload_row.upload_id.clone();

    let keys = datas3t::keys::build("ds1", 0, 99, 1);
    env.store_factory.0.seed(&keys.index, archive.index.clone());

    let part_size = choose_part_size(archive.data_size as u64) as usize;
    let mut part_etags = Vec::new();
    for (i, chunk) in archive.data.chunks(part_size).enumerate() {
        let part_number = (i + 1) as i32;
        env.store_factory.0.seed_part(&multipart_id, part_number, Bytes::copy_from_slice(chunk));
        part_etags.push(CompletedPart {
            part_number,
            e_tag: format!("etag-{part_number}"),
        });
    }
    assert_eq!(part_etags.len(), 2);

    let datarange = upload::complete(
        &env.ctx,
        CompleteUploadRequest {
            upload_id: start.upload_id,
            part_etags: Some(part_etags),
        },
    )
    .await
    .unwrap();

    assert_eq!(datarange.min_key, 0);
    assert_eq!(datarange.max_key, 99);
    assert_eq!(datarange.size_bytes, archive.data_size);
}

#[sqlx::test]
async fn complete_fails_on_size_mismatch_and_queues_both_objects(pool: PgPool) {
    let env = build_env(pool);
    create_bucket(&env.ctx, "b1").await;
    let ds = create_datas3t(&env.ctx, "ds1", "b1").await;

    let start = upload::start(&env.ctx, "ds1", 0, 100, 1024).await.unwrap();
    assert!(start.direct);

    let keys = datas3t::keys::build("ds1", 0, 99, 1);
    // Client only actually PUT 512 bytes against the 1024 declared at Start.
    env.store_factory.0.seed(&keys.data, Bytes::from(vec![0u8; 512]));
    env.store_factory.0.seed(&keys.index, Bytes::new());

    let err = upload::complete(
        &env.ctx,
        CompleteUploadRequest {
            upload_id: start.upload_id,
            part_etags: None,
        },
    )
    .await
    .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("uploaded size mismatch"), "{message}");
    assert!(message.contains("expected 1024"), "{message}");
    assert!(message.contains("got 512"), "{message}");

    let in_flight = datas3t::db::uploads::count_for_datas3t(env.ctx.catalog.pool(), ds.id).await.unwrap();
    assert_eq!(in_flight, 0);

    let queued = datas3t::db::deletions::count(env.ctx.catalog.pool()).await.unwrap();
    assert_eq!(queued, 2);
}

#[sqlx::test]
async fn second_overlapping_complete_loses_and_is_queued_for_deletion(pool: PgPool) {
    let env = build_env(pool);
    create_bucket(&env.ctx, "b1").await;
    let ds = create_datas3t(&env.ctx, "ds1", "b1").await;

    let archive_a = build_archive(50, &[20; 100]); // [50,149]
    let start_a = upload::start(&env.ctx, "ds1", 50, 100, archive_a.data_size).await.unwrap();
    let keys_a = datas3t::keys::build("ds1", 50, 149, 1);
    env.store_factory.0.seed(&keys_a.data, archive_a.data.clone());
    env.store_factory.0.seed(&keys_a.index, archive_a.index.clone());

    let archive_b = build_archive(100, &[20; 100]); // [100,199], overlaps [50,149]
    let start_b = upload::start(&env.ctx, "ds1", 100, 100, archive_b.data_size).await.unwrap();
    let keys_b = datas3t::keys::build("ds1", 100, 199, 2);
    env.store_factory.0.seed(&keys_b.data, archive_b.data.clone());
    env.store_factory.0.seed(&keys_b.index, archive_b.index.clone());

    upload::complete(
        &env.ctx,
        CompleteUploadRequest {
            upload_id: start_a.upload_id,
            part_etags: None,
        },
    )
    .await
    .unwrap();

    let err = upload::complete(
        &env.ctx,
        CompleteUploadRequest {
            upload_id: start_b.upload_id,
            part_etags: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let due = datas3t::db::deletions::fetch_due(env.ctx.catalog.pool(), chrono::Utc::now() + chrono::Duration::hours(2), 100)
        .await
        .unwrap();
    assert!(due.iter().any(|row| row.presigned_delete_url.contains(&keys_b.data)));
    assert!(due.iter().any(|row| row.presigned_delete_url.contains(&keys_b.index)));

    let listed = datas3t::db::dataranges::list_for_datas3t(env.ctx.catalog.pool(), ds.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!((listed[0].min_key, listed[0].max_key), (50, 149));
}

#[sqlx::test]
async fn cancel_direct_put_removes_row_and_best_effort_deletes_objects(pool: PgPool) {
    let env = build_env(pool);
    create_bucket(&env.ctx, "b1").await;
    create_datas3t(&env.ctx, "ds1", "b1").await;

    let archive = build_archive(0, &[18; 3]);
    let start = upload::start(&env.ctx, "ds1", 0, 3, archive.data_size).await.unwrap();

    let keys = datas3t::keys::build("ds1", 0, 2, 1);
    env.store_factory.0.seed(&keys.data, archive.data.clone());
    env.store_factory.0.seed(&keys.index, archive.index.clone());

    upload::cancel(&env.ctx, start.upload_id).await.unwrap();

    assert!(datas3t::db::uploads::get(env.ctx.catalog.pool(), start.upload_id).await.unwrap().is_none());
    assert!(!env.store_factory.0.contains(&keys.data));
    assert!(!env.store_factory.0.contains(&keys.index));

    let err = upload::cancel(&env.ctx, start.upload_id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
