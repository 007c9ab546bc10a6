//! The upload coordinator: Start mints presigned PUT URLs for a single
//! datarange, Complete validates the uploaded objects and commits a
//! catalog row, Cancel tears down an abandoned in-flight upload.

use chrono::Utc;
use uuid::Uuid;

use crate::concurrency::try_for_each_bounded;
use crate::context::AppContext;
use crate::db::models::{Datarange, DatarangeUpload};
use crate::error::{AppError, AppResult};
use crate::object_store::{self, CompletedPart, ObjectStore, PRESIGN_TTL};
use crate::validation::validate_uploaded_archive;

pub struct PartUploadUrl {
    pub part_number: i32,
    pub url: String,
}

pub struct StartUploadResponse {
    pub upload_id: Uuid,
    pub direct: bool,
    pub index_put_url: String,
    pub data_put_url: Option<String>,
    pub part_upload_urls: Vec<PartUploadUrl>,
}

#[tracing::instrument(skip(ctx))]
pub async fn start(ctx: &AppContext, datas3t_name: &str, first_idx: i64, num_points: i64, data_size: i64) -> AppResult<StartUploadResponse> {
    if num_points <= 0 {
        return Err(AppError::Validation("num_points must be positive".into()));
    }
    if data_size <= 0 {
        return Err(AppError::Validation("data_size must be positive".into()));
    }

    let datas3t = crate::db::datas3ts::get_by_name(ctx.catalog.pool(), datas3t_name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("datas3t {datas3t_name} not found")))?;

    let last_idx = first_idx + num_points - 1;

    if crate::db::dataranges::overlaps_any(ctx.catalog.pool(), datas3t.id, first_idx, last_idx).await? {
        return Err(AppError::Conflict(format!("[{first_idx},{last_idx}] overlaps an existing datarange")));
    }

    let store = ctx.store_for_datas3t(&datas3t.bucket_name).await?;

    let mut tx = ctx.catalog.begin().await.map_err(anyhow::Error::from)?;
    let counter = crate::db::datas3ts::increment_upload_counter(&mut *tx, datas3t.id).await.map_err(anyhow::Error::from)?;
    let object_keys = crate::keys::build(datas3t_name, first_idx, last_idx, counter as u64);

    let direct = object_store::is_direct_put(data_size as u64);

    let multipart_upload_id = if direct {
        None
    } else {
        Some(store.create_multipart_upload(&object_keys.data).await.map_err(AppError::from_anyhow_transient)?)
    };

    // Re-check the overlap predicate inside the transaction: a sibling
    // Start could have committed a Datarange between the pre-check above
    // and here.
    if crate::db::dataranges::overlaps_any(&mut *tx, datas3t.id, first_idx, last_idx).await.map_err(anyhow::Error::from)? {
        tx.rollback().await.map_err(anyhow::Error::from)?;
        if let Some(upload_id) = &multipart_upload_id {
            let _ = store.abort_multipart_upload(&object_keys.data, upload_id).await;
        }
        return Err(AppError::Conflict(format!("[{first_idx},{last_idx}] overlaps an existing datarange")));
    }

    let index_put_url = store.presign_put(&object_keys.index, PRESIGN_TTL).await.map_err(AppError::from_anyhow_transient)?;

    let (data_put_url, part_upload_urls) = if direct {
        let url = store.presign_put(&object_keys.data, PRESIGN_TTL).await.map_err(AppError::from_anyhow_transient)?;
        (Some(url), Vec::new())
    } else {
        let upload_id = multipart_upload_id.clone().expect("multipart upload id set above");
        let part_size = object_store::choose_part_size(data_size as u64);
        let n_parts = object_store::part_count(data_size as u64, part_size);
        let part_numbers: Vec<i32> = (1..=n_parts as i32).collect();
        let store_for_parts = store.clone();
        let data_key = object_keys.data.clone();
        let parallelism = ctx.settings.s3_client_parallelism;
        let urls = try_for_each_bounded(part_numbers, parallelism, move |part_number| {
            let store = store_for_parts.clone();
            let data_key = data_key.clone();
            let upload_id = upload_id.clone();
            async move {
                let url = store.presign_upload_part(&data_key, &upload_id, part_number, PRESIGN_TTL).await?;
                Ok::<_, anyhow::Error>(PartUploadUrl { part_number, url })
            }
        })
        .await
        .map_err(AppError::from_anyhow_transient)?;
        (None, urls)
    };

    let stored_upload_id = multipart_upload_id.clone().unwrap_or_else(|| DatarangeUpload::DIRECT_PUT.to_owned());
    let upload = crate::db::uploads::insert(
        &mut *tx,
        datas3t.id,
        &stored_upload_id,
        &object_keys.data,
        &object_keys.index,
        first_idx,
        num_points,
        data_size,
    )
    .await
    .map_err(anyhow::Error::from)?;

    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(StartUploadResponse {
        upload_id: upload.id,
        direct,
        index_put_url,
        data_put_url,
        part_upload_urls,
    })
}

pub struct CompleteUploadRequest {
    pub upload_id: Uuid,
    /// Required (and only meaningful) for multipart uploads.
    pub part_etags: Option<Vec<CompletedPart>>,
}

#[tracing::instrument(skip(ctx, req))]
pub async fn complete(ctx: &AppContext, req: CompleteUploadRequest) -> AppResult<Datarange> {
    let upload = crate::db::uploads::get(ctx.catalog.pool(), req.upload_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("upload {} not found", req.upload_id)))?;

    let datas3t = crate::db::datas3ts::get_by_id(ctx.catalog.pool(), upload.datas3t_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("datas3t {} not found", upload.datas3t_id)))?;

    let store = ctx.store_for_datas3t(&datas3t.bucket_name).await?;

    if let Err(e) = finish_upload(store.as_ref(), &upload, req.part_etags).await {
        fail_upload(ctx, store.as_ref(), &upload).await?;
        return Err(e);
    }

    match validate_uploaded_archive(store.as_ref(), &upload.data_object_key, &upload.index_object_key, upload.first_idx, upload.num_points, upload.data_size).await {
        Ok(_) => {}
        Err(e) => {
            fail_upload(ctx, store.as_ref(), &upload).await?;
            return Err(e);
        }
    }

    let last_idx = upload.last_idx();
    let mut tx = ctx.catalog.begin_serializable().await.map_err(anyhow::Error::from)?;
    let overlapping = crate::db::dataranges::overlaps_any(&mut *tx, upload.datas3t_id, upload.first_idx, last_idx)
        .await
        .map_err(anyhow::Error::from)?;
    if overlapping {
        tx.rollback().await.map_err(anyhow::Error::from)?;
        fail_upload(ctx, store.as_ref(), &upload).await?;
        return Err(AppError::Conflict(format!("[{},{last_idx}] was committed by a concurrent upload", upload.first_idx)));
    }

    let datarange = crate::db::dataranges::insert(
        &mut *tx,
        upload.datas3t_id,
        &upload.data_object_key,
        &upload.index_object_key,
        upload.first_idx,
        last_idx,
        upload.data_size,
    )
    .await
    .map_err(anyhow::Error::from)?;
    crate::db::uploads::delete(&mut *tx, upload.id).await.map_err(anyhow::Error::from)?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(datarange)
}

/// Completes the multipart session, if any. Direct-PUT uploads have
/// nothing to finish before validation runs.
async fn finish_upload(store: &dyn ObjectStore, upload: &DatarangeUpload, part_etags: Option<Vec<CompletedPart>>) -> AppResult<()> {
    if upload.is_direct_put() {
        return Ok(());
    }
    let parts = part_etags.ok_or_else(|| AppError::Validation("part_etags is required to complete a multipart upload".into()))?;
    store
        .complete_multipart_upload(&upload.data_object_key, &upload.upload_id, parts)
        .await
        .map_err(|e| AppError::IntegrityViolation(format!("CompleteMultipartUpload failed: {e}")))
}

/// Failure-cleanup path shared by every way Complete can fail after
/// Start has committed: enqueues both objects for deferred deletion and
/// removes the in-flight upload row, all in one transaction.
async fn fail_upload(ctx: &AppContext, store: &dyn ObjectStore, upload: &DatarangeUpload) -> AppResult<()> {
    let delete_after = Utc::now() + crate::db::deletions::DEFAULT_GRACE_PERIOD;

    if !upload.is_direct_put() {
        let _ = store.abort_multipart_upload(&upload.data_object_key, &upload.upload_id).await;
    }

    let data_delete_url = store.presign_delete(&upload.data_object_key, PRESIGN_TTL).await.map_err(anyhow::Error::from)?;
    let index_delete_url = store.presign_delete(&upload.index_object_key, PRESIGN_TTL).await.map_err(anyhow::Error::from)?;

    let mut tx = ctx.catalog.begin().await.map_err(anyhow::Error::from)?;
    crate::db::deletions::enqueue(&mut *tx, &data_delete_url, delete_after).await.map_err(anyhow::Error::from)?;
    crate::db::deletions::enqueue(&mut *tx, &index_delete_url, delete_after).await.map_err(anyhow::Error::from)?;
    crate::db::uploads::delete(&mut *tx, upload.id).await.map_err(anyhow::Error::from)?;
    tx.commit().await.map_err(anyhow::Error::from)?;
    Ok(())
}

/// Deletes `key`, returning a presigned DELETE URL to enqueue as a
/// fallback if the delete itself failed.
async fn delete_or_enqueue(store: &dyn ObjectStore, key: &str) -> Option<String> {
    if let Err(e) = store.delete(key).await {
        tracing::warn!(key = %key, error = %e, "delete failed on cancel, falling back to deletion queue");
        match store.presign_delete(key, PRESIGN_TTL).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to presign fallback delete url on cancel");
                None
            }
        }
    } else {
        None
    }
}

#[tracing::instrument(skip(ctx))]
pub async fn cancel(ctx: &AppContext, upload_id: Uuid) -> AppResult<()> {
    let upload = crate::db::uploads::get(ctx.catalog.pool(), upload_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("upload {upload_id} not found")))?;

    let datas3t = crate::db::datas3ts::get_by_id(ctx.catalog.pool(), upload.datas3t_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("datas3t {} not found", upload.datas3t_id)))?;

    let store = ctx.store_for_datas3t(&datas3t.bucket_name).await?;

    let cleanup = async {
        let mut fallback_urls = Vec::new();
        if upload.is_direct_put() {
            if let Some(url) = delete_or_enqueue(store.as_ref(), &upload.data_object_key).await {
                fallback_urls.push(url);
            }
        } else {
            let _ = store.abort_multipart_upload(&upload.data_object_key, &upload.upload_id).await;
            if let Some(url) = delete_or_enqueue(store.as_ref(), &upload.data_object_key).await {
                fallback_urls.push(url);
            }
        }
        if let Some(url) = delete_or_enqueue(store.as_ref(), &upload.index_object_key).await {
            fallback_urls.push(url);
        }
        fallback_urls
    };

    let fallback_urls = match tokio::time::timeout(std::time::Duration::from_secs(30), cleanup).await {
        Ok(urls) => urls,
        Err(_) => {
            tracing::warn!(upload_id = %upload_id, "best-effort S3 cleanup timed out on cancel");
            Vec::new()
        }
    };

    let delete_after = Utc::now() + crate::db::deletions::DEFAULT_GRACE_PERIOD;
    let mut tx = ctx.catalog.begin().await.map_err(anyhow::Error::from)?;
    for url in &fallback_urls {
        crate::db::deletions::enqueue(&mut *tx, url, delete_after).await.map_err(anyhow::Error::from)?;
    }
    crate::db::uploads::delete(&mut *tx, upload.id).await.map_err(anyhow::Error::from)?;
    tx.commit().await.map_err(anyhow::Error::from)?;
    Ok(())
}
