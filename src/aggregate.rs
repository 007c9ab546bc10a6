//! The aggregate coordinator: collapses a covering, contiguous run of
//! dataranges into one larger datarange. Start mints download URLs for
//! the sources and upload URLs for the merged object; Complete swaps
//! sources for the merged datarange inside one transaction; Cancel tears
//! down an abandoned merge without touching the sources.

use chrono::Utc;
use uuid::Uuid;

use crate::concurrency::try_for_each_bounded;
use crate::context::AppContext;
use crate::db::dataranges::CoverageError;
use crate::db::models::{AggregateUpload, Datarange};
use crate::error::{AppError, AppResult};
use crate::object_store::{self, CompletedPart, ObjectStore, PRESIGN_TTL};
use crate::upload::PartUploadUrl;
use crate::validation::validate_uploaded_archive;

impl From<CoverageError> for AppError {
    fn from(e: CoverageError) -> Self {
        match e {
            CoverageError::InsufficientDataranges { first, last, found } => {
                AppError::InsufficientDataranges(format!("at least two dataranges must cover [{first},{last}], found {found}"))
            }
            CoverageError::RangeNotFullyCovered { first, last, detail } => {
                AppError::RangeNotFullyCovered(format!("[{first},{last}] is not fully covered: {detail}"))
            }
        }
    }
}

pub struct SourceDownloadUrls {
    pub source_id: i64,
    pub data_get_url: String,
    pub index_get_url: String,
}

pub struct StartAggregateResponse {
    pub aggregate_id: Uuid,
    pub direct: bool,
    pub sources: Vec<SourceDownloadUrls>,
    pub index_put_url: String,
    pub data_put_url: Option<String>,
    pub part_upload_urls: Vec<PartUploadUrl>,
}

#[tracing::instrument(skip(ctx))]
pub async fn start(ctx: &AppContext, datas3t_name: &str, first_idx: i64, last_idx: i64) -> AppResult<StartAggregateResponse> {
    if first_idx > last_idx {
        return Err(AppError::Validation(format!("first_idx {first_idx} must not exceed last_idx {last_idx}")));
    }

    let datas3t = crate::db::datas3ts::get_by_name(ctx.catalog.pool(), datas3t_name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("datas3t {datas3t_name} not found")))?;

    crate::db::dataranges::assert_exact_coverage(ctx.catalog.pool(), datas3t.id, first_idx, last_idx).await?;

    let store = ctx.store_for_datas3t(&datas3t.bucket_name).await?;

    let mut tx = ctx.catalog.begin().await.map_err(anyhow::Error::from)?;
    // Re-check inside the transaction: a concurrent Delete or Aggregate
    // could have invalidated coverage between the check above and here.
    let sources = crate::db::dataranges::assert_exact_coverage(&mut *tx, datas3t.id, first_idx, last_idx).await?;

    let counter = crate::db::datas3ts::increment_upload_counter(&mut *tx, datas3t.id).await.map_err(anyhow::Error::from)?;
    let object_keys = crate::keys::build(datas3t_name, first_idx, last_idx, counter as u64);

    // Estimated merged size: the sum of source sizes minus one redundant
    // 1024-byte trailer per extra source.
    let estimated_size = sources.iter().map(|s| s.size_bytes).sum::<i64>() - 1024 * (sources.len() as i64 - 1);
    let source_ids: Vec<i64> = sources.iter().map(|s| s.id).collect();

    let source_urls_fut = sources.iter().map(|s| {
        let data_key = s.data_object_key.clone();
        let index_key = s.index_object_key.clone();
        let id = s.id;
        let store = store.clone();
        async move {
            let data_get_url = store.presign_get(&data_key, None, PRESIGN_TTL).await?;
            let index_get_url = store.presign_get(&index_key, None, PRESIGN_TTL).await?;
            Ok::<_, anyhow::Error>(SourceDownloadUrls {
                source_id: id,
                data_get_url,
                index_get_url,
            })
        }
    });
    let source_download_urls = futures::future::try_join_all(source_urls_fut).await.map_err(AppError::from_anyhow_transient)?;

    let direct = object_store::is_direct_put(estimated_size.max(0) as u64);

    let multipart_upload_id = if direct {
        None
    } else {
        Some(store.create_multipart_upload(&object_keys.data).await.map_err(AppError::from_anyhow_transient)?)
    };

    let index_put_url = store.presign_put(&object_keys.index, PRESIGN_TTL).await.map_err(AppError::from_anyhow_transient)?;

    let (data_put_url, part_upload_urls) = if direct {
        let url = store.presign_put(&object_keys.data, PRESIGN_TTL).await.map_err(AppError::from_anyhow_transient)?;
        (Some(url), Vec::new())
    } else {
        let upload_id = multipart_upload_id.clone().expect("multipart upload id set above");
        let part_size = object_store::choose_part_size(estimated_size.max(0) as u64);
        let n_parts = object_store::part_count(estimated_size.max(0) as u64, part_size);
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

    let stored_upload_id = multipart_upload_id.clone().unwrap_or_else(|| AggregateUpload::DIRECT_PUT.to_owned());
    let aggregate = crate::db::aggregates::insert(
        &mut *tx,
        datas3t.id,
        &stored_upload_id,
        &object_keys.data,
        &object_keys.index,
        first_idx,
        last_idx,
        estimated_size.max(0),
        &source_ids,
    )
    .await
    .map_err(anyhow::Error::from)?;

    tx.commit().await.map_err(anyhow::Error::from)?;

    Ok(StartAggregateResponse {
        aggregate_id: aggregate.id,
        direct,
        sources: source_download_urls,
        index_put_url,
        data_put_url,
        part_upload_urls,
    })
}

pub struct CompleteAggregateRequest {
    pub aggregate_id: Uuid,
    pub part_etags: Option<Vec<CompletedPart>>,
    /// The client's observed final size, per the design decision that
    /// resolves the ambiguity in how `total_data_size` is validated:
    /// the caller always supplies it, overwriting the estimate recorded
    /// at Start.
    pub total_data_size: i64,
}

#[tracing::instrument(skip(ctx, req))]
pub async fn complete(ctx: &AppContext, req: CompleteAggregateRequest) -> AppResult<Datarange> {
    let aggregate = crate::db::aggregates::get(ctx.catalog.pool(), req.aggregate_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("aggregate {} not found", req.aggregate_id)))?;

    let datas3t = crate::db::datas3ts::get_by_id(ctx.catalog.pool(), aggregate.datas3t_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("datas3t {} not found", aggregate.datas3t_id)))?;

    let store = ctx.store_for_datas3t(&datas3t.bucket_name).await?;

    crate::db::aggregates::set_total_data_size(ctx.catalog.pool(), aggregate.id, req.total_data_size)
        .await
        .map_err(anyhow::Error::from)?;

    if let Err(e) = finish_aggregate(store.as_ref(), &aggregate, req.part_etags).await {
        fail_aggregate(ctx, store.as_ref(), &aggregate).await?;
        return Err(e);
    }

    let expected_num_points = aggregate.last_idx - aggregate.first_idx + 1;
    match validate_uploaded_archive(
        store.as_ref(),
        &aggregate.data_object_key,
        &aggregate.index_object_key,
        aggregate.first_idx,
        expected_num_points,
        req.total_data_size,
    )
    .await
    {
        Ok(_) => {}
        Err(e) => {
            fail_aggregate(ctx, store.as_ref(), &aggregate).await?;
            return Err(e);
        }
    }

    let mut tx = ctx.catalog.begin_serializable().await.map_err(anyhow::Error::from)?;
    let coverage = crate::db::dataranges::assert_exact_coverage(&mut *tx, aggregate.datas3t_id, aggregate.first_idx, aggregate.last_idx).await;
    let still_same_sources = match &coverage {
        Ok(sources) => {
            let mut observed: Vec<i64> = sources.iter().map(|s| s.id).collect();
            let mut frozen = aggregate.source_ids.clone();
            observed.sort_unstable();
            frozen.sort_unstable();
            observed == frozen
        }
        Err(_) => false,
    };

    if !still_same_sources {
        tx.rollback().await.map_err(anyhow::Error::from)?;
        fail_aggregate(ctx, store.as_ref(), &aggregate).await?;
        return Err(AppError::Conflict(format!(
            "sources for aggregate [{},{}] changed since Start",
            aggregate.first_idx, aggregate.last_idx
        )));
    }
    let sources = coverage.expect("still_same_sources implies Ok");

    let datarange = crate::db::dataranges::insert(
        &mut *tx,
        aggregate.datas3t_id,
        &aggregate.data_object_key,
        &aggregate.index_object_key,
        aggregate.first_idx,
        aggregate.last_idx,
        req.total_data_size,
    )
    .await
    .map_err(anyhow::Error::from)?;

    let delete_after = Utc::now() + crate::db::deletions::DEFAULT_GRACE_PERIOD;
    for source in &sources {
        let data_delete_url = store.presign_delete(&source.data_object_key, PRESIGN_TTL).await.map_err(anyhow::Error::from)?;
        let index_delete_url = store.presign_delete(&source.index_object_key, PRESIGN_TTL).await.map_err(anyhow::Error::from)?;
        crate::db::deletions::enqueue(&mut *tx, &data_delete_url, delete_after).await.map_err(anyhow::Error::from)?;
        crate::db::deletions::enqueue(&mut *tx, &index_delete_url, delete_after).await.map_err(anyhow::Error::from)?;
    }
    let source_ids: Vec<i64> = sources.iter().map(|s| s.id).collect();
    crate::db::dataranges::delete_by_ids(&mut *tx, &source_ids).await.map_err(anyhow::Error::from)?;
    crate::db::aggregates::delete(&mut *tx, aggregate.id).await.map_err(anyhow::Error::from)?;
    tx.commit().await.map_err(anyhow::Error::from)?;

    for source in &sources {
        ctx.index_cache.invalidate(&source.index_object_key);
    }

    Ok(datarange)
}

async fn finish_aggregate(store: &dyn ObjectStore, aggregate: &AggregateUpload, part_etags: Option<Vec<CompletedPart>>) -> AppResult<()> {
    if aggregate.is_direct_put() {
        return Ok(());
    }
    let parts = part_etags.ok_or_else(|| AppError::Validation("part_etags is required to complete a multipart aggregate upload".into()))?;
    store
        .complete_multipart_upload(&aggregate.data_object_key, &aggregate.upload_id, parts)
        .await
        .map_err(|e| AppError::IntegrityViolation(format!("CompleteMultipartUpload failed: {e}")))
}

/// Failure-cleanup path for the aggregate's own objects. Sources are
/// never touched on a failed Complete.
async fn fail_aggregate(ctx: &AppContext, store: &dyn ObjectStore, aggregate: &AggregateUpload) -> AppResult<()> {
    let delete_after = Utc::now() + crate::db::deletions::DEFAULT_GRACE_PERIOD;

    if !aggregate.is_direct_put() {
        let _ = store.abort_multipart_upload(&aggregate.data_object_key, &aggregate.upload_id).await;
    }

    let data_delete_url = store.presign_delete(&aggregate.data_object_key, PRESIGN_TTL).await.map_err(anyhow::Error::from)?;
    let index_delete_url = store.presign_delete(&aggregate.index_object_key, PRESIGN_TTL).await.map_err(anyhow::Error::from)?;

    let mut tx = ctx.catalog.begin().await.map_err(anyhow::Error::from)?;
    crate::db::deletions::enqueue(&mut *tx, &data_delete_url, delete_after).await.map_err(anyhow::Error::from)?;
    crate::db::deletions::enqueue(&mut *tx, &index_delete_url, delete_after).await.map_err(anyhow::Error::from)?;
    crate::db::aggregates::delete(&mut *tx, aggregate.id).await.map_err(anyhow::Error::from)?;
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
pub async fn cancel(ctx: &AppContext, aggregate_id: Uuid) -> AppResult<()> {
    let aggregate = crate::db::aggregates::get(ctx.catalog.pool(), aggregate_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("aggregate {aggregate_id} not found")))?;

    let datas3t = crate::db::datas3ts::get_by_id(ctx.catalog.pool(), aggregate.datas3t_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("datas3t {} not found", aggregate.datas3t_id)))?;

    let store = ctx.store_for_datas3t(&datas3t.bucket_name).await?;

    let cleanup = async {
        if !aggregate.is_direct_put() {
            let _ = store.abort_multipart_upload(&aggregate.data_object_key, &aggregate.upload_id).await;
        }
        let mut fallback_urls = Vec::new();
        if let Some(url) = delete_or_enqueue(store.as_ref(), &aggregate.data_object_key).await {
            fallback_urls.push(url);
        }
        if let Some(url) = delete_or_enqueue(store.as_ref(), &aggregate.index_object_key).await {
            fallback_urls.push(url);
        }
        fallback_urls
    };

    let fallback_urls = match tokio::time::timeout(std::time::Duration::from_secs(30), cleanup).await {
        Ok(urls) => urls,
        Err(_) => {
            tracing::warn!(aggregate_id = %aggregate_id, "best-effort S3 cleanup timed out on cancel");
            Vec::new()
        }
    };

    let delete_after = Utc::now() + crate::db::deletions::DEFAULT_GRACE_PERIOD;
    let mut tx = ctx.catalog.begin().await.map_err(anyhow::Error::from)?;
    for url in &fallback_urls {
        crate::db::deletions::enqueue(&mut *tx, url, delete_after).await.map_err(anyhow::Error::from)?;
    }
    crate::db::aggregates::delete(&mut *tx, aggregate.id).await.map_err(anyhow::Error::from)?;
    tx.commit().await.map_err(anyhow::Error::from)?;
    Ok(())
}
