//! The delete coordinator: removes one datarange by exact `[min,max]`
//! bounds, preferring immediate object deletion and falling back to the
//! deferred-deletion queue.

use chrono::Utc;

use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::object_store::{ObjectStore, PRESIGN_TTL};

#[tracing::instrument(skip(ctx))]
pub async fn delete(ctx: &AppContext, datas3t_name: &str, min_key: i64, max_key: i64) -> AppResult<()> {
    let datas3t = crate::db::datas3ts::get_by_name(ctx.catalog.pool(), datas3t_name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("datas3t {datas3t_name} not found")))?;

    let datarange = crate::db::dataranges::get_by_exact_bounds(ctx.catalog.pool(), datas3t.id, min_key, max_key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no datarange [{min_key},{max_key}] on {datas3t_name}")))?;

    let store = ctx.store_for_datas3t(&datas3t.bucket_name).await?;

    let delete_after = Utc::now() + crate::db::deletions::DEFAULT_GRACE_PERIOD;
    let mut tx = ctx.catalog.begin().await.map_err(anyhow::Error::from)?;

    for key in [&datarange.data_object_key, &datarange.index_object_key] {
        if let Err(e) = delete_object(store.as_ref(), key).await {
            tracing::warn!(key = %key, error = %e, "falling back to deletion queue");
            let url = store.presign_delete(key, PRESIGN_TTL).await.map_err(anyhow::Error::from)?;
            crate::db::deletions::enqueue(&mut *tx, &url, delete_after).await.map_err(anyhow::Error::from)?;
        }
    }

    crate::db::dataranges::delete_by_id(&mut *tx, datarange.id).await.map_err(anyhow::Error::from)?;
    tx.commit().await.map_err(anyhow::Error::from)?;
    ctx.index_cache.invalidate(&datarange.index_object_key);
    Ok(())
}

/// Deletes an object, treating a missing object as success.
async fn delete_object(store: &dyn ObjectStore, key: &str) -> anyhow::Result<()> {
    if store.head(key).await?.is_none() {
        return Ok(());
    }
    store.delete(key).await
}

/// Schedules every committed datarange of a datas3t for deletion (the
/// `.../datas3ts/clear` endpoint), without removing the datas3t itself.
#[tracing::instrument(skip(ctx))]
pub async fn clear(ctx: &AppContext, datas3t_name: &str) -> AppResult<usize> {
    let datas3t = crate::db::datas3ts::get_by_name(ctx.catalog.pool(), datas3t_name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("datas3t {datas3t_name} not found")))?;

    let dataranges = crate::db::dataranges::list_for_datas3t(ctx.catalog.pool(), datas3t.id).await?;
    for datarange in &dataranges {
        delete(ctx, datas3t_name, datarange.min_key, datarange.max_key).await?;
    }
    Ok(dataranges.len())
}
