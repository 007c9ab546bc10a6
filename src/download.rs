//! The download planner: turns a `[first,last]` datapoint range into the
//! minimal ordered sequence of presigned, ranged GETs over existing TAR
//! objects.

use std::sync::Arc;

use roaring::RoaringTreemap;

use crate::context::AppContext;
use crate::error::AppResult;
use crate::object_store::{ByteRange, PRESIGN_TTL};
use crate::tar_index::TarIndex;

pub struct Segment {
    pub presigned_url: String,
    pub range: String,
}

#[tracing::instrument(skip(ctx))]
pub async fn plan_download(ctx: &AppContext, datas3t_name: &str, first: i64, last: i64) -> AppResult<Vec<Segment>> {
    let datas3t = crate::db::datas3ts::get_by_name(ctx.catalog.pool(), datas3t_name)
        .await?
        .ok_or_else(|| crate::error::AppError::NotFound(format!("datas3t {datas3t_name} not found")))?;

    let store = ctx.store_for_datas3t(&datas3t.bucket_name).await?;

    let dataranges = crate::db::dataranges::intersecting(ctx.catalog.pool(), datas3t.id, first, last).await?;

    let mut segments = Vec::with_capacity(dataranges.len());
    for datarange in dataranges {
        let index = match ctx.index_cache.get(&datarange.index_object_key) {
            Some(index) => index,
            None => {
                let index_bytes = store.get(&datarange.index_object_key).await.map_err(anyhow::Error::from)?;
                let index = Arc::new(TarIndex::parse(&index_bytes).map_err(crate::error::AppError::Internal)?);
                ctx.index_cache.insert(datarange.index_object_key.clone(), index.clone());
                index
            }
        };

        let k0 = (first.max(datarange.min_key) - datarange.min_key) as usize;
        let k1 = (last.min(datarange.max_key) - datarange.min_key) as usize;
        let (start, end) = index.byte_range(k0, k1).map_err(crate::error::AppError::Internal)?;

        let url = store
            .presign_get(&datarange.data_object_key, Some(ByteRange::new(start, end)), PRESIGN_TTL)
            .await
            .map_err(anyhow::Error::from)?;

        segments.push(Segment {
            presigned_url: url,
            range: ByteRange::new(start, end).to_header(),
        });
    }

    Ok(segments)
}

/// Every datapoint key currently present on a datas3t, as a 64-bit
/// roaring bitmap (`GET /api/v1/datapoints-bitmap`). Negative keys are
/// not representable and are rejected at Upload Start, so every
/// `min_key`/`max_key` here fits in `u64`.
#[tracing::instrument(skip(ctx))]
pub async fn datapoints_bitmap(ctx: &AppContext, datas3t_name: &str) -> AppResult<RoaringTreemap> {
    let datas3t = crate::db::datas3ts::get_by_name(ctx.catalog.pool(), datas3t_name)
        .await?
        .ok_or_else(|| crate::error::AppError::NotFound(format!("datas3t {datas3t_name} not found")))?;

    let dataranges = crate::db::dataranges::list_for_datas3t(ctx.catalog.pool(), datas3t.id).await?;

    let mut bitmap = RoaringTreemap::new();
    for datarange in dataranges {
        bitmap.insert_range(datarange.min_key as u64..=datarange.max_key as u64);
    }
    Ok(bitmap)
}
