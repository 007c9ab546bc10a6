//! The import scanner: reconciles catalog state with a bucket's actual
//! contents by parsing object keys back into `(datas3t, first, last,
//! upload_counter)` tuples and inserting any missing rows.

use std::collections::HashMap;

use crate::context::AppContext;
use crate::error::AppResult;
use crate::keys::{parse_data_key, ParsedDataKey};
use crate::object_store::ObjectStore;

const LIST_PREFIX: &str = "datas3t/";

/// Scans `bucket_name` under `datas3t/` and reconciles the catalog.
/// Returns the names of datas3ts that received at least one new row.
#[tracing::instrument(skip(ctx))]
pub async fn import(ctx: &AppContext, bucket_name: &str) -> AppResult<Vec<String>> {
    let bucket = crate::db::buckets::get(ctx.catalog.pool(), bucket_name)
        .await?
        .ok_or_else(|| crate::error::AppError::NotFound(format!("bucket {bucket_name} not found")))?;

    let store = ctx.object_stores.for_bucket(&bucket, &ctx.cipher_key).await.map_err(anyhow::Error::from)?;

    let keys = store.list(LIST_PREFIX).await.map_err(anyhow::Error::from)?;

    let mut by_datas3t: HashMap<String, Vec<ParsedDataKey>> = HashMap::new();
    for key in keys {
        if let Some(parsed) = parse_data_key(&key) {
            by_datas3t.entry(parsed.datas3t_name.clone()).or_default().push(parsed);
        }
    }

    let parallelism = ctx.settings.import_parallelism;
    let groups: Vec<(String, Vec<ParsedDataKey>)> = by_datas3t.into_iter().collect();

    let ctx_owned = ctx.clone();
    let bucket_name_owned = bucket_name.to_owned();
    let store = store.clone();
    let results = crate::concurrency::try_for_each_bounded(groups, parallelism, move |(name, entries)| {
        let ctx = ctx_owned.clone();
        let bucket_name = bucket_name_owned.clone();
        let store = store.clone();
        async move {
            let inserted = import_group(&ctx, store.as_ref(), &bucket_name, &name, entries).await?;
            Ok::<_, crate::error::AppError>((name, inserted))
        }
    })
    .await?;

    Ok(results.into_iter().filter(|(_, inserted)| *inserted > 0).map(|(name, _)| name).collect())
}

/// Reconciles one datas3t's worth of discovered keys inside a single
/// transaction: creates the Datas3t row if absent, inserts any Datarange
/// not already present at the same `[min,max]`, and raises
/// `upload_counter` to at least the highest observed value.
async fn import_group(ctx: &AppContext, store: &dyn ObjectStore, bucket_name: &str, datas3t_name: &str, entries: Vec<ParsedDataKey>) -> AppResult<usize> {
    let mut tx = ctx.catalog.begin().await.map_err(anyhow::Error::from)?;

    let datas3t = match crate::db::datas3ts::get_by_name(&mut *tx, datas3t_name).await.map_err(anyhow::Error::from)? {
        Some(d) => d,
        None => crate::db::datas3ts::insert(&mut *tx, datas3t_name, bucket_name).await.map_err(anyhow::Error::from)?,
    };

    let mut inserted = 0usize;
    let mut max_counter = 0i64;

    for entry in &entries {
        max_counter = max_counter.max(entry.upload_counter as i64);

        let existing = crate::db::dataranges::get_by_exact_bounds(&mut *tx, datas3t.id, entry.first_idx, entry.last_idx)
            .await
            .map_err(anyhow::Error::from)?;
        if existing.is_some() {
            continue;
        }

        let object_keys = crate::keys::build(datas3t_name, entry.first_idx, entry.last_idx, entry.upload_counter);
        let size_bytes = store.head(&object_keys.data).await.map_err(anyhow::Error::from)?.map(|m| m.size as i64).unwrap_or(0);

        crate::db::dataranges::insert(
            &mut *tx,
            datas3t.id,
            &object_keys.data,
            &object_keys.index,
            entry.first_idx,
            entry.last_idx,
            size_bytes,
        )
        .await
        .map_err(anyhow::Error::from)?;
        inserted += 1;
    }

    crate::db::datas3ts::raise_upload_counter_to_at_least(&mut *tx, datas3t.id, max_counter)
        .await
        .map_err(anyhow::Error::from)?;

    tx.commit().await.map_err(anyhow::Error::from)?;
    Ok(inserted)
}
