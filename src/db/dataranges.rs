use sqlx::PgExecutor;

use super::models::Datarange;

pub async fn insert<'c>(
    exec: impl PgExecutor<'c>,
    datas3t_id: i64,
    data_object_key: &str,
    index_object_key: &str,
    min_key: i64,
    max_key: i64,
    size_bytes: i64,
) -> sqlx::Result<Datarange> {
    sqlx::query_as::<_, Datarange>(
        "INSERT INTO dataranges (datas3t_id, data_object_key, index_object_key, min_key, max_key, size_bytes) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id, datas3t_id, data_object_key, index_object_key, min_key, max_key, size_bytes",
    )
    .bind(datas3t_id)
    .bind(data_object_key)
    .bind(index_object_key)
    .bind(min_key)
    .bind(max_key)
    .bind(size_bytes)
    .fetch_one(exec)
    .await
}

pub async fn list_for_datas3t<'c>(exec: impl PgExecutor<'c>, datas3t_id: i64) -> sqlx::Result<Vec<Datarange>> {
    sqlx::query_as::<_, Datarange>(
        "SELECT id, datas3t_id, data_object_key, index_object_key, min_key, max_key, size_bytes \
         FROM dataranges WHERE datas3t_id = $1 ORDER BY min_key",
    )
    .bind(datas3t_id)
    .fetch_all(exec)
    .await
}

/// Dataranges whose `[min,max]` intersects `[first,last]`, ordered by
/// `min_key` -- used by the download planner and the aggregate
/// coordinator's coverage check.
pub async fn intersecting<'c>(exec: impl PgExecutor<'c>, datas3t_id: i64, first: i64, last: i64) -> sqlx::Result<Vec<Datarange>> {
    sqlx::query_as::<_, Datarange>(
        "SELECT id, datas3t_id, data_object_key, index_object_key, min_key, max_key, size_bytes \
         FROM dataranges WHERE datas3t_id = $1 AND min_key <= $3 AND max_key >= $2 ORDER BY min_key",
    )
    .bind(datas3t_id)
    .bind(first)
    .bind(last)
    .fetch_all(exec)
    .await
}

pub async fn get_by_exact_bounds<'c>(exec: impl PgExecutor<'c>, datas3t_id: i64, min_key: i64, max_key: i64) -> sqlx::Result<Option<Datarange>> {
    sqlx::query_as::<_, Datarange>(
        "SELECT id, datas3t_id, data_object_key, index_object_key, min_key, max_key, size_bytes \
         FROM dataranges WHERE datas3t_id = $1 AND min_key = $2 AND max_key = $3",
    )
    .bind(datas3t_id)
    .bind(min_key)
    .bind(max_key)
    .fetch_optional(exec)
    .await
}

pub async fn delete_by_id<'c>(exec: impl PgExecutor<'c>, id: i64) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM dataranges WHERE id = $1").bind(id).execute(exec).await?;
    Ok(result.rows_affected())
}

pub async fn delete_by_ids<'c>(exec: impl PgExecutor<'c>, ids: &[i64]) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM dataranges WHERE id = ANY($1)").bind(ids).execute(exec).await?;
    Ok(result.rows_affected())
}

/// Closed-interval overlap test, used consistently everywhere in this
/// crate: two closed intervals `[a,b]` and `[c,d]` overlap iff
/// `a <= d && c <= b`.
pub async fn overlaps_any<'c>(exec: impl PgExecutor<'c>, datas3t_id: i64, min_key: i64, max_key: i64) -> sqlx::Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM dataranges WHERE datas3t_id = $1 AND min_key <= $3 AND max_key >= $2",
    )
    .bind(datas3t_id)
    .bind(min_key)
    .bind(max_key)
    .fetch_one(exec)
    .await?;
    Ok(count > 0)
}

#[derive(Debug, thiserror::Error)]
pub enum CoverageError {
    #[error("at least two dataranges must cover [{first},{last}], found {found}")]
    InsufficientDataranges { first: i64, last: i64, found: usize },
    #[error("[{first},{last}] is not fully covered by existing dataranges: {detail}")]
    RangeNotFullyCovered { first: i64, last: i64, detail: String },
}

/// Verifies that the union of committed dataranges intersecting
/// `[first,last]` exactly covers it with no gap and no partial overlap,
/// and that at least two sources participate. Returns the ordered source
/// rows on success.
pub async fn assert_exact_coverage<'c>(exec: impl PgExecutor<'c>, datas3t_id: i64, first: i64, last: i64) -> Result<Vec<Datarange>, CoverageError> {
    let sources = intersecting(exec, datas3t_id, first, last)
        .await
        .map_err(|e| CoverageError::RangeNotFullyCovered {
            first,
            last,
            detail: format!("query failed: {e}"),
        })?;

    if sources.len() < 2 {
        return Err(CoverageError::InsufficientDataranges {
            first,
            last,
            found: sources.len(),
        });
    }

    let mut expected_next = first;
    for source in &sources {
        if source.min_key != expected_next {
            return Err(CoverageError::RangeNotFullyCovered {
                first,
                last,
                detail: format!("gap or overlap before datarange [{},{}]", source.min_key, source.max_key),
            });
        }
        expected_next = source.max_key + 1;
    }

    if expected_next != last + 1 {
        return Err(CoverageError::RangeNotFullyCovered {
            first,
            last,
            detail: format!("coverage ends at {} but [{first},{last}] requires {last}", expected_next - 1),
        });
    }

    Ok(sources)
}

#[cfg(test)]
mod tests {
    // The overlap/coverage predicates are pure SQL and exercised by the
    // integration tests in tests/aggregate_coordinator.rs and
    // tests/upload_coordinator.rs against a real Postgres instance; no
    // meaningful logic here is testable without a database connection.
}
