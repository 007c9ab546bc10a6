//! The deletion worker: a periodic drain of the deferred-deletion queue.
//! Each tick fetches due rows and issues an HTTP DELETE to each stored
//! presigned URL; success or "not found" retires the row, anything else
//! is left for the next tick.

use std::time::Duration;

use chrono::Utc;
use reqwest::StatusCode;
use sqlx::PgPool;
use tokio::sync::watch;

const BATCH_SIZE: i64 = 100;
const PER_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs until `shutdown` fires, ticking every `interval`.
#[tracing::instrument(skip(pool, shutdown))]
pub async fn run(pool: PgPool, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let client = reqwest::Client::builder().timeout(PER_CALL_TIMEOUT).build().expect("reqwest client builds");
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = tick(&pool, &client).await {
                    crate::error::log_err(e.as_ref());
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("deletion worker shutting down");
                    return;
                }
            }
        }
    }
}

async fn tick(pool: &PgPool, client: &reqwest::Client) -> anyhow::Result<()> {
    let due = crate::db::deletions::fetch_due(pool, Utc::now(), BATCH_SIZE).await?;
    if due.is_empty() {
        return Ok(());
    }
    tracing::debug!(count = due.len(), "deletion worker processing due rows");

    for row in due {
        match client.delete(&row.presigned_delete_url).send().await {
            Ok(resp) if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND => {
                if let Err(e) = crate::db::deletions::delete_row(pool, row.id).await {
                    tracing::warn!(id = row.id, error = %e, "failed to retire deletion-queue row after successful DELETE");
                }
            }
            Ok(resp) => {
                tracing::debug!(id = row.id, status = %resp.status(), "deletion retryable, leaving row for next tick");
            }
            Err(e) => {
                tracing::debug!(id = row.id, error = %e, "deletion request failed, leaving row for next tick");
            }
        }
    }

    Ok(())
}
