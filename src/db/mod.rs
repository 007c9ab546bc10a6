//! The catalog store: a relational database holding
//! buckets, datas3ts, dataranges, in-flight upload/aggregate records, and
//! the deferred-deletion queue. All multi-row mutations run inside a
//! single transaction; uniqueness and overlap are enforced by queries,
//! not application memory.

pub mod aggregates;
pub mod buckets;
pub mod dataranges;
pub mod datas3ts;
pub mod deletions;
pub mod models;
pub mod uploads;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

#[derive(Clone)]
pub struct Catalog {
    pool: PgPool,
}

impl Catalog {
    #[tracing::instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new().max_connections(20).connect(database_url).await?;

        tracing::info!("starting database migration");
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("finished database migration");

        Ok(Self { pool })
    }

    /// Wraps an already-connected, already-migrated pool. Used by
    /// integration tests that set up their own ephemeral database via
    /// `sqlx::test`.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> sqlx::Result<sqlx::Transaction<'_, sqlx::Postgres>> {
        self.pool.begin().await
    }

    /// A transaction at `SERIALIZABLE` isolation, used by the commit-time
    /// overlap/coverage re-checks in the upload and aggregate
    /// coordinators: Complete is linearized by the database, first
    /// committer wins and others convert to failure-cleanup.
    pub async fn begin_serializable(&self) -> sqlx::Result<sqlx::Transaction<'_, sqlx::Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE").execute(&mut *tx).await?;
        Ok(tx)
    }
}
