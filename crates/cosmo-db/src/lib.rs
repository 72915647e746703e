//! # cosmo-db
//!
//! PostgreSQL storage layer for cosmograph.
//!
//! This crate provides:
//! - Connection pool management
//! - The per-type entity store (position writes)
//! - The pgvector-backed vector index
//! - Graph snapshot reads
//! - The per-user transformation matrix store
//! - The durable job queue and notification outbox
//!
//! ## Example
//!
//! ```rust,ignore
//! use cosmo_db::Database;
//! use cosmo_core::{JobRepository, JobType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/cosmograph").await?;
//!
//!     let job_id = db.jobs.queue(None, JobType::ProjectGraph, 3, None).await?;
//!     println!("Queued: {}", job_id);
//!     Ok(())
//! }
//! ```

pub mod entities;
pub mod graph;
pub mod jobs;
pub mod matrices;
pub mod notifications;
pub mod pool;
pub mod vectors;

// Re-export core types
pub use cosmo_core::*;

// Re-export repository implementations
pub use entities::PgEntityStore;
pub use graph::PgGraphStore;
pub use jobs::PgJobRepository;
pub use matrices::PgMatrixStore;
pub use notifications::PgNotificationOutbox;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use vectors::PgVectorIndex;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Per-type entity store (position writes).
    pub entities: PgEntityStore,
    /// Vector index keyed by (entity_type, entity_id, user_id).
    pub vectors: PgVectorIndex,
    /// Graph snapshot reads.
    pub graph: PgGraphStore,
    /// Per-user transformation matrix store.
    pub matrices: PgMatrixStore,
    /// Job queue for the two workers.
    pub jobs: PgJobRepository,
    /// Outbound notification queue.
    pub notifications: PgNotificationOutbox,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            entities: PgEntityStore::new(pool.clone()),
            vectors: PgVectorIndex::new(pool.clone()),
            graph: PgGraphStore::new(pool.clone()),
            matrices: PgMatrixStore::new(pool.clone()),
            jobs: PgJobRepository::new(pool.clone()),
            notifications: PgNotificationOutbox::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
