//! # cosmo-jobs
//!
//! Background pipeline workers for cosmograph.
//!
//! This crate provides:
//! - The durable job worker loop with bounded concurrency
//! - The embedding generation handler (entity text → vector index)
//! - The spatial projection handler (vectors + graph → 3-D positions)
//! - Per-user mutual exclusion and deterministic degradation fallbacks
//!
//! ## Example
//!
//! ```ignore
//! use cosmo_jobs::{WorkerBuilder, WorkerConfig, EmbeddingHandler, ProjectionHandler};
//! use cosmo_db::Database;
//!
//! let db = Database::connect("postgres://...").await?;
//!
//! let worker = WorkerBuilder::for_database(&db)
//!     .with_config(WorkerConfig::from_env())
//!     .with_handler(EmbeddingHandler::new(vectors, embedder))
//!     .with_handler(projection_handler)
//!     .build()
//!     .await;
//!
//! let handle = worker.start();
//! // ...
//! handle.shutdown().await?;
//! ```

pub mod config;
pub mod embedding;
pub mod fallback;
pub mod handler;
pub mod pipeline;
pub mod projection;
pub mod user_lock;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

// Re-export core types
pub use cosmo_core::*;

pub use config::ProjectionConfig;
pub use embedding::EmbeddingHandler;
pub use fallback::{pseudo_vector, spiral_coordinates};
pub use handler::{JobContext, JobHandler, JobResult, NoOpHandler};
pub use pipeline::{enqueue_embedding, enqueue_entity_pipeline, enqueue_projection};
pub use projection::{select_method, ProjectionHandler};
pub use user_lock::UserLocks;
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};
