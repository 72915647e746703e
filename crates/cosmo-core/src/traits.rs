//! Core traits for cosmograph abstractions.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy, enabling pluggable backends and testability. `cosmo-db` provides
//! the PostgreSQL implementations; `cosmo-inference` the HTTP backends; the
//! handler tests use in-memory mocks.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// ENTITY STORE
// =============================================================================

/// Store of per-type entity tables. The projection worker is the only writer
/// of the position columns.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Fetch a single entity row.
    async fn fetch(&self, user_id: Uuid, entity: EntityRef) -> Result<Option<Entity>>;

    /// Count the user's entities currently holding a non-null position.
    async fn count_positioned(&self, user_id: Uuid) -> Result<i64>;

    /// Of the given refs, return those that currently have no position.
    async fn unpositioned(&self, user_id: Uuid, refs: &[EntityRef]) -> Result<Vec<EntityRef>>;

    /// Write all three position columns of one entity in a single statement.
    ///
    /// Atomic per entity: either the full `(x, y, z)` triple lands or the row
    /// is untouched.
    async fn update_position(&self, user_id: Uuid, entity: EntityRef, coord: Coord3)
        -> Result<()>;
}

// =============================================================================
// VECTOR INDEX
// =============================================================================

/// Key-addressable vector store. Keys are `(entity_type, entity_id, user_id)`.
///
/// A vector's presence is the only freshness signal consumers may rely on;
/// its age is never interpreted.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Upsert a vector, overwriting any prior record under the same key.
    async fn upsert(
        &self,
        user_id: Uuid,
        entity: EntityRef,
        vector: &Vector,
        model: &str,
    ) -> Result<()>;

    /// Point lookup by key.
    async fn get(&self, user_id: Uuid, entity: EntityRef) -> Result<Option<Vector>>;

    /// Batch lookup; absent keys are simply missing from the result.
    async fn get_many(
        &self,
        user_id: Uuid,
        refs: &[EntityRef],
    ) -> Result<Vec<(EntityRef, Vector)>>;

    /// Of the given refs, return those with no stored vector.
    async fn missing(&self, user_id: Uuid, refs: &[EntityRef]) -> Result<Vec<EntityRef>>;

    /// All vectors for one user (manifold-learning input).
    async fn all_for_user(&self, user_id: Uuid) -> Result<Vec<(EntityRef, Vector)>>;

    /// Approximate nearest neighbors by cosine distance.
    async fn find_similar(
        &self,
        user_id: Uuid,
        query: &Vector,
        limit: i64,
    ) -> Result<Vec<(EntityRef, f32)>>;
}

// =============================================================================
// GRAPH STORE
// =============================================================================

/// Read access to a user's full graph (nodes and typed edges).
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Point-in-time snapshot of the user's entities and edges.
    async fn snapshot(&self, user_id: Uuid) -> Result<GraphSnapshot>;
}

// =============================================================================
// TRANSFORMATION MATRIX STORE
// =============================================================================

/// Store of the current per-user linear transformation matrix.
#[async_trait]
pub trait MatrixStore: Send + Sync {
    /// The user's current matrix, if any manifold fit has run.
    async fn current(&self, user_id: Uuid) -> Result<Option<TransformationMatrix>>;

    /// Replace the user's current matrix (last-write-wins).
    async fn replace(&self, matrix: &TransformationMatrix) -> Result<()>;
}

// =============================================================================
// JOB QUEUE
// =============================================================================

/// Repository for job queue operations.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Queue a new job, claimable immediately.
    async fn queue(
        &self,
        user_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid>;

    /// Queue a job that becomes claimable only after `delay`.
    async fn queue_delayed(
        &self,
        user_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
        delay: Duration,
    ) -> Result<Uuid>;

    /// Queue a job unless the same user already has one of this type
    /// pending or running. Returns `None` when deduplicated away.
    async fn queue_deduplicated(
        &self,
        user_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Option<Uuid>>;

    /// Claim the next due pending job whose type is in `job_types`.
    /// An empty slice means "claim any type".
    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>>;

    /// Mark a job as completed.
    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()>;

    /// Record a transient failure: redeliver with exponential backoff until
    /// `max_retries`, then dead-letter.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Record a permanent input failure: acknowledged, never retried.
    async fn fail_permanent(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Push a running job back to pending with a new `run_at` and optionally
    /// a replacement payload. Does not consume a retry.
    async fn reschedule(
        &self,
        job_id: Uuid,
        delay: Duration,
        payload: Option<JsonValue>,
    ) -> Result<()>;

    /// Get job by ID.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Get pending jobs count.
    async fn pending_count(&self) -> Result<i64>;

    /// Queue statistics summary.
    async fn queue_stats(&self) -> Result<QueueStats>;

    /// List recent jobs, newest first.
    async fn list_recent(&self, limit: i64) -> Result<Vec<Job>>;
}

// =============================================================================
// NOTIFICATION OUTBOX
// =============================================================================

/// Durable outbound notification queue (consumed downstream, out of scope).
#[async_trait]
pub trait NotificationOutbox: Send + Sync {
    /// Append one outbound message. Returns the message id.
    async fn publish(&self, user_id: Uuid, event_type: &str, payload: JsonValue) -> Result<Uuid>;
}

// =============================================================================
// INFERENCE BACKENDS
// =============================================================================

/// Text-to-vector backend.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for a batch of texts, one vector per input.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Vector dimensionality this backend produces.
    fn dimension(&self) -> usize;

    /// Model identifier, recorded alongside stored vectors.
    fn model_name(&self) -> &str;
}

/// Dimension-reduction backend (consumed as a remote black box).
#[async_trait]
pub trait ReductionBackend: Send + Sync {
    /// Full manifold fit: 3-D coordinates for every input vector plus a
    /// reusable linear transformation matrix.
    async fn fit(&self, vectors: &[Vec<f32>]) -> Result<ManifoldFit>;

    /// Apply a previously learned matrix to new vectors.
    async fn transform(&self, vectors: &[Vec<f32>], matrix: &[Vec<f32>]) -> Result<Vec<Coord3>>;
}
