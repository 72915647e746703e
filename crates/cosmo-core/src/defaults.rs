//! Centralized default constants for the cosmograph system.
//!
//! **This module is the single source of truth** for all shared default
//! values. All crates and the worker daemon reference these constants instead
//! of defining their own magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Default embedding backend base URL.
pub const EMBED_BASE: &str = "http://127.0.0.1:11434";

/// Timeout for embedding requests in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// DIMENSION REDUCTION
// =============================================================================

/// Default dimension-reduction service base URL.
pub const REDUCER_BASE: &str = "http://127.0.0.1:8100";

/// Output dimensionality of every projection. The cosmos is 3-D.
pub const TARGET_DIMENSIONS: usize = 3;

/// Timeout for a full manifold fit in seconds. Fits over thousands of
/// vectors are legitimately slow.
pub const REDUCE_FIT_TIMEOUT_SECS: u64 = 120;

/// Timeout for a linear transform in seconds.
pub const REDUCE_TRANSFORM_TIMEOUT_SECS: u64 = 30;

/// Timeout for the reduction-service health probe in seconds.
pub const REDUCE_HEALTH_TIMEOUT_SECS: u64 = 5;

/// Default UMAP neighborhood size passed to the fit endpoint.
pub const MANIFOLD_N_NEIGHBORS: u32 = 15;

/// Default UMAP minimum distance passed to the fit endpoint.
pub const MANIFOLD_MIN_DIST: f32 = 0.1;

// =============================================================================
// PROJECTION DISPATCH
// =============================================================================

/// A manifold fit runs when the node population is an exact multiple of this
/// interval (and within the band below). Every other change re-projects
/// linearly.
pub const LEARNING_INTERVAL: usize = 100;

/// Minimum node count eligible for manifold learning. Below this a fit is
/// numerically meaningless.
pub const LEARNING_MIN_NODES: usize = 10;

/// Maximum node count eligible for manifold learning.
pub const LEARNING_MAX_NODES: usize = 10_000;

/// Maximum delayed redeliveries while waiting for missing embeddings.
pub const WAIT_RETRY_LIMIT: u32 = 5;

/// Fixed delay between missing-embedding redeliveries, in milliseconds.
pub const WAIT_RETRY_DELAY_MS: u64 = 3_000;

/// Radius of the golden-ratio spiral used for fallback coordinates.
pub const FALLBACK_RADIUS: f64 = 50.0;

// =============================================================================
// JOB PROCESSING
// =============================================================================

/// Default maximum retry count for transiently failing jobs.
pub const JOB_MAX_RETRIES: i32 = 3;

/// Base delay for exponential retry backoff, in milliseconds.
/// Attempt `n` is redelivered after `base * 2^n`.
pub const JOB_RETRY_BACKOFF_BASE_MS: u64 = 5_000;

/// Default job worker poll interval in milliseconds when the queue is empty.
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Default maximum concurrent jobs per worker. Single digits: the external
/// services are the bottleneck, not CPU.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Default job execution timeout in seconds (5 minutes).
pub const JOB_TIMEOUT_SECS: u64 = 300;

/// Default queue priority for embedding jobs (higher runs first).
pub const EMBEDDING_PRIORITY: i32 = 5;

/// Default queue priority for projection jobs. Below embeddings so vectors
/// land before the projection worker starts waiting on them.
pub const PROJECTION_PRIORITY: i32 = 3;

// =============================================================================
// EVENTS
// =============================================================================

/// Default event bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;
