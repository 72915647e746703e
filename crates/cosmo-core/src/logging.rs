//! Structured logging schema and field name constants for cosmograph.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (vectors, coordinates) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "db", "inference", "reduction", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "embedding", "projection", "pool", "worker"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "execute", "claim_next", "fit", "transform"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// User UUID whose graph is being operated on.
pub const USER_ID: &str = "user_id";

/// Entity UUID being operated on.
pub const ENTITY_ID: &str = "entity_id";

/// Entity type enum variant.
pub const ENTITY_TYPE: &str = "entity_type";

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Job type enum variant.
pub const JOB_TYPE: &str = "job_type";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of graph nodes handled by a projection cycle.
pub const NODE_COUNT: &str = "node_count";

/// Number of vectors sent to the reduction service.
pub const VECTOR_COUNT: &str = "vector_count";

/// Vector dimensionality.
pub const DIMENSION: &str = "dimension";

// ─── Projection fields ─────────────────────────────────────────────────────

/// Projection method chosen ("manifold_learning", "linear_transform").
pub const METHOD: &str = "method";

/// A degraded path was taken (spiral coordinates, pseudo-vectors).
pub const FALLBACK: &str = "fallback";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for embedding.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";
