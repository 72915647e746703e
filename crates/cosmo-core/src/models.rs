//! Core data model for the cosmograph pipeline.
//!
//! Everything the two workers exchange over the job queue, read from the
//! graph/vector stores, or write back onto entities is defined here.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// Re-export the pgvector type so callers don't need a direct dependency.
pub use pgvector::Vector;

// =============================================================================
// ENTITY MODEL
// =============================================================================

/// The closed set of entity kinds in a user's knowledge graph.
///
/// Each kind maps to its own storage table. Adding a kind means adding a
/// variant here and a table name in [`EntityType::table`]; the compiler
/// flags every match that needs updating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A memory fragment captured from conversation or ingestion.
    MemoryUnit,
    /// A distilled concept.
    Concept,
    /// An artifact derived from other entities (summary, insight, ...).
    DerivedArtifact,
    /// A detected community/cluster of related entities.
    Community,
    /// A proactive prompt surfaced to the user.
    ProactivePrompt,
    /// A recorded growth event.
    GrowthEvent,
    /// The user node itself.
    User,
}

impl EntityType {
    /// All entity kinds, in stable declaration order.
    pub const ALL: [EntityType; 7] = [
        EntityType::MemoryUnit,
        EntityType::Concept,
        EntityType::DerivedArtifact,
        EntityType::Community,
        EntityType::ProactivePrompt,
        EntityType::GrowthEvent,
        EntityType::User,
    ];

    /// Stable string form used in queue payloads and the vector index key.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::MemoryUnit => "memory_unit",
            EntityType::Concept => "concept",
            EntityType::DerivedArtifact => "derived_artifact",
            EntityType::Community => "community",
            EntityType::ProactivePrompt => "proactive_prompt",
            EntityType::GrowthEvent => "growth_event",
            EntityType::User => "user",
        }
    }

    /// Storage table holding rows of this kind.
    pub fn table(&self) -> &'static str {
        match self {
            EntityType::MemoryUnit => "memory_units",
            EntityType::Concept => "concepts",
            EntityType::DerivedArtifact => "derived_artifacts",
            EntityType::Community => "communities",
            EntityType::ProactivePrompt => "proactive_prompts",
            EntityType::GrowthEvent => "growth_events",
            EntityType::User => "users",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "memory_unit" => Ok(EntityType::MemoryUnit),
            "concept" => Ok(EntityType::Concept),
            "derived_artifact" => Ok(EntityType::DerivedArtifact),
            "community" => Ok(EntityType::Community),
            "proactive_prompt" => Ok(EntityType::ProactivePrompt),
            "growth_event" => Ok(EntityType::GrowthEvent),
            "user" => Ok(EntityType::User),
            _ => Err(format!("Unknown entity type: {}", s)),
        }
    }
}

/// Typed reference to one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, id: Uuid) -> Self {
        Self { id, entity_type }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.id)
    }
}

/// A 3-D coordinate triple.
///
/// The per-entity position columns are either all set or all null; a
/// half-written triple is an invariant violation, so positions travel
/// through the code as a whole value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coord3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// True when all three components are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// One row of a per-type entity table, as read by the projection worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub entity_type: EntityType,
    pub title: Option<String>,
    pub content: Option<String>,
    /// Salience in `[0, 1]`.
    pub importance: f32,
    pub created_at: DateTime<Utc>,
    /// Spatial position; `None` until the first projection cycle reaches it.
    pub position: Option<Coord3>,
}

// =============================================================================
// GRAPH SNAPSHOT
// =============================================================================

/// A node in a point-in-time graph read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub title: Option<String>,
    pub importance: f32,
    pub created_at: DateTime<Utc>,
    /// Whether the entity already holds a non-null position.
    pub has_position: bool,
}

impl GraphNode {
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.entity_type, self.id)
    }
}

/// A typed edge between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: EntityRef,
    pub target: EntityRef,
    pub relation: String,
    pub weight: f32,
}

/// Point-in-time read of one user's full graph.
///
/// Used only to know which entities and edges exist and their scalar
/// attributes; never persisted by this pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub user_id: Uuid,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphSnapshot {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Edges whose endpoints are both present in the snapshot.
    pub fn consistent_edges(&self) -> Vec<&GraphEdge> {
        let ids: HashSet<Uuid> = self.nodes.iter().map(|n| n.id).collect();
        self.edges
            .iter()
            .filter(|e| ids.contains(&e.source.id) && ids.contains(&e.target.id))
            .collect()
    }
}

// =============================================================================
// QUEUE PAYLOADS
// =============================================================================

/// Payload of a `generate_embedding` job.
///
/// `entity_id` stays a string on the wire: validating it is the embedding
/// worker's first step, before any external call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingJobPayload {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub user_id: Uuid,
    pub text: String,
}

/// What triggered a projection event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionEventKind {
    /// One or a few entities were just created (incremental path).
    NewEntitiesCreated,
    /// A derivation cycle produced a batch of artifacts (bulk path).
    CycleArtifactsCreated,
}

impl fmt::Display for ProjectionEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionEventKind::NewEntitiesCreated => write!(f, "new_entities_created"),
            ProjectionEventKind::CycleArtifactsCreated => write!(f, "cycle_artifacts_created"),
        }
    }
}

/// Wire form of an entity reference inside a projection event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRefWire {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
}

/// Payload of a `project_graph` job. Both event kinds dispatch identically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionEventPayload {
    #[serde(rename = "type")]
    pub kind: ProjectionEventKind,
    pub user_id: Uuid,
    /// Originating subsystem, for logs only (e.g. "ingestion", "insight_cycle").
    pub source: String,
    pub entities: Vec<EntityRefWire>,
    /// Missing-embedding reschedule counter. Independent of the queue's
    /// error-retry counter.
    #[serde(default)]
    pub wait_attempts: u32,
}

impl ProjectionEventPayload {
    /// Copy of this event with the wait counter bumped, for delayed redelivery.
    pub fn next_wait(&self) -> Self {
        let mut next = self.clone();
        next.wait_attempts += 1;
        next
    }
}

// =============================================================================
// PROJECTION
// =============================================================================

/// How a projection cycle computed its coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionMethod {
    /// Full manifold fit; expensive, produces a reusable linear matrix.
    ManifoldLearning,
    /// Application of a previously learned matrix; cheap.
    LinearTransform,
}

impl ProjectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectionMethod::ManifoldLearning => "manifold_learning",
            ProjectionMethod::LinearTransform => "linear_transform",
        }
    }
}

impl fmt::Display for ProjectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The current linear mapping for one user, learned by the latest manifold
/// fit. Exactly one current record exists per user; a new fit supersedes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationMatrix {
    pub user_id: Uuid,
    /// Row-major `d x 3` projection matrix.
    pub matrix: Vec<Vec<f32>>,
    /// Hyperparameters the fit ran with, for audit.
    pub parameters: JsonValue,
    pub learned_at: DateTime<Utc>,
    /// Node count of the snapshot the fit ran over.
    pub node_count: i32,
}

impl TransformationMatrix {
    /// Input dimensionality this matrix projects from.
    pub fn input_dimension(&self) -> usize {
        self.matrix.len()
    }
}

/// Result of a manifold-learning fit from the reduction service.
#[derive(Debug, Clone)]
pub struct ManifoldFit {
    pub coordinates: Vec<Coord3>,
    pub matrix: Vec<Vec<f32>>,
    pub parameters: JsonValue,
}

// =============================================================================
// JOB QUEUE
// =============================================================================

/// Status of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    /// Permanent input failure; acknowledged, never retried.
    Failed,
    /// Transient-failure retries exhausted; dead-lettered.
    Dead,
}

/// Type of job to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Turn an entity's text into a vector and upsert it (Component A).
    GenerateEmbedding,
    /// Recompute 3-D positions for changed entities (Component B).
    ProjectGraph,
}

impl JobType {
    /// Default queue priority for this job type (higher runs first).
    pub fn default_priority(&self) -> i32 {
        match self {
            JobType::GenerateEmbedding => crate::defaults::EMBEDDING_PRIORITY,
            JobType::ProjectGraph => crate::defaults::PROJECTION_PRIORITY,
        }
    }
}

/// A row in the job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    /// Owning user; per-user serialization keys off this.
    pub user_id: Option<Uuid>,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub payload: Option<JsonValue>,
    pub result: Option<JsonValue>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    /// Earliest claimable time; delayed redelivery moves this forward.
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Queue statistics summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub running: i64,
    pub completed_last_hour: i64,
    pub dead_last_hour: i64,
    pub total: i64,
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Outbound completion message published after a projection cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatesUpdated {
    pub user_id: Uuid,
    /// Entities whose positions were actually written this cycle.
    pub node_count: i64,
    pub method: ProjectionMethod,
    pub is_incremental: bool,
}

impl CoordinatesUpdated {
    /// Event-type discriminator used on the notification queue.
    pub const EVENT_TYPE: &'static str = "coordinates_updated";
}
