//! Spatial projection worker (Component B).
//!
//! Consumes `project_graph` events and drives the dispatch state machine:
//!
//! ```text
//! AWAITING_EMBEDDINGS → {LEARNING, TRANSFORMING} → PERSISTING → NOTIFYING → DONE
//! ```
//!
//! LEARNING runs the expensive manifold fit over the full snapshot and
//! replaces the user's transformation matrix; TRANSFORMING applies the stored
//! matrix to just the event's entities. Every external failure degrades to a
//! deterministic fallback instead of stalling the cosmos view.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use cosmo_core::{
    CoordinatesUpdated, EntityRef, EntityStore, EventBus, GraphStore, JobType, MatrixStore,
    NotificationOutbox, PipelineEvent, ProjectionEventPayload, ProjectionMethod,
    ReductionBackend, Result, TransformationMatrix, VectorIndex,
};
use cosmo_db::Database;

use crate::config::ProjectionConfig;
use crate::fallback::{pseudo_vector, spiral_coordinates};
use crate::handler::{JobContext, JobHandler, JobResult};
use crate::user_lock::UserLocks;

/// Pick the projection method for a node population.
///
/// Pure function of the count and configuration: LEARNING iff the population
/// sits inside the eligibility band *and* on an exact interval milestone.
/// This amortizes the expensive fit over regular population milestones while
/// every other change takes the cheap transform.
pub fn select_method(total_nodes: usize, config: &ProjectionConfig) -> ProjectionMethod {
    let in_band =
        total_nodes >= config.min_learning_nodes && total_nodes <= config.max_learning_nodes;
    if in_band && config.learning_interval > 0 && total_nodes % config.learning_interval == 0 {
        ProjectionMethod::ManifoldLearning
    } else {
        ProjectionMethod::LinearTransform
    }
}

/// Coordinates computed by one pass, before persistence.
struct PassOutcome {
    updates: Vec<(EntityRef, cosmo_core::Coord3)>,
    /// True when a fallback (spiral layout) stood in for the reduction
    /// service.
    degraded: bool,
}

/// Handler for spatial projection jobs.
pub struct ProjectionHandler {
    entities: Arc<dyn EntityStore>,
    vectors: Arc<dyn VectorIndex>,
    graph: Arc<dyn GraphStore>,
    matrices: Arc<dyn MatrixStore>,
    outbox: Arc<dyn NotificationOutbox>,
    reducer: Arc<dyn ReductionBackend>,
    locks: UserLocks,
    config: ProjectionConfig,
    events: EventBus,
}

impl ProjectionHandler {
    /// Create a handler over the database's stores.
    pub fn new(
        db: &Database,
        reducer: Arc<dyn ReductionBackend>,
        config: ProjectionConfig,
        locks: UserLocks,
        events: EventBus,
    ) -> Self {
        Self::with_stores(
            Arc::new(db.entities.clone()),
            Arc::new(db.vectors.clone()),
            Arc::new(db.graph.clone()),
            Arc::new(db.matrices.clone()),
            Arc::new(db.notifications.clone()),
            reducer,
            config,
            locks,
            events,
        )
    }

    /// Create a handler over explicit store implementations.
    #[allow(clippy::too_many_arguments)]
    pub fn with_stores(
        entities: Arc<dyn EntityStore>,
        vectors: Arc<dyn VectorIndex>,
        graph: Arc<dyn GraphStore>,
        matrices: Arc<dyn MatrixStore>,
        outbox: Arc<dyn NotificationOutbox>,
        reducer: Arc<dyn ReductionBackend>,
        config: ProjectionConfig,
        locks: UserLocks,
        events: EventBus,
    ) -> Self {
        Self {
            entities,
            vectors,
            graph,
            matrices,
            outbox,
            reducer,
            locks,
            config,
            events,
        }
    }

    /// Resolve wire refs, dropping malformed ids and duplicates.
    ///
    /// A dropped entity simply keeps its prior (or null) position until a
    /// future cycle names it again.
    fn resolve_refs(event: &ProjectionEventPayload) -> Vec<EntityRef> {
        let mut seen = HashSet::new();
        let mut refs = Vec::with_capacity(event.entities.len());
        for wire in &event.entities {
            match Uuid::parse_str(&wire.id) {
                Ok(id) => {
                    let entity = EntityRef::new(wire.entity_type, id);
                    if seen.insert(entity) {
                        refs.push(entity);
                    }
                }
                Err(_) => {
                    warn!(
                        entity_id = %wire.id,
                        entity_type = %wire.entity_type,
                        "Dropping event entity with malformed id"
                    );
                }
            }
        }
        refs
    }

    /// Full-snapshot manifold fit. Writes a new matrix only on success.
    async fn learning_pass(&self, user_id: Uuid) -> Result<PassOutcome> {
        let snapshot = self.graph.snapshot(user_id).await?;
        if snapshot.nodes.is_empty() {
            debug!(user_id = %user_id, "Empty snapshot; nothing to learn");
            return Ok(PassOutcome {
                updates: Vec::new(),
                degraded: false,
            });
        }

        let stored: HashMap<EntityRef, cosmo_core::Vector> = self
            .vectors
            .all_for_user(user_id)
            .await?
            .into_iter()
            .collect();

        let dimension = stored
            .values()
            .next()
            .map(|v| v.as_slice().len())
            .unwrap_or(self.config.embedding_dimension);

        let refs: Vec<EntityRef> = snapshot.nodes.iter().map(|n| n.entity_ref()).collect();
        let mut inputs = Vec::with_capacity(refs.len());
        let mut synthesized = 0usize;
        for r in &refs {
            match stored.get(r) {
                Some(v) => inputs.push(v.as_slice().to_vec()),
                None => {
                    synthesized += 1;
                    inputs.push(pseudo_vector(r.id, dimension));
                }
            }
        }
        if synthesized > 0 {
            warn!(
                user_id = %user_id,
                synthesized,
                fallback = true,
                "Synthesized pseudo-vectors for unembedded entities"
            );
        }

        match self.reducer.fit(&inputs).await {
            Ok(fit) => {
                // A successful fit supersedes the previous matrix.
                let record = TransformationMatrix {
                    user_id,
                    matrix: fit.matrix,
                    parameters: fit.parameters,
                    learned_at: Utc::now(),
                    node_count: refs.len() as i32,
                };
                self.matrices.replace(&record).await?;

                Ok(PassOutcome {
                    updates: refs.into_iter().zip(fit.coordinates).collect(),
                    degraded: false,
                })
            }
            Err(e) => {
                // Keep the prior matrix; a later healthy fit supersedes it.
                warn!(
                    user_id = %user_id,
                    error = %e,
                    fallback = true,
                    "Manifold fit failed; laying out snapshot on spiral"
                );
                let coords = spiral_coordinates(refs.len());
                Ok(PassOutcome {
                    updates: refs.into_iter().zip(coords).collect(),
                    degraded: true,
                })
            }
        }
    }

    /// Linear re-projection of just the event's entities.
    async fn transform_pass(
        &self,
        user_id: Uuid,
        refs: &[EntityRef],
        matrix: &TransformationMatrix,
    ) -> Result<PassOutcome> {
        if refs.is_empty() {
            return Ok(PassOutcome {
                updates: Vec::new(),
                degraded: false,
            });
        }

        let found: HashMap<EntityRef, cosmo_core::Vector> = self
            .vectors
            .get_many(user_id, refs)
            .await?
            .into_iter()
            .collect();

        let dimension = match matrix.input_dimension() {
            0 => self.config.embedding_dimension,
            d => d,
        };

        let mut inputs = Vec::with_capacity(refs.len());
        let mut synthesized = 0usize;
        for r in refs {
            match found.get(r) {
                Some(v) => inputs.push(v.as_slice().to_vec()),
                None => {
                    synthesized += 1;
                    inputs.push(pseudo_vector(r.id, dimension));
                }
            }
        }
        if synthesized > 0 {
            warn!(
                user_id = %user_id,
                synthesized,
                fallback = true,
                "Synthesized pseudo-vectors for unembedded entities"
            );
        }

        match self.reducer.transform(&inputs, &matrix.matrix).await {
            Ok(coords) => Ok(PassOutcome {
                updates: refs.iter().copied().zip(coords).collect(),
                degraded: false,
            }),
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    error = %e,
                    fallback = true,
                    "Linear transform failed; laying out batch on spiral"
                );
                let coords = spiral_coordinates(refs.len());
                Ok(PassOutcome {
                    updates: refs.iter().copied().zip(coords).collect(),
                    degraded: true,
                })
            }
        }
    }
}

#[async_trait]
impl JobHandler for ProjectionHandler {
    fn job_type(&self) -> JobType {
        JobType::ProjectGraph
    }

    #[instrument(
        skip(self, ctx),
        fields(subsystem = "jobs", component = "projection", op = "execute")
    )]
    async fn execute(&self, ctx: JobContext) -> JobResult {
        let start = Instant::now();

        let event: ProjectionEventPayload = match ctx.payload() {
            Some(raw) => match serde_json::from_value(raw.clone()) {
                Ok(e) => e,
                Err(e) => return JobResult::Fatal(format!("Unparseable event payload: {}", e)),
            },
            None => return JobResult::Fatal("No event payload provided".into()),
        };
        let user_id = event.user_id;

        // LEARNING and TRANSFORMING for the same user must not race on the
        // matrix record; everything below runs under the per-user lock.
        let _guard = self.locks.lock(user_id).await;

        let refs = Self::resolve_refs(&event);

        // ── AWAITING_EMBEDDINGS ────────────────────────────────────────────
        ctx.report_progress(10, Some("Checking embedding availability..."));
        let missing = match self.vectors.missing(user_id, &refs).await {
            Ok(m) => m,
            Err(e) => return JobResult::Failed(format!("Vector probe failed: {}", e)),
        };

        if !missing.is_empty() {
            if event.wait_attempts < self.config.wait_retry_limit {
                debug!(
                    user_id = %user_id,
                    missing_count = missing.len(),
                    wait_attempts = event.wait_attempts,
                    "Embeddings not ready; scheduling delayed redelivery"
                );
                let next = event.next_wait();
                let payload = match serde_json::to_value(&next) {
                    Ok(v) => v,
                    Err(e) => return JobResult::Fatal(format!("Payload re-encoding failed: {}", e)),
                };
                return JobResult::Reschedule {
                    delay: self.config.wait_retry_delay,
                    payload: Some(payload),
                };
            }
            warn!(
                user_id = %user_id,
                missing_count = missing.len(),
                fallback = true,
                "Wait ceiling reached; proceeding with fallback vectors"
            );
        }

        // ── Mode decision ──────────────────────────────────────────────────
        let positioned = match self.entities.count_positioned(user_id).await {
            Ok(n) => n,
            Err(e) => return JobResult::Failed(format!("Positioned count failed: {}", e)),
        };
        let arriving = match self.entities.unpositioned(user_id, &refs).await {
            Ok(a) => a,
            Err(e) => return JobResult::Failed(format!("Arrival probe failed: {}", e)),
        };
        let total_nodes = positioned as usize + arriving.len();
        let mut method = select_method(total_nodes, &self.config);

        debug!(
            user_id = %user_id,
            total_nodes,
            method = %method,
            "Projection mode selected"
        );
        ctx.report_progress(25, Some("Projection mode selected"));

        // ── LEARNING / TRANSFORMING ────────────────────────────────────────
        let pass = match method {
            ProjectionMethod::LinearTransform => {
                let current = match self.matrices.current(user_id).await {
                    Ok(m) => m,
                    Err(e) => return JobResult::Failed(format!("Matrix lookup failed: {}", e)),
                };
                match current {
                    Some(matrix) => self.transform_pass(user_id, &refs, &matrix).await,
                    None => {
                        // Cold start: nothing learned yet for this user.
                        info!(
                            user_id = %user_id,
                            "No stored transformation matrix; falling back to manifold learning"
                        );
                        method = ProjectionMethod::ManifoldLearning;
                        self.learning_pass(user_id).await
                    }
                }
            }
            ProjectionMethod::ManifoldLearning => self.learning_pass(user_id).await,
        };

        let outcome = match pass {
            Ok(o) => o,
            Err(e) => return JobResult::Failed(e.to_string()),
        };
        let is_incremental = method == ProjectionMethod::LinearTransform;

        // ── PERSISTING ─────────────────────────────────────────────────────
        ctx.report_progress(75, Some("Persisting coordinates..."));
        let mut written = 0i64;
        let mut skipped = 0usize;
        for (entity, coord) in &outcome.updates {
            if !coord.is_finite() {
                skipped += 1;
                warn!(entity = %entity, "Skipping non-finite coordinate triple");
                continue;
            }
            match self.entities.update_position(user_id, *entity, *coord).await {
                Ok(()) => written += 1,
                Err(e) => {
                    // Independent across entities: log and move on.
                    skipped += 1;
                    warn!(
                        entity = %entity,
                        error = %e,
                        "Position write failed; entity keeps its prior position"
                    );
                }
            }
        }

        // ── NOTIFYING (best effort) ────────────────────────────────────────
        let message = CoordinatesUpdated {
            user_id,
            node_count: written,
            method,
            is_incremental,
        };
        match serde_json::to_value(&message) {
            Ok(payload) => {
                if let Err(e) = self
                    .outbox
                    .publish(user_id, CoordinatesUpdated::EVENT_TYPE, payload)
                    .await
                {
                    warn!(
                        user_id = %user_id,
                        error = %e,
                        "Completion notification failed; coordinates remain persisted"
                    );
                }
            }
            Err(e) => warn!(error = %e, "Completion message encoding failed"),
        }
        self.events.emit(PipelineEvent::CoordinatesUpdated {
            user_id,
            node_count: written,
            method,
            is_incremental,
        });

        info!(
            user_id = %user_id,
            node_count = written,
            skipped,
            method = %method,
            fallback = outcome.degraded,
            duration_ms = start.elapsed().as_millis() as u64,
            "Projection cycle complete"
        );
        ctx.report_progress(100, Some("Projection complete"));

        JobResult::Success(Some(serde_json::json!({
            "node_count": written,
            "method": method.as_str(),
            "is_incremental": is_incremental,
            "degraded": outcome.degraded,
        })))
    }
}
