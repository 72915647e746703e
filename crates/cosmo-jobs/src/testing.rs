//! In-memory store implementations for handler and worker tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use cosmo_core::{
    Coord3, Entity, EntityRef, EntityStore, Error, GraphEdge, GraphNode, GraphSnapshot,
    GraphStore, Job, JobRepository, JobStatus, JobType, MatrixStore, NotificationOutbox,
    QueueStats, Result, TransformationMatrix, Vector, VectorIndex,
};

/// Build a claimed job for handler tests.
pub fn test_job(job_type: JobType, payload: Option<JsonValue>) -> Job {
    Job {
        id: Uuid::now_v7(),
        user_id: None,
        job_type,
        status: JobStatus::Running,
        priority: job_type.default_priority(),
        payload,
        result: None,
        error_message: None,
        retry_count: 0,
        max_retries: 3,
        run_at: Utc::now(),
        created_at: Utc::now(),
        started_at: Some(Utc::now()),
        completed_at: None,
    }
}

// =============================================================================
// ENTITY STORE
// =============================================================================

#[derive(Default)]
pub struct MemEntityStore {
    rows: Mutex<HashMap<(Uuid, EntityRef), Option<Coord3>>>,
    fail_for: Mutex<HashSet<EntityRef>>,
    fail_all: AtomicBool,
}

impl MemEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entity row, optionally already positioned.
    pub fn seed(&self, user_id: Uuid, entity: EntityRef, position: Option<Coord3>) {
        self.rows.lock().unwrap().insert((user_id, entity), position);
    }

    /// Current position of a seeded entity (`None` = row absent).
    pub fn position(&self, user_id: Uuid, entity: EntityRef) -> Option<Option<Coord3>> {
        self.rows.lock().unwrap().get(&(user_id, entity)).copied()
    }

    /// Make position writes fail for one entity.
    pub fn fail_updates_for(&self, entity: EntityRef) {
        self.fail_for.lock().unwrap().insert(entity);
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl EntityStore for MemEntityStore {
    async fn fetch(&self, user_id: Uuid, entity: EntityRef) -> Result<Option<Entity>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&(user_id, entity))
            .map(|position| Entity {
                id: entity.id,
                user_id,
                entity_type: entity.entity_type,
                title: None,
                content: None,
                importance: 0.5,
                created_at: Utc::now(),
                position: *position,
            }))
    }

    async fn count_positioned(&self, user_id: Uuid) -> Result<i64> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(Error::Internal("entity store failing".into()));
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|((uid, _), pos)| *uid == user_id && pos.is_some())
            .count() as i64)
    }

    async fn unpositioned(&self, user_id: Uuid, refs: &[EntityRef]) -> Result<Vec<EntityRef>> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(Error::Internal("entity store failing".into()));
        }
        let rows = self.rows.lock().unwrap();
        Ok(refs
            .iter()
            .filter(|r| !matches!(rows.get(&(user_id, **r)), Some(Some(_))))
            .copied()
            .collect())
    }

    async fn update_position(
        &self,
        user_id: Uuid,
        entity: EntityRef,
        coord: Coord3,
    ) -> Result<()> {
        if self.fail_all.load(Ordering::SeqCst)
            || self.fail_for.lock().unwrap().contains(&entity)
        {
            return Err(Error::Internal("position write failing".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&(user_id, entity)) {
            Some(position) => {
                *position = Some(coord);
                Ok(())
            }
            None => Err(Error::EntityNotFound(entity.entity_type, entity.id)),
        }
    }
}

// =============================================================================
// VECTOR INDEX
// =============================================================================

#[derive(Default)]
pub struct MemVectorIndex {
    map: Mutex<HashMap<(Uuid, EntityRef), Vector>>,
    fail: AtomicBool,
    upserts: AtomicUsize,
}

impl MemVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Seed a vector directly (bypassing the embedding worker).
    pub fn seed(&self, user_id: Uuid, entity: EntityRef, vector: Vector) {
        self.map.lock().unwrap().insert((user_id, entity), vector);
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Internal("vector index failing".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for MemVectorIndex {
    async fn upsert(
        &self,
        user_id: Uuid,
        entity: EntityRef,
        vector: &Vector,
        _model: &str,
    ) -> Result<()> {
        self.check()?;
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.map
            .lock()
            .unwrap()
            .insert((user_id, entity), vector.clone());
        Ok(())
    }

    async fn get(&self, user_id: Uuid, entity: EntityRef) -> Result<Option<Vector>> {
        self.check()?;
        Ok(self.map.lock().unwrap().get(&(user_id, entity)).cloned())
    }

    async fn get_many(
        &self,
        user_id: Uuid,
        refs: &[EntityRef],
    ) -> Result<Vec<(EntityRef, Vector)>> {
        self.check()?;
        let map = self.map.lock().unwrap();
        Ok(refs
            .iter()
            .filter_map(|r| map.get(&(user_id, *r)).map(|v| (*r, v.clone())))
            .collect())
    }

    async fn missing(&self, user_id: Uuid, refs: &[EntityRef]) -> Result<Vec<EntityRef>> {
        self.check()?;
        let map = self.map.lock().unwrap();
        Ok(refs
            .iter()
            .filter(|r| !map.contains_key(&(user_id, **r)))
            .copied()
            .collect())
    }

    async fn all_for_user(&self, user_id: Uuid) -> Result<Vec<(EntityRef, Vector)>> {
        self.check()?;
        Ok(self
            .map
            .lock()
            .unwrap()
            .iter()
            .filter(|((uid, _), _)| *uid == user_id)
            .map(|((_, r), v)| (*r, v.clone()))
            .collect())
    }

    async fn find_similar(
        &self,
        user_id: Uuid,
        query: &Vector,
        limit: i64,
    ) -> Result<Vec<(EntityRef, f32)>> {
        self.check()?;
        let q = query.as_slice();
        let mut scored: Vec<(EntityRef, f32)> = self
            .map
            .lock()
            .unwrap()
            .iter()
            .filter(|((uid, _), _)| *uid == user_id)
            .map(|((_, r), v)| {
                let dot: f32 = q.iter().zip(v.as_slice()).map(|(a, b)| a * b).sum();
                (*r, dot)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(limit as usize);
        Ok(scored)
    }
}

// =============================================================================
// GRAPH STORE
// =============================================================================

#[derive(Default)]
pub struct MemGraphStore {
    nodes: Mutex<Vec<(Uuid, GraphNode)>>,
    edges: Mutex<Vec<(Uuid, GraphEdge)>>,
}

impl MemGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_node(&self, user_id: Uuid, node: GraphNode) {
        self.nodes.lock().unwrap().push((user_id, node));
    }

    pub fn seed_edge(&self, user_id: Uuid, edge: GraphEdge) {
        self.edges.lock().unwrap().push((user_id, edge));
    }
}

#[async_trait]
impl GraphStore for MemGraphStore {
    async fn snapshot(&self, user_id: Uuid) -> Result<GraphSnapshot> {
        let nodes = self
            .nodes
            .lock()
            .unwrap()
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .map(|(_, n)| n.clone())
            .collect();
        let edges = self
            .edges
            .lock()
            .unwrap()
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .map(|(_, e)| e.clone())
            .collect();
        Ok(GraphSnapshot {
            user_id,
            nodes,
            edges,
        })
    }
}

// =============================================================================
// MATRIX STORE
// =============================================================================

#[derive(Default)]
pub struct MemMatrixStore {
    map: Mutex<HashMap<Uuid, TransformationMatrix>>,
    replaces: AtomicUsize,
}

impl MemMatrixStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_count(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }

    pub fn seed(&self, matrix: TransformationMatrix) {
        self.map.lock().unwrap().insert(matrix.user_id, matrix);
    }
}

#[async_trait]
impl MatrixStore for MemMatrixStore {
    async fn current(&self, user_id: Uuid) -> Result<Option<TransformationMatrix>> {
        Ok(self.map.lock().unwrap().get(&user_id).cloned())
    }

    async fn replace(&self, matrix: &TransformationMatrix) -> Result<()> {
        self.replaces.fetch_add(1, Ordering::SeqCst);
        self.map
            .lock()
            .unwrap()
            .insert(matrix.user_id, matrix.clone());
        Ok(())
    }
}

// =============================================================================
// NOTIFICATION OUTBOX
// =============================================================================

#[derive(Default)]
pub struct MemOutbox {
    messages: Mutex<Vec<(Uuid, String, JsonValue)>>,
    fail: AtomicBool,
}

impl MemOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<(Uuid, String, JsonValue)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationOutbox for MemOutbox {
    async fn publish(&self, user_id: Uuid, event_type: &str, payload: JsonValue) -> Result<Uuid> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Internal("outbox failing".into()));
        }
        let id = Uuid::now_v7();
        self.messages
            .lock()
            .unwrap()
            .push((user_id, event_type.to_string(), payload));
        Ok(id)
    }
}

// =============================================================================
// JOB REPOSITORY
// =============================================================================

#[derive(Default)]
pub struct MemJobRepository {
    jobs: Mutex<Vec<Job>>,
}

impl MemJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, user_id: Option<Uuid>, job_type: JobType, priority: i32,
              payload: Option<JsonValue>, delay: Duration) -> Uuid {
        let now = Utc::now();
        let job = Job {
            id: Uuid::now_v7(),
            user_id,
            job_type,
            status: JobStatus::Pending,
            priority,
            payload,
            result: None,
            error_message: None,
            retry_count: 0,
            max_retries: 3,
            run_at: now + chrono::Duration::from_std(delay).unwrap_or_default(),
            created_at: now,
            started_at: None,
            completed_at: None,
        };
        let id = job.id;
        self.jobs.lock().unwrap().push(job);
        id
    }

    fn with_job<R>(&self, job_id: Uuid, f: impl FnOnce(&mut Job) -> R) -> Result<R> {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.iter_mut()
            .find(|j| j.id == job_id)
            .map(f)
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))
    }
}

#[async_trait]
impl JobRepository for MemJobRepository {
    async fn queue(
        &self,
        user_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid> {
        Ok(self.insert(user_id, job_type, priority, payload, Duration::ZERO))
    }

    async fn queue_delayed(
        &self,
        user_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
        delay: Duration,
    ) -> Result<Uuid> {
        Ok(self.insert(user_id, job_type, priority, payload, delay))
    }

    async fn queue_deduplicated(
        &self,
        user_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Option<Uuid>> {
        if let Some(uid) = user_id {
            let duplicate = self.jobs.lock().unwrap().iter().any(|j| {
                j.user_id == Some(uid)
                    && j.job_type == job_type
                    && matches!(j.status, JobStatus::Pending | JobStatus::Running)
            });
            if duplicate {
                return Ok(None);
            }
        }
        Ok(Some(
            self.insert(user_id, job_type, priority, payload, Duration::ZERO),
        ))
    }

    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().unwrap();

        let candidate = jobs
            .iter_mut()
            .filter(|j| {
                j.status == JobStatus::Pending
                    && j.run_at <= now
                    && (job_types.is_empty() || job_types.contains(&j.job_type))
            })
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then(b.created_at.cmp(&a.created_at))
            });

        Ok(candidate.map(|job| {
            job.status = JobStatus::Running;
            job.started_at = Some(now);
            job.clone()
        }))
    }

    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()> {
        self.with_job(job_id, |job| {
            job.status = JobStatus::Completed;
            job.completed_at = Some(Utc::now());
            job.result = result;
        })
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        self.with_job(job_id, |job| {
            if job.retry_count < job.max_retries {
                job.status = JobStatus::Pending;
                job.retry_count += 1;
                job.started_at = None;
            } else {
                job.status = JobStatus::Dead;
                job.completed_at = Some(Utc::now());
            }
            job.error_message = Some(error.to_string());
        })
    }

    async fn fail_permanent(&self, job_id: Uuid, error: &str) -> Result<()> {
        self.with_job(job_id, |job| {
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
            job.error_message = Some(error.to_string());
        })
    }

    async fn reschedule(
        &self,
        job_id: Uuid,
        delay: Duration,
        payload: Option<JsonValue>,
    ) -> Result<()> {
        self.with_job(job_id, |job| {
            job.status = JobStatus::Pending;
            job.started_at = None;
            job.run_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
            if payload.is_some() {
                job.payload = payload;
            }
        })
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.id == job_id)
            .cloned())
    }

    async fn pending_count(&self) -> Result<i64> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .count() as i64)
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let jobs = self.jobs.lock().unwrap();
        let count = |s: JobStatus| jobs.iter().filter(|j| j.status == s).count() as i64;
        Ok(QueueStats {
            pending: count(JobStatus::Pending),
            running: count(JobStatus::Running),
            completed_last_hour: count(JobStatus::Completed),
            dead_last_hour: count(JobStatus::Dead),
            total: jobs.len() as i64,
        })
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Job>> {
        let mut jobs = self.jobs.lock().unwrap().clone();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit as usize);
        Ok(jobs)
    }
}
