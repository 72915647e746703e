//! Job repository implementation.
//!
//! Durable Postgres-backed queue with at-least-once delivery: claims use
//! `FOR UPDATE SKIP LOCKED`, delayed redelivery rides the `run_at` column,
//! and transient failures are redelivered with exponential backoff until the
//! retry budget is spent, after which the job is dead-lettered.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use tokio::sync::Notify;
use uuid::Uuid;

use cosmo_core::{defaults, Error, Job, JobRepository, JobStatus, JobType, QueueStats, Result};

/// PostgreSQL implementation of [`JobRepository`].
#[derive(Clone)]
pub struct PgJobRepository {
    pool: Pool<Postgres>,
    /// Notify handle for event-driven worker wake.
    notify: Arc<Notify>,
}

impl PgJobRepository {
    /// Create a new PgJobRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Get the job notification handle for event-driven waking.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Convert JobType to string for database.
    fn job_type_to_str(job_type: JobType) -> &'static str {
        match job_type {
            JobType::GenerateEmbedding => "generate_embedding",
            JobType::ProjectGraph => "project_graph",
        }
    }

    /// Convert string from database to JobType.
    fn str_to_job_type(s: &str) -> Result<JobType> {
        match s {
            "generate_embedding" => Ok(JobType::GenerateEmbedding),
            "project_graph" => Ok(JobType::ProjectGraph),
            other => Err(Error::Job(format!("Unknown job type in queue: {}", other))),
        }
    }

    /// Convert string from database to JobStatus.
    fn str_to_job_status(s: &str) -> Result<JobStatus> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "dead" => Ok(JobStatus::Dead),
            other => Err(Error::Job(format!("Unknown job status in queue: {}", other))),
        }
    }

    /// Backoff before redelivery attempt `retry_count + 1`.
    fn retry_backoff(retry_count: i32) -> Duration {
        let exp = retry_count.clamp(0, 16) as u32;
        Duration::from_millis(defaults::JOB_RETRY_BACKOFF_BASE_MS << exp)
    }

    /// Parse a job row into a Job struct.
    fn parse_job_row(row: sqlx::postgres::PgRow) -> Result<Job> {
        Ok(Job {
            id: row.get("id"),
            user_id: row.get("user_id"),
            job_type: Self::str_to_job_type(row.get("job_type"))?,
            status: Self::str_to_job_status(row.get("status"))?,
            priority: row.get("priority"),
            payload: row.get("payload"),
            result: row.get("result"),
            error_message: row.get("error_message"),
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            run_at: row.get("run_at"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        })
    }
}

const JOB_COLUMNS: &str = "id, user_id, job_type::text, status::text, priority, payload, result,
                           error_message, retry_count, max_retries, run_at, created_at,
                           started_at, completed_at";

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn queue(
        &self,
        user_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid> {
        self.queue_delayed(user_id, job_type, priority, payload, Duration::ZERO)
            .await
    }

    async fn queue_delayed(
        &self,
        user_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
        delay: Duration,
    ) -> Result<Uuid> {
        let job_id = Uuid::now_v7();
        let now = Utc::now();
        let run_at = now
            + chrono::Duration::from_std(delay)
                .map_err(|e| Error::Job(format!("Delay out of range: {}", e)))?;

        sqlx::query(
            "INSERT INTO job_queue (id, user_id, job_type, status, priority, payload,
                                    max_retries, run_at, created_at)
             VALUES ($1, $2, $3::job_type, 'pending'::job_status, $4, $5, $6, $7, $8)",
        )
        .bind(job_id)
        .bind(user_id)
        .bind(Self::job_type_to_str(job_type))
        .bind(priority)
        .bind(&payload)
        .bind(defaults::JOB_MAX_RETRIES)
        .bind(run_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        self.notify.notify_waiters();
        Ok(job_id)
    }

    async fn queue_deduplicated(
        &self,
        user_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Option<Uuid>> {
        // Atomic check-and-insert to prevent TOCTOU races when concurrent
        // writers enqueue the same work. Only deduplicates with a user scope;
        // without one, always insert.
        let Some(uid) = user_id else {
            let job_id = self.queue(user_id, job_type, priority, payload).await?;
            return Ok(Some(job_id));
        };

        let job_id = Uuid::now_v7();
        let now = Utc::now();

        let result = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO job_queue (id, user_id, job_type, status, priority, payload,
                                    max_retries, run_at, created_at)
             SELECT $1, $2, $3::job_type, 'pending'::job_status, $4, $5, $6, $7, $7
             WHERE NOT EXISTS (
                 SELECT 1 FROM job_queue
                 WHERE user_id = $2 AND job_type = $3::job_type
                   AND status IN ('pending'::job_status, 'running'::job_status)
             )
             RETURNING id",
        )
        .bind(job_id)
        .bind(uid)
        .bind(Self::job_type_to_str(job_type))
        .bind(priority)
        .bind(&payload)
        .bind(defaults::JOB_MAX_RETRIES)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.is_some() {
            self.notify.notify_waiters();
        }
        Ok(result)
    }

    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>> {
        let now = Utc::now();
        let type_strings: Vec<String> = job_types
            .iter()
            .map(|jt| Self::job_type_to_str(*jt).to_string())
            .collect();

        // FOR UPDATE SKIP LOCKED for concurrent claiming; run_at gates
        // delayed redelivery. Empty array = claim any type.
        let row = sqlx::query(&format!(
            "UPDATE job_queue
             SET status = 'running'::job_status, started_at = $1
             WHERE id = (
                 SELECT id FROM job_queue
                 WHERE status = 'pending'::job_status
                   AND run_at <= $1
                   AND (cardinality($2::text[]) = 0 OR job_type::text = ANY($2))
                 ORDER BY priority DESC, created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(now)
        .bind(&type_strings)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()> {
        sqlx::query(
            "UPDATE job_queue
             SET status = 'completed'::job_status, completed_at = $1, result = $2
             WHERE id = $3",
        )
        .bind(Utc::now())
        .bind(&result)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let (retry_count, max_retries): (i32, i32) =
            sqlx::query_as("SELECT retry_count, max_retries FROM job_queue WHERE id = $1")
                .bind(job_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(Error::Database)?;

        if retry_count < max_retries {
            // Redeliver with exponential backoff.
            let backoff = chrono::Duration::from_std(Self::retry_backoff(retry_count))
                .unwrap_or_else(|_| chrono::Duration::seconds(60));
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'pending'::job_status, retry_count = $1, error_message = $2,
                     started_at = NULL, run_at = $3
                 WHERE id = $4",
            )
            .bind(retry_count + 1)
            .bind(error)
            .bind(now + backoff)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        } else {
            // Retry budget spent: dead-letter.
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'dead'::job_status, completed_at = $1, error_message = $2
                 WHERE id = $3",
            )
            .bind(now)
            .bind(error)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn fail_permanent(&self, job_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE job_queue
             SET status = 'failed'::job_status, completed_at = $1, error_message = $2
             WHERE id = $3",
        )
        .bind(Utc::now())
        .bind(error)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn reschedule(
        &self,
        job_id: Uuid,
        delay: Duration,
        payload: Option<JsonValue>,
    ) -> Result<()> {
        let now = Utc::now();
        let run_at = now
            + chrono::Duration::from_std(delay)
                .map_err(|e| Error::Job(format!("Delay out of range: {}", e)))?;

        // Back to pending with a future run_at; does not consume a retry.
        sqlx::query(
            "UPDATE job_queue
             SET status = 'pending'::job_status, started_at = NULL, run_at = $1,
                 payload = COALESCE($2, payload)
             WHERE id = $3",
        )
        .bind(run_at)
        .bind(&payload)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM job_queue WHERE id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM job_queue WHERE status = 'pending'::job_status",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(count)
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'pending') as pending,
                COUNT(*) FILTER (WHERE status = 'running') as running,
                COUNT(*) FILTER (WHERE status = 'completed' AND completed_at > NOW() - INTERVAL '1 hour') as completed_last_hour,
                COUNT(*) FILTER (WHERE status = 'dead' AND completed_at > NOW() - INTERVAL '1 hour') as dead_last_hour,
                COUNT(*) as total
             FROM job_queue",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.get::<i64, _>("pending"),
            running: row.get::<i64, _>("running"),
            completed_last_hour: row.get::<i64, _>("completed_last_hour"),
            dead_last_hour: row.get::<i64, _>("dead_last_hour"),
            total: row.get::<i64, _>("total"),
        })
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM job_queue
             ORDER BY created_at DESC
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_job_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_to_str_all_variants() {
        assert_eq!(
            PgJobRepository::job_type_to_str(JobType::GenerateEmbedding),
            "generate_embedding"
        );
        assert_eq!(
            PgJobRepository::job_type_to_str(JobType::ProjectGraph),
            "project_graph"
        );
    }

    #[test]
    fn test_job_type_round_trip() {
        for job_type in [JobType::GenerateEmbedding, JobType::ProjectGraph] {
            let s = PgJobRepository::job_type_to_str(job_type);
            assert_eq!(PgJobRepository::str_to_job_type(s).unwrap(), job_type);
        }
    }

    #[test]
    fn test_str_to_job_type_unknown_rejected() {
        assert!(PgJobRepository::str_to_job_type("linking").is_err());
        assert!(PgJobRepository::str_to_job_type("").is_err());
    }

    #[test]
    fn test_str_to_job_status_all_variants() {
        assert_eq!(
            PgJobRepository::str_to_job_status("pending").unwrap(),
            JobStatus::Pending
        );
        assert_eq!(
            PgJobRepository::str_to_job_status("running").unwrap(),
            JobStatus::Running
        );
        assert_eq!(
            PgJobRepository::str_to_job_status("completed").unwrap(),
            JobStatus::Completed
        );
        assert_eq!(
            PgJobRepository::str_to_job_status("failed").unwrap(),
            JobStatus::Failed
        );
        assert_eq!(
            PgJobRepository::str_to_job_status("dead").unwrap(),
            JobStatus::Dead
        );
    }

    #[test]
    fn test_str_to_job_status_unknown_rejected() {
        assert!(PgJobRepository::str_to_job_status("cancelled").is_err());
    }

    #[test]
    fn test_retry_backoff_doubles() {
        let base = Duration::from_millis(defaults::JOB_RETRY_BACKOFF_BASE_MS);
        assert_eq!(PgJobRepository::retry_backoff(0), base);
        assert_eq!(PgJobRepository::retry_backoff(1), base * 2);
        assert_eq!(PgJobRepository::retry_backoff(2), base * 4);
    }

    #[test]
    fn test_retry_backoff_clamped() {
        // A pathological retry_count must not shift into overflow.
        let capped = PgJobRepository::retry_backoff(1_000);
        assert_eq!(
            capped,
            Duration::from_millis(defaults::JOB_RETRY_BACKOFF_BASE_MS << 16)
        );
        assert!(PgJobRepository::retry_backoff(-5) >= Duration::ZERO);
    }
}
