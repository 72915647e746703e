//! Embedding generation worker (Component A).
//!
//! Consumes `generate_embedding` jobs: validates the payload, turns the
//! entity text into a vector, and upserts it into the vector index. The
//! upsert overwrites any prior vector, so at-least-once delivery is safe.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, instrument};
use uuid::Uuid;

use cosmo_core::{EmbeddingBackend, EmbeddingJobPayload, EntityRef, JobType, Vector, VectorIndex};

use crate::handler::{JobContext, JobHandler, JobResult};

/// Handler for embedding generation jobs.
pub struct EmbeddingHandler {
    vectors: Arc<dyn VectorIndex>,
    backend: Arc<dyn EmbeddingBackend>,
}

impl EmbeddingHandler {
    pub fn new(vectors: Arc<dyn VectorIndex>, backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self { vectors, backend }
    }
}

/// Check a returned vector is a finite, fixed-length numeric array.
fn validate_vector(vector: &Vector, expected_dimension: usize) -> Result<(), String> {
    let components = vector.as_slice();
    if components.len() != expected_dimension {
        return Err(format!(
            "Backend returned {}-dimensional vector, expected {}",
            components.len(),
            expected_dimension
        ));
    }
    if components.iter().any(|c| !c.is_finite()) {
        return Err("Backend returned non-finite vector components".to_string());
    }
    Ok(())
}

#[async_trait]
impl JobHandler for EmbeddingHandler {
    fn job_type(&self) -> JobType {
        JobType::GenerateEmbedding
    }

    #[instrument(
        skip(self, ctx),
        fields(subsystem = "jobs", component = "embedding", op = "execute")
    )]
    async fn execute(&self, ctx: JobContext) -> JobResult {
        let start = Instant::now();

        // Input validation happens before any external call; violations are
        // permanent failures, never retried.
        let payload: EmbeddingJobPayload = match ctx.payload() {
            Some(raw) => match serde_json::from_value(raw.clone()) {
                Ok(p) => p,
                Err(e) => return JobResult::Fatal(format!("Unparseable payload: {}", e)),
            },
            None => return JobResult::Fatal("No payload provided".into()),
        };

        let entity_id = match Uuid::parse_str(&payload.entity_id) {
            Ok(id) => id,
            Err(_) => {
                return JobResult::Fatal(format!("Malformed entity id: {}", payload.entity_id))
            }
        };

        if payload.text.trim().is_empty() {
            return JobResult::Fatal("Empty entity text".into());
        }

        ctx.report_progress(20, Some("Embedding text..."));

        let mut result = match self.backend.embed_texts(&[payload.text.clone()]).await {
            Ok(vectors) => vectors,
            Err(e) => return JobResult::Failed(format!("Embedding generation failed: {}", e)),
        };

        let vector = match result.pop() {
            Some(v) if result.is_empty() => v,
            _ => return JobResult::Failed("Backend did not return exactly one vector".into()),
        };

        if let Err(reason) = validate_vector(&vector, self.backend.dimension()) {
            return JobResult::Failed(reason);
        }

        ctx.report_progress(70, Some("Upserting vector..."));

        let entity = EntityRef::new(payload.entity_type, entity_id);
        if let Err(e) = self
            .vectors
            .upsert(payload.user_id, entity, &vector, self.backend.model_name())
            .await
        {
            return JobResult::Failed(format!("Vector upsert failed: {}", e));
        }

        info!(
            user_id = %payload.user_id,
            entity_id = %entity_id,
            entity_type = %payload.entity_type,
            dimension = vector.as_slice().len(),
            model = self.backend.model_name(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Embedding upserted"
        );

        JobResult::Success(Some(serde_json::json!({
            "dimension": vector.as_slice().len(),
            "model": self.backend.model_name(),
        })))
    }
}
