//! Enqueue helpers for the write-side collaborators.
//!
//! Entity mutation paths call these after (re)establishing an entity's text:
//! one embedding job per entity, plus a deduplicated projection event so a
//! burst of mutations collapses into a single pending cycle.

use uuid::Uuid;

use cosmo_core::{
    EmbeddingJobPayload, EventBus, JobRepository, JobType, PipelineEvent, ProjectionEventPayload,
    Result,
};

/// Queue an embedding job for one entity.
pub async fn enqueue_embedding(
    jobs: &dyn JobRepository,
    payload: &EmbeddingJobPayload,
    event_bus: Option<&EventBus>,
) -> Result<Uuid> {
    let job_type = JobType::GenerateEmbedding;
    let job_id = jobs
        .queue(
            Some(payload.user_id),
            job_type,
            job_type.default_priority(),
            Some(serde_json::to_value(payload)?),
        )
        .await?;

    if let Some(bus) = event_bus {
        bus.emit(PipelineEvent::JobQueued {
            job_id,
            job_type: format!("{:?}", job_type),
            user_id: Some(payload.user_id),
        });
    }
    Ok(job_id)
}

/// Queue a projection event, deduplicated per user.
///
/// Returns `None` when the user already has a projection cycle pending or
/// running; the queued event will pick up the new entities' vectors on its
/// next redelivery check.
pub async fn enqueue_projection(
    jobs: &dyn JobRepository,
    event: &ProjectionEventPayload,
    event_bus: Option<&EventBus>,
) -> Result<Option<Uuid>> {
    let job_type = JobType::ProjectGraph;
    let job_id = jobs
        .queue_deduplicated(
            Some(event.user_id),
            job_type,
            job_type.default_priority(),
            Some(serde_json::to_value(event)?),
        )
        .await?;

    if let (Some(id), Some(bus)) = (job_id, event_bus) {
        bus.emit(PipelineEvent::JobQueued {
            job_id: id,
            job_type: format!("{:?}", job_type),
            user_id: Some(event.user_id),
        });
    }
    Ok(job_id)
}

/// Convenience: queue the full pipeline for one freshly written entity
/// (embedding job + projection event).
pub async fn enqueue_entity_pipeline(
    jobs: &dyn JobRepository,
    payload: &EmbeddingJobPayload,
    source: &str,
    event_bus: Option<&EventBus>,
) -> Result<Uuid> {
    let job_id = enqueue_embedding(jobs, payload, event_bus).await?;

    let event = ProjectionEventPayload {
        kind: cosmo_core::ProjectionEventKind::NewEntitiesCreated,
        user_id: payload.user_id,
        source: source.to_string(),
        entities: vec![cosmo_core::EntityRefWire {
            id: payload.entity_id.clone(),
            entity_type: payload.entity_type,
        }],
        wait_attempts: 0,
    };
    enqueue_projection(jobs, &event, event_bus).await?;

    // The embedding job id is the caller-visible handle; the projection
    // event may have been deduplicated away.
    Ok(job_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemJobRepository;
    use cosmo_core::{EntityType, ProjectionEventKind};

    fn embedding_payload(user_id: Uuid) -> EmbeddingJobPayload {
        EmbeddingJobPayload {
            entity_id: Uuid::new_v4().to_string(),
            entity_type: EntityType::MemoryUnit,
            user_id,
            text: "entity text".to_string(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_embedding_carries_payload() {
        let jobs = MemJobRepository::new();
        let payload = embedding_payload(Uuid::new_v4());

        let job_id = enqueue_embedding(&jobs, &payload, None).await.unwrap();

        let job = jobs.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.job_type, JobType::GenerateEmbedding);
        let stored: EmbeddingJobPayload =
            serde_json::from_value(job.payload.unwrap()).unwrap();
        assert_eq!(stored.entity_id, payload.entity_id);
    }

    #[tokio::test]
    async fn test_enqueue_projection_deduplicates_per_user() {
        let jobs = MemJobRepository::new();
        let user_id = Uuid::new_v4();
        let event = ProjectionEventPayload {
            kind: ProjectionEventKind::NewEntitiesCreated,
            user_id,
            source: "ingestion".to_string(),
            entities: vec![],
            wait_attempts: 0,
        };

        let first = enqueue_projection(&jobs, &event, None).await.unwrap();
        let second = enqueue_projection(&jobs, &event, None).await.unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(jobs.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_entity_pipeline_queues_both() {
        let jobs = MemJobRepository::new();
        let payload = embedding_payload(Uuid::new_v4());

        enqueue_entity_pipeline(&jobs, &payload, "ingestion", None)
            .await
            .unwrap();

        assert_eq!(jobs.pending_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_events_emitted_when_bus_provided() {
        let jobs = MemJobRepository::new();
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();

        enqueue_embedding(&jobs, &embedding_payload(Uuid::new_v4()), Some(&bus))
            .await
            .unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            PipelineEvent::JobQueued { .. }
        ));
    }
}
