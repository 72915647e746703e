//! Pipeline event types and event bus for in-process notifications.
//!
//! Aggregates events from the job worker and the projection pipeline into a
//! single broadcast channel. Downstream consumers (future SSE/WebSocket
//! bridges, telemetry) subscribe independently; the durable outbound
//! notification queue is separate and lives in `cosmo-db`.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::ProjectionMethod;

/// Unified pipeline event, serialized as JSON with a `type` tag field, e.g.
/// `{"type":"coordinates_updated","user_id":"...","node_count":12,...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A job was added to the queue.
    JobQueued {
        job_id: Uuid,
        job_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<Uuid>,
    },
    /// A job started processing.
    JobStarted { job_id: Uuid, job_type: String },
    /// Job progress was updated.
    JobProgress {
        job_id: Uuid,
        percent: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// A job completed successfully.
    JobCompleted { job_id: Uuid, job_type: String },
    /// A job failed (after this attempt; the queue may still retry it).
    JobFailed {
        job_id: Uuid,
        job_type: String,
        error: String,
    },
    /// A projection cycle wrote fresh coordinates for a user.
    CoordinatesUpdated {
        user_id: Uuid,
        node_count: i64,
        method: ProjectionMethod,
        is_incremental: bool,
    },
}

/// Broadcast bus for [`PipelineEvent`]s.
///
/// Cloneable handle; all clones share the same channel. If there are no
/// active subscribers, emitted events are silently dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    ///
    /// Recommended: 256 for production, 32 for tests.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: PipelineEvent) {
        let subscriber_count = self.tx.receiver_count();
        tracing::debug!(?event, subscriber_count, "EventBus emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to receive events. Each subscriber gets its own
    /// independent stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();

        bus.emit(PipelineEvent::JobStarted {
            job_id: Uuid::new_v4(),
            job_type: "generate_embedding".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, PipelineEvent::JobStarted { .. }));
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(32);
        bus.emit(PipelineEvent::JobCompleted {
            job_id: Uuid::new_v4(),
            job_type: "project_graph".to_string(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_receive() {
        let bus = EventBus::new(32);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let user_id = Uuid::new_v4();
        bus.emit(PipelineEvent::CoordinatesUpdated {
            user_id,
            node_count: 42,
            method: ProjectionMethod::LinearTransform,
            is_incremental: true,
        });

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                PipelineEvent::CoordinatesUpdated {
                    user_id: uid,
                    node_count,
                    ..
                } => {
                    assert_eq!(uid, user_id);
                    assert_eq!(node_count, 42);
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[test]
    fn test_event_json_tag() {
        let event = PipelineEvent::CoordinatesUpdated {
            user_id: Uuid::nil(),
            node_count: 1,
            method: ProjectionMethod::ManifoldLearning,
            is_incremental: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "coordinates_updated");
        assert_eq!(json["method"], "manifold_learning");
    }
}
