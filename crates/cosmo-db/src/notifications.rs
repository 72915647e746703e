//! Outbound notification queue (outbox).
//!
//! The projection worker appends completion messages here best-effort; a
//! downstream bridge (out of scope) drains them toward the front end.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres};
use tracing::debug;
use uuid::Uuid;

use cosmo_core::{Error, NotificationOutbox, Result};

/// PostgreSQL implementation of [`NotificationOutbox`].
#[derive(Clone)]
pub struct PgNotificationOutbox {
    pool: Pool<Postgres>,
}

impl PgNotificationOutbox {
    /// Create a new PgNotificationOutbox with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationOutbox for PgNotificationOutbox {
    async fn publish(&self, user_id: Uuid, event_type: &str, payload: JsonValue) -> Result<Uuid> {
        let id = Uuid::now_v7();

        sqlx::query(
            "INSERT INTO notification_queue (id, user_id, event_type, payload, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(user_id)
        .bind(event_type)
        .bind(&payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "notifications",
            op = "publish",
            user_id = %user_id,
            event_type = %event_type,
            "Notification enqueued"
        );

        Ok(id)
    }
}
