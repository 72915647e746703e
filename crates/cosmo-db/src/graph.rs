//! Graph snapshot reads.
//!
//! The graph store itself is owned by external collaborators; this module
//! only reads a point-in-time view of one user's nodes and typed edges for
//! the projection worker.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use cosmo_core::{
    EntityRef, EntityType, Error, GraphEdge, GraphNode, GraphSnapshot, GraphStore, Result,
};

/// PostgreSQL implementation of [`GraphStore`].
#[derive(Clone)]
pub struct PgGraphStore {
    pool: Pool<Postgres>,
}

impl PgGraphStore {
    /// Create a new PgGraphStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GraphStore for PgGraphStore {
    async fn snapshot(&self, user_id: Uuid) -> Result<GraphSnapshot> {
        let mut nodes = Vec::new();

        for entity_type in EntityType::ALL {
            let query = format!(
                "SELECT id, title, importance, created_at,
                        (position_x IS NOT NULL) AS has_position
                 FROM {}
                 WHERE user_id = $1
                 ORDER BY created_at",
                entity_type.table()
            );

            let rows = sqlx::query(&query)
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;

            for row in rows {
                nodes.push(GraphNode {
                    id: row.get("id"),
                    entity_type,
                    title: row.get("title"),
                    importance: row.get("importance"),
                    created_at: row.get("created_at"),
                    has_position: row.get("has_position"),
                });
            }
        }

        let edge_rows = sqlx::query(
            "SELECT source_id, source_type, target_id, target_type, relation, weight
             FROM entity_relationships
             WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut edges = Vec::with_capacity(edge_rows.len());
        for row in edge_rows {
            let source_type: String = row.get("source_type");
            let target_type: String = row.get("target_type");
            match (
                EntityType::from_str(&source_type),
                EntityType::from_str(&target_type),
            ) {
                (Ok(st), Ok(tt)) => edges.push(GraphEdge {
                    source: EntityRef::new(st, row.get("source_id")),
                    target: EntityRef::new(tt, row.get("target_id")),
                    relation: row.get("relation"),
                    weight: row.get("weight"),
                }),
                _ => {
                    warn!(
                        subsystem = "db",
                        component = "graph",
                        source_type = %source_type,
                        target_type = %target_type,
                        "Skipping edge with unknown endpoint type"
                    );
                }
            }
        }

        debug!(
            subsystem = "db",
            component = "graph",
            op = "snapshot",
            user_id = %user_id,
            node_count = nodes.len(),
            edge_count = edges.len(),
            "Graph snapshot read"
        );

        Ok(GraphSnapshot {
            user_id,
            nodes,
            edges,
        })
    }
}
