//! Vector index implementation.
//!
//! Vectors are keyed by `(entity_type, entity_id, user_id)` and upserted
//! last-write-wins; a record's presence is the only freshness signal the
//! projection worker reads.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use tracing::warn;
use uuid::Uuid;

use cosmo_core::{EntityRef, EntityType, Error, Result, VectorIndex};

/// PostgreSQL + pgvector implementation of [`VectorIndex`].
#[derive(Clone)]
pub struct PgVectorIndex {
    pool: Pool<Postgres>,
}

impl PgVectorIndex {
    /// Create a new PgVectorIndex with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn group_by_type(refs: &[EntityRef]) -> HashMap<EntityType, Vec<Uuid>> {
        let mut groups: HashMap<EntityType, Vec<Uuid>> = HashMap::new();
        for r in refs {
            groups.entry(r.entity_type).or_default().push(r.id);
        }
        groups
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn upsert(
        &self,
        user_id: Uuid,
        entity: EntityRef,
        vector: &Vector,
        model: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO entity_vectors (entity_type, entity_id, user_id, vector, model, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (entity_type, entity_id, user_id)
             DO UPDATE SET vector = EXCLUDED.vector,
                           model = EXCLUDED.model,
                           updated_at = EXCLUDED.updated_at",
        )
        .bind(entity.entity_type.as_str())
        .bind(entity.id)
        .bind(user_id)
        .bind(vector)
        .bind(model)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, user_id: Uuid, entity: EntityRef) -> Result<Option<Vector>> {
        let row = sqlx::query(
            "SELECT vector FROM entity_vectors
             WHERE entity_type = $1 AND entity_id = $2 AND user_id = $3",
        )
        .bind(entity.entity_type.as_str())
        .bind(entity.id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|r| r.get("vector")))
    }

    async fn get_many(
        &self,
        user_id: Uuid,
        refs: &[EntityRef],
    ) -> Result<Vec<(EntityRef, Vector)>> {
        let mut results = Vec::with_capacity(refs.len());

        for (entity_type, ids) in Self::group_by_type(refs) {
            let rows = sqlx::query(
                "SELECT entity_id, vector FROM entity_vectors
                 WHERE entity_type = $1 AND user_id = $2 AND entity_id = ANY($3)",
            )
            .bind(entity_type.as_str())
            .bind(user_id)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

            for row in rows {
                results.push((
                    EntityRef::new(entity_type, row.get("entity_id")),
                    row.get("vector"),
                ));
            }
        }

        Ok(results)
    }

    async fn missing(&self, user_id: Uuid, refs: &[EntityRef]) -> Result<Vec<EntityRef>> {
        let mut present: HashSet<EntityRef> = HashSet::new();

        for (entity_type, ids) in Self::group_by_type(refs) {
            let rows = sqlx::query(
                "SELECT entity_id FROM entity_vectors
                 WHERE entity_type = $1 AND user_id = $2 AND entity_id = ANY($3)",
            )
            .bind(entity_type.as_str())
            .bind(user_id)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

            for row in rows {
                present.insert(EntityRef::new(entity_type, row.get("entity_id")));
            }
        }

        Ok(refs
            .iter()
            .filter(|r| !present.contains(r))
            .copied()
            .collect())
    }

    async fn all_for_user(&self, user_id: Uuid) -> Result<Vec<(EntityRef, Vector)>> {
        let rows = sqlx::query(
            "SELECT entity_type, entity_id, vector FROM entity_vectors
             WHERE user_id = $1
             ORDER BY entity_type, entity_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let type_str: String = row.get("entity_type");
            match EntityType::from_str(&type_str) {
                Ok(entity_type) => {
                    results.push((
                        EntityRef::new(entity_type, row.get("entity_id")),
                        row.get("vector"),
                    ));
                }
                Err(_) => {
                    // A row written by a newer deployment with an unknown
                    // kind; skip rather than fail the whole scan.
                    warn!(
                        subsystem = "db",
                        component = "vectors",
                        entity_type = %type_str,
                        "Skipping vector with unknown entity type"
                    );
                }
            }
        }

        Ok(results)
    }

    async fn find_similar(
        &self,
        user_id: Uuid,
        query: &Vector,
        limit: i64,
    ) -> Result<Vec<(EntityRef, f32)>> {
        let rows = sqlx::query(
            "SELECT entity_type, entity_id,
                    1.0 - (vector <=> $1::vector) AS score
             FROM entity_vectors
             WHERE user_id = $2
             ORDER BY vector <=> $1::vector
             LIMIT $3",
        )
        .bind(query)
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let type_str: String = row.get("entity_type");
            if let Ok(entity_type) = EntityType::from_str(&type_str) {
                let score: f64 = row.get("score");
                results.push((
                    EntityRef::new(entity_type, row.get("entity_id")),
                    score as f32,
                ));
            }
        }
        Ok(results)
    }
}
