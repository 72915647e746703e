//! Entity store implementation over the per-type tables.
//!
//! Every entity kind lives in its own table (see [`EntityType::table`]), all
//! sharing the same column shape. Table names come exclusively from the
//! closed enum, never from job payloads, so the `format!` queries below stay
//! injection-safe.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use cosmo_core::{Coord3, Entity, EntityRef, EntityStore, EntityType, Error, Result};

/// PostgreSQL implementation of [`EntityStore`].
#[derive(Clone)]
pub struct PgEntityStore {
    pool: Pool<Postgres>,
}

impl PgEntityStore {
    /// Create a new PgEntityStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Group refs by entity type so each per-type table is queried once.
    fn group_by_type(refs: &[EntityRef]) -> HashMap<EntityType, Vec<Uuid>> {
        let mut groups: HashMap<EntityType, Vec<Uuid>> = HashMap::new();
        for r in refs {
            groups.entry(r.entity_type).or_default().push(r.id);
        }
        groups
    }
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn fetch(&self, user_id: Uuid, entity: EntityRef) -> Result<Option<Entity>> {
        let query = format!(
            "SELECT id, user_id, title, content, importance, created_at,
                    position_x, position_y, position_z
             FROM {}
             WHERE id = $1 AND user_id = $2",
            entity.entity_type.table()
        );

        let row = sqlx::query(&query)
            .bind(entity.id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(|row| {
            let position = match (
                row.get::<Option<f64>, _>("position_x"),
                row.get::<Option<f64>, _>("position_y"),
                row.get::<Option<f64>, _>("position_z"),
            ) {
                (Some(x), Some(y), Some(z)) => Some(Coord3::new(x, y, z)),
                _ => None,
            };
            Entity {
                id: row.get("id"),
                user_id: row.get("user_id"),
                entity_type: entity.entity_type,
                title: row.get("title"),
                content: row.get("content"),
                importance: row.get("importance"),
                created_at: row.get("created_at"),
                position,
            }
        }))
    }

    async fn count_positioned(&self, user_id: Uuid) -> Result<i64> {
        let mut total = 0i64;
        for entity_type in EntityType::ALL {
            let query = format!(
                "SELECT COUNT(*) FROM {} WHERE user_id = $1 AND position_x IS NOT NULL",
                entity_type.table()
            );
            let count: i64 = sqlx::query_scalar(&query)
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
            total += count;
        }
        Ok(total)
    }

    async fn unpositioned(&self, user_id: Uuid, refs: &[EntityRef]) -> Result<Vec<EntityRef>> {
        // Rows that are missing entirely also count as unpositioned, so we
        // query for the positioned set and subtract.
        let mut positioned: HashSet<EntityRef> = HashSet::new();

        for (entity_type, ids) in Self::group_by_type(refs) {
            let query = format!(
                "SELECT id FROM {} WHERE user_id = $1 AND id = ANY($2) AND position_x IS NOT NULL",
                entity_type.table()
            );
            let rows = sqlx::query(&query)
                .bind(user_id)
                .bind(&ids)
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;

            for row in rows {
                positioned.insert(EntityRef::new(entity_type, row.get("id")));
            }
        }

        Ok(refs
            .iter()
            .filter(|r| !positioned.contains(r))
            .copied()
            .collect())
    }

    async fn update_position(
        &self,
        user_id: Uuid,
        entity: EntityRef,
        coord: Coord3,
    ) -> Result<()> {
        // All three columns in one statement: the triple is atomic per entity.
        let query = format!(
            "UPDATE {} SET position_x = $1, position_y = $2, position_z = $3
             WHERE id = $4 AND user_id = $5",
            entity.entity_type.table()
        );

        let result = sqlx::query(&query)
            .bind(coord.x)
            .bind(coord.y)
            .bind(coord.z)
            .bind(entity.id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::EntityNotFound(entity.entity_type, entity.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_by_type() {
        let a = EntityRef::new(EntityType::Concept, Uuid::new_v4());
        let b = EntityRef::new(EntityType::Concept, Uuid::new_v4());
        let c = EntityRef::new(EntityType::MemoryUnit, Uuid::new_v4());

        let groups = PgEntityStore::group_by_type(&[a, b, c]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&EntityType::Concept].len(), 2);
        assert_eq!(groups[&EntityType::MemoryUnit], vec![c.id]);
    }

    #[test]
    fn test_group_by_type_empty() {
        let groups = PgEntityStore::group_by_type(&[]);
        assert!(groups.is_empty());
    }
}
