//! Transformation matrix store.
//!
//! One current row per user, replaced wholesale by each successful manifold
//! fit (last-write-wins). Reads and writes happen under the projection
//! worker's per-user lock, so a stale fit can never overwrite a newer one.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use cosmo_core::{Error, MatrixStore, Result, TransformationMatrix};

/// PostgreSQL implementation of [`MatrixStore`].
#[derive(Clone)]
pub struct PgMatrixStore {
    pool: Pool<Postgres>,
}

impl PgMatrixStore {
    /// Create a new PgMatrixStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MatrixStore for PgMatrixStore {
    async fn current(&self, user_id: Uuid) -> Result<Option<TransformationMatrix>> {
        let row = sqlx::query(
            "SELECT matrix, parameters, learned_at, node_count
             FROM projection_matrices
             WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => {
                let matrix_json: serde_json::Value = row.get("matrix");
                let matrix: Vec<Vec<f32>> = serde_json::from_value(matrix_json)
                    .map_err(|e| Error::Serialization(format!("Stored matrix corrupt: {}", e)))?;

                Ok(Some(TransformationMatrix {
                    user_id,
                    matrix,
                    parameters: row.get("parameters"),
                    learned_at: row.get("learned_at"),
                    node_count: row.get("node_count"),
                }))
            }
            None => Ok(None),
        }
    }

    async fn replace(&self, matrix: &TransformationMatrix) -> Result<()> {
        let matrix_json = serde_json::to_value(&matrix.matrix)?;

        sqlx::query(
            "INSERT INTO projection_matrices (user_id, matrix, parameters, learned_at, node_count)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (user_id)
             DO UPDATE SET matrix = EXCLUDED.matrix,
                           parameters = EXCLUDED.parameters,
                           learned_at = EXCLUDED.learned_at,
                           node_count = EXCLUDED.node_count",
        )
        .bind(matrix.user_id)
        .bind(matrix_json)
        .bind(&matrix.parameters)
        .bind(matrix.learned_at)
        .bind(matrix.node_count)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }
}
