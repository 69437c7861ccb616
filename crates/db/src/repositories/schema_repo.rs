//! Repository for the `schemas` table.

use folio_core::{ModelId, Schema, SchemaId};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::schema::SchemaRow;

const COLUMNS: &str = "id, project_id, model_id, body, created_at, updated_at";

pub struct SchemaRepo;

impl SchemaRepo {
    pub async fn find_by_id(pool: &PgPool, id: SchemaId) -> Result<Option<SchemaRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM schemas WHERE id = $1");
        sqlx::query_as::<_, SchemaRow>(&query)
            .bind(id.as_uuid())
            .fetch_optional(pool)
            .await
    }

    pub async fn list_by_model(
        pool: &PgPool,
        model_id: ModelId,
    ) -> Result<Vec<SchemaRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM schemas WHERE model_id = $1 ORDER BY created_at");
        sqlx::query_as::<_, SchemaRow>(&query)
            .bind(model_id.as_uuid())
            .fetch_all(pool)
            .await
    }

    /// Insert a schema or replace the stored document of an existing one.
    pub async fn upsert(pool: &PgPool, schema: &Schema) -> Result<SchemaRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO schemas (id, project_id, model_id, body)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO UPDATE SET body = EXCLUDED.body, updated_at = NOW()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SchemaRow>(&query)
            .bind(schema.id.as_uuid())
            .bind(schema.project_id.as_uuid())
            .bind(schema.model_id.as_uuid())
            .bind(Json(schema))
            .fetch_one(pool)
            .await
    }
}
