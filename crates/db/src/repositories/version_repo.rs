//! Repository for the `item_versions` table. Versions are insert-only.

use folio_core::{ItemId, Version, VersionId};
use sqlx::types::Json;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::version::VersionRow;

const COLUMNS: &str = "id, item_id, number, model_id, schema_id, fields, parent_ids, \
    created_by, created_at";

pub struct VersionRepo;

impl VersionRepo {
    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: VersionId,
    ) -> Result<Option<VersionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM item_versions WHERE id = $1");
        sqlx::query_as::<_, VersionRow>(&query)
            .bind(id.as_uuid())
            .fetch_optional(conn)
            .await
    }

    /// All versions of an item, ordered by version number ascending.
    pub async fn list_by_item(
        conn: &mut PgConnection,
        item_id: ItemId,
    ) -> Result<Vec<VersionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM item_versions WHERE item_id = $1 ORDER BY number ASC"
        );
        sqlx::query_as::<_, VersionRow>(&query)
            .bind(item_id.as_uuid())
            .fetch_all(conn)
            .await
    }

    /// Insert a version. A second version with the same number for the same
    /// item violates `UNIQUE (item_id, number)`.
    pub async fn create(conn: &mut PgConnection, version: &Version) -> Result<(), sqlx::Error> {
        let parent_ids: Vec<Uuid> = version.parents.iter().map(|p| p.as_uuid()).collect();
        sqlx::query(
            "INSERT INTO item_versions
                (id, item_id, number, model_id, schema_id, fields, parent_ids, created_by, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(version.id.as_uuid())
        .bind(version.item_id.as_uuid())
        .bind(version.number)
        .bind(version.model_id.as_uuid())
        .bind(version.schema_id.as_uuid())
        .bind(Json(&version.fields))
        .bind(&parent_ids)
        .bind(Json(version.created_by))
        .bind(version.created_at)
        .execute(conn)
        .await?;
        Ok(())
    }
}
