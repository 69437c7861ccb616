//! Repository for the `items` table.

use folio_core::{Item, ItemId};
use sqlx::types::Json;
use sqlx::PgConnection;

use crate::models::item::ItemRow;

const COLUMNS: &str = "id, project_id, model_id, schema_id, created_by, created_at";

pub struct ItemRepo;

impl ItemRepo {
    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: ItemId,
    ) -> Result<Option<ItemRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM items WHERE id = $1");
        sqlx::query_as::<_, ItemRow>(&query)
            .bind(id.as_uuid())
            .fetch_optional(conn)
            .await
    }

    pub async fn create(conn: &mut PgConnection, item: &Item) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO items (id, project_id, model_id, schema_id, created_by, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(item.id.as_uuid())
        .bind(item.project_id.as_uuid())
        .bind(item.model_id.as_uuid())
        .bind(item.schema_id.as_uuid())
        .bind(Json(item.created_by))
        .bind(item.created_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Delete an item. Versions and refs go with it through `ON DELETE
    /// CASCADE`. Returns `true` if a row was removed.
    pub async fn delete(conn: &mut PgConnection, id: ItemId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id.as_uuid())
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
