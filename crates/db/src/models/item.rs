//! Item row model.

use folio_core::{Item, ItemId, ModelId, Operator, ProjectId, SchemaId, Timestamp};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `items` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ItemRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub model_id: Uuid,
    pub schema_id: Uuid,
    pub created_by: Json<Operator>,
    pub created_at: Timestamp,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            id: ItemId::from_uuid(row.id),
            project_id: ProjectId::from_uuid(row.project_id),
            model_id: ModelId::from_uuid(row.model_id),
            schema_id: SchemaId::from_uuid(row.schema_id),
            created_by: row.created_by.0,
            created_at: row.created_at,
        }
    }
}
