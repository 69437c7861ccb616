//! Item version row model.

use folio_core::{
    FieldValue, ItemId, ModelId, Operator, SchemaId, Timestamp, Version, VersionId,
};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `item_versions` table. Field values are stored as one
/// JSONB array in schema order.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VersionRow {
    pub id: Uuid,
    pub item_id: Uuid,
    pub number: i32,
    pub model_id: Uuid,
    pub schema_id: Uuid,
    pub fields: Json<Vec<FieldValue>>,
    pub parent_ids: Vec<Uuid>,
    pub created_by: Json<Operator>,
    pub created_at: Timestamp,
}

impl From<VersionRow> for Version {
    fn from(row: VersionRow) -> Self {
        Self {
            id: VersionId::from_uuid(row.id),
            item_id: ItemId::from_uuid(row.item_id),
            number: row.number,
            model_id: ModelId::from_uuid(row.model_id),
            schema_id: SchemaId::from_uuid(row.schema_id),
            fields: row.fields.0,
            parents: row.parent_ids.into_iter().map(VersionId::from_uuid).collect(),
            created_by: row.created_by.0,
            created_at: row.created_at,
        }
    }
}
