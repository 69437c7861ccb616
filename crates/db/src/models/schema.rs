//! Schema row model. The schema document is kept whole in `body`; the id
//! columns are duplicated for lookups.

use folio_core::{Schema, Timestamp};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `schemas` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SchemaRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub model_id: Uuid,
    pub body: Json<Schema>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<SchemaRow> for Schema {
    fn from(row: SchemaRow) -> Self {
        row.body.0
    }
}
