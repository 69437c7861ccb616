//! Request row models.

use folio_core::{
    CoreError, ItemId, Operator, ProjectId, RefName, Request, RequestId, RequestItem,
    RequestState, Timestamp, UserId, VersionId,
};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `requests` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RequestRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub reviewer_ids: Vec<Uuid>,
    pub state: String,
    pub created_by: Json<Operator>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub approved_at: Option<Timestamp>,
    pub closed_at: Option<Timestamp>,
}

/// A row from the `request_items` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RequestItemRow {
    pub request_id: Uuid,
    pub position: i32,
    pub item_id: Uuid,
    pub version_id: Uuid,
    pub source_ref: Option<String>,
}

impl RequestRow {
    /// Assemble the domain request from its row and entry rows, which must be
    /// ordered by `position`.
    pub fn into_request(self, items: Vec<RequestItemRow>) -> Result<Request, CoreError> {
        Ok(Request {
            id: RequestId::from_uuid(self.id),
            project_id: ProjectId::from_uuid(self.project_id),
            title: self.title,
            description: self.description,
            reviewer_ids: self.reviewer_ids.into_iter().map(UserId::from_uuid).collect(),
            state: self.state.parse::<RequestState>()?,
            items: items
                .into_iter()
                .map(RequestItemRow::into_item)
                .collect::<Result<_, _>>()?,
            created_by: self.created_by.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
            approved_at: self.approved_at,
            closed_at: self.closed_at,
        })
    }
}

impl RequestItemRow {
    pub fn into_item(self) -> Result<RequestItem, CoreError> {
        let source_ref = self
            .source_ref
            .as_deref()
            .map(str::parse::<RefName>)
            .transpose()?;
        Ok(RequestItem {
            item_id: ItemId::from_uuid(self.item_id),
            version_id: VersionId::from_uuid(self.version_id),
            source_ref,
        })
    }
}
