//! Repository for the `requests` and `request_items` tables.

use folio_core::{ItemId, ProjectId, Request, RequestId, RequestState};
use sqlx::types::Json;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::request::{RequestItemRow, RequestRow};

const COLUMNS: &str = "id, project_id, title, description, reviewer_ids, state, created_by, \
    created_at, updated_at, approved_at, closed_at";

const ITEM_COLUMNS: &str = "request_id, position, item_id, version_id, source_ref";

pub struct RequestRepo;

impl RequestRepo {
    /// Find a request and lock its row until the transaction ends, so two
    /// transitions of the same request are serialized.
    pub async fn find_for_update(
        conn: &mut PgConnection,
        id: RequestId,
    ) -> Result<Option<RequestRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM requests WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, RequestRow>(&query)
            .bind(id.as_uuid())
            .fetch_optional(conn)
            .await
    }

    /// Requests of a project, newest first, optionally filtered by state.
    pub async fn list_by_project(
        conn: &mut PgConnection,
        project_id: ProjectId,
        state: Option<RequestState>,
    ) -> Result<Vec<RequestRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM requests
             WHERE project_id = $1 AND ($2::TEXT IS NULL OR state = $2)
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, RequestRow>(&query)
            .bind(project_id.as_uuid())
            .bind(state.map(|s| s.as_str()))
            .fetch_all(conn)
            .await
    }

    /// Non-terminal requests with an entry for `item_id`.
    pub async fn list_pending_for_item(
        conn: &mut PgConnection,
        item_id: ItemId,
    ) -> Result<Vec<RequestRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM requests r
             WHERE r.state IN ('DRAFT', 'WAITING')
               AND EXISTS (
                   SELECT 1 FROM request_items ri
                   WHERE ri.request_id = r.id AND ri.item_id = $1
               )
             ORDER BY r.created_at DESC"
        );
        sqlx::query_as::<_, RequestRow>(&query)
            .bind(item_id.as_uuid())
            .fetch_all(conn)
            .await
    }

    /// Entries of the given requests, ordered by request then position.
    pub async fn list_items(
        conn: &mut PgConnection,
        request_ids: &[Uuid],
    ) -> Result<Vec<RequestItemRow>, sqlx::Error> {
        let query = format!(
            "SELECT {ITEM_COLUMNS} FROM request_items
             WHERE request_id = ANY($1)
             ORDER BY request_id, position"
        );
        sqlx::query_as::<_, RequestItemRow>(&query)
            .bind(request_ids)
            .fetch_all(conn)
            .await
    }

    pub async fn create(conn: &mut PgConnection, request: &Request) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO requests
                (id, project_id, title, description, reviewer_ids, state, created_by,
                 created_at, updated_at, approved_at, closed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(request.id.as_uuid())
        .bind(request.project_id.as_uuid())
        .bind(&request.title)
        .bind(&request.description)
        .bind(reviewer_uuids(request))
        .bind(request.state.as_str())
        .bind(Json(request.created_by))
        .bind(request.created_at)
        .bind(request.updated_at)
        .bind(request.approved_at)
        .bind(request.closed_at)
        .execute(&mut *conn)
        .await?;

        Self::set_items_inner(conn, request).await
    }

    /// Overwrite a request row and its entries. Returns `false` when no such
    /// request exists.
    pub async fn update(conn: &mut PgConnection, request: &Request) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE requests SET
                title = $2, description = $3, reviewer_ids = $4, state = $5,
                updated_at = $6, approved_at = $7, closed_at = $8
             WHERE id = $1",
        )
        .bind(request.id.as_uuid())
        .bind(&request.title)
        .bind(&request.description)
        .bind(reviewer_uuids(request))
        .bind(request.state.as_str())
        .bind(request.updated_at)
        .bind(request.approved_at)
        .bind(request.closed_at)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        Self::set_items_inner(conn, request).await?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Replace the entries of a request.
    async fn set_items_inner(conn: &mut PgConnection, request: &Request) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM request_items WHERE request_id = $1")
            .bind(request.id.as_uuid())
            .execute(&mut *conn)
            .await?;

        for (position, entry) in request.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO request_items (request_id, position, item_id, version_id, source_ref)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(request.id.as_uuid())
            .bind(position as i32)
            .bind(entry.item_id.as_uuid())
            .bind(entry.version_id.as_uuid())
            .bind(entry.source_ref.map(|r| r.as_str()))
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }
}

fn reviewer_uuids(request: &Request) -> Vec<Uuid> {
    request.reviewer_ids.iter().map(|id| id.as_uuid()).collect()
}
