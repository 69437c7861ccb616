//! PostgreSQL implementation of the item store contracts.

use std::collections::HashMap;

use async_trait::async_trait;
use folio_core::{
    CoreError, Item, ItemId, ModelId, ProjectId, RefName, Repository, Request, RequestId, RequestState,
    Schema, SchemaId, SchemaProvider, Transaction, Version, VersionId,
};
use sqlx::Postgres;
use uuid::Uuid;

use crate::db_error;
use crate::models::request::{RequestItemRow, RequestRow};
use crate::repositories::{ItemRepo, RefRepo, RequestRepo, SchemaRepo, VersionRepo};
use crate::DbPool;

/// [`Repository`] backed by a connection pool. Every store operation gets
/// its own database transaction.
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: DbPool,
}

impl PgRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl Repository for PgRepository {
    type Tx = PgTransaction;

    async fn begin(&self) -> Result<Self::Tx, CoreError> {
        let tx = self.pool.begin().await.map_err(db_error)?;
        Ok(PgTransaction { tx })
    }
}

/// Open database transaction. Dropping it without [`Transaction::commit`]
/// rolls back.
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PgTransaction {
    async fn assemble(&mut self, rows: Vec<RequestRow>) -> Result<Vec<Request>, CoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items: HashMap<Uuid, Vec<RequestItemRow>> = HashMap::new();
        for row in RequestRepo::list_items(&mut self.tx, &ids)
            .await
            .map_err(db_error)?
        {
            items.entry(row.request_id).or_default().push(row);
        }
        rows.into_iter()
            .map(|row| {
                let entries = items.remove(&row.id).unwrap_or_default();
                row.into_request(entries)
            })
            .collect()
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn find_item(&mut self, id: ItemId) -> Result<Option<Item>, CoreError> {
        let row = ItemRepo::find_by_id(&mut self.tx, id)
            .await
            .map_err(db_error)?;
        Ok(row.map(Item::from))
    }

    async fn insert_item(&mut self, item: &Item) -> Result<(), CoreError> {
        ItemRepo::create(&mut self.tx, item).await.map_err(db_error)
    }

    async fn delete_item(&mut self, id: ItemId) -> Result<bool, CoreError> {
        ItemRepo::delete(&mut self.tx, id).await.map_err(db_error)
    }

    async fn find_version(&mut self, id: VersionId) -> Result<Option<Version>, CoreError> {
        let row = VersionRepo::find_by_id(&mut self.tx, id)
            .await
            .map_err(db_error)?;
        Ok(row.map(Version::from))
    }

    async fn list_versions(&mut self, item_id: ItemId) -> Result<Vec<Version>, CoreError> {
        let rows = VersionRepo::list_by_item(&mut self.tx, item_id)
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(Version::from).collect())
    }

    async fn insert_version(&mut self, version: &Version) -> Result<(), CoreError> {
        VersionRepo::create(&mut self.tx, version)
            .await
            .map_err(db_error)
    }

    async fn find_ref(
        &mut self,
        item_id: ItemId,
        name: RefName,
    ) -> Result<Option<VersionId>, CoreError> {
        let id = RefRepo::find(&mut self.tx, item_id, name)
            .await
            .map_err(db_error)?;
        Ok(id.map(VersionId::from_uuid))
    }

    async fn compare_and_swap_ref(
        &mut self,
        item_id: ItemId,
        name: RefName,
        expected: Option<VersionId>,
        new: VersionId,
    ) -> Result<bool, CoreError> {
        RefRepo::compare_and_swap(&mut self.tx, item_id, name, expected, new)
            .await
            .map_err(db_error)
    }

    async fn set_ref(
        &mut self,
        item_id: ItemId,
        name: RefName,
        version: VersionId,
    ) -> Result<(), CoreError> {
        RefRepo::set(&mut self.tx, item_id, name, version)
            .await
            .map_err(db_error)
    }

    async fn clear_ref(&mut self, item_id: ItemId, name: RefName) -> Result<bool, CoreError> {
        RefRepo::clear(&mut self.tx, item_id, name)
            .await
            .map_err(db_error)
    }

    async fn find_request(&mut self, id: RequestId) -> Result<Option<Request>, CoreError> {
        let Some(row) = RequestRepo::find_for_update(&mut self.tx, id)
            .await
            .map_err(db_error)?
        else {
            return Ok(None);
        };
        Ok(self.assemble(vec![row]).await?.pop())
    }

    async fn insert_request(&mut self, request: &Request) -> Result<(), CoreError> {
        RequestRepo::create(&mut self.tx, request)
            .await
            .map_err(db_error)
    }

    async fn save_request(&mut self, request: &Request) -> Result<(), CoreError> {
        let updated = RequestRepo::update(&mut self.tx, request)
            .await
            .map_err(db_error)?;
        if !updated {
            return Err(CoreError::not_found("Request", request.id));
        }
        Ok(())
    }

    async fn list_requests(
        &mut self,
        project_id: ProjectId,
        state: Option<RequestState>,
    ) -> Result<Vec<Request>, CoreError> {
        let rows = RequestRepo::list_by_project(&mut self.tx, project_id, state)
            .await
            .map_err(db_error)?;
        self.assemble(rows).await
    }

    async fn list_pending_requests_for_item(
        &mut self,
        item_id: ItemId,
    ) -> Result<Vec<Request>, CoreError> {
        let rows = RequestRepo::list_pending_for_item(&mut self.tx, item_id)
            .await
            .map_err(db_error)?;
        self.assemble(rows).await
    }

    async fn commit(self) -> Result<(), CoreError> {
        self.tx.commit().await.map_err(db_error)
    }
}

// ---------------------------------------------------------------------------
// Schema provider
// ---------------------------------------------------------------------------

/// [`SchemaProvider`] reading schema documents from the `schemas` table.
#[derive(Debug, Clone)]
pub struct PgSchemaProvider {
    pool: DbPool,
}

impl PgSchemaProvider {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Store a schema, replacing any previous document with the same id.
    pub async fn save(&self, schema: &Schema) -> Result<(), CoreError> {
        SchemaRepo::upsert(&self.pool, schema)
            .await
            .map_err(db_error)?;
        tracing::info!(schema_id = %schema.id, model_id = %schema.model_id, "Schema saved");
        Ok(())
    }

    /// All schemas of a model, oldest first.
    pub async fn schemas_for_model(&self, model_id: ModelId) -> Result<Vec<Schema>, CoreError> {
        let rows = SchemaRepo::list_by_model(&self.pool, model_id)
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(Schema::from).collect())
    }
}

#[async_trait]
impl SchemaProvider for PgSchemaProvider {
    async fn schema(&self, id: SchemaId) -> Result<Schema, CoreError> {
        SchemaRepo::find_by_id(&self.pool, id)
            .await
            .map_err(db_error)?
            .map(Schema::from)
            .ok_or_else(|| CoreError::not_found("Schema", id))
    }
}
