//! Persistence contract for the item store.
//!
//! Every store operation opens one [`Transaction`], performs all reads and
//! writes through it, and commits once. Dropping a transaction without
//! committing discards its writes, which is how a failed reference
//! propagation leaves no partial state behind.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::request::{Request, RequestState};
use crate::types::{ItemId, ProjectId, RequestId, VersionId};
use crate::version::{Item, RefName, Version};

#[async_trait]
pub trait Repository: Send + Sync {
    type Tx: Transaction;

    async fn begin(&self) -> Result<Self::Tx, CoreError>;
}

#[async_trait]
pub trait Transaction: Send {
    // -- items ---------------------------------------------------------------

    async fn find_item(&mut self, id: ItemId) -> Result<Option<Item>, CoreError>;

    async fn insert_item(&mut self, item: &Item) -> Result<(), CoreError>;

    /// Delete an item with all its versions and refs. Returns `false` when
    /// the item did not exist.
    async fn delete_item(&mut self, id: ItemId) -> Result<bool, CoreError>;

    // -- versions ------------------------------------------------------------

    async fn find_version(&mut self, id: VersionId) -> Result<Option<Version>, CoreError>;

    /// All versions of an item, oldest first.
    async fn list_versions(&mut self, item_id: ItemId) -> Result<Vec<Version>, CoreError>;

    async fn insert_version(&mut self, version: &Version) -> Result<(), CoreError>;

    // -- refs ----------------------------------------------------------------

    async fn find_ref(&mut self, item_id: ItemId, name: RefName)
        -> Result<Option<VersionId>, CoreError>;

    /// Point `name` at `new` only if it currently points at `expected`
    /// (`None` meaning unset). Returns whether the swap happened.
    async fn compare_and_swap_ref(
        &mut self,
        item_id: ItemId,
        name: RefName,
        expected: Option<VersionId>,
        new: VersionId,
    ) -> Result<bool, CoreError>;

    /// Point `name` at `version` regardless of its current position.
    async fn set_ref(
        &mut self,
        item_id: ItemId,
        name: RefName,
        version: VersionId,
    ) -> Result<(), CoreError>;

    /// Unset a ref. Returns whether it was set.
    async fn clear_ref(&mut self, item_id: ItemId, name: RefName) -> Result<bool, CoreError>;

    // -- requests ------------------------------------------------------------

    async fn find_request(&mut self, id: RequestId) -> Result<Option<Request>, CoreError>;

    async fn insert_request(&mut self, request: &Request) -> Result<(), CoreError>;

    /// Overwrite a stored request, items included.
    async fn save_request(&mut self, request: &Request) -> Result<(), CoreError>;

    /// Requests of a project, newest first, optionally filtered by state.
    async fn list_requests(
        &mut self,
        project_id: ProjectId,
        state: Option<RequestState>,
    ) -> Result<Vec<Request>, CoreError>;

    /// Non-terminal requests containing `item_id`.
    async fn list_pending_requests_for_item(
        &mut self,
        item_id: ItemId,
    ) -> Result<Vec<Request>, CoreError>;

    // -- lifecycle -----------------------------------------------------------

    async fn commit(self) -> Result<(), CoreError>;
}
