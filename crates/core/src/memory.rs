//! In-process [`Repository`] for tests and small single-node embeddings.
//!
//! Transactions are serialized by one async mutex, so writers never
//! interleave and unrelated items do contend. A transaction reads the shared
//! state directly and copies it on its first write; the copy replaces the
//! shared state on commit. Use the PostgreSQL repository for concurrent
//! workloads.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::CoreError;
use crate::repository::{Repository, Transaction};
use crate::request::{Request, RequestState};
use crate::types::{ItemId, ProjectId, RequestId, VersionId};
use crate::version::{Item, RefName, Version};

#[derive(Debug, Default, Clone)]
struct State {
    items: HashMap<ItemId, Item>,
    versions: HashMap<VersionId, Version>,
    refs: HashMap<(ItemId, RefName), VersionId>,
    requests: HashMap<RequestId, Request>,
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryRepository {
    state: Arc<Mutex<State>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<State>,
    /// Copy of the shared state, taken on the first write.
    working: Option<State>,
}

impl InMemoryTransaction {
    fn read(&self) -> &State {
        self.working.as_ref().unwrap_or(&*self.guard)
    }

    fn write(&mut self) -> &mut State {
        let guard = &self.guard;
        self.working.get_or_insert_with(|| (**guard).clone())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, CoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        Ok(InMemoryTransaction {
            guard,
            working: None,
        })
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn find_item(&mut self, id: ItemId) -> Result<Option<Item>, CoreError> {
        Ok(self.read().items.get(&id).cloned())
    }

    async fn insert_item(&mut self, item: &Item) -> Result<(), CoreError> {
        if self.read().items.contains_key(&item.id) {
            return Err(CoreError::Internal(format!("item {} already exists", item.id)));
        }
        self.write().items.insert(item.id, item.clone());
        Ok(())
    }

    async fn delete_item(&mut self, id: ItemId) -> Result<bool, CoreError> {
        if !self.read().items.contains_key(&id) {
            return Ok(false);
        }
        let state = self.write();
        state.items.remove(&id);
        state.versions.retain(|_, v| v.item_id != id);
        state.refs.retain(|(item_id, _), _| *item_id != id);
        Ok(true)
    }

    async fn find_version(&mut self, id: VersionId) -> Result<Option<Version>, CoreError> {
        Ok(self.read().versions.get(&id).cloned())
    }

    async fn list_versions(&mut self, item_id: ItemId) -> Result<Vec<Version>, CoreError> {
        let mut versions: Vec<Version> = self
            .read()
            .versions
            .values()
            .filter(|v| v.item_id == item_id)
            .cloned()
            .collect();
        versions.sort_by_key(|v| v.number);
        Ok(versions)
    }

    async fn insert_version(&mut self, version: &Version) -> Result<(), CoreError> {
        let duplicate_number = self
            .read()
            .versions
            .values()
            .any(|v| v.item_id == version.item_id && v.number == version.number);
        if duplicate_number || self.read().versions.contains_key(&version.id) {
            return Err(CoreError::Conflict(format!(
                "version {} of item {} already exists",
                version.number, version.item_id
            )));
        }
        self.write().versions.insert(version.id, version.clone());
        Ok(())
    }

    async fn find_ref(
        &mut self,
        item_id: ItemId,
        name: RefName,
    ) -> Result<Option<VersionId>, CoreError> {
        Ok(self.read().refs.get(&(item_id, name)).copied())
    }

    async fn compare_and_swap_ref(
        &mut self,
        item_id: ItemId,
        name: RefName,
        expected: Option<VersionId>,
        new: VersionId,
    ) -> Result<bool, CoreError> {
        let key = (item_id, name);
        if self.read().refs.get(&key).copied() != expected {
            return Ok(false);
        }
        self.write().refs.insert(key, new);
        Ok(true)
    }

    async fn set_ref(
        &mut self,
        item_id: ItemId,
        name: RefName,
        version: VersionId,
    ) -> Result<(), CoreError> {
        self.write().refs.insert((item_id, name), version);
        Ok(())
    }

    async fn clear_ref(&mut self, item_id: ItemId, name: RefName) -> Result<bool, CoreError> {
        if !self.read().refs.contains_key(&(item_id, name)) {
            return Ok(false);
        }
        Ok(self.write().refs.remove(&(item_id, name)).is_some())
    }

    async fn find_request(&mut self, id: RequestId) -> Result<Option<Request>, CoreError> {
        Ok(self.read().requests.get(&id).cloned())
    }

    async fn insert_request(&mut self, request: &Request) -> Result<(), CoreError> {
        self.write().requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn save_request(&mut self, request: &Request) -> Result<(), CoreError> {
        if !self.read().requests.contains_key(&request.id) {
            return Err(CoreError::not_found("Request", request.id));
        }
        match self.write().requests.get_mut(&request.id) {
            Some(stored) => {
                *stored = request.clone();
                Ok(())
            }
            None => Err(CoreError::not_found("Request", request.id)),
        }
    }

    async fn list_requests(
        &mut self,
        project_id: ProjectId,
        state: Option<RequestState>,
    ) -> Result<Vec<Request>, CoreError> {
        let mut requests: Vec<Request> = self
            .read()
            .requests
            .values()
            .filter(|r| r.project_id == project_id)
            .filter(|r| state.map_or(true, |s| r.state == s))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(requests)
    }

    async fn list_pending_requests_for_item(
        &mut self,
        item_id: ItemId,
    ) -> Result<Vec<Request>, CoreError> {
        Ok(self
            .read()
            .requests
            .values()
            .filter(|r| !r.state.is_terminal())
            .filter(|r| r.target_for(item_id).is_some())
            .cloned()
            .collect())
    }

    async fn commit(mut self) -> Result<(), CoreError> {
        if let Some(working) = self.working.take() {
            *self.guard = working;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ModelId, Operator, SchemaId};

    fn item() -> Item {
        Item {
            id: ItemId::new(),
            project_id: ProjectId::new(),
            model_id: ModelId::new(),
            schema_id: SchemaId::new(),
            created_by: Operator::System,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let repo = InMemoryRepository::new();
        let item = item();

        let mut tx = repo.begin().await.unwrap();
        tx.insert_item(&item).await.unwrap();
        drop(tx);

        let mut tx = repo.begin().await.unwrap();
        assert!(tx.find_item(item.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let repo = InMemoryRepository::new();
        let item = item();

        let mut tx = repo.begin().await.unwrap();
        tx.insert_item(&item).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        assert_eq!(tx.find_item(item.id).await.unwrap(), Some(item));
    }

    #[tokio::test]
    async fn read_only_commit_keeps_state() {
        let repo = InMemoryRepository::new();
        let item = item();

        let mut tx = repo.begin().await.unwrap();
        tx.insert_item(&item).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        assert!(tx.find_item(item.id).await.unwrap().is_some());
        assert!(!tx.clear_ref(item.id, RefName::Public).await.unwrap());
        assert!(tx.working.is_none());
        tx.commit().await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        assert_eq!(tx.find_item(item.id).await.unwrap(), Some(item));
    }

    #[tokio::test]
    async fn writes_are_visible_within_the_transaction() {
        let repo = InMemoryRepository::new();
        let item = item();

        let mut tx = repo.begin().await.unwrap();
        tx.insert_item(&item).await.unwrap();
        assert_eq!(tx.find_item(item.id).await.unwrap(), Some(item.clone()));
        assert!(tx.delete_item(item.id).await.unwrap());
        assert!(tx.find_item(item.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn compare_and_swap_checks_expected_position() {
        let repo = InMemoryRepository::new();
        let item_id = ItemId::new();
        let (v1, v2) = (VersionId::new(), VersionId::new());

        let mut tx = repo.begin().await.unwrap();
        assert!(tx
            .compare_and_swap_ref(item_id, RefName::Latest, None, v1)
            .await
            .unwrap());
        assert!(!tx
            .compare_and_swap_ref(item_id, RefName::Latest, None, v2)
            .await
            .unwrap());
        assert!(tx
            .compare_and_swap_ref(item_id, RefName::Latest, Some(v1), v2)
            .await
            .unwrap());
        assert_eq!(tx.find_ref(item_id, RefName::Latest).await.unwrap(), Some(v2));
    }

    #[tokio::test]
    async fn delete_item_removes_versions_and_refs() {
        let repo = InMemoryRepository::new();
        let item = item();
        let version = Version::initial(&item, vec![], Operator::System);

        let mut tx = repo.begin().await.unwrap();
        tx.insert_item(&item).await.unwrap();
        tx.insert_version(&version).await.unwrap();
        tx.set_ref(item.id, RefName::Latest, version.id).await.unwrap();

        assert!(tx.delete_item(item.id).await.unwrap());
        assert!(tx.find_version(version.id).await.unwrap().is_none());
        assert!(tx.find_ref(item.id, RefName::Latest).await.unwrap().is_none());
        assert!(!tx.delete_item(item.id).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_version_number_conflicts() {
        let repo = InMemoryRepository::new();
        let item = item();
        let v1 = Version::initial(&item, vec![], Operator::System);
        let mut clash = Version::initial(&item, vec![], Operator::System);
        clash.number = v1.number;

        let mut tx = repo.begin().await.unwrap();
        tx.insert_version(&v1).await.unwrap();
        assert!(matches!(
            tx.insert_version(&clash).await,
            Err(CoreError::Conflict(_))
        ));
    }
}
