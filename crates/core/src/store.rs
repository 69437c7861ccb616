//! Versioned item store.
//!
//! [`ContentStore`] is the entry point for every write. Each operation runs
//! in a single repository transaction: item rows, versions, ref moves and
//! back-reference updates either all commit or none do.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::field::FieldInput;
use crate::reference::{load_version, targets, ReferenceSync};
use crate::repository::{Repository, Transaction};
use crate::request::{DefaultRequestPolicy, RequestPolicy};
use crate::schema::{Schema, SchemaProvider};
use crate::types::{ItemId, ModelId, Operator, SchemaId, VersionId};
use crate::version::{
    diff_versions, FieldDiff, Item, ItemRefs, ItemSnapshot, RefName, Version, VersionSelector,
};

/// Input for [`ContentStore::create_item`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub model_id: ModelId,
    pub schema_id: SchemaId,
    pub fields: Vec<FieldInput>,
}

pub struct ContentStore<R, S, P = DefaultRequestPolicy> {
    pub(crate) repo: R,
    pub(crate) schemas: S,
    pub(crate) policy: P,
}

impl<R, S> ContentStore<R, S>
where
    R: Repository,
    S: SchemaProvider,
{
    pub fn new(repo: R, schemas: S) -> Self {
        Self {
            repo,
            schemas,
            policy: DefaultRequestPolicy,
        }
    }
}

impl<R, S, P> ContentStore<R, S, P>
where
    R: Repository,
    S: SchemaProvider,
    P: RequestPolicy,
{
    /// Replace the request policy.
    pub fn with_policy<Q: RequestPolicy>(self, policy: Q) -> ContentStore<R, S, Q> {
        ContentStore {
            repo: self.repo,
            schemas: self.schemas,
            policy,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn schemas(&self) -> &S {
        &self.schemas
    }

    // -- writes --------------------------------------------------------------

    /// Create an item with its first version and point `latest` at it.
    ///
    /// Two-way reference fields set on the new item are mirrored onto their
    /// targets in the same transaction.
    pub async fn create_item(
        &self,
        operator: Operator,
        input: NewItem,
    ) -> Result<ItemSnapshot, CoreError> {
        let schema = self.schemas.schema(input.schema_id).await?;
        if schema.model_id != input.model_id {
            return Err(CoreError::Validation(format!(
                "Schema {} does not belong to model {}",
                schema.id, input.model_id
            )));
        }
        let fields = schema.coerce_fields(&input.fields)?;
        let fields = schema.merge_fields(&[], fields);
        schema.check_required(&fields)?;

        let item = Item {
            id: ItemId::new(),
            project_id: schema.project_id,
            model_id: input.model_id,
            schema_id: schema.id,
            created_by: operator,
            created_at: chrono::Utc::now(),
        };

        let mut tx = self.repo.begin().await?;
        let mut sync = ReferenceSync::new(item.id, item.model_id, fields);
        for field in schema.fields.iter().filter(|f| f.field_type.reference().is_some()) {
            let after = targets(sync.origin_field(field.id));
            sync.link(&mut tx, field, &[], &after).await?;
        }

        let version = Version::initial(&item, sync.origin_fields().to_vec(), operator);
        tx.insert_item(&item).await?;
        tx.insert_version(&version).await?;
        if !tx
            .compare_and_swap_ref(item.id, RefName::Latest, None, version.id)
            .await?
        {
            return Err(CoreError::Internal(format!(
                "item {} already has a latest ref",
                item.id
            )));
        }
        let linked = sync.apply(&mut tx, operator).await?;
        tx.commit().await?;

        tracing::info!(
            item_id = %item.id,
            model_id = %item.model_id,
            version_id = %version.id,
            linked,
            "Item created"
        );
        let refs = ItemRefs {
            latest: version.id,
            public: None,
        };
        Ok(ItemSnapshot {
            item,
            version,
            refs,
        })
    }

    /// Append a version built from `fields` merged over the latest version.
    ///
    /// Fails with [`CoreError::Conflict`] when `expected` is no longer the
    /// latest version. When the merge changes nothing, no version is written
    /// and the current latest is returned.
    pub async fn update_item(
        &self,
        operator: Operator,
        item_id: ItemId,
        expected: VersionId,
        fields: Vec<FieldInput>,
    ) -> Result<ItemSnapshot, CoreError> {
        let schema = self.item_schema(item_id).await?;

        let mut tx = self.repo.begin().await?;
        let item = load_item(&mut tx, item_id).await?;
        let latest = load_latest(&mut tx, item_id).await?;
        if latest.id != expected {
            return Err(CoreError::Conflict(format!(
                "Item {item_id} has moved on: expected version {expected}, latest is {}",
                latest.id
            )));
        }

        let patch = schema.coerce_fields(&fields)?;
        let merged = schema.merge_fields(&latest.fields, patch);
        schema.check_required(&merged)?;

        let mut sync = ReferenceSync::new(item.id, item.model_id, merged);
        for field in schema.fields.iter().filter(|f| f.field_type.reference().is_some()) {
            let before = targets(latest.field(field.id));
            let after = targets(sync.origin_field(field.id));
            sync.link(&mut tx, field, &before, &after).await?;
        }

        let public = tx.find_ref(item_id, RefName::Public).await?;
        if sync.origin_fields() == latest.fields.as_slice() && !sync.has_patches() {
            tracing::debug!(item_id = %item_id, "Update left item unchanged");
            let refs = ItemRefs {
                latest: latest.id,
                public,
            };
            return Ok(ItemSnapshot {
                item,
                version: latest,
                refs,
            });
        }

        let next = latest.successor(sync.origin_fields().to_vec(), operator);
        tx.insert_version(&next).await?;
        if !tx
            .compare_and_swap_ref(item_id, RefName::Latest, Some(latest.id), next.id)
            .await?
        {
            return Err(CoreError::Conflict(format!(
                "Item {item_id} was modified concurrently"
            )));
        }
        let linked = sync.apply(&mut tx, operator).await?;
        tx.commit().await?;

        tracing::info!(
            item_id = %item_id,
            version_id = %next.id,
            version = next.number,
            linked,
            "Item updated"
        );
        let refs = ItemRefs {
            latest: next.id,
            public,
        };
        Ok(ItemSnapshot {
            item,
            version: next,
            refs,
        })
    }

    /// Delete an item and all its versions, clearing every back-reference
    /// other items hold to it.
    pub async fn delete_item(&self, operator: Operator, item_id: ItemId) -> Result<(), CoreError> {
        let schema = self.item_schema(item_id).await?;

        let mut tx = self.repo.begin().await?;
        let item = load_item(&mut tx, item_id).await?;
        let latest = load_latest(&mut tx, item_id).await?;

        let mut sync = ReferenceSync::new(item.id, item.model_id, latest.fields.clone());
        for field in &schema.fields {
            for target in targets(latest.field(field.id)) {
                sync.release(&mut tx, field, target).await?;
            }
        }

        tx.delete_item(item_id).await?;
        let unlinked = sync.apply(&mut tx, operator).await?;
        tx.commit().await?;

        tracing::info!(item_id = %item_id, unlinked, "Item deleted");
        Ok(())
    }

    /// Unset the `public` ref of each item. Items that were never published
    /// are left as they are.
    pub async fn unpublish_items(
        &self,
        operator: Operator,
        item_ids: &[ItemId],
    ) -> Result<usize, CoreError> {
        let mut tx = self.repo.begin().await?;
        let mut cleared = 0;
        for &item_id in item_ids {
            load_item(&mut tx, item_id).await?;
            if tx.clear_ref(item_id, RefName::Public).await? {
                cleared += 1;
            }
        }
        tx.commit().await?;

        tracing::info!(
            operator = ?operator,
            requested = item_ids.len(),
            cleared,
            "Items unpublished"
        );
        Ok(cleared)
    }

    // -- reads ---------------------------------------------------------------

    /// Read an item at a ref or at a specific version.
    pub async fn get_item(
        &self,
        item_id: ItemId,
        selector: impl Into<VersionSelector>,
    ) -> Result<ItemSnapshot, CoreError> {
        let mut tx = self.repo.begin().await?;
        let item = load_item(&mut tx, item_id).await?;
        let latest = tx
            .find_ref(item_id, RefName::Latest)
            .await?
            .ok_or_else(|| CoreError::Internal(format!("item {item_id} has no latest ref")))?;
        let public = tx.find_ref(item_id, RefName::Public).await?;

        let version_id = match selector.into() {
            VersionSelector::Ref(RefName::Latest) => latest,
            VersionSelector::Ref(RefName::Public) => {
                public.ok_or_else(|| CoreError::not_found("Public version of item", item_id))?
            }
            VersionSelector::Version(id) => id,
        };
        let version = load_item_version(&mut tx, item_id, version_id).await?;

        Ok(ItemSnapshot {
            item,
            version,
            refs: ItemRefs { latest, public },
        })
    }

    /// Version history of an item, oldest first.
    pub async fn item_versions(&self, item_id: ItemId) -> Result<Vec<Version>, CoreError> {
        let mut tx = self.repo.begin().await?;
        load_item(&mut tx, item_id).await?;
        tx.list_versions(item_id).await
    }

    /// Field-by-field comparison of two versions of the same item.
    pub async fn diff_versions(
        &self,
        item_id: ItemId,
        from: VersionId,
        to: VersionId,
    ) -> Result<Vec<FieldDiff>, CoreError> {
        let mut tx = self.repo.begin().await?;
        load_item(&mut tx, item_id).await?;
        let from = load_item_version(&mut tx, item_id, from).await?;
        let to = load_item_version(&mut tx, item_id, to).await?;
        Ok(diff_versions(&from, &to))
    }

    /// Schema of an existing item, resolved outside the write transaction.
    /// An item's schema id never changes.
    async fn item_schema(&self, item_id: ItemId) -> Result<Schema, CoreError> {
        let schema_id = {
            let mut tx = self.repo.begin().await?;
            load_item(&mut tx, item_id).await?.schema_id
        };
        self.schemas.schema(schema_id).await
    }
}

// ---------------------------------------------------------------------------
// Transaction helpers
// ---------------------------------------------------------------------------

pub(crate) async fn load_item<T: Transaction>(tx: &mut T, id: ItemId) -> Result<Item, CoreError> {
    tx.find_item(id)
        .await?
        .ok_or_else(|| CoreError::not_found("Item", id))
}

pub(crate) async fn load_latest<T: Transaction>(
    tx: &mut T,
    item_id: ItemId,
) -> Result<Version, CoreError> {
    let id = tx
        .find_ref(item_id, RefName::Latest)
        .await?
        .ok_or_else(|| CoreError::Internal(format!("item {item_id} has no latest ref")))?;
    load_version(tx, id).await
}

/// Load a version and check it belongs to `item_id`.
pub(crate) async fn load_item_version<T: Transaction>(
    tx: &mut T,
    item_id: ItemId,
    version_id: VersionId,
) -> Result<Version, CoreError> {
    tx.find_version(version_id)
        .await?
        .filter(|v| v.item_id == item_id)
        .ok_or_else(|| CoreError::not_found("Version", version_id))
}
