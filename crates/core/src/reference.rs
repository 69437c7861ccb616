//! Two-way reference integrity.
//!
//! When a write changes one end of a reference pair, the other end of every
//! affected item has to follow: the previous target lets go of the origin,
//! the new target's previous holder lets go of the new target, and the new
//! target points back at the origin. [`ReferenceSync`] collects those
//! changes as per-item patches, reading through its own pending patches so
//! later steps see earlier ones, and [`ReferenceSync::apply`] writes one new
//! version per touched item inside the caller's transaction.
//!
//! The latest version of every other item is read once and pinned. `apply`
//! moves `latest` by compare-and-swap against that pinned version, so a
//! concurrent write to a touched item between the read and the write fails
//! the operation with [`CoreError::Conflict`] instead of being overwritten.
//!
//! Invariant kept for every pair `(A on X, B on Y)` and the latest versions
//! of both items: `x.A == y` iff `y.B == x`.

use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::field::FieldValue;
use crate::repository::Transaction;
use crate::schema::SchemaField;
use crate::types::{FieldId, ItemId, ModelId, Operator, VersionId};
use crate::version::{set_reference, RefName, Version};

/// Item ids held by a reference field value.
pub(crate) fn targets(value: Option<&FieldValue>) -> Vec<ItemId> {
    value
        .map(|v| v.values.iter().filter_map(|v| v.as_reference()).collect())
        .unwrap_or_default()
}

pub(crate) struct ReferenceSync {
    origin: ItemId,
    origin_model: ModelId,
    origin_fields: Vec<FieldValue>,
    patches: BTreeMap<ItemId, BTreeMap<FieldId, Option<ItemId>>>,
    /// Latest version of each other item as first read by this sync.
    bases: BTreeMap<ItemId, Option<Version>>,
}

impl ReferenceSync {
    /// Start tracking changes caused by writing `fields` as the new content
    /// of `origin`.
    pub(crate) fn new(origin: ItemId, origin_model: ModelId, fields: Vec<FieldValue>) -> Self {
        Self {
            origin,
            origin_model,
            origin_fields: fields,
            patches: BTreeMap::new(),
            bases: BTreeMap::new(),
        }
    }

    pub(crate) fn origin_field(&self, field: FieldId) -> Option<&FieldValue> {
        self.origin_fields.iter().find(|v| v.field_id == field)
    }

    /// The origin's fields with any self-reference patches folded in.
    pub(crate) fn origin_fields(&self) -> &[FieldValue] {
        &self.origin_fields
    }

    pub(crate) fn has_patches(&self) -> bool {
        !self.patches.is_empty()
    }

    /// Reconcile a reference field of the origin whose targets change from
    /// `before` to `after`.
    ///
    /// Newly referenced items must exist and belong to the declared model.
    /// For two-way fields the other ends are patched as described in the
    /// module docs.
    pub(crate) async fn link<T: Transaction>(
        &mut self,
        tx: &mut T,
        field: &SchemaField,
        before: &[ItemId],
        after: &[ItemId],
    ) -> Result<(), CoreError> {
        let Some(spec) = field.field_type.reference() else {
            return Ok(());
        };
        if before == after {
            return Ok(());
        }

        for target in after.iter().filter(|t| !before.contains(*t)) {
            self.check_target(tx, spec.model_id, *target).await?;
        }

        let Some(corresponding) = spec.corresponding_field_id else {
            return Ok(());
        };
        let old = before.first().copied();
        let new = after.first().copied();

        if let Some(old) = old {
            self.release_target(tx, corresponding, old).await?;
        }

        if let Some(new) = new {
            if let Some(holder) = self.current_reference(tx, new, corresponding).await? {
                if holder != self.origin
                    && self.exists(tx, holder).await?
                    && self.current_reference(tx, holder, field.id).await? == Some(new)
                {
                    tracing::debug!(
                        holder = %holder,
                        target = %new,
                        field_id = %field.id,
                        "Clearing previous holder of reference target"
                    );
                    self.patch(holder, field.id, None);
                }
            }
            self.patch(new, corresponding, Some(self.origin));
        }

        Ok(())
    }

    /// Clear the back-reference `target` holds to the origin through `field`,
    /// used when the origin is deleted.
    pub(crate) async fn release<T: Transaction>(
        &mut self,
        tx: &mut T,
        field: &SchemaField,
        target: ItemId,
    ) -> Result<(), CoreError> {
        let Some((_, corresponding)) = field.paired_reference() else {
            return Ok(());
        };
        if target == self.origin {
            return Ok(());
        }
        self.release_target(tx, corresponding, target).await
    }

    /// Write the collected patches as new versions of the touched items.
    /// Returns the number of versions written.
    pub(crate) async fn apply<T: Transaction>(
        self,
        tx: &mut T,
        operator: Operator,
    ) -> Result<usize, CoreError> {
        let Self {
            origin,
            patches,
            mut bases,
            ..
        } = self;
        let mut written = 0;
        for (item_id, patch) in patches {
            if item_id == origin {
                continue;
            }
            // Patches are only recorded after the item's latest was read.
            let Some(latest) = bases.remove(&item_id).flatten() else {
                continue;
            };

            let mut fields = latest.fields.clone();
            for (field, target) in patch {
                if latest.reference(field) != target {
                    set_reference(&mut fields, field, target);
                }
            }
            if fields == latest.fields {
                continue;
            }

            let next = latest.successor(fields, operator);
            tx.insert_version(&next).await?;
            let swapped = tx
                .compare_and_swap_ref(item_id, RefName::Latest, Some(latest.id), next.id)
                .await?;
            if !swapped {
                return Err(CoreError::Conflict(format!(
                    "Referenced item {item_id} was modified concurrently"
                )));
            }
            tracing::debug!(
                item_id = %item_id,
                version = next.number,
                "Wrote back-reference update"
            );
            written += 1;
        }
        Ok(written)
    }

    async fn release_target<T: Transaction>(
        &mut self,
        tx: &mut T,
        corresponding: FieldId,
        target: ItemId,
    ) -> Result<(), CoreError> {
        if !self.exists(tx, target).await? {
            return Ok(());
        }
        if self.current_reference(tx, target, corresponding).await? == Some(self.origin) {
            tracing::debug!(
                target = %target,
                origin = %self.origin,
                "Clearing back-reference to origin"
            );
            self.patch(target, corresponding, None);
        }
        Ok(())
    }

    async fn check_target<T: Transaction>(
        &self,
        tx: &mut T,
        model_id: ModelId,
        target: ItemId,
    ) -> Result<(), CoreError> {
        let target_model = if target == self.origin {
            self.origin_model
        } else {
            tx.find_item(target)
                .await?
                .ok_or_else(|| CoreError::Validation("referenced item not found".to_string()))?
                .model_id
        };
        if target_model != model_id {
            return Err(CoreError::Validation("model mismatch".to_string()));
        }
        Ok(())
    }

    async fn exists<T: Transaction>(&self, tx: &mut T, item: ItemId) -> Result<bool, CoreError> {
        if item == self.origin {
            return Ok(true);
        }
        Ok(tx.find_item(item).await?.is_some())
    }

    /// Current single reference held by `item` in `field`, pending patches
    /// included.
    async fn current_reference<T: Transaction>(
        &mut self,
        tx: &mut T,
        item: ItemId,
        field: FieldId,
    ) -> Result<Option<ItemId>, CoreError> {
        if item == self.origin {
            return Ok(self.origin_field(field).and_then(FieldValue::as_reference));
        }
        if let Some(target) = self.patches.get(&item).and_then(|p| p.get(&field)) {
            return Ok(*target);
        }
        Ok(self.base(tx, item).await?.and_then(|v| v.reference(field)))
    }

    /// Latest version of `item` as of the first read in this sync.
    async fn base<T: Transaction>(
        &mut self,
        tx: &mut T,
        item: ItemId,
    ) -> Result<Option<&Version>, CoreError> {
        if !self.bases.contains_key(&item) {
            let latest = match tx.find_ref(item, RefName::Latest).await? {
                Some(id) => Some(load_version(tx, id).await?),
                None => None,
            };
            self.bases.insert(item, latest);
        }
        Ok(self.bases.get(&item).and_then(Option::as_ref))
    }

    fn patch(&mut self, item: ItemId, field: FieldId, target: Option<ItemId>) {
        if item == self.origin {
            set_reference(&mut self.origin_fields, field, target);
        } else {
            self.patches.entry(item).or_default().insert(field, target);
        }
    }
}

/// Load a version a ref points at. A dangling ref is a storage fault.
pub(crate) async fn load_version<T: Transaction>(
    tx: &mut T,
    id: VersionId,
) -> Result<Version, CoreError> {
    tx.find_version(id)
        .await?
        .ok_or_else(|| CoreError::Internal(format!("ref points at missing version {id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryRepository;
    use crate::repository::Repository;
    use crate::schema::{create_reference_pair, Schema};
    use crate::types::ProjectId;
    use crate::version::Item;

    fn item(schema: &Schema) -> Item {
        Item {
            id: ItemId::new(),
            project_id: schema.project_id,
            model_id: schema.model_id,
            schema_id: schema.id,
            created_by: Operator::System,
            created_at: chrono::Utc::now(),
        }
    }

    async fn store_item<T: Transaction>(tx: &mut T, item: &Item) -> Version {
        let version = Version::initial(item, vec![], Operator::System);
        tx.insert_item(item).await.unwrap();
        tx.insert_version(&version).await.unwrap();
        tx.set_ref(item.id, RefName::Latest, version.id).await.unwrap();
        version
    }

    #[tokio::test]
    async fn write_after_read_of_target_conflicts() {
        let project = ProjectId::new();
        let mut x = Schema::new(project, ModelId::new());
        let mut y = Schema::new(project, ModelId::new());
        let pair = create_reference_pair(&mut x, &mut y, "partner", "partner_of").unwrap();
        let field_a = x.field(pair.field_a).unwrap().clone();

        let repo = InMemoryRepository::new();
        let mut tx = repo.begin().await.unwrap();
        let origin = item(&x);
        let target = item(&y);
        let target_v1 = store_item(&mut tx, &target).await;

        let mut fields = Vec::new();
        set_reference(&mut fields, pair.field_a, Some(target.id));
        let mut sync = ReferenceSync::new(origin.id, origin.model_id, fields);
        sync.link(&mut tx, &field_a, &[], &[target.id]).await.unwrap();
        assert!(sync.has_patches());

        // Another writer moves the target on after it was read.
        let target_v2 = target_v1.successor(vec![], Operator::System);
        tx.insert_version(&target_v2).await.unwrap();
        assert!(tx
            .compare_and_swap_ref(target.id, RefName::Latest, Some(target_v1.id), target_v2.id)
            .await
            .unwrap());

        let result = sync.apply(&mut tx, Operator::System).await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
        assert_eq!(
            tx.find_ref(target.id, RefName::Latest).await.unwrap(),
            Some(target_v2.id)
        );
    }

    #[tokio::test]
    async fn unchanged_target_receives_back_reference() {
        let project = ProjectId::new();
        let mut x = Schema::new(project, ModelId::new());
        let mut y = Schema::new(project, ModelId::new());
        let pair = create_reference_pair(&mut x, &mut y, "partner", "partner_of").unwrap();
        let field_a = x.field(pair.field_a).unwrap().clone();

        let repo = InMemoryRepository::new();
        let mut tx = repo.begin().await.unwrap();
        let origin = item(&x);
        let target = item(&y);
        let target_v1 = store_item(&mut tx, &target).await;

        let mut sync = ReferenceSync::new(origin.id, origin.model_id, vec![]);
        sync.link(&mut tx, &field_a, &[], &[target.id]).await.unwrap();
        assert_eq!(sync.apply(&mut tx, Operator::System).await.unwrap(), 1);

        let latest = tx.find_ref(target.id, RefName::Latest).await.unwrap().unwrap();
        let version = tx.find_version(latest).await.unwrap().unwrap();
        assert_eq!(version.parents.iter().next(), Some(&target_v1.id));
        assert_eq!(version.reference(pair.field_b), Some(origin.id));
    }
}
