//! Items, immutable versions and named refs.
//!
//! An item never changes in place: every write appends a [`Version`] whose
//! parents point at the version it was derived from, and the `latest` ref is
//! moved to it. `public` is moved only by request approval.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::field::FieldValue;
use crate::types::{FieldId, ItemId, ModelId, Operator, ProjectId, SchemaId, Timestamp, VersionId};

// ---------------------------------------------------------------------------
// Refs
// ---------------------------------------------------------------------------

/// Reserved ref names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefName {
    /// Always the newest version; moved on every write.
    Latest,
    /// The version exposed to public consumers; moved on approval.
    Public,
}

impl RefName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Public => "public",
        }
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(Self::Latest),
            "public" => Ok(Self::Public),
            other => Err(CoreError::Validation(format!(
                "Unknown ref '{other}'. Must be one of: latest, public"
            ))),
        }
    }
}

/// How a caller addresses a version of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSelector {
    Ref(RefName),
    Version(VersionId),
}

impl From<RefName> for VersionSelector {
    fn from(name: RefName) -> Self {
        Self::Ref(name)
    }
}

impl From<VersionId> for VersionSelector {
    fn from(id: VersionId) -> Self {
        Self::Version(id)
    }
}

/// Current ref positions of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRefs {
    pub latest: VersionId,
    pub public: Option<VersionId>,
}

// ---------------------------------------------------------------------------
// Items and versions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub project_id: ProjectId,
    pub model_id: ModelId,
    pub schema_id: SchemaId,
    pub created_by: Operator,
    pub created_at: Timestamp,
}

/// One immutable revision of an item's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub item_id: ItemId,
    /// 1-based position in the item's history.
    pub number: i32,
    pub model_id: ModelId,
    pub schema_id: SchemaId,
    pub fields: Vec<FieldValue>,
    pub parents: BTreeSet<VersionId>,
    pub created_by: Operator,
    pub created_at: Timestamp,
}

impl Version {
    /// The first version of a new item.
    pub fn initial(item: &Item, fields: Vec<FieldValue>, operator: Operator) -> Self {
        Self {
            id: VersionId::new(),
            item_id: item.id,
            number: 1,
            model_id: item.model_id,
            schema_id: item.schema_id,
            fields,
            parents: BTreeSet::new(),
            created_by: operator,
            created_at: chrono::Utc::now(),
        }
    }

    /// A new version derived from `self`.
    pub fn successor(&self, fields: Vec<FieldValue>, operator: Operator) -> Self {
        Self {
            id: VersionId::new(),
            item_id: self.item_id,
            number: self.number + 1,
            model_id: self.model_id,
            schema_id: self.schema_id,
            fields,
            parents: BTreeSet::from([self.id]),
            created_by: operator,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn field(&self, id: FieldId) -> Option<&FieldValue> {
        self.fields.iter().find(|v| v.field_id == id)
    }

    /// The item a single-valued reference field points at, if any.
    pub fn reference(&self, field: FieldId) -> Option<ItemId> {
        self.field(field).and_then(FieldValue::as_reference)
    }

    pub fn position(&self) -> VersionPosition {
        VersionPosition {
            id: self.id,
            number: self.number,
        }
    }
}

/// Identity and chain position of a version, enough to order two versions of
/// the same item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPosition {
    pub id: VersionId,
    pub number: i32,
}

/// Resolved view of an item at one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub item: Item,
    pub version: Version,
    pub refs: ItemRefs,
}

impl ItemSnapshot {
    pub fn id(&self) -> ItemId {
        self.item.id
    }

    pub fn version_id(&self) -> VersionId {
        self.version.id
    }

    pub fn fields(&self) -> &[FieldValue] {
        &self.version.fields
    }

    pub fn reference(&self, field: FieldId) -> Option<ItemId> {
        self.version.reference(field)
    }
}

/// Set (or clear) a single-valued reference in a field list.
pub fn set_reference(fields: &mut Vec<FieldValue>, field: FieldId, target: Option<ItemId>) {
    let value = FieldValue::reference(field, target);
    match fields.iter_mut().find(|v| v.field_id == field) {
        Some(existing) => *existing = value,
        None => fields.push(value),
    }
}

// ---------------------------------------------------------------------------
// Diffs
// ---------------------------------------------------------------------------

/// How one field differs between two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Added,
    Removed,
    Changed,
    Unchanged,
}

/// Difference of one field between two versions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    pub field_id: FieldId,
    pub before: Option<FieldValue>,
    pub after: Option<FieldValue>,
    pub status: DiffStatus,
}

/// Compare two versions field by field. Null values count as absent.
///
/// Output follows `from`'s field order, then fields only present in `to`.
pub fn diff_versions(from: &Version, to: &Version) -> Vec<FieldDiff> {
    let present = |fields: &[FieldValue], id: FieldId| {
        fields
            .iter()
            .find(|v| v.field_id == id && !v.is_null())
            .cloned()
    };

    let mut ids: Vec<FieldId> = Vec::new();
    for value in from.fields.iter().chain(to.fields.iter()) {
        if !ids.contains(&value.field_id) {
            ids.push(value.field_id);
        }
    }

    ids.into_iter()
        .filter_map(|id| {
            let before = present(&from.fields, id);
            let after = present(&to.fields, id);
            let status = match (&before, &after) {
                (Some(b), Some(a)) if b == a => DiffStatus::Unchanged,
                (Some(_), Some(_)) => DiffStatus::Changed,
                (Some(_), None) => DiffStatus::Removed,
                (None, Some(_)) => DiffStatus::Added,
                (None, None) => return None,
            };
            Some(FieldDiff {
                field_id: id,
                before,
                after,
                status,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
