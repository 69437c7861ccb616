//! Versioned content item store.
//!
//! Items are schema-conformant records whose every write appends an
//! immutable version. Two-way reference fields are kept consistent across
//! items, and publication requests move an item's `public` ref on approval.

pub mod error;
pub mod field;
pub mod memory;
pub mod publication;
pub mod repository;
pub mod request;
pub mod schema;
pub mod status;
pub mod store;
pub mod types;
pub mod version;

mod reference;

pub use error::CoreError;
pub use field::{FieldInput, FieldKind, FieldType, FieldValue, ReferenceSpec, Value};
pub use memory::{InMemoryRepository, InMemoryTransaction};
pub use repository::{Repository, Transaction};
pub use request::{
    DefaultRequestPolicy, NewRequest, Request, RequestItem, RequestItemInput, RequestPolicy,
    RequestState, RequestUpdate, ReviewerPolicy,
};
pub use schema::{InMemorySchemas, ReferenceFieldPair, Schema, SchemaField, SchemaProvider};
pub use status::{resolve_status, ItemStatus};
pub use store::{ContentStore, NewItem};
pub use types::{
    FieldId, IntegrationId, ItemId, ModelId, Operator, ProjectId, RequestId, SchemaId,
    Timestamp, UserId, VersionId,
};
pub use version::{
    DiffStatus, FieldDiff, Item, ItemRefs, ItemSnapshot, RefName, Version, VersionPosition,
    VersionSelector,
};
