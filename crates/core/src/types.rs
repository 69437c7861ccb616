//! Identifier and timestamp types shared by every module.
//!
//! Identifiers are UUIDv7 newtypes: opaque, comparable and roughly ordered by
//! creation time. Nothing in the store relies on their encoding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh, time-ordered identifier.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

define_id!(
    /// Project owning models, schemas, items and requests.
    ProjectId
);
define_id!(ModelId);
define_id!(SchemaId);
define_id!(
    /// Schema field identifier. Stable across field renames.
    FieldId
);
define_id!(ItemId);
define_id!(
    /// Opaque optimistic-concurrency token for an item revision.
    VersionId
);
define_id!(RequestId);
define_id!(UserId);
define_id!(IntegrationId);

/// Who performed a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Operator {
    User(UserId),
    Integration(IntegrationId),
    System,
}

impl Operator {
    pub fn user(&self) -> Option<UserId> {
        match self {
            Self::User(id) => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_from_display() {
        let id = ItemId::new();
        let parsed: ItemId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn fresh_ids_are_distinct() {
        assert_ne!(VersionId::new(), VersionId::new());
    }

    #[test]
    fn invalid_id_is_rejected() {
        assert!("not-a-uuid".parse::<ItemId>().is_err());
    }

    #[test]
    fn operator_serializes_with_kind_tag() {
        let json = serde_json::to_value(Operator::System).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "system"}));

        let user = UserId::new();
        let json = serde_json::to_value(Operator::User(user)).unwrap();
        assert_eq!(json["kind"], "user");
        assert_eq!(json["id"], user.to_string());
    }
}
