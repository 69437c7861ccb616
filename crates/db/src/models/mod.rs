//! Row structs for the item store tables.
//!
//! Each submodule holds a `FromRow` struct matching one table and the
//! conversion into the corresponding `folio_core` type. Inserts take the
//! domain types directly.

pub mod item;
pub mod request;
pub mod schema;
pub mod version;
