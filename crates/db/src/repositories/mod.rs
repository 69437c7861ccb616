//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods.
//! Item store repositories take `&mut PgConnection` so they run inside the
//! caller's transaction; `SchemaRepo` works on the pool.

pub mod item_repo;
pub mod ref_repo;
pub mod request_repo;
pub mod schema_repo;
pub mod version_repo;

pub use item_repo::ItemRepo;
pub use ref_repo::RefRepo;
pub use request_repo::RequestRepo;
pub use schema_repo::SchemaRepo;
pub use version_repo::VersionRepo;
