//! Store interfaces and backends.
//!
//! The engine only talks to the stores through the traits in [`traits`].
//! Backends provided here:
//! - [`SqliteRegistry`]: model and batch registries in SQLite
//! - [`FsObjectStore`]: per-tenant container directories
//! - [`memory`]: in-memory versions of all four stores with fault injection
//!
//! The HTTP training service client lives in [`crate::network`].

mod fs_object_store;
pub mod memory;
mod sqlite;
mod traits;

pub use fs_object_store::FsObjectStore;
pub use sqlite::SqliteRegistry;
pub use memory::MemoryStores;
pub use traits::{BatchRegistry, ModelRegistry, ObjectStore, Stores, TrainingService};
