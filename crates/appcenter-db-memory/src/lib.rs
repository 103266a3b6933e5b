//! In-memory storage backends for the AppCenter service.
//!
//! This crate provides in-memory implementations of the `CatalogStorage`,
//! `CacheStore` and `LockStore` traits from `appcenter-storage`. They are used
//! for local development and as the substrate of the membership test suites,
//! which rely on the fault and latency hooks each store exposes.
//!
//! # Example
//!
//! ```ignore
//! use appcenter_db_memory::{InMemoryCacheStore, InMemoryLockStore, InMemoryStorage};
//!
//! let storage = InMemoryStorage::new();
//! let cache = InMemoryCacheStore::new();
//! cache.set_write_delay(std::time::Duration::from_millis(5));
//! ```

pub mod cache;
pub mod catalog;
pub mod lock;

pub use appcenter_storage::{CacheStore, CatalogStorage, LockStore, StorageError};

pub use cache::{CacheOp, InMemoryCacheStore};
pub use catalog::{InMemoryStorage, InMemoryTransaction};
pub use lock::InMemoryLockStore;

/// Creates a new in-memory catalog storage instance.
pub fn create_catalog_storage() -> appcenter_storage::DynCatalogStorage {
    std::sync::Arc::new(InMemoryStorage::new())
}
