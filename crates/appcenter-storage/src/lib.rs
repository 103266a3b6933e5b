//! # appcenter-storage
//!
//! Storage abstraction layer for the AppCenter service.
//!
//! This crate defines the traits and types that all storage backends must implement.
//! It does not contain any implementations - those are provided by separate crates
//! (`appcenter-db-memory`, `appcenter-db-postgres`, and the Redis stores in the
//! server crate).
//!
//! ## Example
//!
//! ```ignore
//! use appcenter_storage::{CatalogStorage, StorageError};
//!
//! async fn admins(storage: &dyn CatalogStorage, app_id: &str) -> Result<Vec<String>, StorageError> {
//!     storage.admin_user_ids(app_id).await
//! }
//! ```

mod error;
mod traits;

pub use error::StorageError;
pub use traits::{AppFilter, CacheStore, CatalogStorage, LockStore, Transaction};

/// Shareable catalog storage trait object.
pub type DynCatalogStorage = std::sync::Arc<dyn CatalogStorage>;

/// Shareable cache store trait object.
pub type DynCacheStore = std::sync::Arc<dyn CacheStore>;

/// Shareable lock store trait object.
pub type DynLockStore = std::sync::Arc<dyn LockStore>;
