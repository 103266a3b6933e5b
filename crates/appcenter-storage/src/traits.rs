//! Storage traits for the catalog storage abstraction layer.
//!
//! Three independent stores back the service:
//!
//! - [`CatalogStorage`]: the authoritative relational store (apps, admin
//!   relations, scopes) with transactional writes via [`Transaction`].
//! - [`CacheStore`]: a keyed hash-map store used as a read-path accelerator.
//! - [`LockStore`]: a keyed store with atomic set-if-absent and
//!   compare-and-delete, the substrate for mutual exclusion.

use std::time::Duration;

use async_trait::async_trait;

use appcenter_core::{AdminRelation, App, AppScope, AppStatus, AppUpdate, Page, PageRequest};

use crate::error::StorageError;

/// Filter for paged application listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppFilter {
    /// Only apps where this user holds an admin relation.
    pub admin_user_id: Option<String>,
    /// Substring match on the app name.
    pub name_contains: Option<String>,
    /// Exact status match.
    pub status: Option<AppStatus>,
}

impl AppFilter {
    #[must_use]
    pub fn administered_by(mut self, user_id: impl Into<String>) -> Self {
        self.admin_user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name_contains = (!name.is_empty()).then_some(name);
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: Option<AppStatus>) -> Self {
        self.status = status;
        self
    }

    /// Returns `true` if the app matches every criterion except admin membership,
    /// which requires relation data.
    pub fn matches_app(&self, app: &App) -> bool {
        if app.is_deleted() {
            return false;
        }
        if let Some(name) = &self.name_contains
            && !app.app_name.contains(name.as_str())
        {
            return false;
        }
        if let Some(status) = self.status
            && app.use_status != status
        {
            return false;
        }
        true
    }
}

/// The authoritative relational store.
///
/// Implementations must be thread-safe (`Send + Sync`). Reads outside a
/// transaction see only committed data.
#[async_trait]
pub trait CatalogStorage: Send + Sync {
    // ==================== Applications ====================

    /// Reads an application by ID, including soft-deleted ones.
    async fn find_app(&self, id: &str) -> Result<Option<App>, StorageError>;

    /// Reads a non-deleted application by exact name.
    async fn find_app_by_name(&self, name: &str) -> Result<Option<App>, StorageError>;

    /// Reads a non-deleted application by its app sign.
    async fn find_app_by_sign(&self, sign: &str) -> Result<Option<App>, StorageError>;

    /// Lists non-deleted applications matching the filter, newest first.
    async fn list_apps(
        &self,
        filter: &AppFilter,
        page: PageRequest,
    ) -> Result<Page<App>, StorageError>;

    /// Lists non-deleted applications whose IDs are in `ids`.
    async fn list_apps_by_ids(
        &self,
        ids: &[String],
        page: PageRequest,
    ) -> Result<Page<App>, StorageError>;

    /// Applies a partial update outside any transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the application does not exist.
    async fn update_app(&self, update: &AppUpdate) -> Result<(), StorageError>;

    /// Soft-deletes an application, recording when it may be purged.
    async fn mark_app_deleted(&self, id: &str, purge_at: i64) -> Result<(), StorageError>;

    /// Sets the per-poly flag.
    async fn set_per_poly(&self, id: &str, per_poly: bool) -> Result<(), StorageError>;

    // ==================== Admin relations ====================

    /// Returns every admin user ID for an application.
    async fn admin_user_ids(&self, app_id: &str) -> Result<Vec<String>, StorageError>;

    /// Pages through the admin relations of an application.
    async fn list_relations(
        &self,
        app_id: &str,
        page: PageRequest,
    ) -> Result<Page<AdminRelation>, StorageError>;

    /// Counts relation rows for one (application, user) pair.
    async fn count_relation(&self, app_id: &str, user_id: &str) -> Result<i64, StorageError>;

    // ==================== Scopes ====================

    /// Returns the IDs of applications visible to a user or department.
    async fn app_ids_in_scope(
        &self,
        user_id: &str,
        dep_id: &str,
    ) -> Result<Vec<String>, StorageError>;

    /// Pages through the scopes of an application.
    async fn list_scopes(
        &self,
        app_id: &str,
        page: PageRequest,
    ) -> Result<Page<AppScope>, StorageError>;

    /// Counts scope rows granting a user or department access to an application.
    async fn count_scope_access(
        &self,
        app_id: &str,
        user_id: &str,
        dep_id: &str,
    ) -> Result<i64, StorageError>;

    /// Deletes every scope of an application.
    async fn delete_scopes_by_app(&self, app_id: &str) -> Result<(), StorageError>;

    // ==================== Transactions ====================

    /// Begins a new transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::TransactionError` if a transaction cannot be started.
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StorageError>;

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

/// A transaction for performing atomic catalog writes.
///
/// Writes are invisible to other readers until `commit`. Dropping a
/// transaction without committing discards its writes.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Inserts a new application.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the ID is taken.
    async fn insert_app(&mut self, app: &App) -> Result<(), StorageError>;

    /// Applies a partial application update.
    async fn update_app(&mut self, update: &AppUpdate) -> Result<(), StorageError>;

    /// Inserts one admin relation row.
    async fn insert_relation(&mut self, relation: &AdminRelation) -> Result<(), StorageError>;

    /// Deletes every admin relation row of an application.
    async fn delete_relations_by_app(&mut self, app_id: &str) -> Result<(), StorageError>;

    /// Deletes the admin relation rows of the given users on an application.
    async fn delete_relations_by_app_and_users(
        &mut self,
        app_id: &str,
        user_ids: &[String],
    ) -> Result<(), StorageError>;

    /// Adds scope rows to an application.
    async fn add_scopes(&mut self, app_id: &str, scopes: &[AppScope]) -> Result<(), StorageError>;

    /// Removes scope rows from an application.
    async fn delete_scopes(
        &mut self,
        app_id: &str,
        scopes: &[AppScope],
    ) -> Result<(), StorageError>;

    /// Commits all operations in this transaction.
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// Rolls back all operations in this transaction.
    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}

/// Keyed hash-map store backing the admin membership cache.
///
/// Every error is a store-availability error; absence is never an error.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the field names of the hash at `key`, empty if absent.
    async fn hash_keys(&self, key: &str) -> Result<Vec<String>, StorageError>;

    /// Deletes the whole hash at `key`.
    async fn hash_delete(&self, key: &str) -> Result<(), StorageError>;

    /// Sets one field of the hash at `key`.
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError>;

    /// Returns `true` if the hash at `key` has `field`.
    async fn hash_exists(&self, key: &str, field: &str) -> Result<bool, StorageError>;
}

/// Keyed store providing the two atomic primitives a lease needs.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Creates `key = token` with expiry `ttl` only if `key` does not exist.
    ///
    /// Returns `false` when another holder owns the key.
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StorageError>;

    /// Deletes `key` only if its current value equals `token`.
    ///
    /// Returns `true` if the key was deleted.
    async fn delete_if_matches(&self, key: &str, token: &str) -> Result<bool, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use appcenter_core::DelFlag;

    fn app(name: &str, status: AppStatus) -> App {
        App {
            id: name.into(),
            app_name: name.into(),
            access_url: String::new(),
            app_icon: String::new(),
            create_by: "u1".into(),
            update_by: "u1".into(),
            create_time: 0,
            update_time: 0,
            use_status: status,
            server: 0,
            del_flag: DelFlag::Normal,
            delete_time: None,
            app_sign: String::new(),
            extension: Default::default(),
            description: String::new(),
            per_poly: false,
        }
    }

    #[test]
    fn filter_matches_name_and_status() {
        let filter = AppFilter::default()
            .with_name("cr")
            .with_status(Some(AppStatus::Released));

        assert!(filter.matches_app(&app("crm", AppStatus::Released)));
        assert!(!filter.matches_app(&app("crm", AppStatus::Unreleased)));
        assert!(!filter.matches_app(&app("erp", AppStatus::Released)));
    }

    #[test]
    fn filter_excludes_deleted() {
        let mut deleted = app("crm", AppStatus::Released);
        deleted.del_flag = DelFlag::Deleted;
        assert!(!AppFilter::default().matches_app(&deleted));
    }

    #[test]
    fn empty_name_means_no_name_filter() {
        assert_eq!(AppFilter::default().with_name("").name_contains, None);
    }
}
