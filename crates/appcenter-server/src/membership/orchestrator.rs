//! Grant and revoke of application admins.
//!
//! Both operations commit the relation change first, then rebuild the cache
//! under the change lock. The relation store is the source of truth: once the
//! commit succeeds, cache failures are logged and the call still succeeds.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use appcenter_core::{AdminRelation, Page, PageRequest};
use appcenter_storage::{
    DynCacheStore, DynCatalogStorage, DynLockStore, StorageError, Transaction,
};

use super::authz::AdminChecker;
use super::lock::{DEFAULT_LOCK_TTL, DEFAULT_POLL_INTERVAL, DistributedLock, LockScope};
use super::projector::CacheProjector;
use crate::metrics;

#[derive(Debug, Error)]
pub enum MembershipError {
    /// Rejected before touching any store.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Relation store failure; the transaction was rolled back.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The lock store failed while polling for the change lock.
    /// The relation change is already committed.
    #[error("change lock unavailable: {0}")]
    Lock(#[source] StorageError),

    #[error("cache synchronization task failed: {0}")]
    Task(String),
}

impl MembershipError {
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

/// The admin membership synchronizer.
pub struct MembershipService {
    catalog: DynCatalogStorage,
    lock_store: DynLockStore,
    projector: Arc<CacheProjector>,
    checker: AdminChecker,
    scope: LockScope,
    lock_ttl: Duration,
    poll_interval: Duration,
}

impl MembershipService {
    pub fn new(catalog: DynCatalogStorage, cache: DynCacheStore, lock_store: DynLockStore) -> Self {
        Self {
            checker: AdminChecker::new(catalog.clone(), cache.clone()),
            projector: Arc::new(CacheProjector::new(cache)),
            catalog,
            lock_store,
            scope: LockScope::default(),
            lock_ttl: DEFAULT_LOCK_TTL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_lock_scope(mut self, scope: LockScope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn projector(&self) -> &CacheProjector {
        &self.projector
    }

    pub fn checker(&self) -> &AdminChecker {
        &self.checker
    }

    pub fn lock_scope(&self) -> LockScope {
        self.scope
    }

    /// Makes `user_ids` the complete admin set of `app_id`.
    ///
    /// An empty list removes every admin.
    pub async fn grant_admins(&self, app_id: &str, user_ids: &[String]) -> Result<(), MembershipError> {
        let mut tx = self.catalog.begin_transaction().await?;
        if let Err(err) = replace_relations(tx.as_mut(), app_id, user_ids).await {
            rollback(tx, app_id).await;
            return Err(err.into());
        }
        tx.commit().await?;
        tracing::info!(app_id, admins = user_ids.len(), "admin relations replaced");

        self.sync_cache(app_id, user_ids.to_vec()).await
    }

    /// Removes `user_ids` from the admins of `app_id`.
    pub async fn revoke_admins(&self, app_id: &str, user_ids: &[String]) -> Result<(), MembershipError> {
        if user_ids.is_empty() {
            return Err(MembershipError::InvalidInput(
                "no admin selected for removal".into(),
            ));
        }

        let mut tx = self.catalog.begin_transaction().await?;
        if let Err(err) = tx
            .delete_relations_by_app_and_users(app_id, user_ids)
            .await
        {
            rollback(tx, app_id).await;
            return Err(err.into());
        }
        tx.commit().await?;
        tracing::info!(app_id, revoked = user_ids.len(), "admin relations revoked");

        let remaining = self.catalog.admin_user_ids(app_id).await?;
        self.sync_cache(app_id, remaining).await
    }

    pub async fn is_admin(
        &self,
        app_id: &str,
        user_id: &str,
        is_superuser: bool,
    ) -> Result<bool, MembershipError> {
        Ok(self.checker.is_admin(app_id, user_id, is_superuser).await?)
    }

    /// Pages through the admin relations of `app_id`.
    pub async fn admin_users(
        &self,
        app_id: &str,
        page: PageRequest,
    ) -> Result<Page<AdminRelation>, MembershipError> {
        Ok(self.catalog.list_relations(app_id, page).await?)
    }

    /// Rebuilds the cache of `app_id` to `members` under the change lock.
    ///
    /// Runs on its own task so that dropping the caller does not abandon the
    /// lease or a half-written hash.
    async fn sync_cache(&self, app_id: &str, members: Vec<String>) -> Result<(), MembershipError> {
        let lock = DistributedLock::new(self.lock_store.clone(), self.scope.key_for(app_id))
            .with_ttl(self.lock_ttl)
            .with_poll_interval(self.poll_interval);
        let projector = Arc::clone(&self.projector);
        let app_id = app_id.to_string();

        let task = tokio::spawn(async move {
            let lease = lock.acquire().await.map_err(MembershipError::Lock)?;

            if let Err(err) = projector.rebuild(&app_id, &members).await {
                metrics::record_cache_rebuild_failure(err.stage);
                tracing::error!(
                    app_id = %err.app_id,
                    stage = %err.stage,
                    error = %err.source,
                    "admin cache rebuild failed; readers fall back to the relation store"
                );
            }

            if let Err(err) = lock.release(lease.token()).await {
                tracing::warn!(
                    app_id = %app_id,
                    key = %lease.key(),
                    error = %err,
                    "failed to release change lock; it expires after its ttl"
                );
            }
            tracing::debug!(
                app_id = %app_id,
                attempts = lease.attempts(),
                held_ms = lease.held_for().as_millis() as u64,
                "admin cache synchronized"
            );
            Ok(())
        });

        task.await
            .map_err(|e| MembershipError::Task(e.to_string()))?
    }
}

async fn replace_relations(
    tx: &mut dyn Transaction,
    app_id: &str,
    user_ids: &[String],
) -> Result<(), StorageError> {
    tx.delete_relations_by_app(app_id).await?;
    for user_id in user_ids {
        tx.insert_relation(&AdminRelation::new(app_id, user_id.as_str()))
            .await?;
    }
    Ok(())
}

async fn rollback(tx: Box<dyn Transaction>, app_id: &str) {
    if let Err(err) = tx.rollback().await {
        tracing::warn!(app_id, error = %err, "rollback failed");
    }
}
