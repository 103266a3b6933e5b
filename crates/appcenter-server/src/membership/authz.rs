//! Lock-free admin check: cache first, relation store on a miss.

use appcenter_storage::{DynCacheStore, DynCatalogStorage, StorageError};

use super::projector::cache_key;
use crate::metrics;

/// Answers "does this user administer this application".
///
/// Never takes the change lock and never writes the cache; a miss falls back
/// to a count query instead of repopulating.
#[derive(Clone)]
pub struct AdminChecker {
    catalog: DynCatalogStorage,
    cache: DynCacheStore,
}

impl AdminChecker {
    pub fn new(catalog: DynCatalogStorage, cache: DynCacheStore) -> Self {
        Self { catalog, cache }
    }

    /// Superusers always pass. Missing or deleted applications have no admins.
    ///
    /// # Errors
    ///
    /// Only relation store errors surface; cache errors count as a miss.
    pub async fn is_admin(
        &self,
        app_id: &str,
        user_id: &str,
        is_superuser: bool,
    ) -> Result<bool, StorageError> {
        if is_superuser {
            return Ok(true);
        }

        match self.catalog.find_app(app_id).await? {
            Some(app) if !app.is_deleted() => {}
            _ => return Ok(false),
        }

        match self.cache.hash_exists(&cache_key(app_id), user_id).await {
            Ok(true) => {
                metrics::record_admin_cache_hit();
                return Ok(true);
            }
            Ok(false) => metrics::record_admin_cache_miss("absent"),
            Err(err) => {
                tracing::warn!(app_id, error = %err, "admin cache read failed; using relation store");
                metrics::record_admin_cache_miss("error");
            }
        }

        let count = self.catalog.count_relation(app_id, user_id).await?;
        Ok(count > 0)
    }
}
