//! Cache and lease store backends.
//!
//! With Redis enabled both the admin cache and the change lock live in Redis,
//! shared by every instance. Without it the in-memory stores are used, which
//! only serialize rebuilds within one process.

pub mod redis_store;

use std::sync::Arc;

use appcenter_db_memory::{InMemoryCacheStore, InMemoryLockStore};
use appcenter_storage::{DynCacheStore, DynLockStore};

use crate::config::RedisConfig;

pub use redis_store::{RedisCacheStore, RedisLockStore, create_redis_pool};

/// The cache and lock stores the membership core runs on.
#[derive(Clone)]
pub struct MembershipStores {
    pub cache: DynCacheStore,
    pub lock: DynLockStore,
    /// `"redis"` or `"local"`
    pub mode: &'static str,
}

impl MembershipStores {
    pub fn local() -> Self {
        Self {
            cache: Arc::new(InMemoryCacheStore::new()),
            lock: Arc::new(InMemoryLockStore::new()),
            mode: "local",
        }
    }
}

/// Creates the membership stores from configuration.
///
/// ## Graceful Degradation
///
/// If Redis is enabled but unreachable, falls back to process-local stores so
/// the server can still start. Cross-instance rebuilds are then unserialized.
pub async fn create_membership_stores(config: &RedisConfig) -> MembershipStores {
    if !config.enabled {
        tracing::info!("Redis disabled, using local admin cache and lock");
        return MembershipStores::local();
    }

    tracing::info!(url = %config.url, "Connecting to Redis");
    match create_redis_pool(config).await {
        Ok(pool) => {
            tracing::info!("Connected to Redis");
            MembershipStores {
                cache: Arc::new(RedisCacheStore::new(pool.clone())),
                lock: Arc::new(RedisLockStore::new(pool)),
                mode: "redis",
            }
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to local admin cache and lock."
            );
            MembershipStores::local()
        }
    }
}
