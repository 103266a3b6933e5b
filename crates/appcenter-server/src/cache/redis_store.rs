//! Redis implementations of [`CacheStore`] and [`LockStore`].
//!
//! Both share one `deadpool_redis::Pool`. Every Redis failure, including pool
//! exhaustion, maps to a connection error.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use redis::AsyncCommands;

use appcenter_storage::{CacheStore, LockStore, StorageError};

use crate::config::RedisConfig;

/// Deletes KEYS[1] only while it still holds ARGV[1].
static RELEASE_SCRIPT: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#,
    )
});

fn redis_error(action: &str, err: redis::RedisError) -> StorageError {
    StorageError::connection_error(format!("redis {action} failed: {err}"))
}

async fn connection(pool: &Pool) -> Result<Connection, StorageError> {
    pool.get()
        .await
        .map_err(|e| StorageError::connection_error(format!("redis pool: {e}")))
}

/// Creates a Redis pool and checks that a connection can be opened.
pub async fn create_redis_pool(config: &RedisConfig) -> Result<Pool, StorageError> {
    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let timeout = Duration::from_millis(config.timeout_ms);
    let pool_config = redis_config.pool.get_or_insert_with(Default::default);
    pool_config.max_size = config.pool_size;
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);

    let pool = redis_config
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| StorageError::connection_error(format!("redis pool creation: {e}")))?;

    connection(&pool).await?;
    Ok(pool)
}

/// Admin cache on Redis hashes.
#[derive(Clone)]
pub struct RedisCacheStore {
    pool: Pool,
}

impl RedisCacheStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn hash_keys(&self, key: &str) -> Result<Vec<String>, StorageError> {
        let mut conn = connection(&self.pool).await?;
        conn.hkeys::<_, Vec<String>>(key)
            .await
            .map_err(|e| redis_error("HKEYS", e))
    }

    async fn hash_delete(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = connection(&self.pool).await?;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| redis_error("DEL", e))
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError> {
        let mut conn = connection(&self.pool).await?;
        conn.hset::<_, _, _, ()>(key, field, value)
            .await
            .map_err(|e| redis_error("HSET", e))
    }

    async fn hash_exists(&self, key: &str, field: &str) -> Result<bool, StorageError> {
        let mut conn = connection(&self.pool).await?;
        conn.hexists::<_, _, bool>(key, field)
            .await
            .map_err(|e| redis_error("HEXISTS", e))
    }
}

/// Leases on plain Redis keys: `SET NX PX` to acquire, compare-and-delete
/// script to release.
#[derive(Clone)]
pub struct RedisLockStore {
    pool: Pool,
}

impl RedisLockStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StorageError> {
        let mut conn = connection(&self.pool).await?;
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("SET NX", e))?;
        Ok(reply.is_some())
    }

    async fn delete_if_matches(&self, key: &str, token: &str) -> Result<bool, StorageError> {
        let mut conn = connection(&self.pool).await?;
        let deleted: i64 = RELEASE_SCRIPT
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_error("release script", e))?;
        Ok(deleted == 1)
    }
}
