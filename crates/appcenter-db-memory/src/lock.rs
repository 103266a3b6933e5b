//! In-memory `LockStore` with TTL leases.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use appcenter_storage::{LockStore, StorageError};

#[derive(Debug, Clone)]
struct Lease {
    token: String,
    expires_at: Instant,
}

impl Lease {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Lease store keyed by lock name.
///
/// `set_if_absent` and `delete_if_matches` are atomic per key through the
/// `DashMap` entry API. Expired leases are treated as absent.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    leases: DashMap<String, Lease>,
    attempts: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token of the live lease at `key`, if any.
    pub fn holder(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.leases
            .get(key)
            .filter(|lease| lease.is_live(now))
            .map(|lease| lease.token.clone())
    }

    /// Expires the lease at `key` immediately, as if its TTL had elapsed.
    pub fn expire(&self, key: &str) {
        if let Some(mut lease) = self.leases.get_mut(key) {
            lease.expires_at = Instant::now();
        }
    }

    /// Number of `set_if_absent` calls served so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Makes every call fail with a connection error while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::connection_error("lock store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StorageError> {
        self.check_available()?;
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let now = Instant::now();
        let lease = Lease {
            token: token.to_string(),
            expires_at: now + ttl,
        };
        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    return Ok(false);
                }
                occupied.insert(lease);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(lease);
                Ok(true)
            }
        }
    }

    async fn delete_if_matches(&self, key: &str, token: &str) -> Result<bool, StorageError> {
        self.check_available()?;
        let now = Instant::now();
        let removed = self
            .leases
            .remove_if(key, |_, lease| lease.token == token && lease.is_live(now));
        Ok(removed.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "lock";
    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn second_acquire_is_refused_while_live() {
        let store = InMemoryLockStore::new();
        assert!(store.set_if_absent(KEY, "t1", TTL).await.unwrap());
        assert!(!store.set_if_absent(KEY, "t2", TTL).await.unwrap());
        assert_eq!(store.holder(KEY).as_deref(), Some("t1"));
        assert_eq!(store.attempts(), 2);
    }

    #[tokio::test]
    async fn expired_lease_can_be_taken_over() {
        let store = InMemoryLockStore::new();
        assert!(store.set_if_absent(KEY, "t1", TTL).await.unwrap());
        store.expire(KEY);
        assert_eq!(store.holder(KEY), None);
        assert!(store.set_if_absent(KEY, "t2", TTL).await.unwrap());
        assert_eq!(store.holder(KEY).as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn delete_requires_matching_token() {
        let store = InMemoryLockStore::new();
        store.set_if_absent(KEY, "t1", TTL).await.unwrap();

        assert!(!store.delete_if_matches(KEY, "t2").await.unwrap());
        assert_eq!(store.holder(KEY).as_deref(), Some("t1"));

        assert!(store.delete_if_matches(KEY, "t1").await.unwrap());
        assert_eq!(store.holder(KEY), None);
    }

    #[tokio::test]
    async fn unavailable_store_errors() {
        let store = InMemoryLockStore::new();
        store.set_unavailable(true);
        assert!(store.set_if_absent(KEY, "t1", TTL).await.unwrap_err().is_unavailable());
    }
}
