//! In-memory `CacheStore` with fault and latency injection.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use appcenter_storage::{CacheStore, StorageError};

/// One recorded cache call, in the order the store observed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOp {
    Keys { key: String },
    Delete { key: String },
    Set { key: String, field: String },
}

/// Hash-map cache store backed by `DashMap`.
///
/// Every mutating call is appended to a journal so tests can assert the
/// exact sequence of writes a rebuild produced.
#[derive(Debug)]
pub struct InMemoryCacheStore {
    hashes: DashMap<String, HashMap<String, String>>,
    journal: Mutex<Vec<CacheOp>>,
    write_delay_ms: AtomicU64,
    /// Remaining successful `hash_set` calls before failures start; negative disables.
    sets_before_failure: AtomicI64,
    fail_deletes: AtomicBool,
    unavailable: AtomicBool,
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self {
            hashes: DashMap::new(),
            journal: Mutex::new(Vec::new()),
            write_delay_ms: AtomicU64::new(0),
            sets_before_failure: AtomicI64::new(-1),
            fail_deletes: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
        }
    }
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `delay` before every `hash_set`.
    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Lets `n` more `hash_set` calls succeed, then fails every subsequent one.
    pub fn fail_sets_after(&self, n: usize) {
        self.sets_before_failure.store(n as i64, Ordering::SeqCst);
    }

    /// Makes `hash_delete` fail while set.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Makes every call fail with a connection error while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Clears all injected faults and delays.
    pub fn clear_faults(&self) {
        self.write_delay_ms.store(0, Ordering::SeqCst);
        self.sets_before_failure.store(-1, Ordering::SeqCst);
        self.fail_deletes.store(false, Ordering::SeqCst);
        self.unavailable.store(false, Ordering::SeqCst);
    }

    /// Returns the sorted field names currently stored at `key`.
    pub fn members(&self, key: &str) -> Vec<String> {
        let mut fields: Vec<String> = self
            .hashes
            .get(key)
            .map(|hash| hash.keys().cloned().collect())
            .unwrap_or_default();
        fields.sort();
        fields
    }

    /// Returns `true` if a hash exists at `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.hashes.contains_key(key)
    }

    /// Writes a field directly, bypassing faults and the journal.
    pub fn seed(&self, key: &str, field: &str) {
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), field.to_string());
    }

    /// Returns the journal recorded so far.
    pub fn journal(&self) -> Vec<CacheOp> {
        self.journal
            .lock()
            .map(|journal| journal.clone())
            .unwrap_or_default()
    }

    fn record(&self, op: CacheOp) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(op);
        }
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::connection_error("cache store unavailable"));
        }
        Ok(())
    }

    fn take_set_permit(&self) -> bool {
        self.sets_before_failure
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| match remaining {
                r if r < 0 => Some(r),
                0 => None,
                r => Some(r - 1),
            })
            .is_ok()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn hash_keys(&self, key: &str) -> Result<Vec<String>, StorageError> {
        self.check_available()?;
        self.record(CacheOp::Keys { key: key.to_string() });
        Ok(self
            .hashes
            .get(key)
            .map(|hash| hash.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn hash_delete(&self, key: &str) -> Result<(), StorageError> {
        self.check_available()?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::connection_error("cache delete failed"));
        }
        self.record(CacheOp::Delete { key: key.to_string() });
        self.hashes.remove(key);
        Ok(())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError> {
        self.check_available()?;
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if !self.take_set_permit() {
            return Err(StorageError::connection_error("cache write failed"));
        }
        self.record(CacheOp::Set {
            key: key.to_string(),
            field: field.to_string(),
        });
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_exists(&self, key: &str, field: &str) -> Result<bool, StorageError> {
        self.check_available()?;
        Ok(self
            .hashes
            .get(key)
            .is_some_and(|hash| hash.contains_key(field)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_read_fields() {
        let cache = InMemoryCacheStore::new();
        cache.hash_set("k", "u1", "u1").await.unwrap();
        cache.hash_set("k", "u2", "u2").await.unwrap();

        assert!(cache.hash_exists("k", "u1").await.unwrap());
        assert!(!cache.hash_exists("k", "u3").await.unwrap());
        assert_eq!(cache.members("k"), vec!["u1", "u2"]);

        cache.hash_delete("k").await.unwrap();
        assert!(cache.hash_keys("k").await.unwrap().is_empty());
        assert!(!cache.contains_key("k"));
    }

    #[tokio::test]
    async fn fails_after_configured_writes() {
        let cache = InMemoryCacheStore::new();
        cache.fail_sets_after(1);

        assert!(cache.hash_set("k", "u1", "u1").await.is_ok());
        let err = cache.hash_set("k", "u2", "u2").await.unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(cache.members("k"), vec!["u1"]);

        cache.clear_faults();
        assert!(cache.hash_set("k", "u2", "u2").await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_respect_failure_budget() {
        let cache = std::sync::Arc::new(InMemoryCacheStore::new());
        cache.fail_sets_after(5);

        let writers: Vec<_> = (0..64)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let field = format!("u{i}");
                    cache.hash_set("k", &field, &field).await.is_ok()
                })
            })
            .collect();
        let mut accepted = 0;
        for writer in writers {
            if writer.await.unwrap() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 5);
        assert_eq!(cache.members("k").len(), 5);
    }

    #[tokio::test]
    async fn unavailable_store_rejects_reads() {
        let cache = InMemoryCacheStore::new();
        cache.set_unavailable(true);
        assert!(cache.hash_exists("k", "u1").await.is_err());
        assert!(cache.hash_keys("k").await.is_err());
    }

    #[tokio::test]
    async fn journal_records_mutations_in_order() {
        let cache = InMemoryCacheStore::new();
        cache.hash_keys("k").await.unwrap();
        cache.hash_set("k", "u1", "u1").await.unwrap();
        cache.hash_delete("k").await.unwrap();

        assert_eq!(
            cache.journal(),
            vec![
                CacheOp::Keys { key: "k".into() },
                CacheOp::Set {
                    key: "k".into(),
                    field: "u1".into()
                },
                CacheOp::Delete { key: "k".into() },
            ]
        );
    }
}
