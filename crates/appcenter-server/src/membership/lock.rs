//! Polling mutual exclusion on top of a [`LockStore`].
//!
//! A lease is a key holding an opaque token with a TTL. Acquisition polls at a
//! fixed interval with no attempt bound and no backoff growth, so a waiter
//! blocks until it wins the lease or the store fails. Under sustained
//! contention a waiter can starve; the TTL only bounds how long a crashed
//! holder can block everyone else.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use appcenter_storage::{DynLockStore, StorageError};

use crate::metrics;

/// Lock key shared by every admin membership change in the deployment.
/// Kept outside the admin cache prefix so no application id can collide with it.
pub const ADMIN_CHANGE_LOCK_KEY: &str = "appCenter:lock:admins";

pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(2);

/// A tenth of the default TTL.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Which rebuilds serialize against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockScope {
    /// One lease for all applications: at most one rebuild runs cluster-wide.
    #[default]
    Global,
    /// One lease per application: rebuilds of different applications run concurrently.
    PerApp,
}

impl LockScope {
    /// Lock key guarding rebuilds of `app_id`.
    pub fn key_for(self, app_id: &str) -> String {
        match self {
            Self::Global => ADMIN_CHANGE_LOCK_KEY.to_string(),
            Self::PerApp => format!("{ADMIN_CHANGE_LOCK_KEY}:{app_id}"),
        }
    }
}

/// Opaque lease value identifying one acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// A fresh random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A held lease, returned by [`DistributedLock::acquire`].
#[derive(Debug, Clone)]
pub struct LockLease {
    key: String,
    token: LockToken,
    attempts: u64,
    acquired_at: Instant,
}

impl LockLease {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &LockToken {
        &self.token
    }

    /// Number of attempts it took to win the lease, at least 1.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

/// A named lease with a fixed TTL and poll interval.
#[derive(Clone)]
pub struct DistributedLock {
    store: DynLockStore,
    key: String,
    ttl: Duration,
    poll_interval: Duration,
}

impl fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedLock")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl DistributedLock {
    pub fn new(store: DynLockStore, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            ttl: DEFAULT_LOCK_TTL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// One acquisition attempt.
    ///
    /// `Ok(false)` means another holder owns the lease; only store failures are errors.
    pub async fn try_acquire(&self, token: &LockToken) -> Result<bool, StorageError> {
        match self
            .store
            .set_if_absent(&self.key, token.as_str(), self.ttl)
            .await
        {
            Ok(true) => {
                metrics::record_lock_attempt("acquired");
                Ok(true)
            }
            Ok(false) => {
                metrics::record_lock_attempt("busy");
                Ok(false)
            }
            Err(err) => {
                metrics::record_lock_attempt("error");
                Err(err)
            }
        }
    }

    /// Releases the lease if `token` still owns it.
    ///
    /// A lease that expired and was taken by another holder is left alone.
    pub async fn release(&self, token: &LockToken) -> Result<(), StorageError> {
        let released = self
            .store
            .delete_if_matches(&self.key, token.as_str())
            .await?;
        if !released {
            tracing::warn!(
                key = %self.key,
                token = %token,
                "lease no longer owned at release; it expired before the holder finished"
            );
        }
        Ok(())
    }

    /// Blocks until a fresh token wins the lease or the store fails.
    ///
    /// Attempts immediately, then sleeps `poll_interval` between attempts.
    /// There is no attempt limit.
    pub async fn acquire(&self) -> Result<LockLease, StorageError> {
        let token = LockToken::generate();
        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            if self.try_acquire(&token).await? {
                tracing::debug!(key = %self.key, attempts, "lock acquired");
                return Ok(LockLease {
                    key: self.key.clone(),
                    token,
                    attempts,
                    acquired_at: Instant::now(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
