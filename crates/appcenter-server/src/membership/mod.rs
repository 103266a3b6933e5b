//! Admin membership synchronizer.
//!
//! - [`lock`]: polling lease on the lock store
//! - [`projector`]: full-replace rebuild of the admin cache
//! - [`authz`]: lock-free admin check
//! - [`orchestrator`]: grant/revoke protocol tying the three together

pub mod authz;
pub mod lock;
pub mod orchestrator;
pub mod projector;

pub use authz::AdminChecker;
pub use lock::{
    ADMIN_CHANGE_LOCK_KEY, DEFAULT_LOCK_TTL, DEFAULT_POLL_INTERVAL, DistributedLock, LockLease,
    LockScope, LockToken,
};
pub use orchestrator::{MembershipError, MembershipService};
pub use projector::{
    ADMIN_CACHE_PREFIX, CacheProjector, CacheState, RebuildError, RebuildStage, cache_key,
};
