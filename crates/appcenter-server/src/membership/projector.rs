//! Full-replace rebuild of the per-application admin cache.
//!
//! A rebuild reads the cached field set, deletes the hash when it is not
//! empty, then writes every member. The three steps are not atomic: between
//! the delete and the last write a reader sees a partial or empty hash. A
//! failed write purges the hash so the cache ends empty rather than partial,
//! and readers fall back to the relation store until the next rebuild.
//!
//! Callers must hold the admin change lock for the duration of a rebuild.

use std::fmt;

use dashmap::DashMap;
use thiserror::Error;

use appcenter_storage::{DynCacheStore, StorageError};

use crate::metrics;

/// Prefix of the per-application membership hash.
pub const ADMIN_CACHE_PREFIX: &str = "appCenter:admins:";

/// Cache key of the membership hash of `app_id`.
pub fn cache_key(app_id: &str) -> String {
    format!("{ADMIN_CACHE_PREFIX}{app_id}")
}

/// What this process last left in the cache for one application.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CacheState {
    /// No hash; readers consult the relation store.
    #[default]
    Absent,
    /// Between the delete and the last write, or a failed purge left the hash
    /// in an unknown state.
    Rebuilding,
    /// The hash holds exactly `members`, sorted.
    Populated { members: Vec<String> },
}

impl CacheState {
    pub fn is_populated(&self) -> bool {
        matches!(self, Self::Populated { .. })
    }
}

/// Step of a rebuild that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RebuildStage {
    ReadKeys,
    Delete,
    Insert,
}

impl RebuildStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadKeys => "read_keys",
            Self::Delete => "delete",
            Self::Insert => "insert",
        }
    }
}

impl fmt::Display for RebuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("admin cache rebuild of app {app_id} failed at {stage}: {source}")]
pub struct RebuildError {
    pub app_id: String,
    pub stage: RebuildStage,
    #[source]
    pub source: StorageError,
}

/// Rebuilds admin membership hashes and tracks their [`CacheState`].
pub struct CacheProjector {
    cache: DynCacheStore,
    states: DashMap<String, CacheState>,
}

impl fmt::Debug for CacheProjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheProjector")
            .field("tracked_apps", &self.states.len())
            .finish_non_exhaustive()
    }
}

impl CacheProjector {
    pub fn new(cache: DynCacheStore) -> Self {
        Self {
            cache,
            states: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &DynCacheStore {
        &self.cache
    }

    /// Last state this projector left for `app_id`; `Absent` if never rebuilt here.
    pub fn state(&self, app_id: &str) -> CacheState {
        self.states
            .get(app_id)
            .map(|state| state.clone())
            .unwrap_or_default()
    }

    fn transition(&self, app_id: &str, state: CacheState) {
        tracing::trace!(app_id, state = ?state, "admin cache state");
        self.states.insert(app_id.to_string(), state);
    }

    /// Replaces the cached admin set of `app_id` with exactly `user_ids`.
    pub async fn rebuild(&self, app_id: &str, user_ids: &[String]) -> Result<(), RebuildError> {
        let key = cache_key(app_id);
        let fail = |stage, source| RebuildError {
            app_id: app_id.to_string(),
            stage,
            source,
        };

        let cached = self
            .cache
            .hash_keys(&key)
            .await
            .map_err(|e| fail(RebuildStage::ReadKeys, e))?;

        let previous = self.state(app_id);
        self.transition(app_id, CacheState::Rebuilding);

        if !cached.is_empty()
            && let Err(err) = self.cache.hash_delete(&key).await
        {
            // DEL is all-or-nothing, the old hash is still intact
            self.transition(app_id, previous);
            return Err(fail(RebuildStage::Delete, err));
        }

        for user_id in user_ids {
            if let Err(err) = self.cache.hash_set(&key, user_id, user_id).await {
                self.purge(app_id, &key).await;
                return Err(fail(RebuildStage::Insert, err));
            }
        }

        let mut members = user_ids.to_vec();
        members.sort();
        members.dedup();
        if members.is_empty() {
            self.transition(app_id, CacheState::Absent);
        } else {
            self.transition(app_id, CacheState::Populated { members });
        }
        metrics::record_cache_rebuild();
        Ok(())
    }

    async fn purge(&self, app_id: &str, key: &str) {
        match self.cache.hash_delete(key).await {
            Ok(()) => self.transition(app_id, CacheState::Absent),
            Err(err) => {
                tracing::warn!(
                    app_id,
                    error = %err,
                    "failed to purge partially written admin cache"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use appcenter_db_memory::{CacheOp, InMemoryCacheStore};

    use super::*;

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn projector() -> (Arc<InMemoryCacheStore>, CacheProjector) {
        let cache = Arc::new(InMemoryCacheStore::new());
        let projector = CacheProjector::new(cache.clone());
        (cache, projector)
    }

    #[tokio::test]
    async fn rebuild_replaces_previous_members() {
        let (cache, projector) = projector();
        cache.seed(&cache_key("a1"), "old");

        projector.rebuild("a1", &ids(&["u2", "u1"])).await.unwrap();

        assert_eq!(cache.members(&cache_key("a1")), vec!["u1", "u2"]);
        assert_eq!(
            projector.state("a1"),
            CacheState::Populated {
                members: ids(&["u1", "u2"])
            }
        );
    }

    #[tokio::test]
    async fn empty_cache_skips_delete() {
        let (cache, projector) = projector();
        projector.rebuild("a1", &ids(&["u1"])).await.unwrap();

        let key = cache_key("a1");
        assert_eq!(
            cache.journal(),
            vec![
                CacheOp::Keys { key: key.clone() },
                CacheOp::Set {
                    key,
                    field: "u1".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn empty_member_list_leaves_cache_absent() {
        let (cache, projector) = projector();
        cache.seed(&cache_key("a1"), "u1");

        projector.rebuild("a1", &[]).await.unwrap();

        assert!(!cache.contains_key(&cache_key("a1")));
        assert_eq!(projector.state("a1"), CacheState::Absent);
    }

    #[tokio::test]
    async fn insert_failure_purges_partial_hash() {
        let (cache, projector) = projector();
        cache.seed(&cache_key("a1"), "old");
        cache.fail_sets_after(1);

        let err = projector
            .rebuild("a1", &ids(&["u1", "u2", "u3"]))
            .await
            .unwrap_err();

        assert_eq!(err.stage, RebuildStage::Insert);
        assert!(cache.members(&cache_key("a1")).is_empty());
        assert_eq!(projector.state("a1"), CacheState::Absent);
    }

    #[tokio::test]
    async fn failed_purge_stays_rebuilding() {
        let (cache, projector) = projector();
        cache.fail_sets_after(0);
        cache.set_fail_deletes(true);

        let err = projector.rebuild("a1", &ids(&["u1"])).await.unwrap_err();

        assert_eq!(err.stage, RebuildStage::Insert);
        assert_eq!(projector.state("a1"), CacheState::Rebuilding);
    }

    #[tokio::test]
    async fn delete_failure_keeps_previous_state() {
        let (cache, projector) = projector();
        projector.rebuild("a1", &ids(&["u1"])).await.unwrap();
        cache.set_fail_deletes(true);

        let err = projector.rebuild("a1", &ids(&["u2"])).await.unwrap_err();

        assert_eq!(err.stage, RebuildStage::Delete);
        assert_eq!(cache.members(&cache_key("a1")), vec!["u1"]);
        assert_eq!(
            projector.state("a1"),
            CacheState::Populated {
                members: ids(&["u1"])
            }
        );
    }

    #[tokio::test]
    async fn read_failure_touches_nothing() {
        let (cache, projector) = projector();
        cache.set_unavailable(true);

        let err = projector.rebuild("a1", &ids(&["u1"])).await.unwrap_err();

        assert_eq!(err.stage, RebuildStage::ReadKeys);
        assert_eq!(projector.state("a1"), CacheState::Absent);
    }

    #[tokio::test]
    async fn duplicate_ids_collapse() {
        let (cache, projector) = projector();
        projector.rebuild("a1", &ids(&["u1", "u1"])).await.unwrap();

        assert_eq!(cache.members(&cache_key("a1")), vec!["u1"]);
    }
}
