//! In-memory implementation of `CatalogStorage`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use appcenter_core::{AdminRelation, App, AppScope, AppUpdate, DelFlag, Page, PageRequest, ScopeType};
use appcenter_storage::{AppFilter, CatalogStorage, StorageError, Transaction};

#[derive(Debug, Default, Clone)]
pub(crate) struct CatalogState {
    apps: HashMap<String, App>,
    relations: Vec<AdminRelation>,
    scopes: Vec<(String, AppScope)>,
}

impl CatalogState {
    fn update_app(&mut self, update: &AppUpdate) -> Result<(), StorageError> {
        let app = self
            .apps
            .get_mut(&update.id)
            .ok_or_else(|| StorageError::not_found("app", &update.id))?;
        update.apply_to(app);
        Ok(())
    }

    fn live_apps_sorted<'a>(&'a self, keep: impl Fn(&App) -> bool) -> Vec<&'a App> {
        let mut apps: Vec<&App> = self
            .apps
            .values()
            .filter(|app| !app.is_deleted() && keep(app))
            .collect();
        apps.sort_by(|a, b| {
            b.create_time
                .cmp(&a.create_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        apps
    }

    fn scope_matches(scope: &AppScope, user_id: &str, dep_id: &str) -> bool {
        match scope.scope_type {
            ScopeType::User => !user_id.is_empty() && scope.scope_id == user_id,
            ScopeType::Department => !dep_id.is_empty() && scope.scope_id == dep_id,
        }
    }
}

fn page_of<T: Clone>(items: &[T], page: PageRequest) -> Page<T> {
    Page::new(page.slice(items), items.len() as i64)
}

/// In-memory catalog store.
///
/// Committed state lives behind a single `RwLock`; transactions stage their
/// writes and apply them to a copy of the state on commit, so a failing
/// commit leaves the committed state untouched.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    state: Arc<RwLock<CatalogState>>,
    fail_next_commit: AtomicBool,
    fail_relation_writes: Arc<AtomicBool>,
    count_queries: AtomicUsize,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next transaction's commit fail without applying anything.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Makes relation inserts inside transactions fail while set.
    pub fn set_fail_relation_writes(&self, fail: bool) {
        self.fail_relation_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `count_relation` queries served so far.
    pub fn relation_count_queries(&self) -> usize {
        self.count_queries.load(Ordering::SeqCst)
    }

    /// Inserts an application directly, bypassing transactions.
    pub async fn seed_app(&self, app: App) {
        self.state.write().await.apps.insert(app.id.clone(), app);
    }

    /// Inserts a relation row directly, bypassing transactions.
    pub async fn seed_relation(&self, app_id: &str, user_id: &str) {
        self.state
            .write()
            .await
            .relations
            .push(AdminRelation::new(app_id, user_id));
    }
}

#[async_trait]
impl CatalogStorage for InMemoryStorage {
    async fn find_app(&self, id: &str) -> Result<Option<App>, StorageError> {
        Ok(self.state.read().await.apps.get(id).cloned())
    }

    async fn find_app_by_name(&self, name: &str) -> Result<Option<App>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .apps
            .values()
            .find(|app| !app.is_deleted() && app.app_name == name)
            .cloned())
    }

    async fn find_app_by_sign(&self, sign: &str) -> Result<Option<App>, StorageError> {
        if sign.is_empty() {
            return Ok(None);
        }
        let state = self.state.read().await;
        Ok(state
            .apps
            .values()
            .find(|app| !app.is_deleted() && app.app_sign == sign)
            .cloned())
    }

    async fn list_apps(
        &self,
        filter: &AppFilter,
        page: PageRequest,
    ) -> Result<Page<App>, StorageError> {
        let state = self.state.read().await;
        let administered: Option<HashSet<&str>> = filter.admin_user_id.as_deref().map(|user| {
            state
                .relations
                .iter()
                .filter(|r| r.user_id == user)
                .map(|r| r.app_id.as_str())
                .collect()
        });

        let apps: Vec<App> = state
            .live_apps_sorted(|app| {
                filter.matches_app(app)
                    && administered
                        .as_ref()
                        .is_none_or(|ids| ids.contains(app.id.as_str()))
            })
            .into_iter()
            .cloned()
            .collect();
        Ok(page_of(&apps, page))
    }

    async fn list_apps_by_ids(
        &self,
        ids: &[String],
        page: PageRequest,
    ) -> Result<Page<App>, StorageError> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let state = self.state.read().await;
        let apps: Vec<App> = state
            .live_apps_sorted(|app| wanted.contains(app.id.as_str()))
            .into_iter()
            .cloned()
            .collect();
        Ok(page_of(&apps, page))
    }

    async fn update_app(&self, update: &AppUpdate) -> Result<(), StorageError> {
        self.state.write().await.update_app(update)
    }

    async fn mark_app_deleted(&self, id: &str, purge_at: i64) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        let app = state
            .apps
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found("app", id))?;
        app.del_flag = DelFlag::Deleted;
        app.delete_time = Some(purge_at);
        Ok(())
    }

    async fn set_per_poly(&self, id: &str, per_poly: bool) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        let app = state
            .apps
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found("app", id))?;
        app.per_poly = per_poly;
        Ok(())
    }

    async fn admin_user_ids(&self, app_id: &str) -> Result<Vec<String>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .relations
            .iter()
            .filter(|r| r.app_id == app_id)
            .map(|r| r.user_id.clone())
            .collect())
    }

    async fn list_relations(
        &self,
        app_id: &str,
        page: PageRequest,
    ) -> Result<Page<AdminRelation>, StorageError> {
        let state = self.state.read().await;
        let rows: Vec<AdminRelation> = state
            .relations
            .iter()
            .filter(|r| r.app_id == app_id)
            .cloned()
            .collect();
        Ok(page_of(&rows, page))
    }

    async fn count_relation(&self, app_id: &str, user_id: &str) -> Result<i64, StorageError> {
        self.count_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read().await;
        Ok(state
            .relations
            .iter()
            .filter(|r| r.app_id == app_id && r.user_id == user_id)
            .count() as i64)
    }

    async fn app_ids_in_scope(
        &self,
        user_id: &str,
        dep_id: &str,
    ) -> Result<Vec<String>, StorageError> {
        let state = self.state.read().await;
        let mut seen = HashSet::new();
        Ok(state
            .scopes
            .iter()
            .filter(|(_, scope)| CatalogState::scope_matches(scope, user_id, dep_id))
            .filter(|(app_id, _)| seen.insert(app_id.clone()))
            .map(|(app_id, _)| app_id.clone())
            .collect())
    }

    async fn list_scopes(
        &self,
        app_id: &str,
        page: PageRequest,
    ) -> Result<Page<AppScope>, StorageError> {
        let state = self.state.read().await;
        let rows: Vec<AppScope> = state
            .scopes
            .iter()
            .filter(|(id, _)| id == app_id)
            .map(|(_, scope)| scope.clone())
            .collect();
        Ok(page_of(&rows, page))
    }

    async fn count_scope_access(
        &self,
        app_id: &str,
        user_id: &str,
        dep_id: &str,
    ) -> Result<i64, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .scopes
            .iter()
            .filter(|(id, scope)| id == app_id && CatalogState::scope_matches(scope, user_id, dep_id))
            .count() as i64)
    }

    async fn delete_scopes_by_app(&self, app_id: &str) -> Result<(), StorageError> {
        self.state
            .write()
            .await
            .scopes
            .retain(|(id, _)| id != app_id);
        Ok(())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StorageError> {
        Ok(Box::new(InMemoryTransaction {
            state: Arc::clone(&self.state),
            ops: Vec::new(),
            fail_commit: self.fail_next_commit.swap(false, Ordering::SeqCst),
            fail_relation_writes: Arc::clone(&self.fail_relation_writes),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}

enum TransactionOp {
    InsertApp(App),
    UpdateApp(AppUpdate),
    InsertRelation(AdminRelation),
    DeleteRelationsByApp(String),
    DeleteRelationsByAppAndUsers(String, Vec<String>),
    AddScopes(String, Vec<AppScope>),
    DeleteScopes(String, Vec<AppScope>),
}

impl TransactionOp {
    fn apply(self, state: &mut CatalogState) -> Result<(), StorageError> {
        match self {
            Self::InsertApp(app) => {
                if state.apps.contains_key(&app.id) {
                    return Err(StorageError::already_exists("app", &app.id));
                }
                state.apps.insert(app.id.clone(), app);
            }
            Self::UpdateApp(update) => state.update_app(&update)?,
            Self::InsertRelation(relation) => state.relations.push(relation),
            Self::DeleteRelationsByApp(app_id) => {
                state.relations.retain(|r| r.app_id != app_id);
            }
            Self::DeleteRelationsByAppAndUsers(app_id, users) => {
                state
                    .relations
                    .retain(|r| r.app_id != app_id || !users.contains(&r.user_id));
            }
            Self::AddScopes(app_id, scopes) => {
                for scope in scopes {
                    state.scopes.push((app_id.clone(), scope));
                }
            }
            Self::DeleteScopes(app_id, scopes) => {
                state
                    .scopes
                    .retain(|(id, scope)| *id != app_id || !scopes.contains(scope));
            }
        }
        Ok(())
    }
}

/// Staged in-memory transaction.
///
/// Operations are collected and applied atomically on commit.
pub struct InMemoryTransaction {
    state: Arc<RwLock<CatalogState>>,
    ops: Vec<TransactionOp>,
    fail_commit: bool,
    fail_relation_writes: Arc<AtomicBool>,
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn insert_app(&mut self, app: &App) -> Result<(), StorageError> {
        let staged = self
            .ops
            .iter()
            .any(|op| matches!(op, TransactionOp::InsertApp(a) if a.id == app.id));
        if staged || self.state.read().await.apps.contains_key(&app.id) {
            return Err(StorageError::already_exists("app", &app.id));
        }
        self.ops.push(TransactionOp::InsertApp(app.clone()));
        Ok(())
    }

    async fn update_app(&mut self, update: &AppUpdate) -> Result<(), StorageError> {
        self.ops.push(TransactionOp::UpdateApp(update.clone()));
        Ok(())
    }

    async fn insert_relation(&mut self, relation: &AdminRelation) -> Result<(), StorageError> {
        if self.fail_relation_writes.load(Ordering::SeqCst) {
            return Err(StorageError::internal("relation write rejected"));
        }
        self.ops.push(TransactionOp::InsertRelation(relation.clone()));
        Ok(())
    }

    async fn delete_relations_by_app(&mut self, app_id: &str) -> Result<(), StorageError> {
        self.ops
            .push(TransactionOp::DeleteRelationsByApp(app_id.to_string()));
        Ok(())
    }

    async fn delete_relations_by_app_and_users(
        &mut self,
        app_id: &str,
        user_ids: &[String],
    ) -> Result<(), StorageError> {
        self.ops.push(TransactionOp::DeleteRelationsByAppAndUsers(
            app_id.to_string(),
            user_ids.to_vec(),
        ));
        Ok(())
    }

    async fn add_scopes(&mut self, app_id: &str, scopes: &[AppScope]) -> Result<(), StorageError> {
        self.ops
            .push(TransactionOp::AddScopes(app_id.to_string(), scopes.to_vec()));
        Ok(())
    }

    async fn delete_scopes(
        &mut self,
        app_id: &str,
        scopes: &[AppScope],
    ) -> Result<(), StorageError> {
        self.ops
            .push(TransactionOp::DeleteScopes(app_id.to_string(), scopes.to_vec()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let Self {
            state,
            ops,
            fail_commit,
            ..
        } = *self;
        if fail_commit {
            return Err(StorageError::transaction_error("commit rejected"));
        }
        let mut guard = state.write().await;
        let mut next = guard.clone();
        for op in ops {
            op.apply(&mut next)?;
        }
        *guard = next;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        tracing::debug!(discarded = self.ops.len(), "in-memory transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appcenter_core::AppStatus;

    fn app(id: &str, name: &str, created: i64) -> App {
        App {
            id: id.into(),
            app_name: name.into(),
            access_url: String::new(),
            app_icon: String::new(),
            create_by: "u1".into(),
            update_by: "u1".into(),
            create_time: created,
            update_time: created,
            use_status: AppStatus::Released,
            server: 0,
            del_flag: DelFlag::Normal,
            delete_time: None,
            app_sign: String::new(),
            extension: Default::default(),
            description: String::new(),
            per_poly: false,
        }
    }

    #[tokio::test]
    async fn transaction_writes_are_invisible_until_commit() {
        let storage = InMemoryStorage::new();
        storage.seed_app(app("a1", "crm", 1)).await;

        let mut tx = storage.begin_transaction().await.unwrap();
        tx.insert_relation(&AdminRelation::new("a1", "u1")).await.unwrap();
        assert!(storage.admin_user_ids("a1").await.unwrap().is_empty());

        tx.commit().await.unwrap();
        assert_eq!(storage.admin_user_ids("a1").await.unwrap(), vec!["u1"]);
    }

    #[tokio::test]
    async fn rollback_discards_staged_writes() {
        let storage = InMemoryStorage::new();
        storage.seed_relation("a1", "u1").await;

        let mut tx = storage.begin_transaction().await.unwrap();
        tx.delete_relations_by_app("a1").await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(storage.admin_user_ids("a1").await.unwrap(), vec!["u1"]);
    }

    #[tokio::test]
    async fn failed_commit_leaves_state_untouched() {
        let storage = InMemoryStorage::new();
        storage.seed_relation("a1", "u1").await;
        storage.fail_next_commit();

        let mut tx = storage.begin_transaction().await.unwrap();
        tx.delete_relations_by_app("a1").await.unwrap();
        assert!(tx.commit().await.is_err());
        assert_eq!(storage.admin_user_ids("a1").await.unwrap(), vec!["u1"]);

        // Only the next commit is affected.
        let tx = storage.begin_transaction().await.unwrap();
        assert!(tx.commit().await.is_ok());
    }

    #[tokio::test]
    async fn partial_relation_delete_keeps_other_users() {
        let storage = InMemoryStorage::new();
        for user in ["u1", "u2", "u3"] {
            storage.seed_relation("a1", user).await;
        }
        storage.seed_relation("a2", "u1").await;

        let mut tx = storage.begin_transaction().await.unwrap();
        tx.delete_relations_by_app_and_users("a1", &["u1".into(), "u3".into()])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(storage.admin_user_ids("a1").await.unwrap(), vec!["u2"]);
        assert_eq!(storage.count_relation("a2", "u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_apps_filters_by_admin_and_orders_newest_first() {
        let storage = InMemoryStorage::new();
        storage.seed_app(app("a1", "crm", 1)).await;
        storage.seed_app(app("a2", "erp", 2)).await;
        storage.seed_app(app("a3", "wiki", 3)).await;
        storage.seed_relation("a1", "u9").await;
        storage.seed_relation("a3", "u9").await;

        let all = storage
            .list_apps(&AppFilter::default(), PageRequest::default())
            .await
            .unwrap();
        let ids: Vec<_> = all.data.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a3", "a2", "a1"]);

        let mine = storage
            .list_apps(&AppFilter::default().administered_by("u9"), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(mine.total_count, 2);
    }

    #[tokio::test]
    async fn scope_lookup_matches_user_or_department() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin_transaction().await.unwrap();
        tx.add_scopes("a1", &[AppScope::user("u1")]).await.unwrap();
        tx.add_scopes("a2", &[AppScope::department("d1")]).await.unwrap();
        tx.commit().await.unwrap();

        let mut ids = storage.app_ids_in_scope("u1", "d1").await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a1", "a2"]);
        assert_eq!(storage.count_scope_access("a2", "u1", "").await.unwrap(), 0);
        assert_eq!(storage.count_scope_access("a2", "u1", "d1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_app_insert_is_rejected() {
        let storage = InMemoryStorage::new();
        storage.seed_app(app("a1", "crm", 1)).await;

        let mut tx = storage.begin_transaction().await.unwrap();
        let err = tx.insert_app(&app("a1", "other", 2)).await.unwrap_err();
        assert!(err.is_already_exists());
    }
}
