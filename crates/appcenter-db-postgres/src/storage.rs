//! PostgreSQL implementation of the `CatalogStorage` trait.

use async_trait::async_trait;
use sqlx_postgres::PgPool;

use appcenter_core::{AdminRelation, App, AppScope, AppUpdate, Page, PageRequest};
use appcenter_storage::{AppFilter, CatalogStorage, StorageError, Transaction};

use crate::config::PostgresConfig;
use crate::error::query_error;
use crate::migrations;
use crate::pool;
use crate::queries;
use crate::transaction::PostgresTransaction;

/// PostgreSQL catalog storage backend.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Creates a new `PostgresStorage` with the given configuration.
    ///
    /// This will:
    /// 1. Create a connection pool
    /// 2. Run migrations (if configured)
    ///
    /// # Errors
    ///
    /// Returns an error if the connection pool cannot be created
    /// or if migrations fail.
    pub async fn new(config: PostgresConfig) -> Result<Self, StorageError> {
        let pool = pool::create_pool(&config).await?;

        if config.run_migrations {
            migrations::run(&pool).await?;
        }

        Ok(Self { pool })
    }

    /// Creates a new `PostgresStorage` from an existing connection pool.
    ///
    /// Migrations are not run automatically when using this constructor.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Checks that the database answers a trivial query.
    pub async fn ping(&self) -> Result<(), StorageError> {
        pool::ping(&self.pool).await.map_err(Into::into)
    }
}

#[async_trait]
impl CatalogStorage for PostgresStorage {
    async fn find_app(&self, id: &str) -> Result<Option<App>, StorageError> {
        queries::app::find_by_id(&self.pool, id).await
    }

    async fn find_app_by_name(&self, name: &str) -> Result<Option<App>, StorageError> {
        queries::app::find_by_name(&self.pool, name).await
    }

    async fn find_app_by_sign(&self, sign: &str) -> Result<Option<App>, StorageError> {
        queries::app::find_by_sign(&self.pool, sign).await
    }

    async fn list_apps(
        &self,
        filter: &AppFilter,
        page: PageRequest,
    ) -> Result<Page<App>, StorageError> {
        queries::app::list(&self.pool, filter, page).await
    }

    async fn list_apps_by_ids(
        &self,
        ids: &[String],
        page: PageRequest,
    ) -> Result<Page<App>, StorageError> {
        queries::app::list_by_ids(&self.pool, ids, page).await
    }

    async fn update_app(&self, update: &AppUpdate) -> Result<(), StorageError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| query_error("acquire connection", e))?;
        queries::app::update(&mut conn, update).await
    }

    async fn mark_app_deleted(&self, id: &str, purge_at: i64) -> Result<(), StorageError> {
        queries::app::mark_deleted(&self.pool, id, purge_at).await
    }

    async fn set_per_poly(&self, id: &str, per_poly: bool) -> Result<(), StorageError> {
        queries::app::set_per_poly(&self.pool, id, per_poly).await
    }

    async fn admin_user_ids(&self, app_id: &str) -> Result<Vec<String>, StorageError> {
        queries::relation::user_ids_by_app(&self.pool, app_id).await
    }

    async fn list_relations(
        &self,
        app_id: &str,
        page: PageRequest,
    ) -> Result<Page<AdminRelation>, StorageError> {
        queries::relation::list_by_app(&self.pool, app_id, page).await
    }

    async fn count_relation(&self, app_id: &str, user_id: &str) -> Result<i64, StorageError> {
        queries::relation::count(&self.pool, app_id, user_id).await
    }

    async fn app_ids_in_scope(
        &self,
        user_id: &str,
        dep_id: &str,
    ) -> Result<Vec<String>, StorageError> {
        queries::scope::app_ids_for(&self.pool, user_id, dep_id).await
    }

    async fn list_scopes(
        &self,
        app_id: &str,
        page: PageRequest,
    ) -> Result<Page<AppScope>, StorageError> {
        queries::scope::list_by_app(&self.pool, app_id, page).await
    }

    async fn count_scope_access(
        &self,
        app_id: &str,
        user_id: &str,
        dep_id: &str,
    ) -> Result<i64, StorageError> {
        queries::scope::count_access(&self.pool, app_id, user_id, dep_id).await
    }

    async fn delete_scopes_by_app(&self, app_id: &str) -> Result<(), StorageError> {
        queries::scope::delete_by_app(&self.pool, app_id).await
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StorageError> {
        let tx = self.pool.begin().await.map_err(|e| {
            StorageError::transaction_error(format!("Failed to begin transaction: {e}"))
        })?;
        Ok(Box::new(PostgresTransaction::new(tx)))
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
