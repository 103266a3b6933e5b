//! PostgreSQL transaction implementation.

use async_trait::async_trait;
use sqlx_postgres::PgTransaction;
use tokio::sync::Mutex;

use appcenter_core::{AdminRelation, App, AppScope, AppUpdate};
use appcenter_storage::{StorageError, Transaction};

use crate::queries;

/// PostgreSQL transaction wrapper.
///
/// The sqlx transaction sits in a `Mutex<Option<..>>` so commit and rollback
/// can take ownership of it, and so the wrapper is `Sync`. sqlx rolls the
/// transaction back on drop if neither was called.
pub struct PostgresTransaction {
    tx: Mutex<Option<Box<PgTransaction<'static>>>>,
}

impl PostgresTransaction {
    pub fn new(tx: PgTransaction<'static>) -> Self {
        Self {
            tx: Mutex::new(Some(Box::new(tx))),
        }
    }
}

fn completed() -> StorageError {
    StorageError::transaction_error("Transaction already completed (committed or rolled back)")
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn insert_app(&mut self, app: &App) -> Result<(), StorageError> {
        let tx = self.tx.get_mut().as_deref_mut().ok_or_else(completed)?;
        queries::app::insert(tx, app).await
    }

    async fn update_app(&mut self, update: &AppUpdate) -> Result<(), StorageError> {
        let tx = self.tx.get_mut().as_deref_mut().ok_or_else(completed)?;
        queries::app::update(tx, update).await
    }

    async fn insert_relation(&mut self, relation: &AdminRelation) -> Result<(), StorageError> {
        let tx = self.tx.get_mut().as_deref_mut().ok_or_else(completed)?;
        queries::relation::insert(tx, relation).await
    }

    async fn delete_relations_by_app(&mut self, app_id: &str) -> Result<(), StorageError> {
        let tx = self.tx.get_mut().as_deref_mut().ok_or_else(completed)?;
        queries::relation::delete_by_app(tx, app_id).await
    }

    async fn delete_relations_by_app_and_users(
        &mut self,
        app_id: &str,
        user_ids: &[String],
    ) -> Result<(), StorageError> {
        let tx = self.tx.get_mut().as_deref_mut().ok_or_else(completed)?;
        queries::relation::delete_by_app_and_users(tx, app_id, user_ids).await
    }

    async fn add_scopes(&mut self, app_id: &str, scopes: &[AppScope]) -> Result<(), StorageError> {
        let tx = self.tx.get_mut().as_deref_mut().ok_or_else(completed)?;
        queries::scope::insert_many(tx, app_id, scopes).await
    }

    async fn delete_scopes(
        &mut self,
        app_id: &str,
        scopes: &[AppScope],
    ) -> Result<(), StorageError> {
        let tx = self.tx.get_mut().as_deref_mut().ok_or_else(completed)?;
        queries::scope::delete_many(tx, app_id, scopes).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        if let Some(tx) = self.tx.lock().await.take() {
            tx.commit().await.map_err(|e| {
                StorageError::transaction_error(format!("Failed to commit transaction: {e}"))
            })?;
            tracing::debug!("Transaction committed successfully");
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        if let Some(tx) = self.tx.lock().await.take() {
            tx.rollback().await.map_err(|e| {
                StorageError::transaction_error(format!("Failed to rollback transaction: {e}"))
            })?;
            tracing::debug!("Transaction rolled back successfully");
        }
        Ok(())
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        if self.tx.get_mut().is_some() {
            tracing::warn!(
                "PostgresTransaction dropped without explicit commit/rollback - will auto-rollback"
            );
        }
    }
}
