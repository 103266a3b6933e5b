//! Queries over the `app_user_relation` table.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::{PgConnection, PgPool};

use appcenter_core::{AdminRelation, Page, PageRequest};
use appcenter_storage::StorageError;

use crate::error::query_error;

pub async fn user_ids_by_app(pool: &PgPool, app_id: &str) -> Result<Vec<String>, StorageError> {
    query_scalar("SELECT user_id FROM app_user_relation WHERE app_id = $1")
        .bind(app_id)
        .fetch_all(pool)
        .await
        .map_err(|e| query_error("read admin relations", e))
}

pub async fn list_by_app(
    pool: &PgPool,
    app_id: &str,
    page: PageRequest,
) -> Result<Page<AdminRelation>, StorageError> {
    let total: Option<i64> =
        query_scalar("SELECT COUNT(*) FROM app_user_relation WHERE app_id = $1")
            .bind(app_id)
            .fetch_one(pool)
            .await
            .map_err(|e| query_error("count admin relations", e))?;

    let rows: Vec<(String, String)> = query_as(
        "SELECT app_id, user_id FROM app_user_relation WHERE app_id = $1 \
         ORDER BY user_id LIMIT $2 OFFSET $3",
    )
    .bind(app_id)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await
    .map_err(|e| query_error("list admin relations", e))?;

    let relations = rows
        .into_iter()
        .map(|(app_id, user_id)| AdminRelation { app_id, user_id })
        .collect();
    Ok(Page::new(relations, super::total(total)))
}

pub async fn count(pool: &PgPool, app_id: &str, user_id: &str) -> Result<i64, StorageError> {
    let count: Option<i64> = query_scalar(
        "SELECT COUNT(*) FROM app_user_relation WHERE app_id = $1 AND user_id = $2",
    )
    .bind(app_id)
    .bind(user_id)
    .fetch_one(pool)
    .await
    .map_err(|e| query_error("count admin relation", e))?;
    Ok(super::total(count))
}

pub async fn insert(conn: &mut PgConnection, relation: &AdminRelation) -> Result<(), StorageError> {
    query("INSERT INTO app_user_relation (app_id, user_id) VALUES ($1, $2)")
        .bind(&relation.app_id)
        .bind(&relation.user_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| query_error("insert admin relation", e))?;
    Ok(())
}

pub async fn delete_by_app(conn: &mut PgConnection, app_id: &str) -> Result<(), StorageError> {
    query("DELETE FROM app_user_relation WHERE app_id = $1")
        .bind(app_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| query_error("delete admin relations", e))?;
    Ok(())
}

pub async fn delete_by_app_and_users(
    conn: &mut PgConnection,
    app_id: &str,
    user_ids: &[String],
) -> Result<(), StorageError> {
    query("DELETE FROM app_user_relation WHERE app_id = $1 AND user_id = ANY($2)")
        .bind(app_id)
        .bind(user_ids)
        .execute(&mut *conn)
        .await
        .map_err(|e| query_error("delete admin relations", e))?;
    Ok(())
}
