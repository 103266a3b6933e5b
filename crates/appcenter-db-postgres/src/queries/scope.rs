//! Queries over the `app_scope` table.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::{PgConnection, PgPool};

use appcenter_core::{AppScope, Page, PageRequest, ScopeType};
use appcenter_storage::StorageError;

use crate::error::query_error;

/// Matches a user scope on $2 or a department scope on $3; empty IDs never match.
const ACCESS_PREDICATE: &str = "((type = 1 AND scope_id = $2 AND $2 <> '') \
    OR (type = 2 AND scope_id = $3 AND $3 <> ''))";

pub async fn app_ids_for(
    pool: &PgPool,
    user_id: &str,
    dep_id: &str,
) -> Result<Vec<String>, StorageError> {
    query_scalar(
        "SELECT DISTINCT app_id FROM app_scope \
         WHERE (type = 1 AND scope_id = $1 AND $1 <> '') \
            OR (type = 2 AND scope_id = $2 AND $2 <> '')",
    )
    .bind(user_id)
    .bind(dep_id)
    .fetch_all(pool)
    .await
    .map_err(|e| query_error("read scopes", e))
}

pub async fn list_by_app(
    pool: &PgPool,
    app_id: &str,
    page: PageRequest,
) -> Result<Page<AppScope>, StorageError> {
    let total: Option<i64> = query_scalar("SELECT COUNT(*) FROM app_scope WHERE app_id = $1")
        .bind(app_id)
        .fetch_one(pool)
        .await
        .map_err(|e| query_error("count scopes", e))?;

    let rows: Vec<(String, i32)> = query_as(
        "SELECT scope_id, type FROM app_scope WHERE app_id = $1 \
         ORDER BY type, scope_id LIMIT $2 OFFSET $3",
    )
    .bind(app_id)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await
    .map_err(|e| query_error("list scopes", e))?;

    let scopes = rows
        .into_iter()
        .map(|(scope_id, code)| {
            ScopeType::try_from(code)
                .map(|scope_type| AppScope {
                    scope_id,
                    scope_type,
                })
                .map_err(|e| StorageError::internal(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Page::new(scopes, super::total(total)))
}

pub async fn count_access(
    pool: &PgPool,
    app_id: &str,
    user_id: &str,
    dep_id: &str,
) -> Result<i64, StorageError> {
    let sql = format!("SELECT COUNT(*) FROM app_scope WHERE app_id = $1 AND {ACCESS_PREDICATE}");
    let count: Option<i64> = query_scalar(&sql)
        .bind(app_id)
        .bind(user_id)
        .bind(dep_id)
        .fetch_one(pool)
        .await
        .map_err(|e| query_error("count scope access", e))?;
    Ok(super::total(count))
}

pub async fn delete_by_app(pool: &PgPool, app_id: &str) -> Result<(), StorageError> {
    query("DELETE FROM app_scope WHERE app_id = $1")
        .bind(app_id)
        .execute(pool)
        .await
        .map_err(|e| query_error("delete scopes", e))?;
    Ok(())
}

pub async fn insert_many(
    conn: &mut PgConnection,
    app_id: &str,
    scopes: &[AppScope],
) -> Result<(), StorageError> {
    for scope in scopes {
        query("INSERT INTO app_scope (app_id, scope_id, type) VALUES ($1, $2, $3)")
            .bind(app_id)
            .bind(&scope.scope_id)
            .bind(i32::from(scope.scope_type))
            .execute(&mut *conn)
            .await
            .map_err(|e| query_error("insert scope", e))?;
    }
    Ok(())
}

pub async fn delete_many(
    conn: &mut PgConnection,
    app_id: &str,
    scopes: &[AppScope],
) -> Result<(), StorageError> {
    for scope in scopes {
        query("DELETE FROM app_scope WHERE app_id = $1 AND scope_id = $2 AND type = $3")
            .bind(app_id)
            .bind(&scope.scope_id)
            .bind(i32::from(scope.scope_type))
            .execute(&mut *conn)
            .await
            .map_err(|e| query_error("delete scope", e))?;
    }
    Ok(())
}
