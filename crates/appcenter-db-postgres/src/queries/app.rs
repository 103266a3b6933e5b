//! Queries over the `app_center` table.

use serde_json::{Map, Value};
use sqlx_core::query::query;
use sqlx_core::query_scalar::query_scalar;
use sqlx_core::row::Row;
use sqlx_postgres::{PgConnection, PgPool, PgRow};

use appcenter_core::{App, AppStatus, AppUpdate, DelFlag, Page, PageRequest};
use appcenter_storage::{AppFilter, StorageError};

use crate::error::{is_unique_violation, query_error};

const APP_COLUMNS: &str = "id, app_name, access_url, app_icon, create_by, update_by, \
    create_time, update_time, use_status, server, del_flag, delete_time, app_sign, \
    extension, description, per_poly";

/// Shared predicate for filtered listings. Parameters: $1 name, $2 status, $3 admin user.
const FILTER_PREDICATE: &str = "del_flag = 0 \
    AND ($1::text IS NULL OR app_name LIKE '%' || $1 || '%') \
    AND ($2::int IS NULL OR use_status = $2) \
    AND ($3::text IS NULL OR id IN (SELECT app_id FROM app_user_relation WHERE user_id = $3))";

fn decode(row: &PgRow) -> Result<App, StorageError> {
    let map = |e: sqlx_core::error::Error| StorageError::internal(format!("Failed to decode app row: {e}"));
    let status: i32 = row.try_get("use_status").map_err(map)?;
    let extension = match row.try_get::<Value, _>("extension").map_err(map)? {
        Value::Object(obj) => obj,
        _ => Map::new(),
    };
    Ok(App {
        id: row.try_get("id").map_err(map)?,
        app_name: row.try_get("app_name").map_err(map)?,
        access_url: row.try_get("access_url").map_err(map)?,
        app_icon: row.try_get("app_icon").map_err(map)?,
        create_by: row.try_get("create_by").map_err(map)?,
        update_by: row.try_get("update_by").map_err(map)?,
        create_time: row.try_get("create_time").map_err(map)?,
        update_time: row.try_get("update_time").map_err(map)?,
        use_status: AppStatus::from_code(status)
            .map_err(|e| StorageError::internal(e.to_string()))?,
        server: row.try_get("server").map_err(map)?,
        del_flag: DelFlag::from(row.try_get::<i64, _>("del_flag").map_err(map)?),
        delete_time: row.try_get("delete_time").map_err(map)?,
        app_sign: row.try_get("app_sign").map_err(map)?,
        extension,
        description: row.try_get("description").map_err(map)?,
        per_poly: row.try_get("per_poly").map_err(map)?,
    })
}

fn decode_all(rows: &[PgRow]) -> Result<Vec<App>, StorageError> {
    rows.iter().map(decode).collect()
}

/// Reads an application by ID, including soft-deleted rows.
pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<App>, StorageError> {
    let sql = format!("SELECT {APP_COLUMNS} FROM app_center WHERE id = $1");
    let row = query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| query_error("read app", e))?;
    row.as_ref().map(decode).transpose()
}

/// Reads a live application where `column` equals `value`.
async fn find_live_by(
    pool: &PgPool,
    column: &'static str,
    value: &str,
) -> Result<Option<App>, StorageError> {
    let sql = format!(
        "SELECT {APP_COLUMNS} FROM app_center WHERE {column} = $1 AND del_flag = 0 LIMIT 1"
    );
    let row = query(&sql)
        .bind(value)
        .fetch_optional(pool)
        .await
        .map_err(|e| query_error("read app", e))?;
    row.as_ref().map(decode).transpose()
}

pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<App>, StorageError> {
    find_live_by(pool, "app_name", name).await
}

pub async fn find_by_sign(pool: &PgPool, sign: &str) -> Result<Option<App>, StorageError> {
    if sign.is_empty() {
        return Ok(None);
    }
    find_live_by(pool, "app_sign", sign).await
}

/// Lists live applications matching `filter`, newest first.
pub async fn list(
    pool: &PgPool,
    filter: &AppFilter,
    page: PageRequest,
) -> Result<Page<App>, StorageError> {
    let status = filter.status.map(AppStatus::code);

    let count_sql = format!("SELECT COUNT(*) FROM app_center WHERE {FILTER_PREDICATE}");
    let total: Option<i64> = query_scalar(&count_sql)
        .bind(filter.name_contains.as_deref())
        .bind(status)
        .bind(filter.admin_user_id.as_deref())
        .fetch_one(pool)
        .await
        .map_err(|e| query_error("count apps", e))?;

    let sql = format!(
        "SELECT {APP_COLUMNS} FROM app_center WHERE {FILTER_PREDICATE} \
         ORDER BY create_time DESC, id LIMIT $4 OFFSET $5"
    );
    let rows = query(&sql)
        .bind(filter.name_contains.as_deref())
        .bind(status)
        .bind(filter.admin_user_id.as_deref())
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool)
        .await
        .map_err(|e| query_error("list apps", e))?;

    Ok(Page::new(decode_all(&rows)?, super::total(total)))
}

/// Lists live applications whose ID is in `ids`, newest first.
pub async fn list_by_ids(
    pool: &PgPool,
    ids: &[String],
    page: PageRequest,
) -> Result<Page<App>, StorageError> {
    if ids.is_empty() {
        return Ok(Page::empty());
    }

    let total: Option<i64> =
        query_scalar("SELECT COUNT(*) FROM app_center WHERE del_flag = 0 AND id = ANY($1)")
            .bind(ids)
            .fetch_one(pool)
            .await
            .map_err(|e| query_error("count apps", e))?;

    let sql = format!(
        "SELECT {APP_COLUMNS} FROM app_center WHERE del_flag = 0 AND id = ANY($1) \
         ORDER BY create_time DESC, id LIMIT $2 OFFSET $3"
    );
    let rows = query(&sql)
        .bind(ids)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool)
        .await
        .map_err(|e| query_error("list apps", e))?;

    Ok(Page::new(decode_all(&rows)?, super::total(total)))
}

/// Inserts a new application.
pub async fn insert(conn: &mut PgConnection, app: &App) -> Result<(), StorageError> {
    let sql = format!(
        "INSERT INTO app_center ({APP_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
    );
    query(&sql)
        .bind(&app.id)
        .bind(&app.app_name)
        .bind(&app.access_url)
        .bind(&app.app_icon)
        .bind(&app.create_by)
        .bind(&app.update_by)
        .bind(app.create_time)
        .bind(app.update_time)
        .bind(app.use_status.code())
        .bind(app.server)
        .bind(i64::from(app.del_flag))
        .bind(app.delete_time)
        .bind(&app.app_sign)
        .bind(Value::Object(app.extension.clone()))
        .bind(&app.description)
        .bind(app.per_poly)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::already_exists("app", &app.id)
            } else {
                query_error("insert app", e)
            }
        })?;
    Ok(())
}

/// Applies a partial update; `NULL` parameters keep the current column value.
pub async fn update(conn: &mut PgConnection, update: &AppUpdate) -> Result<(), StorageError> {
    let result = query(
        "UPDATE app_center SET \
            app_name = COALESCE($2, app_name), \
            access_url = COALESCE($3, access_url), \
            app_icon = COALESCE($4, app_icon), \
            update_by = COALESCE($5, update_by), \
            update_time = COALESCE($6, update_time), \
            use_status = COALESCE($7, use_status), \
            server = COALESCE($8, server), \
            app_sign = COALESCE($9, app_sign), \
            extension = COALESCE($10, extension), \
            description = COALESCE($11, description) \
         WHERE id = $1",
    )
    .bind(&update.id)
    .bind(update.app_name.as_deref())
    .bind(update.access_url.as_deref())
    .bind(update.app_icon.as_deref())
    .bind(update.update_by.as_deref())
    .bind(update.update_time)
    .bind(update.use_status.map(AppStatus::code))
    .bind(update.server)
    .bind(update.app_sign.as_deref())
    .bind(update.extension.clone().map(Value::Object))
    .bind(update.description.as_deref())
    .execute(&mut *conn)
    .await
    .map_err(|e| query_error("update app", e))?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("app", &update.id));
    }
    Ok(())
}

/// Marks an application deleted and records its purge time.
pub async fn mark_deleted(pool: &PgPool, id: &str, purge_at: i64) -> Result<(), StorageError> {
    let result = query("UPDATE app_center SET del_flag = 1, delete_time = $2 WHERE id = $1")
        .bind(id)
        .bind(purge_at)
        .execute(pool)
        .await
        .map_err(|e| query_error("delete app", e))?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("app", id));
    }
    Ok(())
}

pub async fn set_per_poly(pool: &PgPool, id: &str, per_poly: bool) -> Result<(), StorageError> {
    let result = query("UPDATE app_center SET per_poly = $2 WHERE id = $1")
        .bind(id)
        .bind(per_poly)
        .execute(pool)
        .await
        .map_err(|e| query_error("update per_poly", e))?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("app", id));
    }
    Ok(())
}
