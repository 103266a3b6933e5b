use sqlx_core::pool::PoolOptions;
use sqlx_postgres::{PgPool, Postgres};
use tracing::{debug, info, instrument};

use crate::config::PostgresConfig;
use crate::error::{PostgresError, Result};

/// Opens the catalog connection pool.
#[instrument(skip(config), fields(url = %config.redacted_url()))]
pub async fn create_pool(config: &PostgresConfig) -> Result<PgPool> {
    if config.pool_size == 0 {
        return Err(PostgresError::config("pool_size must be greater than 0"));
    }

    info!(
        pool_size = config.pool_size,
        idle = config.idle_connections(),
        acquire_timeout_ms = config.acquire_timeout_ms,
        "Opening catalog database pool"
    );

    let pool = PoolOptions::<Postgres>::new()
        .max_connections(config.pool_size)
        .min_connections(config.idle_connections())
        .acquire_timeout(config.acquire_timeout())
        .max_lifetime(config.conn_max_lifetime())
        .connect(&config.url)
        .await?;

    debug!("Catalog database pool ready");
    Ok(pool)
}

/// Round-trips a trivial query.
pub async fn ping(pool: &PgPool) -> Result<()> {
    sqlx_core::query::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(PostgresError::from)?;
    Ok(())
}
