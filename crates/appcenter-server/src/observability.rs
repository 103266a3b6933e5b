use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Directives appended to the configured level; sqlx logs every statement at info.
const QUIET_DEPENDENCIES: &str = "sqlx=warn,deadpool=warn";

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_new(format!("{level},{QUIET_DEPENDENCIES}"))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn rust_log_set() -> bool {
    std::env::var_os("RUST_LOG").is_some()
}

pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init_tracing_with_level(level: &str) {
    let filter = if rust_log_set() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(level))
    } else {
        filter_for(level)
    };

    let (filter, handle) = reload::Layer::new(filter);
    let _ = FILTER_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Swaps in the level from the loaded config. No-op when `RUST_LOG` is set.
pub fn apply_logging_level(level: &str) {
    if rust_log_set() {
        tracing::debug!(level, "RUST_LOG set, keeping it");
        return;
    }
    if let Some(handle) = FILTER_HANDLE.get()
        && let Err(err) = handle.reload(filter_for(level))
    {
        tracing::warn!(error = %err, "failed to apply logging level");
    }
}
