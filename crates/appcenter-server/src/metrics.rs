//! Prometheus metrics for the AppCenter server.
//!
//! Covers the admin membership synchronizer: cache hit/miss rates on the
//! authorization path, change-lock acquisition attempts and cache rebuild
//! failures.

use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use crate::membership::RebuildStage;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    // Authorization path
    pub const ADMIN_CACHE_HITS_TOTAL: &str = "appcenter_admin_cache_hits_total";
    pub const ADMIN_CACHE_MISSES_TOTAL: &str = "appcenter_admin_cache_misses_total";

    // Change lock
    pub const LOCK_ATTEMPTS_TOTAL: &str = "appcenter_lock_attempts_total";

    // Cache projector
    pub const CACHE_REBUILDS_TOTAL: &str = "appcenter_cache_rebuilds_total";
    pub const CACHE_REBUILD_FAILURES_TOTAL: &str = "appcenter_cache_rebuild_failures_total";
}

/// Initialize the Prometheus metrics exporter.
///
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    // Pull-based: /metrics renders the handle itself
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }

            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if metrics were not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// =============================================================================
// Authorization Metrics
// =============================================================================

/// Record an admin check answered from the cache.
pub fn record_admin_cache_hit() {
    counter!(names::ADMIN_CACHE_HITS_TOTAL).increment(1);
}

/// Record an admin check that fell back to the relation store.
pub fn record_admin_cache_miss(reason: &'static str) {
    counter!(names::ADMIN_CACHE_MISSES_TOTAL, "reason" => reason).increment(1);
}

// =============================================================================
// Lock Metrics
// =============================================================================

/// Record one acquisition attempt and its outcome (`acquired`, `busy` or `error`).
pub fn record_lock_attempt(outcome: &'static str) {
    counter!(names::LOCK_ATTEMPTS_TOTAL, "outcome" => outcome).increment(1);
}

// =============================================================================
// Projector Metrics
// =============================================================================

/// Record a completed cache rebuild.
pub fn record_cache_rebuild() {
    counter!(names::CACHE_REBUILDS_TOTAL).increment(1);
}

/// Record a cache rebuild that stopped at `stage`.
pub fn record_cache_rebuild_failure(stage: RebuildStage) {
    counter!(names::CACHE_REBUILD_FAILURES_TOTAL, "stage" => stage.as_str()).increment(1);
}
