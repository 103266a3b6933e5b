use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use appcenter_storage::DynCatalogStorage;

use crate::cache::{MembershipStores, create_membership_stores};
use crate::clients::{
    ChaosClient, FlowClient, HttpChaosClient, HttpFlowClient, HttpFormClient, HttpOrgClient,
    OrgClient,
};
use crate::config::{AppConfig, ServerConfig, StorageBackend};
use crate::handlers;
use crate::membership::MembershipService;
use crate::provision::{FormRoleExecutor, Provisioner};
use crate::service::AppService;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AppService>,
}

impl AppState {
    pub fn new(service: AppService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

fn app_center_routes() -> Router<AppState> {
    Router::new()
        // Admin
        .route("/add", post(handlers::add_app))
        .route("/update", post(handlers::update_app))
        .route("/updateStatus", post(handlers::update_status))
        .route("/del", post(handlers::delete_app))
        .route("/one", post(handlers::admin_select_by_id))
        .route("/getOne", post(handlers::get_one))
        .route("/adminList", post(handlers::admin_page_list))
        .route("/superAdminList", post(handlers::super_admin_page_list))
        .route("/addAdmin", post(handlers::add_admin))
        .route("/delAdmin", post(handlers::del_admin))
        .route("/adminUsers", post(handlers::admin_users))
        .route("/listByStatus", post(handlers::list_by_status))
        .route("/perPoly", post(handlers::change_per_poly))
        // Home platform
        .route("/userList", post(handlers::user_page_list))
        .route("/apps", post(handlers::get_apps_by_ids))
        // Checks
        .route("/checkIsAdmin", post(handlers::check_is_admin))
        .route("/checkAppAccess", post(handlers::check_app_access))
        // Scopes
        .route("/addAppScope", post(handlers::add_app_scope))
        .route("/homeAccessList", post(handlers::home_access_list))
        // Import / export
        .route("/export", post(handlers::export_app))
        .route("/importApp", post(handlers::import_app))
        .route("/finishImport", post(handlers::finish_import))
        .route("/errorImport", post(handlers::error_import))
        .route("/checkVersion", post(handlers::check_version))
        // Provisioning
        .route("/initServer", post(handlers::init_server))
        .route("/initCallBack", post(handlers::init_callback))
}

pub fn build_app(state: AppState, cfg: &ServerConfig) -> Router {
    let body_limit = cfg.body_limit_bytes;
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/metrics", get(handlers::metrics))
        .nest("/api/v1/app-center", app_center_routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let user_id = req
                        .headers()
                        .get(handlers::USER_ID_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        user_id = %user_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                        span.record("http.status_code", tracing::field::display(res.status().as_u16()));
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Connects the storage backends and sibling-service clients.
    pub async fn build(self) -> anyhow::Result<AppCenterServer> {
        let catalog = create_catalog(&self.config).await?;
        let stores = create_membership_stores(&self.config.redis).await;
        let state = build_state(&self.config, catalog, stores)?;
        let app = build_app(state, &self.config.server);

        Ok(AppCenterServer {
            addr: self.addr,
            app,
        })
    }
}

async fn create_catalog(cfg: &AppConfig) -> anyhow::Result<DynCatalogStorage> {
    match cfg.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory catalog storage; data is lost on restart");
            Ok(appcenter_db_memory::create_catalog_storage())
        }
        StorageBackend::Postgres => {
            let pg = cfg
                .storage
                .postgres
                .clone()
                .ok_or_else(|| anyhow::anyhow!("storage.postgres is required for the postgres backend"))?;
            let storage: DynCatalogStorage = appcenter_db_postgres::create_storage(pg).await?;
            Ok(storage)
        }
    }
}

/// Wires the catalog service from already created stores.
pub fn build_state(
    cfg: &AppConfig,
    catalog: DynCatalogStorage,
    stores: MembershipStores,
) -> anyhow::Result<AppState> {
    let membership = MembershipService::new(catalog.clone(), stores.cache, stores.lock)
        .with_lock_scope(cfg.membership.lock_scope)
        .with_lock_ttl(cfg.membership.lock_ttl())
        .with_poll_interval(cfg.membership.poll_interval());
    tracing::info!(
        mode = stores.mode,
        backend = catalog.backend_name(),
        lock_scope = ?cfg.membership.lock_scope,
        "Membership synchronizer configured"
    );

    let org: Arc<dyn OrgClient> = Arc::new(HttpOrgClient::new(&cfg.clients.org)?);
    let flow: Arc<dyn FlowClient> = Arc::new(HttpFlowClient::new(&cfg.clients.flow)?);
    let form = Arc::new(HttpFormClient::new(&cfg.clients.form)?);
    let chaos: Arc<dyn ChaosClient> = Arc::new(
        Provisioner::new(Arc::new(HttpChaosClient::new(&cfg.clients.chaos)?))
            .with_executor(Arc::new(FormRoleExecutor::new(form))),
    );

    Ok(AppState::new(AppService::new(
        catalog,
        Arc::new(membership),
        org,
        flow,
        chaos,
        cfg.app.clone(),
    )))
}

pub struct AppCenterServer {
    addr: SocketAddr,
    app: Router,
}

impl AppCenterServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
