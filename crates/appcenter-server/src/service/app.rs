//! Catalog operations: application CRUD, admin listings, visibility scopes,
//! import/export and provisioning hand-off.

use std::sync::Arc;

use appcenter_api::ErrorCode;
use appcenter_core::{
    AdminRelation, App, AppStatus, AppUpdate, DelFlag, Page, PageRequest, generate_id, now_unix,
    unix_after_days, validate_id,
};
use appcenter_storage::{AppFilter, DynCatalogStorage, StorageError, Transaction};

use super::error::ServiceError;
use super::model::{
    AddAppRequest, AdminApp, AppSummary, CreatedApp, ExportedApp, ListAppsRequest, ScopeChange,
    ScopeList, UpdateAppRequest, UpdateStatusRequest, UserApp,
};
use crate::clients::{ChaosClient, FlowClient, InitTask, OrgClient, PRE_DELETE, UserInfo};
use crate::config::AppSettings;
use crate::membership::MembershipService;

/// Days a soft-deleted application is kept before it may be purged.
const PURGE_AFTER_DAYS: i64 = 5;

/// Upper bound on apps fetched for one home-platform listing.
const USER_LIST_FETCH_LIMIT: i64 = 999;

pub type ServiceResult<T> = Result<T, ServiceError>;

pub struct AppService {
    catalog: DynCatalogStorage,
    membership: Arc<MembershipService>,
    org: Arc<dyn OrgClient>,
    flow: Arc<dyn FlowClient>,
    chaos: Arc<dyn ChaosClient>,
    settings: AppSettings,
}

impl AppService {
    pub fn new(
        catalog: DynCatalogStorage,
        membership: Arc<MembershipService>,
        org: Arc<dyn OrgClient>,
        flow: Arc<dyn FlowClient>,
        chaos: Arc<dyn ChaosClient>,
        settings: AppSettings,
    ) -> Self {
        Self {
            catalog,
            membership,
            org,
            flow,
            chaos,
            settings,
        }
    }

    pub fn membership(&self) -> &MembershipService {
        &self.membership
    }

    pub fn catalog(&self) -> &DynCatalogStorage {
        &self.catalog
    }

    // ==================== Admin listings ====================

    /// Apps administered by `user_id`.
    pub async fn admin_page_list(
        &self,
        user_id: &str,
        req: &ListAppsRequest,
    ) -> ServiceResult<Page<AdminApp>> {
        let filter = AppFilter::default()
            .administered_by(user_id)
            .with_name(req.app_name.as_str())
            .with_status(req.use_status);
        let page = self.catalog.list_apps(&filter, req.paging.into()).await?;
        Ok(page.map(AdminApp::from))
    }

    /// Every non-deleted app.
    pub async fn super_admin_page_list(&self, req: &ListAppsRequest) -> ServiceResult<Page<AdminApp>> {
        let filter = AppFilter::default()
            .with_name(req.app_name.as_str())
            .with_status(req.use_status);
        let page = self.catalog.list_apps(&filter, req.paging.into()).await?;
        Ok(page.map(AdminApp::from))
    }

    pub async fn list_by_status(
        &self,
        status: AppStatus,
        page: PageRequest,
    ) -> ServiceResult<Page<AdminApp>> {
        let filter = AppFilter::default().with_status(Some(status));
        let page = self.catalog.list_apps(&filter, page).await?;
        Ok(page.map(AdminApp::from))
    }

    pub async fn get_apps_by_ids(&self, ids: &[String]) -> ServiceResult<Vec<UserApp>> {
        let page = self
            .catalog
            .list_apps_by_ids(ids, PageRequest::new(1, USER_LIST_FETCH_LIMIT))
            .await?;
        Ok(page.data.into_iter().map(UserApp::from).collect())
    }

    /// Full record, including soft-deleted apps.
    pub async fn admin_select_by_id(&self, id: &str) -> ServiceResult<Option<AdminApp>> {
        Ok(self.catalog.find_app(id).await?.map(AdminApp::from))
    }

    pub async fn get_one(&self, id: &str) -> ServiceResult<Option<AppSummary>> {
        Ok(self.catalog.find_app(id).await?.map(|app| AppSummary {
            del_flag: app.del_flag.into(),
            per_poly: app.per_poly,
            id: app.id,
            name: app.app_name,
        }))
    }

    // ==================== Lifecycle ====================

    /// Creates an app with its creator as sole admin, then asks the
    /// provisioning service to set it up.
    ///
    /// The app stays `NotReady` until the init callback arrives. A failed
    /// provisioning call is returned after the app is committed.
    pub async fn add_app(&self, req: AddAppRequest) -> ServiceResult<CreatedApp> {
        let created = self
            .insert_with_creator(&req, AppStatus::NotReady, 0)
            .await?;

        self.chaos
            .init(&[InitTask {
                app_id: created.id.clone(),
                create_by: created.create_by.clone(),
                content: self.settings.init_server_bits,
            }])
            .await?;
        tracing::info!(app_id = %created.id, "app created");
        Ok(created)
    }

    /// Creates the shell of an imported app. No provisioning call is made;
    /// the importer reports the outcome via `finish_import`/`error_import`.
    pub async fn create_import_app(&self, req: AddAppRequest) -> ServiceResult<CreatedApp> {
        let created = self
            .insert_with_creator(&req, AppStatus::Importing, self.settings.init_server_bits)
            .await?;
        tracing::info!(app_id = %created.id, "import app created");
        Ok(created)
    }

    async fn insert_with_creator(
        &self,
        req: &AddAppRequest,
        status: AppStatus,
        server: i32,
    ) -> ServiceResult<CreatedApp> {
        if req.app_name.is_empty() {
            return Err(ServiceError::invalid_request("appName is required"));
        }
        if req.create_by.is_empty() {
            return Err(ServiceError::invalid_request("caller user id is required"));
        }
        self.ensure_name_free(&req.app_name).await?;
        self.ensure_sign_free(&req.app_sign).await?;

        let now = now_unix();
        let app = App {
            id: generate_id(self.settings.id_length),
            app_name: req.app_name.clone(),
            access_url: req.access_url.clone(),
            app_icon: req.app_icon.clone(),
            create_by: req.create_by.clone(),
            update_by: req.create_by.clone(),
            create_time: now,
            update_time: now,
            use_status: status,
            server,
            del_flag: DelFlag::Normal,
            delete_time: None,
            app_sign: req.app_sign.clone(),
            extension: req.extension.clone().unwrap_or_default(),
            description: req.description.clone(),
            per_poly: false,
        };

        let mut tx = self.catalog.begin_transaction().await?;
        let staged = async {
            tx.insert_app(&app).await?;
            tx.insert_relation(&AdminRelation::new(app.id.as_str(), app.create_by.as_str()))
                .await
        }
        .await;
        finish(tx, staged).await?;

        Ok(CreatedApp {
            id: app.id,
            create_by: app.create_by,
        })
    }

    async fn ensure_name_free(&self, name: &str) -> ServiceResult<()> {
        if self.catalog.find_app_by_name(name).await?.is_some() {
            return Err(ServiceError::business(ErrorCode::NameExist));
        }
        Ok(())
    }

    async fn ensure_sign_free(&self, sign: &str) -> ServiceResult<()> {
        if !sign.is_empty() && self.catalog.find_app_by_sign(sign).await?.is_some() {
            return Err(ServiceError::business(ErrorCode::IdentifiesExist));
        }
        Ok(())
    }

    /// Updates descriptive fields. The name changes only when it differs and
    /// is free; the app sign can be set once.
    pub async fn update_app(&self, req: UpdateAppRequest) -> ServiceResult<()> {
        let Some(current) = self.catalog.find_app(&req.id).await? else {
            return Err(ServiceError::business(ErrorCode::InvalidParams));
        };

        let mut update = AppUpdate::new(req.id.as_str())
            .with_access_url(req.access_url.as_str())
            .with_app_icon(req.app_icon.as_str())
            .with_description(req.description.as_str())
            .with_extension(req.extension.unwrap_or_default())
            .touched_by(req.update_by.as_str(), now_unix());

        if !req.app_name.is_empty() && req.app_name != current.app_name {
            self.ensure_name_free(&req.app_name).await?;
            update = update.with_app_name(req.app_name.as_str());
        }
        if current.app_sign.is_empty() && !req.app_sign.is_empty() {
            self.ensure_sign_free(&req.app_sign).await?;
            update = update.with_app_sign(req.app_sign.as_str());
        }

        let mut tx = self.catalog.begin_transaction().await?;
        let staged = tx.update_app(&update).await;
        finish(tx, staged).await
    }

    pub async fn update_status(&self, req: UpdateStatusRequest) -> ServiceResult<()> {
        self.set_status(&req.id, req.use_status, &req.update_by).await
    }

    async fn set_status(&self, id: &str, status: AppStatus, update_by: &str) -> ServiceResult<()> {
        let update = AppUpdate::new(id)
            .with_status(status)
            .touched_by(update_by, now_unix());
        self.catalog.update_app(&update).await?;
        tracing::info!(app_id = id, status = status.code(), "app status changed");
        Ok(())
    }

    pub async fn change_per_poly(&self, id: &str, per_poly: bool) -> ServiceResult<()> {
        Ok(self.catalog.set_per_poly(id, per_poly).await?)
    }

    /// Soft-deletes an app: marks it for purge, stops its flows, clears its
    /// admins and drops its scopes. Stops at the first failure.
    pub async fn delete_app(&self, id: &str) -> ServiceResult<()> {
        self.catalog
            .mark_app_deleted(id, unix_after_days(PURGE_AFTER_DAYS))
            .await?;

        if let Err(err) = self.flow.remove_app(id, PRE_DELETE).await {
            tracing::error!(app_id = id, error = %err, "failed to remove app flows");
            return Err(err.into());
        }

        if let Err(err) = self.membership.grant_admins(id, &[]).await {
            tracing::error!(app_id = id, error = %err, "failed to clear app admins");
            return Err(err.into());
        }

        if let Err(err) = self.catalog.delete_scopes_by_app(id).await {
            tracing::error!(app_id = id, error = %err, "failed to remove app scopes");
            return Err(err.into());
        }
        tracing::info!(app_id = id, "app deleted");
        Ok(())
    }

    // ==================== Admins ====================

    pub async fn grant_admins(&self, app_id: &str, user_ids: &[String]) -> ServiceResult<()> {
        validate_admin_change(app_id, user_ids)?;
        Ok(self.membership.grant_admins(app_id, user_ids).await?)
    }

    pub async fn revoke_admins(&self, app_id: &str, user_ids: &[String]) -> ServiceResult<()> {
        validate_admin_change(app_id, user_ids)?;
        Ok(self.membership.revoke_admins(app_id, user_ids).await?)
    }

    pub async fn check_is_admin(
        &self,
        app_id: &str,
        user_id: &str,
        is_superuser: bool,
    ) -> ServiceResult<bool> {
        Ok(self.membership.is_admin(app_id, user_id, is_superuser).await?)
    }

    /// Admins of `app_id`, resolved through the organization directory.
    pub async fn admin_users(&self, app_id: &str, page: PageRequest) -> ServiceResult<Page<UserInfo>> {
        let relations = self.membership.admin_users(app_id, page).await?;
        if relations.data.is_empty() {
            return Ok(Page::new(Vec::new(), relations.total_count));
        }
        let ids: Vec<String> = relations.data.into_iter().map(|r| r.user_id).collect();
        let users = self.org.users_by_ids(&ids).await?;
        Ok(Page::new(users, relations.total_count))
    }

    // ==================== Home platform ====================

    /// Released apps visible to the user or their department.
    ///
    /// Without a department the user's primary one is looked up; if that
    /// lookup fails the page is empty.
    pub async fn user_page_list(
        &self,
        user_id: &str,
        dep_id: &str,
        page: PageRequest,
    ) -> ServiceResult<Page<UserApp>> {
        let dep_id = if dep_id.is_empty() {
            match self.org.user_info(user_id).await {
                Ok(info) => info
                    .primary_department()
                    .map(|d| d.id.clone())
                    .unwrap_or_default(),
                Err(err) => {
                    tracing::error!(user_id, error = %err, "failed to get user info");
                    return Ok(Page::empty());
                }
            }
        } else {
            dep_id.to_string()
        };

        let ids = self.catalog.app_ids_in_scope(user_id, &dep_id).await?;
        if ids.is_empty() {
            return Ok(Page::empty());
        }
        let visible = self
            .catalog
            .list_apps_by_ids(&ids, PageRequest::new(1, USER_LIST_FETCH_LIMIT))
            .await?;
        let released: Vec<UserApp> = visible
            .data
            .into_iter()
            .filter(|app| app.use_status == AppStatus::Released)
            .map(UserApp::from)
            .collect();
        Ok(Page::new(page.slice(&released), released.len() as i64))
    }

    // ==================== Scopes ====================

    /// Adds and removes scope rows in one transaction.
    pub async fn add_app_scope(&self, change: &ScopeChange) -> ServiceResult<()> {
        let mut tx = self.catalog.begin_transaction().await?;
        let staged = async {
            if !change.add.is_empty() {
                tx.add_scopes(&change.app_id, &change.add).await?;
            }
            if !change.delete.is_empty() {
                tx.delete_scopes(&change.app_id, &change.delete).await?;
            }
            Ok::<(), StorageError>(())
        }
        .await;
        finish(tx, staged).await
    }

    pub async fn home_access_list(&self, app_id: &str, page: PageRequest) -> ServiceResult<ScopeList> {
        let scopes = self.catalog.list_scopes(app_id, page).await?;
        Ok(ScopeList {
            list: scopes.data,
            total: scopes.total_count,
        })
    }

    /// Whether the user or department may open the app. Missing and deleted
    /// apps grant no access.
    pub async fn check_app_access(
        &self,
        app_id: &str,
        user_id: &str,
        dep_id: &str,
    ) -> ServiceResult<bool> {
        match self.catalog.find_app(app_id).await? {
            Some(app) if !app.is_deleted() => {}
            _ => return Ok(false),
        }
        let count = self
            .catalog
            .count_scope_access(app_id, user_id, dep_id)
            .await?;
        Ok(count > 0)
    }

    // ==================== Import / export ====================

    pub async fn export_app(&self, id: &str) -> ServiceResult<ExportedApp> {
        let app = self
            .catalog
            .find_app(id)
            .await?
            .ok_or(ServiceError::Business(ErrorCode::InvalidUri))?;
        Ok(ExportedApp {
            app_id: app.id,
            app_name: app.app_name,
            version: self.settings.compatible_version.clone(),
        })
    }

    pub async fn finish_import(&self, id: &str, update_by: &str) -> ServiceResult<()> {
        self.set_status(id, AppStatus::Unreleased, update_by).await
    }

    pub async fn error_import(&self, id: &str, update_by: &str) -> ServiceResult<()> {
        self.set_status(id, AppStatus::ImportError, update_by).await
    }

    pub fn check_import_version(&self, version: &str) -> ServiceResult<()> {
        if version != self.settings.compatible_version {
            return Err(ServiceError::business(ErrorCode::ErrVersion));
        }
        Ok(())
    }

    // ==================== Provisioning ====================

    pub async fn init_server(&self, id: &str, create_by: &str) -> ServiceResult<()> {
        self.chaos
            .init(&[InitTask {
                app_id: id.to_string(),
                create_by: create_by.to_string(),
                content: self.settings.init_server_bits,
            }])
            .await?;
        Ok(())
    }

    /// Records the provisioning outcome: `ret` is the bitmask of services set up.
    pub async fn init_callback(
        &self,
        id: &str,
        succeeded: bool,
        ret: i32,
        update_by: &str,
    ) -> ServiceResult<()> {
        let status = if succeeded {
            AppStatus::Unreleased
        } else {
            AppStatus::InitializeError
        };
        let update = AppUpdate::new(id)
            .with_status(status)
            .with_server(ret)
            .touched_by(update_by, now_unix());
        self.catalog.update_app(&update).await?;
        tracing::info!(app_id = id, succeeded, server = ret, "provisioning reported");
        Ok(())
    }
}

/// Commits `tx` if every staged write succeeded, otherwise rolls it back.
fn validate_admin_change(app_id: &str, user_ids: &[String]) -> ServiceResult<()> {
    validate_id(app_id)?;
    user_ids.iter().try_for_each(|id| validate_id(id))?;
    Ok(())
}

async fn finish(tx: Box<dyn Transaction>, staged: Result<(), StorageError>) -> ServiceResult<()> {
    match staged {
        Ok(()) => Ok(tx.commit().await?),
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            Err(err.into())
        }
    }
}
