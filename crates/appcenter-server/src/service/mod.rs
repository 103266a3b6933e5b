//! Catalog service layer shared by the HTTP handlers.

pub mod app;
pub mod error;
pub mod model;

pub use app::{AppService, ServiceResult};
pub use error::ServiceError;
pub use model::{
    AddAppRequest, AdminApp, AppSummary, CreatedApp, ExportedApp, ListAppsRequest, Paging,
    ScopeChange, ScopeList, UpdateAppRequest, UpdateStatusRequest, UserApp,
};
