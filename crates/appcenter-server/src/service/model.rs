//! Request and response bodies of the catalog operations.
//!
//! Caller identity (`create_by`, `update_by`, `user_id`) is filled in from
//! request headers by the handlers; any value in the body is ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use appcenter_core::{App, AppScope, AppStatus, PageRequest};

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    10
}

/// 1-based paging fields embedded in list requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl From<Paging> for PageRequest {
    fn from(p: Paging) -> Self {
        PageRequest::new(p.page, p.limit)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAppRequest {
    pub app_name: String,
    #[serde(default, rename = "accessURL")]
    pub access_url: String,
    #[serde(default)]
    pub app_icon: String,
    #[serde(default)]
    pub app_sign: String,
    #[serde(default)]
    pub extension: Option<Map<String, Value>>,
    #[serde(default)]
    pub description: String,
    #[serde(skip)]
    pub create_by: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAppRequest {
    pub id: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default, rename = "accessURL")]
    pub access_url: String,
    #[serde(default)]
    pub app_icon: String,
    #[serde(default)]
    pub app_sign: String,
    #[serde(default)]
    pub extension: Option<Map<String, Value>>,
    #[serde(default)]
    pub description: String,
    #[serde(skip)]
    pub update_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub id: String,
    pub use_status: AppStatus,
    #[serde(skip)]
    pub update_by: String,
}

/// Filters of the admin listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAppsRequest {
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub use_status: Option<AppStatus>,
    #[serde(flatten)]
    pub paging: Paging,
}

/// Full application view for administrators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminApp {
    pub id: String,
    pub app_name: String,
    #[serde(rename = "accessURL")]
    pub access_url: String,
    pub app_icon: String,
    pub create_by: String,
    pub update_by: String,
    pub create_time: i64,
    pub update_time: i64,
    pub use_status: AppStatus,
    pub server: i32,
    pub del_flag: i64,
    pub app_sign: String,
    pub extension: Map<String, Value>,
    pub description: String,
    pub per_poly: bool,
}

impl From<App> for AdminApp {
    fn from(app: App) -> Self {
        Self {
            id: app.id,
            app_name: app.app_name,
            access_url: app.access_url,
            app_icon: app.app_icon,
            create_by: app.create_by,
            update_by: app.update_by,
            create_time: app.create_time,
            update_time: app.update_time,
            use_status: app.use_status,
            server: app.server,
            del_flag: app.del_flag.into(),
            app_sign: app.app_sign,
            extension: app.extension,
            description: app.description,
            per_poly: app.per_poly,
        }
    }
}

/// Application view for the home platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserApp {
    pub id: String,
    pub app_name: String,
    #[serde(rename = "accessURL")]
    pub access_url: String,
    pub app_icon: String,
    pub extension: Map<String, Value>,
    pub description: String,
}

impl From<App> for UserApp {
    fn from(app: App) -> Self {
        Self {
            id: app.id,
            app_name: app.app_name,
            access_url: app.access_url,
            app_icon: app.app_icon,
            extension: app.extension,
            description: app.description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedApp {
    pub id: String,
    pub create_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSummary {
    pub id: String,
    pub name: String,
    pub del_flag: i64,
    pub per_poly: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedApp {
    #[serde(rename = "appID")]
    pub app_id: String,
    pub app_name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeList {
    pub list: Vec<AppScope>,
    pub total: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeChange {
    #[serde(rename = "appID")]
    pub app_id: String,
    #[serde(default)]
    pub add: Vec<AppScope>,
    #[serde(default)]
    pub delete: Vec<AppScope>,
}
