use std::convert::Infallible;

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Request, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::IntoResponse,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use appcenter_api::{ApiError, ApiResponse, ApiResult, ErrorCode};
use appcenter_core::{AppStatus, Page, PageRequest};

use crate::clients::UserInfo;
use crate::server::AppState;
use crate::service::{
    AddAppRequest, AdminApp, AppSummary, CreatedApp, ExportedApp, ListAppsRequest, Paging,
    ScopeChange, ScopeList, UpdateAppRequest, UpdateStatusRequest, UserApp,
};

pub const USER_ID_HEADER: &str = "user-id";
pub const DEPARTMENT_ID_HEADER: &str = "department-id";

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn readyz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ready" }))
}

pub async fn metrics() -> impl IntoResponse {
    match crate::metrics::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "metrics recorder not installed".to_string(),
        ),
    }
}

// ---- Extractors ----

/// Identity of the caller as forwarded by the gateway.
///
/// Missing headers yield empty strings; operations that need an identity
/// reject them themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub dep_id: String,
}

impl Caller {
    fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        Self {
            user_id: read(USER_ID_HEADER),
            dep_id: read(DEPARTMENT_ID_HEADER),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

/// JSON body whose rejections are reported in the response envelope.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        Ok(Self(value))
    }
}

// ---- Request bodies ----

#[derive(Debug, Deserialize)]
pub struct IdBody {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminChangeBody {
    #[serde(rename = "appID")]
    pub app_id: String,
    #[serde(default, rename = "userIDs")]
    pub user_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AppPageBody {
    #[serde(rename = "appID")]
    pub app_id: String,
    #[serde(flatten)]
    pub paging: Paging,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusListBody {
    pub use_status: AppStatus,
    #[serde(flatten)]
    pub paging: Paging,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerPolyBody {
    pub id: String,
    pub per_poly: bool,
}

#[derive(Debug, Deserialize)]
pub struct IdsBody {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckIsAdminBody {
    #[serde(rename = "appID")]
    pub app_id: String,
    #[serde(default, rename = "userID")]
    pub user_id: String,
    #[serde(default)]
    pub is_super: bool,
}

#[derive(Debug, Deserialize)]
pub struct CheckAppAccessBody {
    #[serde(rename = "appID")]
    pub app_id: String,
    #[serde(default, rename = "userID")]
    pub user_id: String,
    #[serde(default, rename = "depID")]
    pub dep_id: String,
}

#[derive(Debug, Deserialize)]
pub struct VersionBody {
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct InitCallbackBody {
    pub id: String,
    pub status: bool,
    #[serde(default)]
    pub ret: i32,
}

// ---- Response bodies ----

#[derive(Debug, Serialize)]
pub struct AppsBody {
    pub apps: Vec<UserApp>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IsAdminBody {
    pub is_admin: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessBody {
    pub is_authority: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct Empty {}

fn or_invalid_uri<T>(value: Option<T>) -> Result<T, ApiError> {
    value.ok_or(ApiError::business(ErrorCode::InvalidUri))
}

fn require_caller(caller: &Caller) -> Result<(), ApiError> {
    if caller.user_id.is_empty() {
        return Err(ApiError::bad_request("missing User-Id header"));
    }
    Ok(())
}

// ---- Admin ----

pub async fn add_app(
    State(state): State<AppState>,
    caller: Caller,
    JsonBody(mut body): JsonBody<AddAppRequest>,
) -> ApiResult<CreatedApp> {
    require_caller(&caller)?;
    body.create_by = caller.user_id;
    Ok(ApiResponse::ok(state.service.add_app(body).await?))
}

pub async fn update_app(
    State(state): State<AppState>,
    caller: Caller,
    JsonBody(mut body): JsonBody<UpdateAppRequest>,
) -> ApiResult<Empty> {
    body.update_by = caller.user_id;
    state.service.update_app(body).await?;
    Ok(ApiResponse::ok(Empty::default()))
}

pub async fn update_status(
    State(state): State<AppState>,
    caller: Caller,
    JsonBody(mut body): JsonBody<UpdateStatusRequest>,
) -> ApiResult<Empty> {
    body.update_by = caller.user_id;
    state.service.update_status(body).await?;
    Ok(ApiResponse::ok(Empty::default()))
}

pub async fn delete_app(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<IdBody>,
) -> ApiResult<Empty> {
    state.service.delete_app(&body.id).await?;
    Ok(ApiResponse::ok(Empty::default()))
}

pub async fn admin_select_by_id(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<IdBody>,
) -> ApiResult<AdminApp> {
    let app = or_invalid_uri(state.service.admin_select_by_id(&body.id).await?)?;
    Ok(ApiResponse::ok(app))
}

pub async fn get_one(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<IdBody>,
) -> ApiResult<AppSummary> {
    let summary = or_invalid_uri(state.service.get_one(&body.id).await?)?;
    Ok(ApiResponse::ok(summary))
}

pub async fn admin_page_list(
    State(state): State<AppState>,
    caller: Caller,
    JsonBody(body): JsonBody<ListAppsRequest>,
) -> ApiResult<Page<AdminApp>> {
    require_caller(&caller)?;
    Ok(ApiResponse::ok(
        state.service.admin_page_list(&caller.user_id, &body).await?,
    ))
}

pub async fn super_admin_page_list(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ListAppsRequest>,
) -> ApiResult<Page<AdminApp>> {
    Ok(ApiResponse::ok(state.service.super_admin_page_list(&body).await?))
}

pub async fn add_admin(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<AdminChangeBody>,
) -> ApiResult<Empty> {
    state.service.grant_admins(&body.app_id, &body.user_ids).await?;
    Ok(ApiResponse::ok(Empty::default()))
}

pub async fn del_admin(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<AdminChangeBody>,
) -> ApiResult<Empty> {
    state.service.revoke_admins(&body.app_id, &body.user_ids).await?;
    Ok(ApiResponse::ok(Empty::default()))
}

pub async fn admin_users(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<AppPageBody>,
) -> ApiResult<Page<UserInfo>> {
    Ok(ApiResponse::ok(
        state
            .service
            .admin_users(&body.app_id, body.paging.into())
            .await?,
    ))
}

pub async fn list_by_status(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<StatusListBody>,
) -> ApiResult<Page<AdminApp>> {
    Ok(ApiResponse::ok(
        state
            .service
            .list_by_status(body.use_status, body.paging.into())
            .await?,
    ))
}

pub async fn change_per_poly(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<PerPolyBody>,
) -> ApiResult<Empty> {
    state.service.change_per_poly(&body.id, body.per_poly).await?;
    Ok(ApiResponse::ok(Empty::default()))
}

// ---- Home platform ----

pub async fn user_page_list(
    State(state): State<AppState>,
    caller: Caller,
    JsonBody(body): JsonBody<Paging>,
) -> ApiResult<Page<UserApp>> {
    require_caller(&caller)?;
    let page: PageRequest = body.into();
    Ok(ApiResponse::ok(
        state
            .service
            .user_page_list(&caller.user_id, &caller.dep_id, page)
            .await?,
    ))
}

pub async fn get_apps_by_ids(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<IdsBody>,
) -> ApiResult<AppsBody> {
    let apps = state.service.get_apps_by_ids(&body.ids).await?;
    Ok(ApiResponse::ok(AppsBody { apps }))
}

// ---- Checks ----

pub async fn check_is_admin(
    State(state): State<AppState>,
    caller: Caller,
    JsonBody(body): JsonBody<CheckIsAdminBody>,
) -> ApiResult<IsAdminBody> {
    let user_id = if body.user_id.is_empty() {
        caller.user_id
    } else {
        body.user_id
    };
    let is_admin = state
        .service
        .check_is_admin(&body.app_id, &user_id, body.is_super)
        .await?;
    Ok(ApiResponse::ok(IsAdminBody { is_admin }))
}

pub async fn check_app_access(
    State(state): State<AppState>,
    caller: Caller,
    JsonBody(body): JsonBody<CheckAppAccessBody>,
) -> ApiResult<AccessBody> {
    let user_id = if body.user_id.is_empty() {
        caller.user_id
    } else {
        body.user_id
    };
    let dep_id = if body.dep_id.is_empty() {
        caller.dep_id
    } else {
        body.dep_id
    };
    let is_authority = state
        .service
        .check_app_access(&body.app_id, &user_id, &dep_id)
        .await?;
    Ok(ApiResponse::ok(AccessBody { is_authority }))
}

// ---- Scopes ----

pub async fn add_app_scope(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ScopeChange>,
) -> ApiResult<Empty> {
    state.service.add_app_scope(&body).await?;
    Ok(ApiResponse::ok(Empty::default()))
}

pub async fn home_access_list(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<AppPageBody>,
) -> ApiResult<ScopeList> {
    Ok(ApiResponse::ok(
        state
            .service
            .home_access_list(&body.app_id, body.paging.into())
            .await?,
    ))
}

// ---- Import / export ----

pub async fn export_app(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<IdBody>,
) -> ApiResult<ExportedApp> {
    Ok(ApiResponse::ok(state.service.export_app(&body.id).await?))
}

pub async fn import_app(
    State(state): State<AppState>,
    caller: Caller,
    JsonBody(mut body): JsonBody<AddAppRequest>,
) -> ApiResult<CreatedApp> {
    require_caller(&caller)?;
    body.create_by = caller.user_id;
    Ok(ApiResponse::ok(state.service.create_import_app(body).await?))
}

pub async fn finish_import(
    State(state): State<AppState>,
    caller: Caller,
    JsonBody(body): JsonBody<IdBody>,
) -> ApiResult<Empty> {
    state
        .service
        .finish_import(&body.id, &caller.user_id)
        .await?;
    Ok(ApiResponse::ok(Empty::default()))
}

pub async fn error_import(
    State(state): State<AppState>,
    caller: Caller,
    JsonBody(body): JsonBody<IdBody>,
) -> ApiResult<Empty> {
    state.service.error_import(&body.id, &caller.user_id).await?;
    Ok(ApiResponse::ok(Empty::default()))
}

pub async fn check_version(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<VersionBody>,
) -> ApiResult<Empty> {
    state.service.check_import_version(&body.version)?;
    Ok(ApiResponse::ok(Empty::default()))
}

// ---- Provisioning ----

pub async fn init_server(
    State(state): State<AppState>,
    caller: Caller,
    JsonBody(body): JsonBody<IdBody>,
) -> ApiResult<Empty> {
    state.service.init_server(&body.id, &caller.user_id).await?;
    Ok(ApiResponse::ok(Empty::default()))
}

pub async fn init_callback(
    State(state): State<AppState>,
    caller: Caller,
    JsonBody(body): JsonBody<InitCallbackBody>,
) -> ApiResult<Empty> {
    state
        .service
        .init_callback(&body.id, body.status, body.ret, &caller.user_id)
        .await?;
    Ok(ApiResponse::ok(Empty::default()))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn caller_reads_identity_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("u1"));
        headers.insert(DEPARTMENT_ID_HEADER, HeaderValue::from_static("d1"));

        let caller = Caller::from_headers(&headers);
        assert_eq!(caller.user_id, "u1");
        assert_eq!(caller.dep_id, "d1");
    }

    #[test]
    fn caller_defaults_to_empty() {
        assert_eq!(Caller::from_headers(&HeaderMap::new()), Caller::default());
    }

    #[test]
    fn admin_change_without_users_is_empty_list() {
        let body: AdminChangeBody = serde_json::from_str(r#"{"appID": "a1"}"#).unwrap();
        assert!(body.user_ids.is_empty());
    }
}
