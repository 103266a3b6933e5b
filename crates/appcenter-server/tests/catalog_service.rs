use std::sync::{Arc, Mutex};

use appcenter_api::ErrorCode;
use appcenter_core::{AppScope, AppStatus, DelFlag, PageRequest};
use appcenter_db_memory::{InMemoryCacheStore, InMemoryLockStore, InMemoryStorage};
use appcenter_server::clients::{
    ChaosClient, ClientError, Department, FlowClient, InitTask, OrgClient, UserInfo,
};
use appcenter_server::config::AppSettings;
use appcenter_server::membership::{MembershipService, cache_key};
use appcenter_server::service::{
    AddAppRequest, AppService, ListAppsRequest, ScopeChange, ServiceError, UpdateAppRequest,
    UpdateStatusRequest,
};
use appcenter_storage::CatalogStorage;
use async_trait::async_trait;

#[derive(Default)]
struct StubOrg {
    departments: Vec<(String, String)>,
    fail: bool,
}

#[async_trait]
impl OrgClient for StubOrg {
    async fn user_info(&self, user_id: &str) -> Result<UserInfo, ClientError> {
        if self.fail {
            return Err(ClientError::Network {
                service: "org",
                message: "down".into(),
            });
        }
        let dep = self
            .departments
            .iter()
            .filter(|(user, _)| user == user_id)
            .map(|(_, dep)| {
                vec![Department {
                    id: dep.clone(),
                    department_name: String::new(),
                }]
            })
            .collect();
        Ok(UserInfo {
            id: user_id.to_string(),
            dep,
            ..Default::default()
        })
    }

    async fn users_by_ids(&self, ids: &[String]) -> Result<Vec<UserInfo>, ClientError> {
        Ok(ids
            .iter()
            .map(|id| UserInfo {
                id: id.clone(),
                user_name: format!("name-{id}"),
                ..Default::default()
            })
            .collect())
    }
}

#[derive(Default)]
struct RecordingFlow {
    removed: Mutex<Vec<(String, String)>>,
    fail: bool,
}

#[async_trait]
impl FlowClient for RecordingFlow {
    async fn remove_app(&self, app_id: &str, action: &str) -> Result<(), ClientError> {
        if self.fail {
            return Err(ClientError::Http {
                service: "flow",
                status: 502,
            });
        }
        if let Ok(mut removed) = self.removed.lock() {
            removed.push((app_id.to_string(), action.to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct RecordingChaos {
    tasks: Mutex<Vec<InitTask>>,
    fail: bool,
}

#[async_trait]
impl ChaosClient for RecordingChaos {
    async fn init(&self, tasks: &[InitTask]) -> Result<(), ClientError> {
        if self.fail {
            return Err(ClientError::Http {
                service: "chaos",
                status: 500,
            });
        }
        if let Ok(mut seen) = self.tasks.lock() {
            seen.extend_from_slice(tasks);
        }
        Ok(())
    }
}

struct Fixture {
    catalog: Arc<InMemoryStorage>,
    cache: Arc<InMemoryCacheStore>,
    flow: Arc<RecordingFlow>,
    chaos: Arc<RecordingChaos>,
    service: AppService,
}

fn settings() -> AppSettings {
    AppSettings {
        init_server_bits: 7,
        compatible_version: "v1.0.0".into(),
        id_length: 5,
    }
}

fn fixture_with(org: StubOrg, flow: RecordingFlow, chaos: RecordingChaos) -> Fixture {
    let catalog = Arc::new(InMemoryStorage::new());
    let cache = Arc::new(InMemoryCacheStore::new());
    let lock = Arc::new(InMemoryLockStore::new());
    let membership = MembershipService::new(catalog.clone(), cache.clone(), lock);
    let flow = Arc::new(flow);
    let chaos = Arc::new(chaos);
    let service = AppService::new(
        catalog.clone(),
        Arc::new(membership),
        Arc::new(org),
        flow.clone(),
        chaos.clone(),
        settings(),
    );
    Fixture {
        catalog,
        cache,
        flow,
        chaos,
        service,
    }
}

fn fixture() -> Fixture {
    fixture_with(
        StubOrg::default(),
        RecordingFlow::default(),
        RecordingChaos::default(),
    )
}

fn add_request(name: &str, creator: &str) -> AddAppRequest {
    AddAppRequest {
        app_name: name.to_string(),
        create_by: creator.to_string(),
        ..Default::default()
    }
}

fn business_code(err: ServiceError) -> ErrorCode {
    match err {
        ServiceError::Business(code) => code,
        other => panic!("expected business error, got {other:?}"),
    }
}

#[tokio::test]
async fn add_app_creates_not_ready_app_with_creator_admin() {
    let f = fixture();

    let created = f.service.add_app(add_request("crm", "u1")).await.unwrap();

    assert_eq!(created.id.len(), 5);
    assert_eq!(created.create_by, "u1");
    let app = f.catalog.find_app(&created.id).await.unwrap().unwrap();
    assert_eq!(app.use_status, AppStatus::NotReady);
    assert_eq!(app.server, 0);
    assert_eq!(
        f.catalog.admin_user_ids(&created.id).await.unwrap(),
        vec!["u1".to_string()]
    );

    let tasks = f.chaos.tasks.lock().unwrap().clone();
    assert_eq!(
        tasks,
        vec![InitTask {
            app_id: created.id.clone(),
            create_by: "u1".into(),
            content: 7,
        }]
    );
}

#[tokio::test]
async fn add_app_rejects_duplicate_name_and_sign() {
    let f = fixture();
    let mut first = add_request("crm", "u1");
    first.app_sign = "crm-sign".into();
    f.service.add_app(first).await.unwrap();

    let err = f.service.add_app(add_request("crm", "u2")).await.unwrap_err();
    assert_eq!(business_code(err), ErrorCode::NameExist);

    let mut same_sign = add_request("erp", "u2");
    same_sign.app_sign = "crm-sign".into();
    let err = f.service.add_app(same_sign).await.unwrap_err();
    assert_eq!(business_code(err), ErrorCode::IdentifiesExist);
}

#[tokio::test]
async fn add_app_surfaces_provisioning_failure_after_commit() {
    let f = fixture_with(
        StubOrg::default(),
        RecordingFlow::default(),
        RecordingChaos {
            fail: true,
            ..Default::default()
        },
    );

    let err = f.service.add_app(add_request("crm", "u1")).await.unwrap_err();
    assert!(matches!(err, ServiceError::Client(_)));

    let app = f.catalog.find_app_by_name("crm").await.unwrap().unwrap();
    assert_eq!(app.use_status, AppStatus::NotReady);
}

#[tokio::test]
async fn update_app_renames_and_sets_sign_once() {
    let f = fixture();
    let created = f.service.add_app(add_request("crm", "u1")).await.unwrap();
    f.service.add_app(add_request("erp", "u1")).await.unwrap();

    let err = f
        .service
        .update_app(UpdateAppRequest {
            id: created.id.clone(),
            app_name: "erp".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(business_code(err), ErrorCode::NameExist);

    f.service
        .update_app(UpdateAppRequest {
            id: created.id.clone(),
            app_name: "crm2".into(),
            app_sign: "first".into(),
            description: "customers".into(),
            update_by: "u2".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    f.service
        .update_app(UpdateAppRequest {
            id: created.id.clone(),
            app_sign: "second".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let app = f.catalog.find_app(&created.id).await.unwrap().unwrap();
    assert_eq!(app.app_name, "crm2");
    assert_eq!(app.app_sign, "first");
}

#[tokio::test]
async fn update_unknown_app_is_invalid_params() {
    let f = fixture();
    let err = f
        .service
        .update_app(UpdateAppRequest {
            id: "nope".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(business_code(err), ErrorCode::InvalidParams);
}

#[tokio::test]
async fn delete_app_cleans_up_everywhere() {
    let f = fixture();
    let created = f.service.add_app(add_request("crm", "u1")).await.unwrap();
    f.service
        .grant_admins(&created.id, &["u1".to_string(), "u2".to_string()])
        .await
        .unwrap();
    f.service
        .add_app_scope(&ScopeChange {
            app_id: created.id.clone(),
            add: vec![AppScope::user("u3")],
            delete: Vec::new(),
        })
        .await
        .unwrap();

    f.service.delete_app(&created.id).await.unwrap();

    let app = f.catalog.find_app(&created.id).await.unwrap().unwrap();
    assert_eq!(app.del_flag, DelFlag::Deleted);
    assert!(app.delete_time.is_some());
    assert_eq!(
        f.flow.removed.lock().unwrap().clone(),
        vec![(created.id.clone(), "preDelete".to_string())]
    );
    assert!(f.catalog.admin_user_ids(&created.id).await.unwrap().is_empty());
    assert!(!f.cache.contains_key(&cache_key(&created.id)));
    let scopes = f
        .service
        .home_access_list(&created.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(scopes.total, 0);
    assert!(!f.service.check_is_admin(&created.id, "u1", false).await.unwrap());
}

#[tokio::test]
async fn delete_app_stops_on_flow_failure() {
    let f = fixture_with(
        StubOrg::default(),
        RecordingFlow {
            fail: true,
            ..Default::default()
        },
        RecordingChaos::default(),
    );
    let created = f.service.add_app(add_request("crm", "u1")).await.unwrap();

    let err = f.service.delete_app(&created.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Client(_)));
    // Admins are untouched when the workflow engine refuses
    assert_eq!(
        f.catalog.admin_user_ids(&created.id).await.unwrap(),
        vec!["u1".to_string()]
    );
}

#[tokio::test]
async fn admin_lists_filter_by_admin_and_status() {
    let f = fixture();
    let crm = f.service.add_app(add_request("crm", "u1")).await.unwrap();
    f.service.add_app(add_request("erp", "u2")).await.unwrap();
    f.service
        .update_status(UpdateStatusRequest {
            id: crm.id.clone(),
            use_status: AppStatus::Released,
            update_by: "u1".into(),
        })
        .await
        .unwrap();

    let mine = f
        .service
        .admin_page_list("u1", &ListAppsRequest::default())
        .await
        .unwrap();
    assert_eq!(mine.total_count, 1);
    assert_eq!(mine.data[0].id, crm.id);

    let all = f
        .service
        .super_admin_page_list(&ListAppsRequest::default())
        .await
        .unwrap();
    assert_eq!(all.total_count, 2);

    let released = f
        .service
        .list_by_status(AppStatus::Released, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(released.total_count, 1);
}

#[tokio::test]
async fn user_page_list_resolves_department_and_keeps_released_apps() {
    let f = fixture_with(
        StubOrg {
            departments: vec![("u9".into(), "d1".into())],
            fail: false,
        },
        RecordingFlow::default(),
        RecordingChaos::default(),
    );
    let released = f.service.add_app(add_request("crm", "u1")).await.unwrap();
    let hidden = f.service.add_app(add_request("erp", "u1")).await.unwrap();
    f.service
        .update_status(UpdateStatusRequest {
            id: released.id.clone(),
            use_status: AppStatus::Released,
            update_by: "u1".into(),
        })
        .await
        .unwrap();
    for id in [&released.id, &hidden.id] {
        f.service
            .add_app_scope(&ScopeChange {
                app_id: id.clone(),
                add: vec![AppScope::department("d1")],
                delete: Vec::new(),
            })
            .await
            .unwrap();
    }

    let page = f
        .service
        .user_page_list("u9", "", PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.data[0].id, released.id);
}

#[tokio::test]
async fn user_page_list_is_empty_when_org_lookup_fails() {
    let f = fixture_with(
        StubOrg {
            departments: Vec::new(),
            fail: true,
        },
        RecordingFlow::default(),
        RecordingChaos::default(),
    );
    let page = f
        .service
        .user_page_list("u9", "", PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total_count, 0);
    assert!(page.data.is_empty());
}

#[tokio::test]
async fn check_app_access_honours_scope_and_deletion() {
    let f = fixture();
    let created = f.service.add_app(add_request("crm", "u1")).await.unwrap();
    f.service
        .add_app_scope(&ScopeChange {
            app_id: created.id.clone(),
            add: vec![AppScope::user("u2"), AppScope::department("d1")],
            delete: Vec::new(),
        })
        .await
        .unwrap();

    assert!(f.service.check_app_access(&created.id, "u2", "").await.unwrap());
    assert!(f.service.check_app_access(&created.id, "x", "d1").await.unwrap());
    assert!(!f.service.check_app_access(&created.id, "x", "d2").await.unwrap());
    assert!(!f.service.check_app_access("missing", "u2", "").await.unwrap());

    f.service
        .add_app_scope(&ScopeChange {
            app_id: created.id.clone(),
            add: Vec::new(),
            delete: vec![AppScope::user("u2")],
        })
        .await
        .unwrap();
    assert!(!f.service.check_app_access(&created.id, "u2", "").await.unwrap());
}

#[tokio::test]
async fn admin_users_are_resolved_through_org() {
    let f = fixture();
    let created = f.service.add_app(add_request("crm", "u1")).await.unwrap();

    let page = f
        .service
        .admin_users(&created.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.data[0].user_name, "name-u1");
}

#[tokio::test]
async fn import_lifecycle() {
    let f = fixture();
    let created = f
        .service
        .create_import_app(add_request("crm", "u1"))
        .await
        .unwrap();
    let app = f.catalog.find_app(&created.id).await.unwrap().unwrap();
    assert_eq!(app.use_status, AppStatus::Importing);
    assert_eq!(app.server, 7);
    assert!(f.chaos.tasks.lock().unwrap().is_empty());

    f.service.finish_import(&created.id, "u1").await.unwrap();
    let app = f.catalog.find_app(&created.id).await.unwrap().unwrap();
    assert_eq!(app.use_status, AppStatus::Unreleased);

    f.service.error_import(&created.id, "u1").await.unwrap();
    let app = f.catalog.find_app(&created.id).await.unwrap().unwrap();
    assert_eq!(app.use_status, AppStatus::ImportError);

    let exported = f.service.export_app(&created.id).await.unwrap();
    assert_eq!(exported.app_name, "crm");
    assert_eq!(exported.version, "v1.0.0");

    assert!(f.service.check_import_version("v1.0.0").is_ok());
    let err = f.service.check_import_version("v0.9.0").unwrap_err();
    assert_eq!(business_code(err), ErrorCode::ErrVersion);

    let err = f.service.export_app("missing").await.unwrap_err();
    assert_eq!(business_code(err), ErrorCode::InvalidUri);
}

#[tokio::test]
async fn init_callback_records_outcome() {
    let f = fixture();
    let created = f.service.add_app(add_request("crm", "u1")).await.unwrap();

    f.service
        .init_callback(&created.id, false, 3, "chaos")
        .await
        .unwrap();
    let app = f.catalog.find_app(&created.id).await.unwrap().unwrap();
    assert_eq!(app.use_status, AppStatus::InitializeError);
    assert_eq!(app.server, 3);

    f.service.init_server(&created.id, "u1").await.unwrap();
    f.service
        .init_callback(&created.id, true, 7, "chaos")
        .await
        .unwrap();
    let app = f.catalog.find_app(&created.id).await.unwrap().unwrap();
    assert_eq!(app.use_status, AppStatus::Unreleased);
    assert_eq!(app.server, 7);
    assert_eq!(f.chaos.tasks.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn get_one_and_per_poly() {
    let f = fixture();
    let created = f.service.add_app(add_request("crm", "u1")).await.unwrap();
    f.service.change_per_poly(&created.id, true).await.unwrap();

    let summary = f.service.get_one(&created.id).await.unwrap().unwrap();
    assert_eq!(summary.name, "crm");
    assert!(summary.per_poly);
    assert_eq!(summary.del_flag, 0);
    assert!(f.service.get_one("missing").await.unwrap().is_none());

    let apps = f
        .service
        .get_apps_by_ids(&[created.id.clone(), "missing".into()])
        .await
        .unwrap();
    assert_eq!(apps.len(), 1);
}

#[tokio::test]
async fn admin_changes_reject_malformed_ids_before_any_write() {
    let f = fixture();
    let created = f.service.add_app(add_request("crm", "u1")).await.unwrap();

    let err = f
        .service
        .grant_admins(&created.id, &["u2".to_string(), "bad id".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidRequest(_)), "{err:?}");

    let err = f
        .service
        .revoke_admins("", &["u1".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidRequest(_)), "{err:?}");

    assert_eq!(
        f.catalog.admin_user_ids(&created.id).await.unwrap(),
        vec!["u1".to_string()]
    );
}
