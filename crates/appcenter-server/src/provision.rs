//! In-process provisioning of new applications.
//!
//! An [`InitTask`] carries a bitmask of sibling services to set up. Each
//! [`InitExecutor`] owns one bit. [`Provisioner`] runs the executors whose bit
//! is set, in registration order, and forwards the remaining bits to the
//! remote provisioning service.

use std::sync::Arc;

use async_trait::async_trait;

use crate::clients::{ChaosClient, ClientError, FormClient, InitTask, RoleMember, RoleSpec};

/// Bit of the form engine API roles.
pub const FORM_API_BIT: i32 = 1;

/// Default API role granted to the creator of a new application.
pub const DEFAULT_ROLE_NAME: &str = "全部权限";
pub const DEFAULT_ROLE_DESCRIPTION: &str = "系统默认角色";

#[async_trait]
pub trait InitExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    fn bit(&self) -> i32;

    async fn exec(&self, task: &InitTask) -> Result<(), ClientError>;
}

/// Creates the default API role of the app and assigns the creator to it.
pub struct FormRoleExecutor {
    form: Arc<dyn FormClient>,
}

impl FormRoleExecutor {
    pub fn new(form: Arc<dyn FormClient>) -> Self {
        Self { form }
    }
}

#[async_trait]
impl InitExecutor for FormRoleExecutor {
    fn name(&self) -> &'static str {
        "form-role"
    }

    fn bit(&self) -> i32 {
        FORM_API_BIT
    }

    async fn exec(&self, task: &InitTask) -> Result<(), ClientError> {
        let role = RoleSpec {
            name: DEFAULT_ROLE_NAME.to_string(),
            description: DEFAULT_ROLE_DESCRIPTION.to_string(),
        };
        let role_id = self.form.create_role(&task.app_id, &role).await?;
        self.form
            .assign_role(&task.app_id, &role_id, &[RoleMember::user(&task.create_by)])
            .await?;
        tracing::info!(app_id = %task.app_id, role_id = %role_id, "default form role assigned to creator");
        Ok(())
    }
}

pub struct Provisioner {
    executors: Vec<Arc<dyn InitExecutor>>,
    remote: Arc<dyn ChaosClient>,
}

impl Provisioner {
    pub fn new(remote: Arc<dyn ChaosClient>) -> Self {
        Self {
            executors: Vec::new(),
            remote,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn InitExecutor>) -> Self {
        self.executors.push(executor);
        self
    }

    fn local_bits(&self) -> i32 {
        self.executors.iter().fold(0, |bits, e| bits | e.bit())
    }
}

#[async_trait]
impl ChaosClient for Provisioner {
    async fn init(&self, tasks: &[InitTask]) -> Result<(), ClientError> {
        for task in tasks {
            for executor in self.executors.iter().filter(|e| task.content & e.bit() != 0) {
                if let Err(err) = executor.exec(task).await {
                    tracing::warn!(
                        app_id = %task.app_id,
                        executor = executor.name(),
                        error = %err,
                        "provisioning step failed"
                    );
                    return Err(err);
                }
            }
        }

        let local = self.local_bits();
        let remaining: Vec<InitTask> = tasks
            .iter()
            .filter(|task| task.content & !local != 0)
            .map(|task| InitTask {
                content: task.content & !local,
                ..task.clone()
            })
            .collect();
        if remaining.is_empty() {
            return Ok(());
        }
        self.remote.init(&remaining).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingForm {
        calls: Mutex<Vec<String>>,
        fail_create: bool,
    }

    #[async_trait]
    impl FormClient for RecordingForm {
        async fn create_role(&self, app_id: &str, role: &RoleSpec) -> Result<String, ClientError> {
            if self.fail_create {
                return Err(ClientError::Http {
                    service: "form",
                    status: 500,
                });
            }
            self.calls
                .lock()
                .unwrap()
                .push(format!("create {app_id} {}", role.name));
            Ok(format!("role-{app_id}"))
        }

        async fn assign_role(
            &self,
            app_id: &str,
            role_id: &str,
            members: &[RoleMember],
        ) -> Result<(), ClientError> {
            let ids: Vec<&str> = members.iter().map(|m| m.id.as_str()).collect();
            self.calls
                .lock()
                .unwrap()
                .push(format!("assign {app_id} {role_id} {}", ids.join(",")));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingRemote {
        tasks: Mutex<Vec<InitTask>>,
    }

    #[async_trait]
    impl ChaosClient for RecordingRemote {
        async fn init(&self, tasks: &[InitTask]) -> Result<(), ClientError> {
            self.tasks.lock().unwrap().extend_from_slice(tasks);
            Ok(())
        }
    }

    fn task(content: i32) -> InitTask {
        InitTask {
            app_id: "a1".into(),
            create_by: "u1".into(),
            content,
        }
    }

    #[tokio::test]
    async fn form_bit_creates_role_then_assigns_creator() {
        let form = Arc::new(RecordingForm::default());
        let remote = Arc::new(RecordingRemote::default());
        let provisioner =
            Provisioner::new(remote.clone()).with_executor(Arc::new(FormRoleExecutor::new(form.clone())));

        provisioner.init(&[task(FORM_API_BIT | 6)]).await.unwrap();

        assert_eq!(
            *form.calls.lock().unwrap(),
            vec![
                format!("create a1 {DEFAULT_ROLE_NAME}"),
                "assign a1 role-a1 u1".to_string(),
            ]
        );
        assert_eq!(*remote.tasks.lock().unwrap(), vec![task(6)]);
    }

    #[tokio::test]
    async fn remote_is_skipped_when_every_bit_is_local() {
        let form = Arc::new(RecordingForm::default());
        let remote = Arc::new(RecordingRemote::default());
        let provisioner =
            Provisioner::new(remote.clone()).with_executor(Arc::new(FormRoleExecutor::new(form)));

        provisioner.init(&[task(FORM_API_BIT)]).await.unwrap();
        assert!(remote.tasks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unset_bit_skips_executor() {
        let form = Arc::new(RecordingForm::default());
        let remote = Arc::new(RecordingRemote::default());
        let provisioner =
            Provisioner::new(remote.clone()).with_executor(Arc::new(FormRoleExecutor::new(form.clone())));

        provisioner.init(&[task(4)]).await.unwrap();
        assert!(form.calls.lock().unwrap().is_empty());
        assert_eq!(*remote.tasks.lock().unwrap(), vec![task(4)]);
    }

    #[tokio::test]
    async fn executor_failure_stops_before_remote() {
        let form = Arc::new(RecordingForm {
            fail_create: true,
            ..Default::default()
        });
        let remote = Arc::new(RecordingRemote::default());
        let provisioner =
            Provisioner::new(remote.clone()).with_executor(Arc::new(FormRoleExecutor::new(form)));

        let err = provisioner.init(&[task(FORM_API_BIT | 2)]).await.unwrap_err();
        assert!(matches!(err, ClientError::Http { service: "form", .. }));
        assert!(remote.tasks.lock().unwrap().is_empty());
    }
}
