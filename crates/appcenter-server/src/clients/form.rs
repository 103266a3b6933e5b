//! Form engine client: API roles of an application.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ClientError, ServiceClient};
use crate::config::ServiceEndpoint;

/// Member type of a user in a role assignment.
pub const MEMBER_TYPE_USER: i32 = 1;

fn create_role_path(app_id: &str) -> String {
    format!("/api/v1/form/{app_id}/internal/apiRole/create")
}

fn assign_role_path(app_id: &str, role_id: &str) -> String {
    format!("/api/v1/form/{app_id}/internal/apiRole/grant/assign/{role_id}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleSpec {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMember {
    pub id: String,
    #[serde(rename = "type")]
    pub member_type: i32,
}

impl RoleMember {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            member_type: MEMBER_TYPE_USER,
        }
    }
}

#[async_trait]
pub trait FormClient: Send + Sync {
    /// Creates an API role in `app_id` and returns its id.
    async fn create_role(&self, app_id: &str, role: &RoleSpec) -> Result<String, ClientError>;

    async fn assign_role(
        &self,
        app_id: &str,
        role_id: &str,
        members: &[RoleMember],
    ) -> Result<(), ClientError>;
}

#[derive(Debug, Default, Deserialize)]
struct CreateRoleResponse {
    #[serde(rename = "roleID", default)]
    role_id: String,
}

#[derive(Serialize)]
struct AssignRequest<'a> {
    add: &'a [RoleMember],
}

#[derive(Debug, Clone)]
pub struct HttpFormClient {
    inner: ServiceClient,
}

impl HttpFormClient {
    pub fn new(endpoint: &ServiceEndpoint) -> Result<Self, ClientError> {
        Ok(Self {
            inner: ServiceClient::new("form", endpoint)?,
        })
    }
}

#[async_trait]
impl FormClient for HttpFormClient {
    async fn create_role(&self, app_id: &str, role: &RoleSpec) -> Result<String, ClientError> {
        let created: CreateRoleResponse = self.inner.post(&create_role_path(app_id), role).await?;
        if created.role_id.is_empty() {
            return Err(ClientError::Decode {
                service: "form",
                message: "create role response has no roleID".into(),
            });
        }
        Ok(created.role_id)
    }

    async fn assign_role(
        &self,
        app_id: &str,
        role_id: &str,
        members: &[RoleMember],
    ) -> Result<(), ClientError> {
        let _: serde_json::Value = self
            .inner
            .post(&assign_role_path(app_id, role_id), &AssignRequest { add: members })
            .await?;
        Ok(())
    }
}
