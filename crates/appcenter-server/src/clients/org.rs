//! Organization directory client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ClientError, ServiceClient};
use crate::config::ServiceEndpoint;

const USER_INFO_PATH: &str = "/api/v1/org/o/user/info";
const USERS_BY_IDS_PATH: &str = "/api/v1/org/o/user/ids";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: String,
    #[serde(default)]
    pub department_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub email: String,
    /// Department paths, each from the user's own department up to the root.
    #[serde(default)]
    pub dep: Vec<Vec<Department>>,
}

impl UserInfo {
    /// The user's own department on the first path, if any.
    pub fn primary_department(&self) -> Option<&Department> {
        self.dep.first().and_then(|path| path.first())
    }
}

#[async_trait]
pub trait OrgClient: Send + Sync {
    async fn user_info(&self, user_id: &str) -> Result<UserInfo, ClientError>;

    async fn users_by_ids(&self, ids: &[String]) -> Result<Vec<UserInfo>, ClientError>;
}

#[derive(Serialize)]
struct OneUserRequest<'a> {
    id: &'a str,
}

#[derive(Serialize)]
struct UsersByIdsRequest<'a> {
    ids: &'a [String],
}

#[derive(Default, Deserialize)]
struct UsersByIdsResponse {
    #[serde(default)]
    users: Vec<UserInfo>,
}

#[derive(Debug, Clone)]
pub struct HttpOrgClient {
    inner: ServiceClient,
}

impl HttpOrgClient {
    pub fn new(endpoint: &ServiceEndpoint) -> Result<Self, ClientError> {
        Ok(Self {
            inner: ServiceClient::new("org", endpoint)?,
        })
    }
}

#[async_trait]
impl OrgClient for HttpOrgClient {
    async fn user_info(&self, user_id: &str) -> Result<UserInfo, ClientError> {
        self.inner
            .post(USER_INFO_PATH, &OneUserRequest { id: user_id })
            .await
    }

    async fn users_by_ids(&self, ids: &[String]) -> Result<Vec<UserInfo>, ClientError> {
        let resp: UsersByIdsResponse = self
            .inner
            .post(USERS_BY_IDS_PATH, &UsersByIdsRequest { ids })
            .await?;
        Ok(resp.users)
    }
}
