//! Provisioning ("chaos") service client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ClientError, ServiceClient};
use crate::config::ServiceEndpoint;

const INIT_PATH: &str = "/api/v1/chaos/init";

/// One application to provision; `content` is the bitmask of sibling
/// services to set up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitTask {
    #[serde(rename = "appID")]
    pub app_id: String,
    pub create_by: String,
    pub content: i32,
}

#[async_trait]
pub trait ChaosClient: Send + Sync {
    /// Queues provisioning; completion is reported through the init callback.
    async fn init(&self, tasks: &[InitTask]) -> Result<(), ClientError>;
}

#[derive(Debug, Clone)]
pub struct HttpChaosClient {
    inner: ServiceClient,
}

impl HttpChaosClient {
    pub fn new(endpoint: &ServiceEndpoint) -> Result<Self, ClientError> {
        Ok(Self {
            inner: ServiceClient::new("chaos", endpoint)?,
        })
    }
}

#[async_trait]
impl ChaosClient for HttpChaosClient {
    async fn init(&self, tasks: &[InitTask]) -> Result<(), ClientError> {
        let _: serde_json::Value = self.inner.post(INIT_PATH, tasks).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn init_posts_task_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(INIT_PATH))
            .and(body_json(json!([{"appID": "a1", "createBy": "u1", "content": 7}])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 0, "msg": ""})))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpChaosClient::new(&ServiceEndpoint::new(server.uri())).unwrap();
        client
            .init(&[InitTask {
                app_id: "a1".into(),
                create_by: "u1".into(),
                content: 7,
            }])
            .await
            .unwrap();
    }
}
