//! Workflow engine client.

use async_trait::async_trait;
use serde::Serialize;

use super::{ClientError, ServiceClient};
use crate::config::ServiceEndpoint;

const REMOVE_APP_PATH: &str = "/api/v1/flow/removeApp";

/// Removal action sent when an application is soft-deleted.
pub const PRE_DELETE: &str = "preDelete";

#[async_trait]
pub trait FlowClient: Send + Sync {
    /// Tells the workflow engine to stop the flows of `app_id`.
    async fn remove_app(&self, app_id: &str, action: &str) -> Result<(), ClientError>;
}

#[derive(Serialize)]
struct RemoveAppRequest<'a> {
    #[serde(rename = "appID")]
    app_id: &'a str,
    action: &'a str,
}

#[derive(Debug, Clone)]
pub struct HttpFlowClient {
    inner: ServiceClient,
}

impl HttpFlowClient {
    pub fn new(endpoint: &ServiceEndpoint) -> Result<Self, ClientError> {
        Ok(Self {
            inner: ServiceClient::new("flow", endpoint)?,
        })
    }
}

#[async_trait]
impl FlowClient for HttpFlowClient {
    async fn remove_app(&self, app_id: &str, action: &str) -> Result<(), ClientError> {
        let _: serde_json::Value = self
            .inner
            .post(REMOVE_APP_PATH, &RemoveAppRequest { app_id, action })
            .await?;
        Ok(())
    }
}
