//! HTTP clients for the sibling services.
//!
//! - [`org`]: organization directory (user info, department paths)
//! - [`flow`]: workflow engine (app removal)
//! - [`chaos`]: provisioning service (app initialization)
//! - [`form`]: form engine (API roles)
//!
//! Every service answers with the `{code, msg, data}` envelope; a non-zero
//! code is reported as [`ClientError::Remote`].

pub mod chaos;
pub mod flow;
pub mod form;
pub mod org;

use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use appcenter_api::Envelope;

use crate::config::ServiceEndpoint;

pub use chaos::{ChaosClient, HttpChaosClient, InitTask};
pub use flow::{FlowClient, HttpFlowClient, PRE_DELETE};
pub use form::{FormClient, HttpFormClient, RoleMember, RoleSpec};
pub use org::{Department, HttpOrgClient, OrgClient, UserInfo};

/// Errors that can occur when calling a sibling service.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid {service} base URL: {message}")]
    InvalidUrl {
        service: &'static str,
        message: String,
    },

    #[error("failed to build HTTP client: {0}")]
    Build(String),

    #[error("request to {service} failed: {message}")]
    Network {
        service: &'static str,
        message: String,
    },

    #[error("{service} responded with HTTP {status}")]
    Http { service: &'static str, status: u16 },

    #[error("{service} returned code {code}: {msg}")]
    Remote {
        service: &'static str,
        code: i64,
        msg: String,
    },

    #[error("failed to decode {service} response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
}

/// JSON-over-HTTP plumbing shared by the service clients.
#[derive(Debug, Clone)]
pub(crate) struct ServiceClient {
    service: &'static str,
    http: reqwest::Client,
    base_url: Url,
}

impl ServiceClient {
    pub(crate) fn new(service: &'static str, endpoint: &ServiceEndpoint) -> Result<Self, ClientError> {
        let base_url = Url::parse(&endpoint.base_url).map_err(|e| ClientError::InvalidUrl {
            service,
            message: e.to_string(),
        })?;
        let http = reqwest::Client::builder()
            .timeout(endpoint.timeout())
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;
        Ok(Self {
            service,
            http,
            base_url,
        })
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url.join(path).map_err(|e| ClientError::InvalidUrl {
            service: self.service,
            message: e.to_string(),
        })
    }

    /// POSTs `body` to `path` and unwraps the envelope.
    ///
    /// A missing `data` field decodes as `T::default()`.
    pub(crate) async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Default,
    {
        let url = self.url(path)?;
        let response = self
            .http
            .post(url.as_str())
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(service = self.service, url = %url, error = %e, "sibling service request failed");
                ClientError::Network {
                    service: self.service,
                    message: e.to_string(),
                }
            })?;

        if !response.status().is_success() {
            return Err(ClientError::Http {
                service: self.service,
                status: response.status().as_u16(),
            });
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| ClientError::Decode {
            service: self.service,
            message: e.to_string(),
        })?;

        if envelope.code != 0 {
            return Err(ClientError::Remote {
                service: self.service,
                code: envelope.code,
                msg: envelope.msg,
            });
        }
        Ok(envelope.data.unwrap_or_default())
    }
}
