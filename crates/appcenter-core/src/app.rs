//! Application catalog records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Lifecycle status of an application.
///
/// Serialized as the integer code stored in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum AppStatus {
    /// Published and visible on the home platform.
    Released,
    /// Created and provisioned but not published.
    Unreleased,
    /// Import in progress.
    Importing,
    /// Import failed.
    ImportError,
    /// Provisioning callback reported failure.
    InitializeError,
    /// Created, waiting for provisioning.
    NotReady,
}

impl AppStatus {
    pub fn code(self) -> i32 {
        match self {
            Self::Released => 1,
            Self::Unreleased => -1,
            Self::Importing => -2,
            Self::ImportError => -3,
            Self::InitializeError => -4,
            Self::NotReady => -5,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, CoreError> {
        match code {
            1 => Ok(Self::Released),
            -1 => Ok(Self::Unreleased),
            -2 => Ok(Self::Importing),
            -3 => Ok(Self::ImportError),
            -4 => Ok(Self::InitializeError),
            -5 => Ok(Self::NotReady),
            other => Err(CoreError::InvalidStatus(other)),
        }
    }
}

impl TryFrom<i32> for AppStatus {
    type Error = CoreError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

impl From<AppStatus> for i32 {
    fn from(status: AppStatus) -> Self {
        status.code()
    }
}

/// Soft-delete marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum DelFlag {
    #[default]
    Normal,
    Deleted,
}

impl From<i64> for DelFlag {
    fn from(v: i64) -> Self {
        if v == 1 { Self::Deleted } else { Self::Normal }
    }
}

impl From<DelFlag> for i64 {
    fn from(flag: DelFlag) -> Self {
        match flag {
            DelFlag::Normal => 0,
            DelFlag::Deleted => 1,
        }
    }
}

/// A catalog application record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
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
    /// Bitmask of provisioned sibling services.
    pub server: i32,
    pub del_flag: DelFlag,
    /// Unix seconds after which a deleted app may be purged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_time: Option<i64>,
    pub app_sign: String,
    #[serde(default)]
    pub extension: Map<String, Value>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub per_poly: bool,
}

impl App {
    pub fn is_deleted(&self) -> bool {
        self.del_flag == DelFlag::Deleted
    }
}

/// Partial update of an application; `None` leaves the column unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppUpdate {
    pub id: String,
    pub app_name: Option<String>,
    pub access_url: Option<String>,
    pub app_icon: Option<String>,
    pub update_by: Option<String>,
    pub update_time: Option<i64>,
    pub use_status: Option<AppStatus>,
    pub server: Option<i32>,
    pub app_sign: Option<String>,
    pub extension: Option<Map<String, Value>>,
    pub description: Option<String>,
}

impl AppUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Sets a text column, treating an empty value as "leave unchanged".
    fn non_empty(value: impl Into<String>) -> Option<String> {
        let value = value.into();
        (!value.is_empty()).then_some(value)
    }

    #[must_use]
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Self::non_empty(name);
        self
    }

    #[must_use]
    pub fn with_access_url(mut self, url: impl Into<String>) -> Self {
        self.access_url = Self::non_empty(url);
        self
    }

    #[must_use]
    pub fn with_app_icon(mut self, icon: impl Into<String>) -> Self {
        self.app_icon = Self::non_empty(icon);
        self
    }

    #[must_use]
    pub fn with_app_sign(mut self, sign: impl Into<String>) -> Self {
        self.app_sign = Self::non_empty(sign);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Self::non_empty(description);
        self
    }

    #[must_use]
    pub fn with_extension(mut self, extension: Map<String, Value>) -> Self {
        self.extension = Some(extension);
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: AppStatus) -> Self {
        self.use_status = Some(status);
        self
    }

    #[must_use]
    pub fn with_server(mut self, server: i32) -> Self {
        self.server = Some(server);
        self
    }

    #[must_use]
    pub fn touched_by(mut self, user_id: impl Into<String>, at: i64) -> Self {
        self.update_by = Self::non_empty(user_id);
        self.update_time = Some(at);
        self
    }

    /// Applies this update to an in-memory record.
    pub fn apply_to(&self, app: &mut App) {
        if let Some(v) = &self.app_name {
            app.app_name = v.clone();
        }
        if let Some(v) = &self.access_url {
            app.access_url = v.clone();
        }
        if let Some(v) = &self.app_icon {
            app.app_icon = v.clone();
        }
        if let Some(v) = &self.update_by {
            app.update_by = v.clone();
        }
        if let Some(v) = self.update_time {
            app.update_time = v;
        }
        if let Some(v) = self.use_status {
            app.use_status = v;
        }
        if let Some(v) = self.server {
            app.server = v;
        }
        if let Some(v) = &self.app_sign {
            app.app_sign = v.clone();
        }
        if let Some(v) = &self.extension {
            app.extension = v.clone();
        }
        if let Some(v) = &self.description {
            app.description = v.clone();
        }
    }
}
