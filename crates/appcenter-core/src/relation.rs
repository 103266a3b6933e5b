use serde::{Deserialize, Serialize};

/// One user's administrative grant on one application.
///
/// Duplicate rows for the same pair are tolerated by every consumer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRelation {
    #[serde(rename = "appID")]
    pub app_id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
}

impl AdminRelation {
    pub fn new(app_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            user_id: user_id.into(),
        }
    }
}
