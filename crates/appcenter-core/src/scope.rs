//! Visibility scopes: which users and departments may open an application.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum ScopeType {
    User,
    Department,
}

impl TryFrom<i32> for ScopeType {
    type Error = CoreError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::User),
            2 => Ok(Self::Department),
            other => Err(CoreError::InvalidScopeType(other)),
        }
    }
}

impl From<ScopeType> for i32 {
    fn from(t: ScopeType) -> Self {
        match t {
            ScopeType::User => 1,
            ScopeType::Department => 2,
        }
    }
}

/// A single scope entry attached to an application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppScope {
    #[serde(rename = "id")]
    pub scope_id: String,
    #[serde(rename = "type")]
    pub scope_type: ScopeType,
}

impl AppScope {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            scope_id: id.into(),
            scope_type: ScopeType::User,
        }
    }

    pub fn department(id: impl Into<String>) -> Self {
        Self {
            scope_id: id.into(),
            scope_type: ScopeType::Department,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_wire_shape() {
        let json = serde_json::to_value(AppScope::department("d1")).unwrap();
        assert_eq!(json, serde_json::json!({"id": "d1", "type": 2}));

        let parsed: AppScope = serde_json::from_value(serde_json::json!({"id": "u1", "type": 1})).unwrap();
        assert_eq!(parsed, AppScope::user("u1"));
    }

    #[test]
    fn unknown_scope_type_is_rejected() {
        let res = serde_json::from_value::<AppScope>(serde_json::json!({"id": "x", "type": 9}));
        assert!(res.is_err());
    }
}
