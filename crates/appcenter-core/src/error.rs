use thiserror::Error;

/// Errors raised while decoding or validating catalog values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid ID: {0:?}")]
    InvalidId(String),

    #[error("Invalid application status code: {0}")]
    InvalidStatus(i32),

    #[error("Invalid scope type code: {0}")]
    InvalidScopeType(i32),
}

impl CoreError {
    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId(id.into())
    }
}
