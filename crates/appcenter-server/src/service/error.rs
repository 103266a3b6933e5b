use appcenter_api::{ApiError, ErrorCode};
use appcenter_storage::StorageError;
use thiserror::Error;

use crate::clients::ClientError;
use crate::membership::MembershipError;

/// Errors of catalog operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{}", .0.message())]
    Business(ErrorCode),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Membership(#[from] MembershipError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl ServiceError {
    pub fn business(code: ErrorCode) -> Self {
        Self::Business(code)
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}

impl From<appcenter_core::CoreError> for ServiceError {
    fn from(err: appcenter_core::CoreError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

fn storage_to_api(err: StorageError) -> ApiError {
    if err.is_not_found() {
        return ApiError::business(ErrorCode::InvalidUri);
    }
    if err.is_unavailable() {
        return ApiError::unavailable(err.to_string());
    }
    match err {
        StorageError::InvalidInput { message } => ApiError::bad_request(message),
        other => ApiError::internal(other.to_string()),
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Business(code) => ApiError::business(code),
            ServiceError::InvalidRequest(msg) => ApiError::bad_request(msg),
            ServiceError::Storage(e) => storage_to_api(e),
            ServiceError::Membership(MembershipError::InvalidInput(_)) => {
                ApiError::business(ErrorCode::InvalidDel)
            }
            ServiceError::Membership(MembershipError::Storage(e)) => storage_to_api(e),
            ServiceError::Membership(MembershipError::Lock(e)) => ApiError::unavailable(e.to_string()),
            ServiceError::Membership(e @ MembershipError::Task(_)) => ApiError::internal(e.to_string()),
            ServiceError::Client(e) => ApiError::unavailable(e.to_string()),
        }
    }
}
