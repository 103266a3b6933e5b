use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// -------------------------
// Service error codes
// -------------------------

/// Error codes carried in the `code` field of every response envelope.
///
/// `0` is success; every other value names one failure the caller can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Success,
    Internal,
    InvalidParams,
    InvalidUri,
    NameExist,
    IdentifiesExist,
    InvalidDel,
    ErrVersion,
    Unavailable,
}

impl ErrorCode {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Success => 0,
            Self::Internal => -1,
            Self::InvalidParams => 90014000000,
            Self::InvalidUri => 90014000001,
            Self::NameExist => 90014000002,
            Self::IdentifiesExist => 90014000003,
            Self::InvalidDel => 90014000004,
            Self::ErrVersion => 90014000005,
            Self::Unavailable => 90015000000,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Success => "",
            Self::Internal => "internal server error",
            Self::InvalidParams => "invalid parameters",
            Self::InvalidUri => "application does not exist",
            Self::NameExist => "application name already exists",
            Self::IdentifiesExist => "application identifier already exists",
            Self::InvalidDel => "no administrator selected for removal",
            Self::ErrVersion => "import version is not compatible",
            Self::Unavailable => "dependent service unavailable",
        }
    }

    pub fn status_code(self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,
            Self::InvalidParams | Self::InvalidDel | Self::ErrVersion => StatusCode::BAD_REQUEST,
            Self::InvalidUri => StatusCode::NOT_FOUND,
            Self::NameExist | Self::IdentifiesExist => StatusCode::CONFLICT,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// -------------------------
// Response envelope
// -------------------------

/// The `{code, msg, data}` body shared by every endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: ErrorCode::Success.as_i64(),
            msg: String::new(),
            data: Some(data),
        }
    }
}

impl Envelope<()> {
    pub fn error(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self {
            code: code.as_i64(),
            msg: msg.into(),
            data: None,
        }
    }
}

fn json_response(status: StatusCode, body: Vec<u8>, extra: Vec<(HeaderName, HeaderValue)>) -> Response {
    let mut builder = axum::http::Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (n, v) in extra {
        builder = builder.header(n, v);
    }
    builder
        .body(axum::body::Body::from(body))
        .unwrap_or_else(|_| {
            let mut fallback = Response::new(axum::body::Body::from("{}"));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}

fn serialization_failure() -> Vec<u8> {
    serde_json::to_vec(&Envelope::error(ErrorCode::Internal, "serialization failure"))
        .unwrap_or_else(|_| b"{}".to_vec())
}

// -------------------------
// API errors
// -------------------------

/// High-level API errors mapped to HTTP responses and envelope codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("{}", .0.message())]
    Business(ErrorCode),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
    pub fn business(code: ErrorCode) -> Self {
        Self::Business(code)
    }
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::BadRequest(_) => ErrorCode::InvalidParams,
            ApiError::Business(code) => *code,
            ApiError::Unavailable(_) => ErrorCode::Unavailable,
            ApiError::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.code().status_code()
    }

    pub fn to_envelope(&self) -> Envelope<()> {
        Envelope::error(self.code(), self.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::to_vec(&self.to_envelope()).unwrap_or_else(|_| serialization_failure());
        json_response(self.status_code(), body, Vec::new())
    }
}


// -------------------------
// API Response Wrapper
// -------------------------

/// A successful response; the value is wrapped in an [`Envelope`].
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub value: T,
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

impl<T> ApiResponse<T> {
    pub fn new(value: T, status: StatusCode) -> Self {
        Self {
            value,
            status,
            headers: Vec::new(),
        }
    }

    pub fn ok(value: T) -> Self {
        Self::new(value, StatusCode::OK)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body =
            serde_json::to_vec(&Envelope::ok(&self.value)).unwrap_or_else(|_| serialization_failure());
        json_response(self.status, body, self.headers)
    }
}

/// Result type for handlers.
pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;
