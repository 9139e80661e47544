use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;
use utoipa::ToSchema;

/// Why an outbound fetch failed. Only ever logged; callers collapse every
/// variant into [`ApiError::NotAccessible`] or an unauthenticated result.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Scheme not allowed: {0}")]
    SchemeNotAllowed(String),
    #[error("DNS resolution failed: {0}")]
    Dns(String),
    #[error("No addresses found for host")]
    NoAddresses,
    #[error("Host resolves to a non-public address: {0}")]
    NonPublicAddress(IpAddr),
    #[error("TLS error: {0}")]
    Tls(String),
    #[error("Network timeout after {0:?}")]
    Timeout(std::time::Duration),
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP status {0}")]
    Status(StatusCode),
    #[error("Response body exceeds {0} bytes")]
    BodyTooLarge(usize),
}

#[derive(Debug, Error)]
pub enum KvError {
    #[error("Cache backend error: {0}")]
    Backend(String),
    #[error("Cache value could not be encoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for KvError {
    fn from(e: redis::RedisError) -> Self {
        KvError::Backend(e.to_string())
    }
}

/// Which unique field a registration collided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    Username,
    Email,
    Other,
}

/// The error taxonomy exposed over HTTP.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Unauthenticated")]
    Unauthenticated,
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Conflict: {0:?}")]
    Conflict(ConflictKind),
    #[error("Resource not accessible")]
    NotAccessible,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::NotAccessible => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated | ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "invalid_request",
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::NotAccessible => "not_accessible",
            ApiError::Internal(_) => "server_error",
        }
    }

    fn public_description(&self) -> Option<String> {
        match self {
            ApiError::Validation(msg) | ApiError::Unauthorized(msg) | ApiError::NotFound(msg) => {
                Some(msg.clone())
            }
            ApiError::Unauthenticated => Some("Authentication required".to_string()),
            ApiError::Conflict(ConflictKind::Username) => {
                Some("Username is already taken".to_string())
            }
            ApiError::Conflict(ConflictKind::Email) => {
                Some("Email is already registered".to_string())
            }
            ApiError::Conflict(ConflictKind::Other) => {
                Some("Username or email already taken".to_string())
            }
            ApiError::NotAccessible => {
                Some("The requested resource could not be accessed".to_string())
            }
            ApiError::Internal(_) => None,
        }
    }
}

/// JSON error body shared by every endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Machine readable error code
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(error = %detail, "internal error while handling request");
        }
        let body = ErrorResponse {
            error: self.code().to_string(),
            error_description: self.public_description(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<KvError> for ApiError {
    fn from(e: KvError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(e: sea_orm::DbErr) -> Self {
        ApiError::Internal(e.to_string())
    }
}
