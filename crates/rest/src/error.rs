//! Error types for the portal HTTP surface.
//!
//! Persistence errors are mapped to HTTP status codes here. Responses carry a
//! JSON body `{"error": {"code": ..., "message": ...}}`.
//!
//! # Error Mapping
//!
//! | Storage Error | HTTP Status | Code |
//! |--------------|-------------|------|
//! | Silo: Unauthenticated | 401 | unauthenticated |
//! | Silo: InvalidSiloAssignment | 403 | forbidden |
//! | Silo: SiloMismatch / RoleNotPermitted | 403 | forbidden |
//! | Session, Scope, Audit, Backend | 500 | internal |
//!
//! Forbidden and internal responses use fixed messages: the body never names
//! another silo or echoes SQL. Details are logged instead.

use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use portal_persistence::error::{AuditError, SiloError, StorageError};
use tracing::{error, warn};

/// The primary error type for portal HTTP operations.
#[derive(Debug)]
pub enum RestError {
    /// No authenticated principal (HTTP 401).
    Unauthenticated,

    /// Silo or role check failed (HTTP 403).
    Forbidden {
        /// Internal reason, logged but never returned.
        reason: String,
    },

    /// Entity not found in the caller's silo (HTTP 404).
    NotFound {
        /// The entity kind (e.g., "commission").
        entity: &'static str,
        /// The entity ID.
        id: String,
    },

    /// Internal server error (HTTP 500).
    InternalError {
        /// Internal message, logged but never returned.
        message: String,
    },
}

impl fmt::Display for RestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestError::Unauthenticated => write!(f, "Unauthenticated"),
            RestError::Forbidden { reason } => write!(f, "Forbidden: {}", reason),
            RestError::NotFound { entity, id } => write!(f, "Not found: {} {}", entity, id),
            RestError::InternalError { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for RestError {}

impl RestError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RestError::Unauthenticated => StatusCode::UNAUTHORIZED,
            RestError::Forbidden { .. } => StatusCode::FORBIDDEN,
            RestError::NotFound { .. } => StatusCode::NOT_FOUND,
            RestError::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            RestError::Unauthenticated => "unauthenticated",
            RestError::Forbidden { .. } => "forbidden",
            RestError::NotFound { .. } => "not-found",
            RestError::InternalError { .. } => "internal",
        }
    }

    fn public_message(&self) -> String {
        match self {
            RestError::Unauthenticated => "Authentication required".to_string(),
            RestError::Forbidden { .. } => "Access to this resource is not permitted".to_string(),
            RestError::NotFound { entity, id } => format!("{} {} not found", entity, id),
            RestError::InternalError { .. } => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        match &self {
            RestError::Forbidden { reason } => warn!(reason = %reason, "Request forbidden"),
            RestError::InternalError { message } => error!(message = %message, "Request failed"),
            _ => {}
        }

        let body = serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.public_message(),
            }
        });
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<SiloError> for RestError {
    fn from(err: SiloError) -> Self {
        if err.is_unauthenticated() {
            RestError::Unauthenticated
        } else {
            RestError::Forbidden {
                reason: err.to_string(),
            }
        }
    }
}

impl From<StorageError> for RestError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Silo(e) => e.into(),
            other => RestError::InternalError {
                message: other.to_string(),
            },
        }
    }
}

impl From<AuditError> for RestError {
    fn from(err: AuditError) -> Self {
        RestError::InternalError {
            message: err.to_string(),
        }
    }
}

/// Result type for REST operations.
pub type RestResult<T> = Result<T, RestError>;
