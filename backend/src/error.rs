//! Error types surfaced to the routing layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use backoffice_common::RecordError;

use crate::identity::IdentityError;
use crate::store::StoreError;
use crate::whm::ControlPlaneError;

/// Errors returned by the exposed operations.
///
/// Each variant maps to a stable category and an HTTP status class.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The gateway answered but reported a failure; carries its display reason.
    #[error("{0}")]
    Upstream(String),

    /// The feature needs a control plane this service does not have.
    #[error("{0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-checkable category.
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Upstream(_) => "upstream_error",
            AppError::Unavailable(_) => "service_unavailable",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) => StatusCode::BAD_REQUEST,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(detail) = &self {
            tracing::error!("Internal error: {}", detail);
        }

        let body = Json(json!({
            "success": false,
            "error": {
                "type": self.category(),
                "message": self.public_message()
            }
        }));

        (self.status(), body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(path) => AppError::NotFound(path),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<RecordError> for AppError {
    fn from(e: RecordError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<IdentityError> for AppError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::InvalidToken(msg) => AppError::Unauthorized(msg),
            IdentityError::AlreadyExists(email) => {
                AppError::Conflict(format!("Email {} is already in use", email))
            }
            IdentityError::NotFound(id) => AppError::NotFound(format!("identity {}", id)),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<ControlPlaneError> for AppError {
    fn from(e: ControlPlaneError) -> Self {
        AppError::Internal(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Success body wrapper: `{"success": true, "data": ...}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert_eq!(AppError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Unauthorized("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::Upstream("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::Unavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_detail_is_not_public() {
        let err = AppError::Internal("sqlite: disk I/O error at /var/db".into());
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(err.category(), "internal_error");
    }

    #[test]
    fn test_upstream_message_is_reason_text() {
        let err = AppError::Upstream("Sorry, that domain is already in use.".into());
        assert_eq!(err.public_message(), "Sorry, that domain is already in use.");
    }

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let err: AppError = StoreError::NotFound("services/abc".into()).into();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_identity_exists_maps_to_conflict() {
        let err: AppError = IdentityError::AlreadyExists("a@x.com".into()).into();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_control_plane_timeout_is_internal() {
        let err: AppError = ControlPlaneError::Timeout("operation timed out".into()).into();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
