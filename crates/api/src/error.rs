//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::ErrorKind;
use domain::DomainError;
use saga::SagaError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Saga(#[from] SagaError),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::BadRequest(_) => ErrorKind::Validation,
            ApiError::Domain(e) => e.kind(),
            ApiError::Saga(e) => e.kind(),
        }
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.kind())
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);
        if kind == ErrorKind::Internal {
            tracing::error!(error = %self, "internal server error");
        }

        let mut body = serde_json::json!({ "error": self.to_string(), "kind": kind });
        if let ApiError::Saga(SagaError::WorkflowFailed {
            saga_id,
            workflow,
            step,
            ..
        }) = &self
        {
            body["saga_id"] = serde_json::json!(saga_id);
            body["workflow"] = serde_json::json!(workflow);
            body["step"] = serde_json::json!(step);
        }
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_map_to_statuses() {
        assert_eq!(
            ApiError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(SagaError::Conflict("dup".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(SagaError::transient("inventory", "timeout")).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(DomainError::not_found("SplitOrderPayment", "x")).status(),
            StatusCode::NOT_FOUND
        );
    }
}
