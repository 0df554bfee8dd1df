//! HTTP error mapping.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use flakeguard_core::{FieldError, FlakeguardError, GuardrailViolation};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] FlakeguardError),

    #[error("invalid request: {0}")]
    BadRequest(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Error envelope: `{status: "error", message, errors?, violation?}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation: Option<GuardrailViolation>,
}

impl ErrorBody {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: "error",
            code,
            message: message.into(),
            errors: None,
            violation: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => {
                let mut body = ErrorBody::new("invalid_request", "request body is invalid");
                body.errors = Some(vec![FieldError::new("body", message)]);
                (StatusCode::BAD_REQUEST, body)
            }
            ApiError::Domain(err) => match err {
                FlakeguardError::NotFound { .. } => {
                    (StatusCode::NOT_FOUND, ErrorBody::new("not_found", err.to_string()))
                }
                FlakeguardError::Validation(v) => {
                    let mut body = ErrorBody::new("validation_failed", v.to_string());
                    body.errors = Some(v.errors);
                    (StatusCode::BAD_REQUEST, body)
                }
                FlakeguardError::Guardrail(violation) => {
                    let mut body = ErrorBody::new("guardrail_violation", violation.to_string());
                    body.violation = Some(violation);
                    (StatusCode::CONFLICT, body)
                }
                FlakeguardError::Conflict(message) => {
                    (StatusCode::CONFLICT, ErrorBody::new("conflict", message))
                }
                FlakeguardError::Upstream(message) => {
                    tracing::warn!(error = %message, "upstream failure");
                    (StatusCode::BAD_GATEWAY, ErrorBody::new("upstream_error", message))
                }
                FlakeguardError::Storage(e) => {
                    tracing::error!(error = %e, "storage error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorBody::new("storage_error", "A storage error occurred"),
                    )
                }
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flakeguard_core::ValidationError;
    use flakeguard_state::StorageError;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn domain_errors_map_to_statuses() {
        assert_eq!(
            status_of(FlakeguardError::not_found("test", "t1")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(FlakeguardError::from(ValidationError::field("repo", "is required"))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(FlakeguardError::from(GuardrailViolation::MaxExcludedTests {
                limit: 10,
                resulting: 11
            })),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(FlakeguardError::Upstream("jira: down".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(FlakeguardError::from(StorageError::Backend("io".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(ApiError::BadRequest("EOF".into())),
            StatusCode::BAD_REQUEST
        );
    }
}
