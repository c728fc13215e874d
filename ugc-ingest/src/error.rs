//! Error type bridging domain failures to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::fmt;
use ugc_core::payload::{FieldError, ValidationErrors};

/// Application error for web handlers.
///
/// Maps the error taxonomy onto HTTP statuses: bad/missing auth → 401,
/// missing `X-Request-Id` → 400, payload-schema violations → 422 with a
/// field list, everything unexpected → 500 with the cause logged and
/// never leaked.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    body: ErrorBody,
    source: Option<anyhow::Error>,
}

#[derive(Debug)]
enum ErrorBody {
    Message(String),
    Fields(Vec<FieldError>),
}

impl AppError {
    /// 401 with the canonical unauthorized message.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: ErrorBody::Message(
                "Unauthorized. Bearer token not specified or invalid".to_string(),
            ),
            source: None,
        }
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody::Message(message.into()),
            source: None,
        }
    }

    /// 422 with the machine-readable field list.
    #[must_use]
    pub fn validation(errors: ValidationErrors) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: ErrorBody::Fields(errors.errors),
            source: None,
        }
    }

    /// 500 Internal Server Error; the cause is logged, not returned.
    #[must_use]
    pub fn internal(source: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody::Message("Internal server error".to_string()),
            source: Some(source),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            ErrorBody::Message(message) => write!(f, "[{}] {message}", self.status),
            ErrorBody::Fields(fields) => {
                write!(f, "[{}] {} field error(s)", self.status, fields.len())
            }
        }
    }
}

#[derive(Serialize)]
struct MessageBody {
    error: String,
}

#[derive(Serialize)]
struct FieldsBody {
    errors: Vec<FieldError>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => {
                    tracing::error!(status = %self.status, error = ?source, "request failed");
                }
                None => tracing::error!(status = %self.status, "request failed"),
            }
        }
        match self.body {
            ErrorBody::Message(error) => {
                (self.status, Json(MessageBody { error })).into_response()
            }
            ErrorBody::Fields(errors) => {
                (self.status, Json(FieldsBody { errors })).into_response()
            }
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        Self::validation(errors)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err)
    }
}

impl From<ugc_mongo::StoreError> for AppError {
    fn from(err: ugc_mongo::StoreError) -> Self {
        Self::internal(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_keeps_the_canonical_message() {
        let err = AppError::unauthorized();
        assert_eq!(
            err.to_string(),
            "[401 Unauthorized] Unauthorized. Bearer token not specified or invalid"
        );
    }

    #[test]
    fn validation_reports_field_count() {
        let err = AppError::validation(ValidationErrors::single("value", "out of range"));
        assert_eq!(err.to_string(), "[422 Unprocessable Entity] 1 field error(s)");
    }
}
