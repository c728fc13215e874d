//! Liveness endpoint, unauthenticated.

use axum::http::StatusCode;

/// `GET /healthz`
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}
