//! Custom extractors for the ingest pre-processing contract.
//!
//! Order matters: authentication is checked before the `X-Request-Id`
//! header, so a request missing both gets 401, and a valid token without
//! a request id gets 400.

use crate::error::AppError;
use crate::state::{AppState, BusKind};
use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use ugc_core::payload::ValidationErrors;
use uuid::Uuid;

/// Header carrying the request id the envelope propagates.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Header selecting the bus backend (honoured only with the override flag).
pub const EVENTBUS_HEADER: &str = "Eventbus";

/// The authenticated caller plus the propagated request id.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    /// `sub` claim of the verified token.
    pub user_id: Uuid,
    /// Value of the `X-Request-Id` header.
    pub request_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(AppError::unauthorized)?;

        let claims = state.verifier.verify(token).map_err(|err| {
            tracing::debug!(error = %err, "token rejected");
            AppError::unauthorized()
        })?;

        let request_id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::bad_request("Header X-Request-Id not specified"))?;
        let request_id = Uuid::parse_str(request_id)
            .map_err(|_| AppError::bad_request("Header X-Request-Id is not a UUID"))?;

        Ok(Self { user_id: claims.sub, request_id })
    }
}

/// The per-request bus choice from the `Eventbus` header, if any.
///
/// An unknown value is a client error; an absent header means "use the
/// pinned backend".
#[derive(Debug, Clone, Copy)]
pub struct BusChoice(pub Option<BusKind>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for BusChoice {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.headers.get(EVENTBUS_HEADER) {
            None => Ok(Self(None)),
            Some(value) => {
                let value = value
                    .to_str()
                    .map_err(|_| AppError::bad_request("Header Eventbus is not valid"))?;
                let kind = value.parse().map_err(AppError::bad_request)?;
                Ok(Self(Some(kind)))
            }
        }
    }
}

/// `Json<T>` that answers schema problems with the 422 field-error shape
/// instead of axum's plain-text rejection.
#[derive(Debug, Clone)]
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Self(value)),
            Err(JsonRejection::JsonSyntaxError(err)) => {
                Err(AppError::bad_request(format!("malformed JSON body: {err}")))
            }
            Err(err) => Err(AppError::validation(ValidationErrors::single(
                "body",
                err.to_string(),
            ))),
        }
    }
}
