//! HTTP front-end of the UGC pipeline.
//!
//! Stateless service with two halves:
//!
//! - **Ingest**: every `POST`/`PATCH`/`DELETE` endpoint authenticates the
//!   caller (RS256 Bearer JWT), requires an `X-Request-Id`, validates the
//!   body into a typed payload, enriches it into an
//!   [`ugc_core::Envelope`] and publishes one record to the event bus.
//! - **Read**: three `GET` endpoints serving per-film rating, reviews with
//!   their rating aggregates and the caller's bookmarks straight from the
//!   document store.
//!
//! The bus backend is pinned by configuration; the `Eventbus` request
//! header can switch backends per request only when the override flag is
//! enabled (A/B benchmarking).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod publish;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use routes::router;
pub use state::{AppState, BusKind};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
