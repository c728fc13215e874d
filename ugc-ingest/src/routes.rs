//! Router assembly and cross-cutting layers.

use crate::error::AppError;
use crate::extract::REQUEST_ID_HEADER;
use crate::handlers::{events, films, health, read};
use crate::state::AppState;
use axum::error_handling::HandleErrorLayer;
use axum::http::Request;
use axum::routing::{get, post};
use axum::{BoxError, Router};
use std::time::Duration;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Build the full application router.
///
/// Every request runs under a span carrying method, path and the
/// propagated request id (the access log), and under one overall timeout;
/// on timeout the client gets 500 and any in-flight publish completes in
/// the background inside the adapter.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let api = Router::new()
        .route("/events/click", post(events::click))
        .route("/events/visit", post(events::visit))
        .route("/films/bookmarks", get(read::user_bookmarks))
        .route(
            "/films/:film_id/rating",
            get(read::film_rating)
                .post(films::create_rating)
                .patch(films::update_rating)
                .delete(films::delete_rating),
        )
        .route(
            "/films/:film_id/reviews",
            get(read::film_reviews).post(films::create_review),
        )
        .route(
            "/films/reviews/:review_id/",
            axum::routing::patch(films::update_review).delete(films::delete_review),
        )
        .route(
            "/films/reviews/:review_id/rating",
            post(films::create_review_rating)
                .patch(films::update_review_rating)
                .delete(films::delete_review_rating),
        )
        .route(
            "/films/:film_id/bookmarks",
            post(films::create_bookmark).delete(films::delete_bookmark),
        )
        .route("/films/:film_id/fully_watched", post(films::fully_watched))
        .route("/films/:film_id/quality_changed", post(films::quality_changed));

    Router::new()
        .route("/healthz", get(health::healthz))
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|request: &Request<_>| {
                            let request_id = request
                                .headers()
                                .get(REQUEST_ID_HEADER)
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or("-");
                            tracing::info_span!(
                                "http_request",
                                method = %request.method(),
                                path = %request.uri().path(),
                                request_id = %request_id,
                            )
                        })
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

async fn handle_middleware_error(err: BoxError) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        AppError::internal(anyhow::anyhow!("request timed out"))
    } else {
        AppError::internal(anyhow::anyhow!(err))
    }
}
