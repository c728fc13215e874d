//! Film-scoped ingest: playback milestones, ratings, reviews, review
//! ratings and bookmarks.
//!
//! The HTTP method selects the operation (POST create, PATCH update,
//! DELETE delete); the path parameter is injected into the payload before
//! validation so the body cannot contradict the route.

use crate::extract::{BusChoice, Identity, ValidJson};
use crate::publish::{ingest_event, EventBody};
use crate::state::AppState;
use crate::WebResult;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use ugc_core::envelope::{EventSubtype, EventType};
use uuid::Uuid;

async fn film_event(
    state: AppState,
    identity: Identity,
    bus: BusChoice,
    body: EventBody,
    subtype: EventSubtype,
    film_id: Uuid,
) -> WebResult<StatusCode> {
    ingest_event(
        &state,
        identity,
        bus.0,
        body,
        EventType::Custom,
        Some(subtype),
        &[("film_id", film_id)],
    )
    .await
}

async fn review_event(
    state: AppState,
    identity: Identity,
    bus: BusChoice,
    body: EventBody,
    subtype: EventSubtype,
    review_id: Uuid,
) -> WebResult<StatusCode> {
    ingest_event(
        &state,
        identity,
        bus.0,
        body,
        EventType::Custom,
        Some(subtype),
        &[("review_id", review_id)],
    )
    .await
}

/// `POST /api/v1/films/{film_id}/fully_watched`
pub async fn fully_watched(
    State(state): State<AppState>,
    Path(film_id): Path<Uuid>,
    identity: Identity,
    bus: BusChoice,
    ValidJson(body): ValidJson<EventBody>,
) -> WebResult<StatusCode> {
    film_event(state, identity, bus, body, EventSubtype::FullyWatched, film_id).await
}

/// `POST /api/v1/films/{film_id}/quality_changed`
pub async fn quality_changed(
    State(state): State<AppState>,
    Path(film_id): Path<Uuid>,
    identity: Identity,
    bus: BusChoice,
    ValidJson(body): ValidJson<EventBody>,
) -> WebResult<StatusCode> {
    film_event(state, identity, bus, body, EventSubtype::QualityChanged, film_id).await
}

/// `POST /api/v1/films/{film_id}/rating`
pub async fn create_rating(
    State(state): State<AppState>,
    Path(film_id): Path<Uuid>,
    identity: Identity,
    bus: BusChoice,
    ValidJson(body): ValidJson<EventBody>,
) -> WebResult<StatusCode> {
    film_event(state, identity, bus, body, EventSubtype::CreateFilmRating, film_id).await
}

/// `PATCH /api/v1/films/{film_id}/rating`
pub async fn update_rating(
    State(state): State<AppState>,
    Path(film_id): Path<Uuid>,
    identity: Identity,
    bus: BusChoice,
    ValidJson(body): ValidJson<EventBody>,
) -> WebResult<StatusCode> {
    film_event(state, identity, bus, body, EventSubtype::UpdateFilmRating, film_id).await
}

/// `DELETE /api/v1/films/{film_id}/rating`
pub async fn delete_rating(
    State(state): State<AppState>,
    Path(film_id): Path<Uuid>,
    identity: Identity,
    bus: BusChoice,
    ValidJson(body): ValidJson<EventBody>,
) -> WebResult<StatusCode> {
    film_event(state, identity, bus, body, EventSubtype::DeleteFilmRating, film_id).await
}

/// `POST /api/v1/films/{film_id}/reviews`
pub async fn create_review(
    State(state): State<AppState>,
    Path(film_id): Path<Uuid>,
    identity: Identity,
    bus: BusChoice,
    ValidJson(body): ValidJson<EventBody>,
) -> WebResult<StatusCode> {
    film_event(state, identity, bus, body, EventSubtype::CreateFilmReview, film_id).await
}

/// `PATCH /api/v1/films/reviews/{review_id}/`
pub async fn update_review(
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
    identity: Identity,
    bus: BusChoice,
    ValidJson(body): ValidJson<EventBody>,
) -> WebResult<StatusCode> {
    review_event(state, identity, bus, body, EventSubtype::UpdateFilmReview, review_id).await
}

/// `DELETE /api/v1/films/reviews/{review_id}/`
pub async fn delete_review(
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
    identity: Identity,
    bus: BusChoice,
    ValidJson(body): ValidJson<EventBody>,
) -> WebResult<StatusCode> {
    review_event(state, identity, bus, body, EventSubtype::DeleteFilmReview, review_id).await
}

/// `POST /api/v1/films/reviews/{review_id}/rating`
pub async fn create_review_rating(
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
    identity: Identity,
    bus: BusChoice,
    ValidJson(body): ValidJson<EventBody>,
) -> WebResult<StatusCode> {
    review_event(state, identity, bus, body, EventSubtype::CreateFilmReviewRating, review_id)
        .await
}

/// `PATCH /api/v1/films/reviews/{review_id}/rating`
pub async fn update_review_rating(
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
    identity: Identity,
    bus: BusChoice,
    ValidJson(body): ValidJson<EventBody>,
) -> WebResult<StatusCode> {
    review_event(state, identity, bus, body, EventSubtype::UpdateFilmReviewRating, review_id)
        .await
}

/// `DELETE /api/v1/films/reviews/{review_id}/rating`
pub async fn delete_review_rating(
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
    identity: Identity,
    bus: BusChoice,
    ValidJson(body): ValidJson<EventBody>,
) -> WebResult<StatusCode> {
    review_event(state, identity, bus, body, EventSubtype::DeleteFilmReviewRating, review_id)
        .await
}

/// `POST /api/v1/films/{film_id}/bookmarks`
pub async fn create_bookmark(
    State(state): State<AppState>,
    Path(film_id): Path<Uuid>,
    identity: Identity,
    bus: BusChoice,
    ValidJson(body): ValidJson<EventBody>,
) -> WebResult<StatusCode> {
    film_event(state, identity, bus, body, EventSubtype::CreateBookmark, film_id).await
}

/// `DELETE /api/v1/films/{film_id}/bookmarks`
pub async fn delete_bookmark(
    State(state): State<AppState>,
    Path(film_id): Path<Uuid>,
    identity: Identity,
    bus: BusChoice,
    ValidJson(body): ValidJson<EventBody>,
) -> WebResult<StatusCode> {
    film_event(state, identity, bus, body, EventSubtype::DeleteBookmark, film_id).await
}
