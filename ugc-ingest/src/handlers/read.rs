//! Read-side endpoints serving UGC state from the document store.

use crate::extract::Identity;
use crate::state::AppState;
use crate::WebResult;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ugc_mongo::documents::RatingSummary;
use uuid::Uuid;

/// `skip`/`limit` query parameters shared by the list endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    /// Rows to skip.
    pub skip: Option<u64>,
    /// Maximum rows to return.
    pub limit: Option<i64>,
}

/// Counter view shared by rating responses; hides the internal sum.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RatingBody {
    /// Count of ratings equal to 10.
    pub like_count: i64,
    /// Count of ratings equal to 0.
    pub dislike_count: i64,
    /// Arithmetic mean; 0 when nobody rated.
    pub avg_rating: f64,
    /// Number of contributing rows.
    pub value_count: i64,
}

impl From<RatingSummary> for RatingBody {
    fn from(summary: RatingSummary) -> Self {
        Self {
            like_count: summary.like_count,
            dislike_count: summary.dislike_count,
            avg_rating: summary.avg_rating,
            value_count: summary.value_count,
        }
    }
}

/// Response of `GET /films/{film_id}/rating`.
#[derive(Debug, Clone, Serialize)]
pub struct FilmRatingBody {
    /// The film in question.
    pub film_id: Uuid,
    /// Count of ratings equal to 10.
    pub like_count: i64,
    /// Count of ratings equal to 0.
    pub dislike_count: i64,
    /// Arithmetic mean; 0 when nobody rated.
    pub avg_rating: f64,
}

/// One review in the `GET /films/{film_id}/reviews` response.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewBody {
    /// Stable review identity.
    pub review_id: String,
    /// The reviewing user.
    pub user_id: String,
    /// Review text.
    pub value: String,
    /// The review's own rating aggregate (zeros when nobody rated it).
    pub rating: RatingBody,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Response of `GET /films/{film_id}/reviews`.
#[derive(Debug, Clone, Serialize)]
pub struct FilmReviewsBody {
    /// The film in question.
    pub film_id: Uuid,
    /// Its reviews, joined with their aggregates.
    pub reviews: Vec<ReviewBody>,
}

/// One bookmark in the `GET /films/bookmarks` response.
#[derive(Debug, Clone, Serialize)]
pub struct BookmarkBody {
    /// The bookmarked film.
    pub film_id: String,
    /// When it was bookmarked.
    pub created_at: DateTime<Utc>,
}

/// `GET /api/v1/films/{film_id}/rating`
pub async fn film_rating(
    State(state): State<AppState>,
    Path(film_id): Path<Uuid>,
    _identity: Identity,
) -> WebResult<Json<FilmRatingBody>> {
    let summary = state
        .reader
        .film_rating(&film_id.to_string())
        .await?
        .map_or(RatingSummary::ZERO, |rating| rating.summary);

    Ok(Json(FilmRatingBody {
        film_id,
        like_count: summary.like_count,
        dislike_count: summary.dislike_count,
        avg_rating: summary.avg_rating,
    }))
}

/// `GET /api/v1/films/{film_id}/reviews`
pub async fn film_reviews(
    State(state): State<AppState>,
    Path(film_id): Path<Uuid>,
    Query(page): Query<Pagination>,
    _identity: Identity,
) -> WebResult<Json<FilmReviewsBody>> {
    let reviews = state
        .reader
        .film_reviews(&film_id.to_string(), page.skip, page.limit)
        .await?;

    let reviews = reviews
        .into_iter()
        .map(|review| ReviewBody {
            review_id: review.review_id,
            user_id: review.user_id,
            value: review.value,
            rating: review
                .rating
                .map_or(RatingSummary::ZERO, |rating| rating.summary)
                .into(),
            created_at: review.created_at,
            updated_at: review.updated_at,
        })
        .collect();

    Ok(Json(FilmReviewsBody { film_id, reviews }))
}

/// `GET /api/v1/films/bookmarks`
pub async fn user_bookmarks(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
    identity: Identity,
) -> WebResult<Json<Vec<BookmarkBody>>> {
    let bookmarks = state
        .reader
        .user_bookmarks(&identity.user_id.to_string(), page.skip, page.limit)
        .await?;

    Ok(Json(
        bookmarks
            .into_iter()
            .map(|bookmark| BookmarkBody {
                film_id: bookmark.film_id,
                created_at: bookmark.created_at,
            })
            .collect(),
    ))
}
