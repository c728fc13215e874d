//! Read-side queries for the UGC HTTP API.
//!
//! These are thin, read-only lookups against the same collections the
//! NoSQL ETL maintains; the HTTP layer shapes the responses.

use crate::documents::{FilmRating, FilmReviewRating, UserBookmark};
use crate::store::{collections, MongoStore, StoreError, UgcStore};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, from_document, Document};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;

/// One review joined with its derived rating aggregate.
///
/// `rating` is `None` when nobody has rated the review yet; the HTTP layer
/// synthesizes zeros.
#[derive(Clone, Debug, Deserialize)]
pub struct ReviewWithRating {
    /// Stable review identity.
    pub review_id: String,
    /// The reviewed film.
    pub film_id: String,
    /// The reviewing user.
    pub user_id: String,
    /// Review text.
    pub value: String,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: Option<DateTime<Utc>>,
    /// Derived aggregate, when present.
    pub rating: Option<FilmReviewRating>,
}

/// Read-only view served by the HTTP API.
///
/// Dyn-compatible (explicit boxed futures) so the web layer can hold an
/// `Arc<dyn UgcReader>` and tests can substitute an in-memory view.
pub trait UgcReader: Send + Sync {
    /// The derived rating of one film, when present.
    fn film_rating(
        &self,
        film_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<FilmRating>, StoreError>> + Send + '_>>;

    /// Reviews of one film joined with their rating aggregates, paginated.
    fn film_reviews(
        &self,
        film_id: &str,
        skip: Option<u64>,
        limit: Option<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ReviewWithRating>, StoreError>> + Send + '_>>;

    /// One user's bookmarks, paginated.
    fn user_bookmarks(
        &self,
        user_id: &str,
        skip: Option<u64>,
        limit: Option<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<UserBookmark>, StoreError>> + Send + '_>>;
}

impl UgcReader for MongoStore {
    fn film_rating(
        &self,
        film_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<FilmRating>, StoreError>> + Send + '_>> {
        let film_id = film_id.to_string();
        Box::pin(async move { MongoStore::film_rating(self, &film_id).await })
    }

    fn film_reviews(
        &self,
        film_id: &str,
        skip: Option<u64>,
        limit: Option<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ReviewWithRating>, StoreError>> + Send + '_>> {
        let film_id = film_id.to_string();
        Box::pin(async move { MongoStore::film_reviews(self, &film_id, skip, limit).await })
    }

    fn user_bookmarks(
        &self,
        user_id: &str,
        skip: Option<u64>,
        limit: Option<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<UserBookmark>, StoreError>> + Send + '_>> {
        let user_id = user_id.to_string();
        Box::pin(async move { MongoStore::user_bookmarks(self, &user_id, skip, limit).await })
    }
}

impl MongoStore {
    /// The derived rating of one film, when present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failures.
    pub async fn film_rating(&self, film_id: &str) -> Result<Option<FilmRating>, StoreError> {
        self.find_film_rating(film_id).await
    }

    /// Reviews of one film joined with their rating aggregates, paginated.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failures or when a stored document
    /// does not decode ([`StoreError::ShapeMismatch`]).
    pub async fn film_reviews(
        &self,
        film_id: &str,
        skip: Option<u64>,
        limit: Option<i64>,
    ) -> Result<Vec<ReviewWithRating>, StoreError> {
        let mut pipeline = vec![
            doc! { "$match": { "film_id": film_id } },
            doc! { "$lookup": {
                "from": collections::FILM_REVIEW_RATING,
                "localField": "review_id",
                "foreignField": "review_id",
                "as": "rating",
            } },
            doc! { "$unwind": {
                "path": "$rating",
                "preserveNullAndEmptyArrays": true,
            } },
        ];
        if let Some(skip) = skip {
            pipeline.push(doc! { "$skip": i64::try_from(skip).unwrap_or(i64::MAX) });
        }
        if let Some(limit) = limit {
            pipeline.push(doc! { "$limit": limit });
        }

        let raw: Vec<Document> = self
            .database()
            .collection::<Document>(collections::FILM_REVIEW)
            .aggregate(pipeline)
            .await?
            .try_collect()
            .await?;

        raw.into_iter()
            .map(|document| {
                from_document(document).map_err(|e| StoreError::ShapeMismatch {
                    collection: collections::FILM_REVIEW.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    /// One user's bookmarks, paginated.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failures.
    pub async fn user_bookmarks(
        &self,
        user_id: &str,
        skip: Option<u64>,
        limit: Option<i64>,
    ) -> Result<Vec<UserBookmark>, StoreError> {
        let collection = self
            .database()
            .collection::<UserBookmark>(collections::USER_BOOKMARK);
        let mut find = collection.find(doc! { "user_id": user_id });
        if let Some(skip) = skip {
            find = find.skip(skip);
        }
        if let Some(limit) = limit {
            find = find.limit(limit);
        }
        let bookmarks = find.await?.try_collect().await?;
        Ok(bookmarks)
    }
}
