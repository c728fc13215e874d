//! The document-store contract and its MongoDB implementation.
//!
//! The NoSQL ETL writes through [`UgcStore`] so the aggregate logic can be
//! exercised against an in-memory store in tests; [`MongoStore`] is the
//! production backend. Every operation is keyed and idempotent at the
//! caller's level: replays after a crash re-issue the same keyed writes.

use crate::documents::{
    FilmRating, FilmReview, FilmReviewRating, FilmReviewUserRating, FilmUserRating, UserBookmark,
};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::{Client, Collection, Database};
use thiserror::Error;

/// Errors from the document store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("document store error: {0}")]
    Backend(String),

    /// A stored document did not match the expected shape (schema drift).
    ///
    /// The ETL treats this as fatal so an operator notices.
    #[error("document shape mismatch in {collection}: {reason}")]
    ShapeMismatch {
        /// Collection holding the offending document.
        collection: String,
        /// Decoder error text.
        reason: String,
    },
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        // A document that no longer decodes is schema drift, not a
        // transient failure; callers treat it as fatal.
        if let mongodb::error::ErrorKind::BsonDeserialization(ref reason) = *err.kind {
            return Self::ShapeMismatch {
                collection: "unknown".to_string(),
                reason: reason.to_string(),
            };
        }
        Self::Backend(err.to_string())
    }
}

/// Capability contract over the six UGC collections.
///
/// Implementations: [`MongoStore`] (production) and the in-memory store in
/// `ugc-testing`. All methods are keyed lookups or keyed writes; none of
/// them cross a collection boundary (the cascade on review deletion is
/// sequenced by the caller).
#[allow(async_fn_in_trait, missing_docs)]
pub trait UgcStore: Send + Sync {
    // FilmUserRating, keyed by (film_id, user_id)
    async fn find_film_user_rating(
        &self,
        film_id: &str,
        user_id: &str,
    ) -> Result<Option<FilmUserRating>, StoreError>;
    async fn insert_film_user_rating(&self, row: FilmUserRating) -> Result<(), StoreError>;
    async fn update_film_user_rating(
        &self,
        film_id: &str,
        user_id: &str,
        value: i32,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn delete_film_user_rating(&self, film_id: &str, user_id: &str)
        -> Result<(), StoreError>;
    /// Surviving rating values for one film, for reconciliation.
    async fn film_user_rating_values(&self, film_id: &str) -> Result<Vec<i32>, StoreError>;

    // FilmReview, keyed by review_id, owned by (film_id, user_id)
    async fn find_film_review(&self, review_id: &str) -> Result<Option<FilmReview>, StoreError>;
    async fn find_film_review_by_owner(
        &self,
        film_id: &str,
        user_id: &str,
    ) -> Result<Option<FilmReview>, StoreError>;
    async fn insert_film_review(&self, row: FilmReview) -> Result<(), StoreError>;
    async fn update_film_review(
        &self,
        review_id: &str,
        value: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn delete_film_review(&self, review_id: &str) -> Result<(), StoreError>;

    // FilmReviewUserRating, keyed by (review_id, user_id)
    async fn find_film_review_user_rating(
        &self,
        review_id: &str,
        user_id: &str,
    ) -> Result<Option<FilmReviewUserRating>, StoreError>;
    async fn insert_film_review_user_rating(
        &self,
        row: FilmReviewUserRating,
    ) -> Result<(), StoreError>;
    async fn update_film_review_user_rating(
        &self,
        review_id: &str,
        user_id: &str,
        value: i32,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn delete_film_review_user_rating(
        &self,
        review_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError>;
    /// Cascade half of review deletion: drop every rating of the review.
    async fn delete_film_review_user_ratings(&self, review_id: &str) -> Result<u64, StoreError>;
    /// Surviving rating values for one review, for reconciliation.
    async fn film_review_user_rating_values(&self, review_id: &str)
        -> Result<Vec<i32>, StoreError>;

    // UserBookmark, keyed by (film_id, user_id)
    async fn find_user_bookmark(
        &self,
        film_id: &str,
        user_id: &str,
    ) -> Result<Option<UserBookmark>, StoreError>;
    async fn insert_user_bookmark(&self, row: UserBookmark) -> Result<(), StoreError>;
    async fn delete_user_bookmark(&self, film_id: &str, user_id: &str) -> Result<(), StoreError>;

    // Derived aggregates, owned by the object; written only by the NoSQL ETL
    async fn find_film_rating(&self, film_id: &str) -> Result<Option<FilmRating>, StoreError>;
    async fn upsert_film_rating(&self, rating: FilmRating) -> Result<(), StoreError>;
    /// All film ids that currently carry a derived aggregate.
    async fn film_rating_ids(&self) -> Result<Vec<String>, StoreError>;

    async fn find_film_review_rating(
        &self,
        review_id: &str,
    ) -> Result<Option<FilmReviewRating>, StoreError>;
    async fn upsert_film_review_rating(&self, rating: FilmReviewRating)
        -> Result<(), StoreError>;
    async fn delete_film_review_rating(&self, review_id: &str) -> Result<(), StoreError>;
    /// All review ids that currently carry a derived aggregate.
    async fn film_review_rating_ids(&self) -> Result<Vec<String>, StoreError>;
}

/// Collection names, shared with the read side.
pub(crate) mod collections {
    pub const FILM_USER_RATING: &str = "FilmUserRating";
    pub const FILM_REVIEW: &str = "FilmReview";
    pub const FILM_REVIEW_USER_RATING: &str = "FilmReviewUserRating";
    pub const USER_BOOKMARK: &str = "UserBookmark";
    pub const FILM_RATING: &str = "FilmRating";
    pub const FILM_REVIEW_RATING: &str = "FilmReviewRating";
}

/// MongoDB-backed [`UgcStore`]; one pooled client per process.
#[derive(Clone, Debug)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// Connect to `url` and select `database`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the URL cannot be parsed.
    /// Connectivity is only proven by [`MongoStore::ping`].
    pub async fn connect(url: &str, database: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(url).await?;
        Ok(Self { db: client.database(database) })
    }

    /// Round-trip to the server.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the server is unreachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    /// The underlying database handle (read-side queries build on it).
    #[must_use]
    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    fn col<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }
}

impl UgcStore for MongoStore {
    async fn find_film_user_rating(
        &self,
        film_id: &str,
        user_id: &str,
    ) -> Result<Option<FilmUserRating>, StoreError> {
        let found = self
            .col::<FilmUserRating>(collections::FILM_USER_RATING)
            .find_one(doc! { "film_id": film_id, "user_id": user_id })
            .await?;
        Ok(found)
    }

    async fn insert_film_user_rating(&self, row: FilmUserRating) -> Result<(), StoreError> {
        self.col::<FilmUserRating>(collections::FILM_USER_RATING)
            .insert_one(row)
            .await?;
        Ok(())
    }

    async fn update_film_user_rating(
        &self,
        film_id: &str,
        user_id: &str,
        value: i32,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.col::<FilmUserRating>(collections::FILM_USER_RATING)
            .update_one(
                doc! { "film_id": film_id, "user_id": user_id },
                doc! { "$set": { "value": value, "updated_at": updated_at.to_rfc3339() } },
            )
            .await?;
        Ok(())
    }

    async fn delete_film_user_rating(
        &self,
        film_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        self.col::<FilmUserRating>(collections::FILM_USER_RATING)
            .delete_one(doc! { "film_id": film_id, "user_id": user_id })
            .await?;
        Ok(())
    }

    async fn film_user_rating_values(&self, film_id: &str) -> Result<Vec<i32>, StoreError> {
        let rows: Vec<FilmUserRating> = self
            .col::<FilmUserRating>(collections::FILM_USER_RATING)
            .find(doc! { "film_id": film_id })
            .await?
            .try_collect()
            .await?;
        Ok(rows.into_iter().map(|r| r.value).collect())
    }

    async fn find_film_review(&self, review_id: &str) -> Result<Option<FilmReview>, StoreError> {
        let found = self
            .col::<FilmReview>(collections::FILM_REVIEW)
            .find_one(doc! { "review_id": review_id })
            .await?;
        Ok(found)
    }

    async fn find_film_review_by_owner(
        &self,
        film_id: &str,
        user_id: &str,
    ) -> Result<Option<FilmReview>, StoreError> {
        let found = self
            .col::<FilmReview>(collections::FILM_REVIEW)
            .find_one(doc! { "film_id": film_id, "user_id": user_id })
            .await?;
        Ok(found)
    }

    async fn insert_film_review(&self, row: FilmReview) -> Result<(), StoreError> {
        self.col::<FilmReview>(collections::FILM_REVIEW).insert_one(row).await?;
        Ok(())
    }

    async fn update_film_review(
        &self,
        review_id: &str,
        value: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.col::<FilmReview>(collections::FILM_REVIEW)
            .update_one(
                doc! { "review_id": review_id },
                doc! { "$set": { "value": value, "updated_at": updated_at.to_rfc3339() } },
            )
            .await?;
        Ok(())
    }

    async fn delete_film_review(&self, review_id: &str) -> Result<(), StoreError> {
        self.col::<FilmReview>(collections::FILM_REVIEW)
            .delete_one(doc! { "review_id": review_id })
            .await?;
        Ok(())
    }

    async fn find_film_review_user_rating(
        &self,
        review_id: &str,
        user_id: &str,
    ) -> Result<Option<FilmReviewUserRating>, StoreError> {
        let found = self
            .col::<FilmReviewUserRating>(collections::FILM_REVIEW_USER_RATING)
            .find_one(doc! { "review_id": review_id, "user_id": user_id })
            .await?;
        Ok(found)
    }

    async fn insert_film_review_user_rating(
        &self,
        row: FilmReviewUserRating,
    ) -> Result<(), StoreError> {
        self.col::<FilmReviewUserRating>(collections::FILM_REVIEW_USER_RATING)
            .insert_one(row)
            .await?;
        Ok(())
    }

    async fn update_film_review_user_rating(
        &self,
        review_id: &str,
        user_id: &str,
        value: i32,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.col::<FilmReviewUserRating>(collections::FILM_REVIEW_USER_RATING)
            .update_one(
                doc! { "review_id": review_id, "user_id": user_id },
                doc! { "$set": { "value": value, "updated_at": updated_at.to_rfc3339() } },
            )
            .await?;
        Ok(())
    }

    async fn delete_film_review_user_rating(
        &self,
        review_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        self.col::<FilmReviewUserRating>(collections::FILM_REVIEW_USER_RATING)
            .delete_one(doc! { "review_id": review_id, "user_id": user_id })
            .await?;
        Ok(())
    }

    async fn delete_film_review_user_ratings(&self, review_id: &str) -> Result<u64, StoreError> {
        let result = self
            .col::<FilmReviewUserRating>(collections::FILM_REVIEW_USER_RATING)
            .delete_many(doc! { "review_id": review_id })
            .await?;
        Ok(result.deleted_count)
    }

    async fn film_review_user_rating_values(
        &self,
        review_id: &str,
    ) -> Result<Vec<i32>, StoreError> {
        let rows: Vec<FilmReviewUserRating> = self
            .col::<FilmReviewUserRating>(collections::FILM_REVIEW_USER_RATING)
            .find(doc! { "review_id": review_id })
            .await?
            .try_collect()
            .await?;
        Ok(rows.into_iter().map(|r| r.value).collect())
    }

    async fn find_user_bookmark(
        &self,
        film_id: &str,
        user_id: &str,
    ) -> Result<Option<UserBookmark>, StoreError> {
        let found = self
            .col::<UserBookmark>(collections::USER_BOOKMARK)
            .find_one(doc! { "film_id": film_id, "user_id": user_id })
            .await?;
        Ok(found)
    }

    async fn insert_user_bookmark(&self, row: UserBookmark) -> Result<(), StoreError> {
        self.col::<UserBookmark>(collections::USER_BOOKMARK).insert_one(row).await?;
        Ok(())
    }

    async fn delete_user_bookmark(&self, film_id: &str, user_id: &str) -> Result<(), StoreError> {
        self.col::<UserBookmark>(collections::USER_BOOKMARK)
            .delete_one(doc! { "film_id": film_id, "user_id": user_id })
            .await?;
        Ok(())
    }

    async fn find_film_rating(&self, film_id: &str) -> Result<Option<FilmRating>, StoreError> {
        let found = self
            .col::<FilmRating>(collections::FILM_RATING)
            .find_one(doc! { "film_id": film_id })
            .await?;
        Ok(found)
    }

    async fn upsert_film_rating(&self, rating: FilmRating) -> Result<(), StoreError> {
        self.col::<FilmRating>(collections::FILM_RATING)
            .replace_one(doc! { "film_id": &rating.film_id }, &rating)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn film_rating_ids(&self) -> Result<Vec<String>, StoreError> {
        let rows: Vec<FilmRating> = self
            .col::<FilmRating>(collections::FILM_RATING)
            .find(doc! {})
            .await?
            .try_collect()
            .await?;
        Ok(rows.into_iter().map(|r| r.film_id).collect())
    }

    async fn find_film_review_rating(
        &self,
        review_id: &str,
    ) -> Result<Option<FilmReviewRating>, StoreError> {
        let found = self
            .col::<FilmReviewRating>(collections::FILM_REVIEW_RATING)
            .find_one(doc! { "review_id": review_id })
            .await?;
        Ok(found)
    }

    async fn upsert_film_review_rating(
        &self,
        rating: FilmReviewRating,
    ) -> Result<(), StoreError> {
        self.col::<FilmReviewRating>(collections::FILM_REVIEW_RATING)
            .replace_one(doc! { "review_id": &rating.review_id }, &rating)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn delete_film_review_rating(&self, review_id: &str) -> Result<(), StoreError> {
        self.col::<FilmReviewRating>(collections::FILM_REVIEW_RATING)
            .delete_one(doc! { "review_id": review_id })
            .await?;
        Ok(())
    }

    async fn film_review_rating_ids(&self) -> Result<Vec<String>, StoreError> {
        let rows: Vec<FilmReviewRating> = self
            .col::<FilmReviewRating>(collections::FILM_REVIEW_RATING)
            .find(doc! {})
            .await?
            .try_collect()
            .await?;
        Ok(rows.into_iter().map(|r| r.review_id).collect())
    }
}
