//! Applies domain operations to the document store.
//!
//! Ops are applied serially within a worker, so the deltas are race-free
//! against themselves; cross-worker safety comes from the producer keying
//! every aggregate-affecting event on its owning object id. Each op is
//! idempotent with respect to its key: a duplicate create/delete is a
//! warn-and-skip, a duplicate update rewrites the same values, so
//! redelivery never double-counts.
//!
//! The primary row and its derived aggregate are written in two steps;
//! the backing store only guarantees per-document atomicity, so a crash
//! between them can leave a torn counter until the reconciler repairs it.

use crate::op::UgcOp;
use chrono::Utc;
use std::sync::Arc;
use ugc_mongo::documents::{
    FilmRating, FilmReview, FilmReviewRating, FilmReviewUserRating, FilmUserRating, RatingSummary,
    UserBookmark,
};
use ugc_mongo::store::{StoreError, UgcStore};

/// Serial op applier over a [`UgcStore`].
pub struct Loader<S> {
    store: Arc<S>,
}

impl<S: UgcStore> Loader<S> {
    /// Wrap a store handle.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Apply one operation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failures; the caller retries the
    /// batch (every op here tolerates re-application).
    pub async fn apply(&self, op: &UgcOp) -> Result<(), StoreError> {
        match op {
            UgcOp::CreateFilmRating { film_id, user_id, value } => {
                self.create_film_rating(film_id, user_id, *value).await
            }
            UgcOp::UpdateFilmRating { film_id, user_id, value } => {
                self.update_film_rating(film_id, user_id, *value).await
            }
            UgcOp::DeleteFilmRating { film_id, user_id } => {
                self.delete_film_rating(film_id, user_id).await
            }
            UgcOp::CreateFilmReview { review_id, film_id, user_id, value } => {
                self.create_film_review(review_id, film_id, user_id, value).await
            }
            UgcOp::UpdateFilmReview { review_id, user_id, value } => {
                self.update_film_review(review_id, user_id, value).await
            }
            UgcOp::DeleteFilmReview { review_id, user_id } => {
                self.delete_film_review(review_id, user_id).await
            }
            UgcOp::CreateFilmReviewRating { review_id, user_id, value } => {
                self.create_review_rating(review_id, user_id, *value).await
            }
            UgcOp::UpdateFilmReviewRating { review_id, user_id, value } => {
                self.update_review_rating(review_id, user_id, *value).await
            }
            UgcOp::DeleteFilmReviewRating { review_id, user_id } => {
                self.delete_review_rating(review_id, user_id).await
            }
            UgcOp::CreateBookmark { film_id, user_id } => {
                self.create_bookmark(film_id, user_id).await
            }
            UgcOp::DeleteBookmark { film_id, user_id } => {
                self.delete_bookmark(film_id, user_id).await
            }
        }
    }

    async fn mutate_film_rating(
        &self,
        film_id: &str,
        mutate: impl FnOnce(&mut RatingSummary),
    ) -> Result<(), StoreError> {
        let mut aggregate = self
            .store
            .find_film_rating(film_id)
            .await?
            .unwrap_or_else(|| FilmRating {
                film_id: film_id.to_string(),
                summary: RatingSummary::ZERO,
            });
        mutate(&mut aggregate.summary);
        self.store.upsert_film_rating(aggregate).await
    }

    async fn mutate_review_rating(
        &self,
        review_id: &str,
        mutate: impl FnOnce(&mut RatingSummary),
    ) -> Result<(), StoreError> {
        let mut aggregate = self
            .store
            .find_film_review_rating(review_id)
            .await?
            .unwrap_or_else(|| FilmReviewRating {
                review_id: review_id.to_string(),
                summary: RatingSummary::ZERO,
            });
        mutate(&mut aggregate.summary);
        self.store.upsert_film_review_rating(aggregate).await
    }

    async fn create_film_rating(
        &self,
        film_id: &str,
        user_id: &str,
        value: i32,
    ) -> Result<(), StoreError> {
        if self.store.find_film_user_rating(film_id, user_id).await?.is_some() {
            tracing::warn!(film_id, user_id, "FilmUserRating already exists, skipped");
            return Ok(());
        }
        self.store
            .insert_film_user_rating(FilmUserRating {
                film_id: film_id.to_string(),
                user_id: user_id.to_string(),
                value,
                created_at: Utc::now(),
                updated_at: None,
            })
            .await?;
        self.mutate_film_rating(film_id, |summary| summary.apply_create(value)).await
    }

    async fn update_film_rating(
        &self,
        film_id: &str,
        user_id: &str,
        value: i32,
    ) -> Result<(), StoreError> {
        let Some(existing) = self.store.find_film_user_rating(film_id, user_id).await? else {
            tracing::warn!(film_id, user_id, "FilmUserRating not found, update skipped");
            return Ok(());
        };
        let old = existing.value;
        self.store
            .update_film_user_rating(film_id, user_id, value, Utc::now())
            .await?;
        self.mutate_film_rating(film_id, |summary| summary.apply_update(old, value)).await
    }

    async fn delete_film_rating(&self, film_id: &str, user_id: &str) -> Result<(), StoreError> {
        let Some(existing) = self.store.find_film_user_rating(film_id, user_id).await? else {
            tracing::warn!(film_id, user_id, "FilmUserRating not found, delete skipped");
            return Ok(());
        };
        self.store.delete_film_user_rating(film_id, user_id).await?;
        self.mutate_film_rating(film_id, |summary| summary.apply_delete(existing.value)).await
    }

    async fn create_film_review(
        &self,
        review_id: &str,
        film_id: &str,
        user_id: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        if self.store.find_film_review_by_owner(film_id, user_id).await?.is_some() {
            tracing::warn!(film_id, user_id, "FilmReview already exists, skipped");
            return Ok(());
        }
        self.store
            .insert_film_review(FilmReview {
                review_id: review_id.to_string(),
                film_id: film_id.to_string(),
                user_id: user_id.to_string(),
                value: value.to_string(),
                created_at: Utc::now(),
                updated_at: None,
            })
            .await
    }

    async fn update_film_review(
        &self,
        review_id: &str,
        user_id: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        if self.store.find_film_review(review_id).await?.is_none() {
            tracing::warn!(review_id, user_id, "FilmReview not found, update skipped");
            return Ok(());
        }
        self.store.update_film_review(review_id, value, Utc::now()).await
    }

    /// Best-effort cascade: the review first, then its ratings, then the
    /// derived aggregate. Each step is keyed and idempotent, so a crash
    /// in between is safe to replay.
    async fn delete_film_review(&self, review_id: &str, user_id: &str) -> Result<(), StoreError> {
        if self.store.find_film_review(review_id).await?.is_none() {
            tracing::warn!(review_id, user_id, "FilmReview not found, delete skipped");
            return Ok(());
        }
        self.store.delete_film_review(review_id).await?;
        let dropped = self.store.delete_film_review_user_ratings(review_id).await?;
        self.store.delete_film_review_rating(review_id).await?;
        tracing::info!(review_id, dropped_ratings = dropped, "review cascade deleted");
        Ok(())
    }

    async fn create_review_rating(
        &self,
        review_id: &str,
        user_id: &str,
        value: i32,
    ) -> Result<(), StoreError> {
        if self
            .store
            .find_film_review_user_rating(review_id, user_id)
            .await?
            .is_some()
        {
            tracing::warn!(review_id, user_id, "FilmReviewUserRating already exists, skipped");
            return Ok(());
        }
        self.store
            .insert_film_review_user_rating(FilmReviewUserRating {
                review_id: review_id.to_string(),
                user_id: user_id.to_string(),
                value,
                created_at: Utc::now(),
                updated_at: None,
            })
            .await?;
        self.mutate_review_rating(review_id, |summary| summary.apply_create(value)).await
    }

    async fn update_review_rating(
        &self,
        review_id: &str,
        user_id: &str,
        value: i32,
    ) -> Result<(), StoreError> {
        let Some(existing) = self
            .store
            .find_film_review_user_rating(review_id, user_id)
            .await?
        else {
            tracing::warn!(review_id, user_id, "FilmReviewUserRating not found, update skipped");
            return Ok(());
        };
        let old = existing.value;
        self.store
            .update_film_review_user_rating(review_id, user_id, value, Utc::now())
            .await?;
        self.mutate_review_rating(review_id, |summary| summary.apply_update(old, value)).await
    }

    async fn delete_review_rating(
        &self,
        review_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        let Some(existing) = self
            .store
            .find_film_review_user_rating(review_id, user_id)
            .await?
        else {
            tracing::warn!(review_id, user_id, "FilmReviewUserRating not found, delete skipped");
            return Ok(());
        };
        self.store.delete_film_review_user_rating(review_id, user_id).await?;
        self.mutate_review_rating(review_id, |summary| summary.apply_delete(existing.value))
            .await
    }

    async fn create_bookmark(&self, film_id: &str, user_id: &str) -> Result<(), StoreError> {
        if self.store.find_user_bookmark(film_id, user_id).await?.is_some() {
            tracing::warn!(film_id, user_id, "UserBookmark already exists, skipped");
            return Ok(());
        }
        self.store
            .insert_user_bookmark(UserBookmark {
                film_id: film_id.to_string(),
                user_id: user_id.to_string(),
                created_at: Utc::now(),
            })
            .await
    }

    async fn delete_bookmark(&self, film_id: &str, user_id: &str) -> Result<(), StoreError> {
        if self.store.find_user_bookmark(film_id, user_id).await?.is_none() {
            tracing::warn!(film_id, user_id, "UserBookmark not found, delete skipped");
            return Ok(());
        }
        self.store.delete_user_bookmark(film_id, user_id).await
    }
}
