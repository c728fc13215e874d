//! Aggregate reconciliation.
//!
//! Recomputes every derived aggregate from its surviving primary rows and
//! rewrites the ones that drifted (torn writes on process death, manual
//! fiddling). Drift in the integer counters is compared exactly; the
//! float average is rewritten along with them.

use std::sync::Arc;
use ugc_mongo::documents::{FilmRating, FilmReviewRating, RatingSummary};
use ugc_mongo::store::{StoreError, UgcStore};

fn drifted(stored: &RatingSummary, expected: &RatingSummary) -> bool {
    stored.value_count != expected.value_count
        || stored.value_sum != expected.value_sum
        || stored.like_count != expected.like_count
        || stored.dislike_count != expected.dislike_count
}

/// Periodic aggregate repair over a [`UgcStore`].
pub struct Reconciler<S> {
    store: Arc<S>,
}

impl<S: UgcStore> Reconciler<S> {
    /// Wrap a store handle.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Recompute every film aggregate; returns how many drifted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failures.
    pub async fn reconcile_films(&self) -> Result<usize, StoreError> {
        let mut repaired = 0;
        for film_id in self.store.film_rating_ids().await? {
            let values = self.store.film_user_rating_values(&film_id).await?;
            let expected = RatingSummary::from_values(values);
            let stored = self
                .store
                .find_film_rating(&film_id)
                .await?
                .map_or(RatingSummary::ZERO, |rating| rating.summary);
            if drifted(&stored, &expected) {
                tracing::warn!(
                    film_id,
                    stored_count = stored.value_count,
                    expected_count = expected.value_count,
                    "film rating drifted, recomputing"
                );
                self.store
                    .upsert_film_rating(FilmRating { film_id, summary: expected })
                    .await?;
                repaired += 1;
            }
        }
        Ok(repaired)
    }

    /// Recompute every review aggregate; returns how many drifted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failures.
    pub async fn reconcile_reviews(&self) -> Result<usize, StoreError> {
        let mut repaired = 0;
        for review_id in self.store.film_review_rating_ids().await? {
            let values = self.store.film_review_user_rating_values(&review_id).await?;
            let expected = RatingSummary::from_values(values);
            let stored = self
                .store
                .find_film_review_rating(&review_id)
                .await?
                .map_or(RatingSummary::ZERO, |rating| rating.summary);
            if drifted(&stored, &expected) {
                tracing::warn!(
                    review_id,
                    stored_count = stored.value_count,
                    expected_count = expected.value_count,
                    "review rating drifted, recomputing"
                );
                self.store
                    .upsert_film_review_rating(FilmReviewRating { review_id, summary: expected })
                    .await?;
                repaired += 1;
            }
        }
        Ok(repaired)
    }

    /// One full pass over both aggregate families.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on backend failures.
    pub async fn run_once(&self) -> Result<usize, StoreError> {
        let repaired = self.reconcile_films().await? + self.reconcile_reviews().await?;
        if repaired > 0 {
            tracing::info!(repaired, "reconciliation repaired aggregates");
        } else {
            tracing::debug!("reconciliation found no drift");
        }
        Ok(repaired)
    }
}
