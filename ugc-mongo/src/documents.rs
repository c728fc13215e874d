//! Collection documents and the rating delta algebra.
//!
//! # Counter semantics
//!
//! For both derived aggregates, `like_count` counts ratings equal to 10,
//! `dislike_count` counts ratings equal to 0, `value_count` is the number
//! of contributing rows and `avg_rating` their arithmetic mean. The
//! persisted document keeps the integer `value_sum` next to the float
//! average so deltas never re-derive the sum from `avg_rating * count`
//! and accumulate float error; `avg_rating` is recomputed from the sum on
//! every write and `value_count = 0` always forces `avg_rating = 0`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One user's rating of one film. Keyed by `(film_id, user_id)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilmUserRating {
    /// The rated film.
    pub film_id: String,
    /// The rating user.
    pub user_id: String,
    /// Rating value, 0..=10.
    pub value: i32,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time; unset until the first update.
    pub updated_at: Option<DateTime<Utc>>,
}

/// One user's review of one film. Keyed by `(film_id, user_id)`; also
/// addressable by `review_id` (assigned at creation, stable under
/// redelivery) so review-rating events and the read-side join have a key
/// the clients can hold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilmReview {
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
    /// Last mutation time; unset until the first update.
    pub updated_at: Option<DateTime<Utc>>,
}

/// One user's rating of one review. Keyed by `(review_id, user_id)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilmReviewUserRating {
    /// The rated review.
    pub review_id: String,
    /// The rating user.
    pub user_id: String,
    /// Rating value, 0..=10.
    pub value: i32,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time; unset until the first update.
    pub updated_at: Option<DateTime<Utc>>,
}

/// A bookmarked film. Keyed by `(film_id, user_id)`; create/delete only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserBookmark {
    /// The bookmarked film.
    pub film_id: String,
    /// The owning user.
    pub user_id: String,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
}

/// The arithmetic summary every derived aggregate carries.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    /// Count of ratings equal to 10.
    pub like_count: i64,
    /// Count of ratings equal to 0.
    pub dislike_count: i64,
    /// Arithmetic mean of all contributing values; 0 when empty.
    pub avg_rating: f64,
    /// Number of contributing rows.
    pub value_count: i64,
    /// Integer sum of all contributing values.
    pub value_sum: i64,
}

impl Default for RatingSummary {
    fn default() -> Self {
        Self::ZERO
    }
}

impl RatingSummary {
    /// The empty summary.
    pub const ZERO: Self = Self {
        like_count: 0,
        dislike_count: 0,
        avg_rating: 0.0,
        value_count: 0,
        value_sum: 0,
    };

    /// Apply the delta for a newly created rating of `value`.
    pub fn apply_create(&mut self, value: i32) {
        self.value_count += 1;
        self.value_sum += i64::from(value);
        if value == 10 {
            self.like_count += 1;
        }
        if value == 0 {
            self.dislike_count += 1;
        }
        self.renormalize();
    }

    /// Apply the delta for a rating changed from `old` to `new`.
    pub fn apply_update(&mut self, old: i32, new: i32) {
        self.value_sum += i64::from(new) - i64::from(old);
        if old == 10 {
            self.like_count -= 1;
        }
        if old == 0 {
            self.dislike_count -= 1;
        }
        if new == 10 {
            self.like_count += 1;
        }
        if new == 0 {
            self.dislike_count += 1;
        }
        self.renormalize();
    }

    /// Apply the delta for a deleted rating of `old`.
    pub fn apply_delete(&mut self, old: i32) {
        self.value_count -= 1;
        self.value_sum -= i64::from(old);
        if old == 10 {
            self.like_count -= 1;
        }
        if old == 0 {
            self.dislike_count -= 1;
        }
        self.renormalize();
    }

    /// The summary of a set of surviving rating values; the reconciliation
    /// baseline the incremental path must always agree with.
    #[must_use]
    pub fn from_values<I: IntoIterator<Item = i32>>(values: I) -> Self {
        let mut summary = Self::ZERO;
        for value in values {
            summary.apply_create(value);
        }
        summary
    }

    fn renormalize(&mut self) {
        // A negative counter means a delta was applied against state that
        // never existed; clamp and let the reconciler restore the truth.
        if self.value_count < 0 || self.like_count < 0 || self.dislike_count < 0 {
            tracing::warn!(
                value_count = self.value_count,
                like_count = self.like_count,
                dislike_count = self.dislike_count,
                "rating counters went negative, clamping"
            );
            self.value_count = self.value_count.max(0);
            self.like_count = self.like_count.max(0);
            self.dislike_count = self.dislike_count.max(0);
        }
        if self.value_count == 0 {
            self.value_sum = 0;
            self.avg_rating = 0.0;
        } else {
            self.avg_rating = self.value_sum as f64 / self.value_count as f64;
        }
    }
}

/// Derived per-film aggregate, maintained only by the NoSQL ETL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilmRating {
    /// The owning film.
    pub film_id: String,
    /// Counter state.
    #[serde(flatten)]
    pub summary: RatingSummary,
}

/// Derived per-review aggregate, maintained only by the NoSQL ETL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilmReviewRating {
    /// The owning review.
    pub review_id: String,
    /// Counter state.
    #[serde(flatten)]
    pub summary: RatingSummary,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn create_tracks_likes_dislikes_and_average() {
        let mut summary = RatingSummary::ZERO;
        summary.apply_create(10);
        assert_eq!(summary.like_count, 1);
        assert_eq!(summary.dislike_count, 0);
        assert_eq!(summary.value_count, 1);
        assert!((summary.avg_rating - 10.0).abs() < f64::EPSILON);

        summary.apply_create(0);
        assert_eq!(summary.like_count, 1);
        assert_eq!(summary.dislike_count, 1);
        assert_eq!(summary.value_count, 2);
        assert!((summary.avg_rating - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn midrange_values_leave_like_and_dislike_alone() {
        let mut summary = RatingSummary::ZERO;
        for value in 1..=9 {
            summary.apply_create(value);
        }
        assert_eq!(summary.like_count, 0);
        assert_eq!(summary.dislike_count, 0);
        assert_eq!(summary.value_count, 9);
        assert!((summary.avg_rating - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn update_adjusts_both_endpoints_independently() {
        let mut summary = RatingSummary::ZERO;
        summary.apply_create(10);
        summary.apply_update(10, 0);
        assert_eq!(summary.like_count, 0);
        assert_eq!(summary.dislike_count, 1);
        assert_eq!(summary.value_count, 1);
        assert!((summary.avg_rating - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn last_delete_forces_average_to_zero() {
        let mut summary = RatingSummary::ZERO;
        summary.apply_create(7);
        summary.apply_delete(7);
        assert_eq!(summary.value_count, 0);
        assert_eq!(summary.value_sum, 0);
        assert!((summary.avg_rating - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn counters_never_go_negative() {
        let mut summary = RatingSummary::ZERO;
        summary.apply_delete(10);
        assert_eq!(summary.value_count, 0);
        assert_eq!(summary.like_count, 0);
        assert!((summary.avg_rating - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fold_of_deltas_matches_summary_of_survivors() {
        // create 10, create 0, create 7, update 7 -> 3, delete 0
        let mut incremental = RatingSummary::ZERO;
        incremental.apply_create(10);
        incremental.apply_create(0);
        incremental.apply_create(7);
        incremental.apply_update(7, 3);
        incremental.apply_delete(0);

        let survivors = RatingSummary::from_values([10, 3]);
        assert_eq!(incremental, survivors);
    }

    #[test]
    fn rate_patch_delete_lifecycle() {
        // rate 10, patch to 0, delete
        let mut summary = RatingSummary::ZERO;
        summary.apply_create(10);
        assert_eq!((summary.like_count, summary.dislike_count, summary.value_count), (1, 0, 1));
        assert!((summary.avg_rating - 10.0).abs() < f64::EPSILON);

        summary.apply_update(10, 0);
        assert_eq!((summary.like_count, summary.dislike_count, summary.value_count), (0, 1, 1));
        assert!((summary.avg_rating - 0.0).abs() < f64::EPSILON);

        summary.apply_delete(0);
        assert_eq!((summary.like_count, summary.dislike_count, summary.value_count), (0, 0, 0));
        assert!((summary.avg_rating - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_flattens_into_aggregate_documents() {
        let rating = FilmRating {
            film_id: "f1".to_string(),
            summary: RatingSummary::from_values([10, 10, 0]),
        };
        let json = serde_json::to_value(&rating).unwrap();
        assert_eq!(json["film_id"], "f1");
        assert_eq!(json["like_count"], 2);
        assert_eq!(json["dislike_count"], 1);
        assert_eq!(json["value_count"], 3);
    }
}
