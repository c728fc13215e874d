//! In-memory document store implementing the UGC store contract.

use crate::lock;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use ugc_mongo::documents::{
    FilmRating, FilmReview, FilmReviewRating, FilmReviewUserRating, FilmUserRating, UserBookmark,
};
use ugc_mongo::read::{ReviewWithRating, UgcReader};
use ugc_mongo::store::{StoreError, UgcStore};

/// HashMap-backed [`UgcStore`] with the same keying as the Mongo
/// collections.
#[derive(Default)]
pub struct InMemoryStore {
    film_user_ratings: Mutex<HashMap<(String, String), FilmUserRating>>,
    film_reviews: Mutex<HashMap<String, FilmReview>>,
    film_review_user_ratings: Mutex<HashMap<(String, String), FilmReviewUserRating>>,
    bookmarks: Mutex<HashMap<(String, String), UserBookmark>>,
    film_ratings: Mutex<HashMap<String, FilmRating>>,
    film_review_ratings: Mutex<HashMap<String, FilmReviewRating>>,
}

impl InMemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl UgcStore for InMemoryStore {
    async fn find_film_user_rating(
        &self,
        film_id: &str,
        user_id: &str,
    ) -> Result<Option<FilmUserRating>, StoreError> {
        Ok(lock(&self.film_user_ratings)
            .get(&(film_id.to_string(), user_id.to_string()))
            .cloned())
    }

    async fn insert_film_user_rating(&self, row: FilmUserRating) -> Result<(), StoreError> {
        lock(&self.film_user_ratings)
            .insert((row.film_id.clone(), row.user_id.clone()), row);
        Ok(())
    }

    async fn update_film_user_rating(
        &self,
        film_id: &str,
        user_id: &str,
        value: i32,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(row) = lock(&self.film_user_ratings)
            .get_mut(&(film_id.to_string(), user_id.to_string()))
        {
            row.value = value;
            row.updated_at = Some(updated_at);
        }
        Ok(())
    }

    async fn delete_film_user_rating(
        &self,
        film_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        lock(&self.film_user_ratings).remove(&(film_id.to_string(), user_id.to_string()));
        Ok(())
    }

    async fn film_user_rating_values(&self, film_id: &str) -> Result<Vec<i32>, StoreError> {
        Ok(lock(&self.film_user_ratings)
            .values()
            .filter(|row| row.film_id == film_id)
            .map(|row| row.value)
            .collect())
    }

    async fn find_film_review(&self, review_id: &str) -> Result<Option<FilmReview>, StoreError> {
        Ok(lock(&self.film_reviews).get(review_id).cloned())
    }

    async fn find_film_review_by_owner(
        &self,
        film_id: &str,
        user_id: &str,
    ) -> Result<Option<FilmReview>, StoreError> {
        Ok(lock(&self.film_reviews)
            .values()
            .find(|row| row.film_id == film_id && row.user_id == user_id)
            .cloned())
    }

    async fn insert_film_review(&self, row: FilmReview) -> Result<(), StoreError> {
        lock(&self.film_reviews).insert(row.review_id.clone(), row);
        Ok(())
    }

    async fn update_film_review(
        &self,
        review_id: &str,
        value: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(row) = lock(&self.film_reviews).get_mut(review_id) {
            row.value = value.to_string();
            row.updated_at = Some(updated_at);
        }
        Ok(())
    }

    async fn delete_film_review(&self, review_id: &str) -> Result<(), StoreError> {
        lock(&self.film_reviews).remove(review_id);
        Ok(())
    }

    async fn find_film_review_user_rating(
        &self,
        review_id: &str,
        user_id: &str,
    ) -> Result<Option<FilmReviewUserRating>, StoreError> {
        Ok(lock(&self.film_review_user_ratings)
            .get(&(review_id.to_string(), user_id.to_string()))
            .cloned())
    }

    async fn insert_film_review_user_rating(
        &self,
        row: FilmReviewUserRating,
    ) -> Result<(), StoreError> {
        lock(&self.film_review_user_ratings)
            .insert((row.review_id.clone(), row.user_id.clone()), row);
        Ok(())
    }

    async fn update_film_review_user_rating(
        &self,
        review_id: &str,
        user_id: &str,
        value: i32,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(row) = lock(&self.film_review_user_ratings)
            .get_mut(&(review_id.to_string(), user_id.to_string()))
        {
            row.value = value;
            row.updated_at = Some(updated_at);
        }
        Ok(())
    }

    async fn delete_film_review_user_rating(
        &self,
        review_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        lock(&self.film_review_user_ratings)
            .remove(&(review_id.to_string(), user_id.to_string()));
        Ok(())
    }

    async fn delete_film_review_user_ratings(&self, review_id: &str) -> Result<u64, StoreError> {
        let mut ratings = lock(&self.film_review_user_ratings);
        let before = ratings.len();
        ratings.retain(|(rid, _), _| rid != review_id);
        Ok((before - ratings.len()) as u64)
    }

    async fn film_review_user_rating_values(
        &self,
        review_id: &str,
    ) -> Result<Vec<i32>, StoreError> {
        Ok(lock(&self.film_review_user_ratings)
            .values()
            .filter(|row| row.review_id == review_id)
            .map(|row| row.value)
            .collect())
    }

    async fn find_user_bookmark(
        &self,
        film_id: &str,
        user_id: &str,
    ) -> Result<Option<UserBookmark>, StoreError> {
        Ok(lock(&self.bookmarks)
            .get(&(film_id.to_string(), user_id.to_string()))
            .cloned())
    }

    async fn insert_user_bookmark(&self, row: UserBookmark) -> Result<(), StoreError> {
        lock(&self.bookmarks).insert((row.film_id.clone(), row.user_id.clone()), row);
        Ok(())
    }

    async fn delete_user_bookmark(&self, film_id: &str, user_id: &str) -> Result<(), StoreError> {
        lock(&self.bookmarks).remove(&(film_id.to_string(), user_id.to_string()));
        Ok(())
    }

    async fn find_film_rating(&self, film_id: &str) -> Result<Option<FilmRating>, StoreError> {
        Ok(lock(&self.film_ratings).get(film_id).cloned())
    }

    async fn upsert_film_rating(&self, rating: FilmRating) -> Result<(), StoreError> {
        lock(&self.film_ratings).insert(rating.film_id.clone(), rating);
        Ok(())
    }

    async fn film_rating_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(lock(&self.film_ratings).keys().cloned().collect())
    }

    async fn find_film_review_rating(
        &self,
        review_id: &str,
    ) -> Result<Option<FilmReviewRating>, StoreError> {
        Ok(lock(&self.film_review_ratings).get(review_id).cloned())
    }

    async fn upsert_film_review_rating(
        &self,
        rating: FilmReviewRating,
    ) -> Result<(), StoreError> {
        lock(&self.film_review_ratings).insert(rating.review_id.clone(), rating);
        Ok(())
    }

    async fn delete_film_review_rating(&self, review_id: &str) -> Result<(), StoreError> {
        lock(&self.film_review_ratings).remove(review_id);
        Ok(())
    }

    async fn film_review_rating_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(lock(&self.film_review_ratings).keys().cloned().collect())
    }
}

fn paginate<T>(rows: Vec<T>, skip: Option<u64>, limit: Option<i64>) -> Vec<T> {
    let skip = usize::try_from(skip.unwrap_or(0)).unwrap_or(usize::MAX);
    let limit = limit
        .and_then(|l| usize::try_from(l).ok())
        .unwrap_or(usize::MAX);
    rows.into_iter().skip(skip).take(limit).collect()
}

impl UgcReader for InMemoryStore {
    fn film_rating(
        &self,
        film_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<FilmRating>, StoreError>> + Send + '_>> {
        let found = lock(&self.film_ratings).get(film_id).cloned();
        Box::pin(async move { Ok(found) })
    }

    fn film_reviews(
        &self,
        film_id: &str,
        skip: Option<u64>,
        limit: Option<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ReviewWithRating>, StoreError>> + Send + '_>> {
        let ratings = lock(&self.film_review_ratings);
        let mut reviews: Vec<ReviewWithRating> = lock(&self.film_reviews)
            .values()
            .filter(|review| review.film_id == film_id)
            .map(|review| ReviewWithRating {
                review_id: review.review_id.clone(),
                film_id: review.film_id.clone(),
                user_id: review.user_id.clone(),
                value: review.value.clone(),
                created_at: review.created_at,
                updated_at: review.updated_at,
                rating: ratings.get(&review.review_id).cloned(),
            })
            .collect();
        reviews.sort_by(|a, b| a.review_id.cmp(&b.review_id));
        let page = paginate(reviews, skip, limit);
        Box::pin(async move { Ok(page) })
    }

    fn user_bookmarks(
        &self,
        user_id: &str,
        skip: Option<u64>,
        limit: Option<i64>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<UserBookmark>, StoreError>> + Send + '_>> {
        let mut bookmarks: Vec<UserBookmark> = lock(&self.bookmarks)
            .values()
            .filter(|bookmark| bookmark.user_id == user_id)
            .cloned()
            .collect();
        bookmarks.sort_by(|a, b| a.film_id.cmp(&b.film_id));
        let page = paginate(bookmarks, skip, limit);
        Box::pin(async move { Ok(page) })
    }
}
