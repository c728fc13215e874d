//! Aggregate maintenance scenarios over the in-memory store.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use ugc_etl_nosql::{Loader, Reconciler, UgcOp};
use ugc_mongo::documents::{FilmRating, RatingSummary};
use ugc_mongo::UgcStore;
use ugc_testing::InMemoryStore;
use uuid::Uuid;

fn ids() -> (String, String) {
    (Uuid::new_v4().to_string(), Uuid::new_v4().to_string())
}

async fn film_summary(store: &InMemoryStore, film_id: &str) -> RatingSummary {
    store
        .find_film_rating(film_id)
        .await
        .unwrap()
        .map_or(RatingSummary::ZERO, |rating| rating.summary)
}

async fn review_summary(store: &InMemoryStore, review_id: &str) -> Option<RatingSummary> {
    store
        .find_film_review_rating(review_id)
        .await
        .unwrap()
        .map(|rating| rating.summary)
}

#[tokio::test]
async fn rating_lifecycle_create_update_delete() {
    let store = Arc::new(InMemoryStore::new());
    let loader = Loader::new(store.clone());
    let (film, user) = ids();

    loader
        .apply(&UgcOp::CreateFilmRating { film_id: film.clone(), user_id: user.clone(), value: 10 })
        .await
        .unwrap();
    let row = store.find_film_user_rating(&film, &user).await.unwrap().unwrap();
    assert_eq!(row.value, 10);
    let summary = film_summary(&store, &film).await;
    assert_eq!((summary.like_count, summary.dislike_count, summary.value_count), (1, 0, 1));
    assert!((summary.avg_rating - 10.0).abs() < f64::EPSILON);

    loader
        .apply(&UgcOp::UpdateFilmRating { film_id: film.clone(), user_id: user.clone(), value: 0 })
        .await
        .unwrap();
    let summary = film_summary(&store, &film).await;
    assert_eq!((summary.like_count, summary.dislike_count, summary.value_count), (0, 1, 1));
    assert!((summary.avg_rating - 0.0).abs() < f64::EPSILON);

    loader
        .apply(&UgcOp::DeleteFilmRating { film_id: film.clone(), user_id: user.clone() })
        .await
        .unwrap();
    assert!(store.find_film_user_rating(&film, &user).await.unwrap().is_none());
    let summary = film_summary(&store, &film).await;
    assert_eq!((summary.like_count, summary.dislike_count, summary.value_count), (0, 0, 0));
    assert!((summary.avg_rating - 0.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn duplicate_create_does_not_double_count() {
    let store = Arc::new(InMemoryStore::new());
    let loader = Loader::new(store.clone());
    let (film, user) = ids();

    let op = UgcOp::CreateFilmRating { film_id: film.clone(), user_id: user.clone(), value: 7 };
    loader.apply(&op).await.unwrap();
    loader.apply(&op).await.unwrap();

    let summary = film_summary(&store, &film).await;
    assert_eq!(summary.value_count, 1);
    assert_eq!(summary.value_sum, 7);
}

#[tokio::test]
async fn update_and_delete_of_absent_rows_are_skipped() {
    let store = Arc::new(InMemoryStore::new());
    let loader = Loader::new(store.clone());
    let (film, user) = ids();

    loader
        .apply(&UgcOp::UpdateFilmRating { film_id: film.clone(), user_id: user.clone(), value: 5 })
        .await
        .unwrap();
    loader
        .apply(&UgcOp::DeleteFilmRating { film_id: film.clone(), user_id: user.clone() })
        .await
        .unwrap();

    assert!(store.find_film_rating(&film).await.unwrap().is_none());
}

#[tokio::test]
async fn review_delete_cascades_to_ratings_and_aggregate() {
    let store = Arc::new(InMemoryStore::new());
    let loader = Loader::new(store.clone());
    let film = Uuid::new_v4().to_string();
    let review = Uuid::new_v4().to_string();
    let author = Uuid::new_v4().to_string();

    loader
        .apply(&UgcOp::CreateFilmReview {
            review_id: review.clone(),
            film_id: film.clone(),
            user_id: author.clone(),
            value: "three raters incoming".to_string(),
        })
        .await
        .unwrap();

    for value in [10, 10, 0] {
        loader
            .apply(&UgcOp::CreateFilmReviewRating {
                review_id: review.clone(),
                user_id: Uuid::new_v4().to_string(),
                value,
            })
            .await
            .unwrap();
    }

    let summary = review_summary(&store, &review).await.unwrap();
    assert_eq!((summary.like_count, summary.dislike_count, summary.value_count), (2, 1, 3));
    assert!((summary.avg_rating - 20.0 / 3.0).abs() < 1e-9);

    loader
        .apply(&UgcOp::DeleteFilmReview { review_id: review.clone(), user_id: author })
        .await
        .unwrap();

    assert!(store.find_film_review(&review).await.unwrap().is_none());
    assert!(store.film_review_user_rating_values(&review).await.unwrap().is_empty());
    assert!(review_summary(&store, &review).await.is_none());
}

#[tokio::test]
async fn second_review_by_the_same_user_is_skipped() {
    let store = Arc::new(InMemoryStore::new());
    let loader = Loader::new(store.clone());
    let (film, user) = ids();

    loader
        .apply(&UgcOp::CreateFilmReview {
            review_id: Uuid::new_v4().to_string(),
            film_id: film.clone(),
            user_id: user.clone(),
            value: "first".to_string(),
        })
        .await
        .unwrap();
    loader
        .apply(&UgcOp::CreateFilmReview {
            review_id: Uuid::new_v4().to_string(),
            film_id: film.clone(),
            user_id: user.clone(),
            value: "second".to_string(),
        })
        .await
        .unwrap();

    let review = store.find_film_review_by_owner(&film, &user).await.unwrap().unwrap();
    assert_eq!(review.value, "first");
}

#[tokio::test]
async fn bookmarks_create_if_absent_delete_if_present() {
    let store = Arc::new(InMemoryStore::new());
    let loader = Loader::new(store.clone());
    let (film, user) = ids();

    let create = UgcOp::CreateBookmark { film_id: film.clone(), user_id: user.clone() };
    loader.apply(&create).await.unwrap();
    loader.apply(&create).await.unwrap();
    assert!(store.find_user_bookmark(&film, &user).await.unwrap().is_some());

    let delete = UgcOp::DeleteBookmark { film_id: film.clone(), user_id: user.clone() };
    loader.apply(&delete).await.unwrap();
    loader.apply(&delete).await.unwrap();
    assert!(store.find_user_bookmark(&film, &user).await.unwrap().is_none());
}

#[tokio::test]
async fn reconciler_repairs_a_torn_aggregate() {
    let store = Arc::new(InMemoryStore::new());
    let loader = Loader::new(store.clone());
    let film = Uuid::new_v4().to_string();

    for value in [10, 4, 0] {
        loader
            .apply(&UgcOp::CreateFilmRating {
                film_id: film.clone(),
                user_id: Uuid::new_v4().to_string(),
                value,
            })
            .await
            .unwrap();
    }

    // Tear the counters behind the loader's back.
    store
        .upsert_film_rating(FilmRating {
            film_id: film.clone(),
            summary: RatingSummary::from_values([10]),
        })
        .await
        .unwrap();

    let reconciler = Reconciler::new(store.clone());
    let repaired = reconciler.run_once().await.unwrap();
    assert_eq!(repaired, 1);

    let summary = film_summary(&store, &film).await;
    assert_eq!(summary, RatingSummary::from_values([10, 4, 0]));

    // A second pass finds nothing to do.
    assert_eq!(reconciler.run_once().await.unwrap(), 0);
}

#[tokio::test]
async fn incremental_path_matches_the_reconciliation_fold() {
    let store = Arc::new(InMemoryStore::new());
    let loader = Loader::new(store.clone());
    let film = Uuid::new_v4().to_string();
    let raters: Vec<String> = (0..5).map(|_| Uuid::new_v4().to_string()).collect();

    for (rater, value) in raters.iter().zip([10, 0, 5, 9, 10]) {
        loader
            .apply(&UgcOp::CreateFilmRating {
                film_id: film.clone(),
                user_id: rater.clone(),
                value,
            })
            .await
            .unwrap();
    }
    loader
        .apply(&UgcOp::UpdateFilmRating {
            film_id: film.clone(),
            user_id: raters[0].clone(),
            value: 1,
        })
        .await
        .unwrap();
    loader
        .apply(&UgcOp::DeleteFilmRating { film_id: film.clone(), user_id: raters[1].clone() })
        .await
        .unwrap();

    let incremental = film_summary(&store, &film).await;
    let survivors = store.film_user_rating_values(&film).await.unwrap();
    assert_eq!(incremental, RatingSummary::from_values(survivors));
}
