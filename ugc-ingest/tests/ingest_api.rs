//! End-to-end handler tests over in-memory bus and store fakes.

#![allow(clippy::unwrap_used)]

use axum_test::TestServer;
use http::header::AUTHORIZATION;
use http::{HeaderName, HeaderValue};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use ugc_core::bus::EventProducer;
use ugc_core::envelope::{Envelope, EventSubtype, EventType};
use ugc_ingest::auth::{AuthError, Claims, TokenVerifier};
use ugc_ingest::{router, AppState, BusKind};
use ugc_mongo::documents::{FilmRating, FilmReview, FilmReviewRating, RatingSummary, UserBookmark};
use ugc_mongo::UgcStore;
use ugc_testing::{InMemoryBus, InMemoryStore};
use uuid::Uuid;

const TOKEN: &str = "test-token";

struct StaticVerifier {
    sub: Uuid,
}

impl TokenVerifier for StaticVerifier {
    fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        if token == TOKEN {
            Ok(Claims { sub: self.sub })
        } else {
            Err(AuthError::Invalid("unknown test token".to_string()))
        }
    }
}

struct Fixture {
    server: TestServer,
    log_bus: Arc<InMemoryBus>,
    broker_bus: Arc<InMemoryBus>,
    store: Arc<InMemoryStore>,
    user_id: Uuid,
    request_id: Uuid,
}

fn fixture(header_override: bool) -> Fixture {
    let user_id = Uuid::new_v4();
    let log_bus = Arc::new(InMemoryBus::new());
    let broker_bus = Arc::new(InMemoryBus::new());
    let store = Arc::new(InMemoryStore::new());

    let state = AppState {
        verifier: Arc::new(StaticVerifier { sub: user_id }),
        log_bus: Some(log_bus.clone() as Arc<dyn EventProducer>),
        broker_bus: Some(broker_bus.clone() as Arc<dyn EventProducer>),
        default_bus: BusKind::Log,
        header_override,
        reader: store.clone(),
    };

    let server = TestServer::new(router(state, Duration::from_secs(10))).unwrap();
    Fixture {
        server,
        log_bus,
        broker_bus,
        store,
        user_id,
        request_id: Uuid::new_v4(),
    }
}

fn event_body(payload: Value) -> Value {
    json!({
        "session_id": Uuid::new_v4(),
        "user_ts": 1_700_000_000,
        "url": "https://practix.example/films/42",
        "payload": payload,
    })
}

fn auth_header() -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {TOKEN}")).unwrap()
}

fn request_id_header(id: Uuid) -> HeaderValue {
    HeaderValue::from_str(&id.to_string()).unwrap()
}

#[tokio::test]
async fn click_is_enriched_and_published() {
    let fx = fixture(false);

    let response = fx
        .server
        .post("/api/v1/events/click")
        .add_header(AUTHORIZATION, auth_header())
        .add_header(HeaderName::from_static("x-request-id"), request_id_header(fx.request_id))
        .json(&event_body(json!({"element_id": "id-1", "element_payload": "p"})))
        .await;
    response.assert_status_ok();

    let published = fx.log_bus.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "click");

    let envelope = Envelope::from_wire(&published[0].payload).unwrap();
    assert_eq!(envelope.event_type, EventType::Click);
    assert_eq!(envelope.event_subtype, None);
    assert_eq!(envelope.user_id, fx.user_id);
    assert_eq!(envelope.request_id, fx.request_id);
    assert_eq!(
        envelope.payload,
        Some(json!({"element_id": "id-1", "element_payload": "p"}))
    );
    // Telemetry keeps the unique event id as the partitioning key.
    assert_eq!(published[0].key.as_deref(), Some(envelope.event_id.to_string().as_str()));
}

#[tokio::test]
async fn missing_token_is_401_and_missing_request_id_is_400() {
    let fx = fixture(false);

    let response = fx
        .server
        .post("/api/v1/events/click")
        .json(&event_body(json!({"element_id": "id-1", "element_payload": "p"})))
        .await;
    response.assert_status(http::StatusCode::UNAUTHORIZED);

    let response = fx
        .server
        .post("/api/v1/events/click")
        .add_header(AUTHORIZATION, auth_header())
        .json(&event_body(json!({"element_id": "id-1", "element_payload": "p"})))
        .await;
    response.assert_status(http::StatusCode::BAD_REQUEST);

    // Neither request reached the bus.
    assert!(fx.log_bus.published().is_empty());
}

#[tokio::test]
async fn out_of_range_rating_is_422_with_field_errors() {
    let fx = fixture(false);
    let film_id = Uuid::new_v4();

    let response = fx
        .server
        .post(&format!("/api/v1/films/{film_id}/rating"))
        .add_header(AUTHORIZATION, auth_header())
        .add_header(HeaderName::from_static("x-request-id"), request_id_header(fx.request_id))
        .json(&event_body(json!({"value": 11})))
        .await;
    response.assert_status(http::StatusCode::UNPROCESSABLE_ENTITY);

    let body: Value = response.json();
    let errors = body["errors"].as_array().unwrap();
    assert!(errors.iter().any(|e| e["field"] == "value"));
    assert!(fx.log_bus.published().is_empty());
}

#[tokio::test]
async fn rating_events_are_keyed_on_the_film_id() {
    let fx = fixture(false);
    let film_id = Uuid::new_v4();

    let response = fx
        .server
        .post(&format!("/api/v1/films/{film_id}/rating"))
        .add_header(AUTHORIZATION, auth_header())
        .add_header(HeaderName::from_static("x-request-id"), request_id_header(fx.request_id))
        .json(&event_body(json!({"value": 10})))
        .await;
    response.assert_status_ok();

    let published = fx.log_bus.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "custom");
    assert_eq!(published[0].key.as_deref(), Some(film_id.to_string().as_str()));

    let envelope = Envelope::from_wire(&published[0].payload).unwrap();
    assert_eq!(envelope.event_subtype, Some(EventSubtype::CreateFilmRating));
}

#[tokio::test]
async fn eventbus_header_is_ignored_without_the_override_flag() {
    let fx = fixture(false);

    let response = fx
        .server
        .post("/api/v1/events/visit")
        .add_header(AUTHORIZATION, auth_header())
        .add_header(HeaderName::from_static("x-request-id"), request_id_header(fx.request_id))
        .add_header(HeaderName::from_static("eventbus"), HeaderValue::from_static("broker"))
        .json(&event_body(json!({})))
        .await;
    response.assert_status_ok();

    assert_eq!(fx.log_bus.published().len(), 1);
    assert!(fx.broker_bus.published().is_empty());
}

#[tokio::test]
async fn eventbus_header_wins_with_the_override_flag() {
    let fx = fixture(true);

    let response = fx
        .server
        .post("/api/v1/events/visit")
        .add_header(AUTHORIZATION, auth_header())
        .add_header(HeaderName::from_static("x-request-id"), request_id_header(fx.request_id))
        .add_header(HeaderName::from_static("eventbus"), HeaderValue::from_static("broker"))
        .json(&event_body(json!({})))
        .await;
    response.assert_status_ok();

    assert!(fx.log_bus.published().is_empty());
    assert_eq!(fx.broker_bus.published().len(), 1);
}

#[tokio::test]
async fn absent_film_rating_reads_as_zeros() {
    let fx = fixture(false);
    let film_id = Uuid::new_v4();

    let response = fx
        .server
        .get(&format!("/api/v1/films/{film_id}/rating"))
        .add_header(AUTHORIZATION, auth_header())
        .add_header(HeaderName::from_static("x-request-id"), request_id_header(fx.request_id))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["film_id"], json!(film_id));
    assert_eq!(body["like_count"], 0);
    assert_eq!(body["dislike_count"], 0);
    assert_eq!(body["avg_rating"], 0.0);
}

#[tokio::test]
async fn film_reviews_join_their_rating_aggregates() {
    let fx = fixture(false);
    let film_id = Uuid::new_v4();
    let review_id = Uuid::new_v4();

    fx.store
        .insert_film_review(FilmReview {
            review_id: review_id.to_string(),
            film_id: film_id.to_string(),
            user_id: Uuid::new_v4().to_string(),
            value: "a fine film".to_string(),
            created_at: chrono::Utc::now(),
            updated_at: None,
        })
        .await
        .unwrap();
    fx.store
        .upsert_film_review_rating(FilmReviewRating {
            review_id: review_id.to_string(),
            summary: RatingSummary::from_values([10, 10, 0]),
        })
        .await
        .unwrap();

    let response = fx
        .server
        .get(&format!("/api/v1/films/{film_id}/reviews"))
        .add_header(AUTHORIZATION, auth_header())
        .add_header(HeaderName::from_static("x-request-id"), request_id_header(fx.request_id))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    let reviews = body["reviews"].as_array().unwrap();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0]["review_id"], json!(review_id.to_string()));
    assert_eq!(reviews[0]["value"], "a fine film");
    assert_eq!(reviews[0]["rating"]["like_count"], 2);
    assert_eq!(reviews[0]["rating"]["dislike_count"], 1);
    assert_eq!(reviews[0]["rating"]["value_count"], 3);
}

#[tokio::test]
async fn bookmarks_are_scoped_to_the_caller() {
    let fx = fixture(false);
    let film_id = Uuid::new_v4();

    fx.store
        .insert_user_bookmark(UserBookmark {
            film_id: film_id.to_string(),
            user_id: fx.user_id.to_string(),
            created_at: chrono::Utc::now(),
        })
        .await
        .unwrap();
    fx.store
        .insert_user_bookmark(UserBookmark {
            film_id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    let response = fx
        .server
        .get("/api/v1/films/bookmarks")
        .add_header(AUTHORIZATION, auth_header())
        .add_header(HeaderName::from_static("x-request-id"), request_id_header(fx.request_id))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    let bookmarks = body.as_array().unwrap();
    assert_eq!(bookmarks.len(), 1);
    assert_eq!(bookmarks[0]["film_id"], json!(film_id.to_string()));
}

#[tokio::test]
async fn healthz_needs_no_auth() {
    let fx = fixture(false);
    fx.server.get("/healthz").await.assert_status_ok();
}

#[tokio::test]
async fn film_rating_seeded_aggregate_is_served() {
    let fx = fixture(false);
    let film_id = Uuid::new_v4();

    fx.store
        .upsert_film_rating(FilmRating {
            film_id: film_id.to_string(),
            summary: RatingSummary::from_values([10]),
        })
        .await
        .unwrap();

    let response = fx
        .server
        .get(&format!("/api/v1/films/{film_id}/rating"))
        .add_header(AUTHORIZATION, auth_header())
        .add_header(HeaderName::from_static("x-request-id"), request_id_header(fx.request_id))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["like_count"], 1);
    assert_eq!(body["avg_rating"], 10.0);
}
