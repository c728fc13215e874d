//! Loop behaviour over the in-memory bus and store.

#![allow(clippy::unwrap_used, clippy::panic)]

use chrono::DateTime;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use ugc_core::bus::EventProducer;
use ugc_core::envelope::{Envelope, EventSubtype, EventType};
use ugc_etl_nosql::pipeline::PipelineSettings;
use ugc_etl_nosql::{Loader, NosqlEtl};
use ugc_mongo::documents::RatingSummary;
use ugc_mongo::UgcStore;
use ugc_runtime::retry::RetryPolicy;
use ugc_runtime::Shutdown;
use ugc_testing::{InMemoryBus, InMemoryStore};
use url::Url;
use uuid::Uuid;

fn rating_envelope(subtype: EventSubtype, film_id: Uuid, user_id: Uuid, value: i32) -> Envelope {
    Envelope {
        event_id: Uuid::new_v4(),
        request_id: Uuid::new_v4(),
        session_id: Uuid::new_v4(),
        user_id,
        user_ts: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        server_ts: DateTime::from_timestamp(1_700_000_001, 0).unwrap(),
        eventbus_ts: DateTime::from_timestamp(1_700_000_002, 0).unwrap(),
        url: Url::parse("https://practix.example/").unwrap(),
        event_type: EventType::Custom,
        event_subtype: Some(subtype),
        payload: Some(json!({"film_id": film_id, "value": value})),
    }
}

fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        batch_size: 100,
        min_batch: 1,
        poll_timeout: Duration::from_millis(5),
        retry: RetryPolicy {
            max_retries: usize::MAX,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        },
        apply_retries: 2,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn duplicate_delivery_of_the_same_event_is_idempotent() {
    let bus = Arc::new(InMemoryBus::new());
    let store = Arc::new(InMemoryStore::new());
    let film_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    // The same envelope delivered twice (at-least-once).
    let envelope = rating_envelope(EventSubtype::CreateFilmRating, film_id, user_id, 10);
    let bytes = envelope.to_wire().unwrap();
    let key = envelope.partition_key().to_string();
    bus.publish(envelope.topic(), &key, &bytes).await.unwrap();
    bus.publish(envelope.topic(), &key, &bytes).await.unwrap();

    let (tx, rx) = watch::channel(false);
    let etl = NosqlEtl::new(bus.clone(), Loader::new(store.clone()), fast_settings());
    let handle = tokio::spawn(async move { etl.run(Shutdown::from_receiver(rx)).await });

    let film = film_id.to_string();
    let store_probe = store.clone();
    wait_until(|| {
        let store = store_probe.clone();
        let film = film.clone();
        futures::executor::block_on(async move {
            store.find_film_rating(&film).await.unwrap().is_some()
        })
    })
    .await;

    // Give the second delivery time to be (not) applied, then stop.
    tokio::time::sleep(Duration::from_millis(30)).await;
    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    let summary = store
        .find_film_rating(&film)
        .await
        .unwrap()
        .map_or(RatingSummary::ZERO, |rating| rating.summary);
    assert_eq!(summary.value_count, 1);
    assert_eq!(summary.like_count, 1);
}

#[tokio::test]
async fn batch_is_committed_after_apply() {
    let bus = Arc::new(InMemoryBus::new());
    let store = Arc::new(InMemoryStore::new());
    let film_id = Uuid::new_v4();

    for value in [3, 4] {
        let envelope =
            rating_envelope(EventSubtype::CreateFilmRating, film_id, Uuid::new_v4(), value);
        bus.publish(
            envelope.topic(),
            &envelope.partition_key().to_string(),
            &envelope.to_wire().unwrap(),
        )
        .await
        .unwrap();
    }

    let (tx, rx) = watch::channel(false);
    let etl = NosqlEtl::new(bus.clone(), Loader::new(store.clone()), fast_settings());
    let handle = tokio::spawn(async move { etl.run(Shutdown::from_receiver(rx)).await });

    let film = film_id.to_string();
    let store_probe = store.clone();
    wait_until(|| {
        let store = store_probe.clone();
        let film = film.clone();
        futures::executor::block_on(async move {
            store
                .find_film_rating(&film)
                .await
                .unwrap()
                .is_some_and(|rating| rating.summary.value_count == 2)
        })
    })
    .await;

    tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    // Everything pulled was committed: a crash-and-restart redelivers
    // nothing.
    bus.redeliver_uncommitted();
    assert_eq!(bus.depth(), 0);
}
