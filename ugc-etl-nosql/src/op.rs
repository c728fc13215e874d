//! Envelope-to-operation transform.
//!
//! Each consumed envelope maps to at most one domain operation. Telemetry
//! events (clicks, visits, playback milestones) carry no UGC state and
//! map to nothing; envelopes whose payload does not validate are logged
//! and dropped, never retried.

use ugc_core::envelope::Envelope;
use ugc_core::payload::Payload;

/// A domain operation against the document store.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum UgcOp {
    CreateFilmRating { film_id: String, user_id: String, value: i32 },
    UpdateFilmRating { film_id: String, user_id: String, value: i32 },
    DeleteFilmRating { film_id: String, user_id: String },

    CreateFilmReview { review_id: String, film_id: String, user_id: String, value: String },
    UpdateFilmReview { review_id: String, user_id: String, value: String },
    DeleteFilmReview { review_id: String, user_id: String },

    CreateFilmReviewRating { review_id: String, user_id: String, value: i32 },
    UpdateFilmReviewRating { review_id: String, user_id: String, value: i32 },
    DeleteFilmReviewRating { review_id: String, user_id: String },

    CreateBookmark { film_id: String, user_id: String },
    DeleteBookmark { film_id: String, user_id: String },
}

/// Map one envelope to its operation.
///
/// Returns `None` for telemetry events and for payloads that fail
/// validation (logged here; the caller just skips).
///
/// A created review's identity is the creating envelope's `event_id`:
/// stable under redelivery, and the key every later review-rating event
/// and the read-side join use.
#[must_use]
pub fn transform(envelope: &Envelope) -> Option<UgcOp> {
    let payload = match envelope.decode_payload() {
        Ok(payload) => payload?,
        Err(errors) => {
            tracing::warn!(
                event_id = %envelope.event_id,
                subtype = envelope.event_subtype.map_or("-", |s| s.as_str()),
                errors = %errors,
                "payload validation failed, event dropped"
            );
            return None;
        }
    };
    let user_id = envelope.user_id.to_string();

    match payload {
        Payload::Click { .. }
        | Payload::Visit {}
        | Payload::FullyWatched { .. }
        | Payload::QualityChanged { .. } => None,

        Payload::CreateFilmRating { film_id, value } => Some(UgcOp::CreateFilmRating {
            film_id: film_id.to_string(),
            user_id,
            value: i32::from(value),
        }),
        Payload::UpdateFilmRating { film_id, value } => Some(UgcOp::UpdateFilmRating {
            film_id: film_id.to_string(),
            user_id,
            value: i32::from(value),
        }),
        Payload::DeleteFilmRating { film_id } => {
            Some(UgcOp::DeleteFilmRating { film_id: film_id.to_string(), user_id })
        }

        Payload::CreateFilmReview { film_id, value } => Some(UgcOp::CreateFilmReview {
            review_id: envelope.event_id.to_string(),
            film_id: film_id.to_string(),
            user_id,
            value,
        }),
        Payload::UpdateFilmReview { review_id, value } => Some(UgcOp::UpdateFilmReview {
            review_id: review_id.to_string(),
            user_id,
            value,
        }),
        Payload::DeleteFilmReview { review_id } => {
            Some(UgcOp::DeleteFilmReview { review_id: review_id.to_string(), user_id })
        }

        Payload::CreateFilmReviewRating { review_id, value } => {
            Some(UgcOp::CreateFilmReviewRating {
                review_id: review_id.to_string(),
                user_id,
                value: i32::from(value),
            })
        }
        Payload::UpdateFilmReviewRating { review_id, value } => {
            Some(UgcOp::UpdateFilmReviewRating {
                review_id: review_id.to_string(),
                user_id,
                value: i32::from(value),
            })
        }
        Payload::DeleteFilmReviewRating { review_id } => {
            Some(UgcOp::DeleteFilmReviewRating { review_id: review_id.to_string(), user_id })
        }

        Payload::CreateBookmark { film_id } => {
            Some(UgcOp::CreateBookmark { film_id: film_id.to_string(), user_id })
        }
        Payload::DeleteBookmark { film_id } => {
            Some(UgcOp::DeleteBookmark { film_id: film_id.to_string(), user_id })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use serde_json::json;
    use ugc_core::envelope::{EventSubtype, EventType};
    use url::Url;
    use uuid::Uuid;

    fn envelope(
        event_type: EventType,
        subtype: Option<EventSubtype>,
        payload: serde_json::Value,
    ) -> Envelope {
        Envelope {
            event_id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_ts: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            server_ts: DateTime::from_timestamp(1_700_000_001, 0).unwrap(),
            eventbus_ts: DateTime::from_timestamp(1_700_000_002, 0).unwrap(),
            url: Url::parse("https://practix.example/").unwrap(),
            event_type,
            event_subtype: subtype,
            payload: Some(payload),
        }
    }

    #[test]
    fn rating_event_maps_to_its_operation() {
        let film_id = Uuid::new_v4();
        let e = envelope(
            EventType::Custom,
            Some(EventSubtype::CreateFilmRating),
            json!({"film_id": film_id, "value": 7}),
        );
        assert_eq!(
            transform(&e),
            Some(UgcOp::CreateFilmRating {
                film_id: film_id.to_string(),
                user_id: e.user_id.to_string(),
                value: 7,
            })
        );
    }

    #[test]
    fn review_creation_takes_its_identity_from_the_event() {
        let film_id = Uuid::new_v4();
        let e = envelope(
            EventType::Custom,
            Some(EventSubtype::CreateFilmReview),
            json!({"film_id": film_id, "value": "liked it"}),
        );
        let Some(UgcOp::CreateFilmReview { review_id, .. }) = transform(&e) else {
            panic!("expected a review creation");
        };
        assert_eq!(review_id, e.event_id.to_string());
    }

    #[test]
    fn telemetry_events_map_to_nothing() {
        let click = envelope(
            EventType::Click,
            None,
            json!({"element_id": "x", "element_payload": "y"}),
        );
        assert_eq!(transform(&click), None);

        let watched = envelope(
            EventType::Custom,
            Some(EventSubtype::FullyWatched),
            json!({"film_id": Uuid::new_v4()}),
        );
        assert_eq!(transform(&watched), None);
    }

    #[test]
    fn invalid_payload_is_dropped() {
        let e = envelope(
            EventType::Custom,
            Some(EventSubtype::CreateFilmRating),
            json!({"film_id": Uuid::new_v4(), "value": 42}),
        );
        assert_eq!(transform(&e), None);
    }
}
