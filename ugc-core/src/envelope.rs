//! The event envelope and taxonomy.
//!
//! Every user action travels through the pipeline as an [`Envelope`]: a uniform
//! outer shape carrying ids, three timestamps, the origin URL, the event type
//! (which doubles as the bus topic) and a payload whose schema is dictated by
//! the subtype. The wire form is canonical JSON with epoch-second timestamps.
//!
//! # Timestamps
//!
//! - `user_ts` is client-supplied and untrusted (informational only).
//! - `server_ts` is assigned by the ingest API and authoritative.
//! - `eventbus_ts` is stamped when the record is handed to the bus adapter.

use crate::payload::{Payload, ValidationErrors};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Errors produced when encoding or decoding the wire form.
#[derive(Error, Debug)]
pub enum WireError {
    /// The envelope could not be serialized to JSON.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// The bytes are not a valid JSON envelope.
    #[error("failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Top-level event classification; equal to the bus topic / routing key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// A UI element was clicked.
    Click,
    /// A page was visited.
    Visit,
    /// A domain event; the concrete schema is selected by [`EventSubtype`].
    Custom,
}

impl EventType {
    /// All event types, in topic-declaration order.
    pub const ALL: [Self; 3] = [Self::Click, Self::Visit, Self::Custom];

    /// The wire name, which is also the bus topic this event is routed to.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Visit => "visit",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of custom event subtypes.
///
/// Present on an envelope iff `event_type == custom`. Consumers treat an
/// unknown subtype as a data error: the row is logged and dropped, never
/// retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSubtype {
    /// A film was watched to the end.
    FullyWatched,
    /// Playback quality was switched.
    QualityChanged,
    /// A user rated a film.
    CreateFilmRating,
    /// A user changed their film rating.
    UpdateFilmRating,
    /// A user removed their film rating.
    DeleteFilmRating,
    /// A user reviewed a film.
    CreateFilmReview,
    /// A user edited their review.
    UpdateFilmReview,
    /// A user removed their review.
    DeleteFilmReview,
    /// A user rated a review.
    CreateFilmReviewRating,
    /// A user changed their review rating.
    UpdateFilmReviewRating,
    /// A user removed their review rating.
    DeleteFilmReviewRating,
    /// A user bookmarked a film.
    CreateBookmark,
    /// A user removed a bookmark.
    DeleteBookmark,
}

impl EventSubtype {
    /// The snake_case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FullyWatched => "fully_watched",
            Self::QualityChanged => "quality_changed",
            Self::CreateFilmRating => "create_film_rating",
            Self::UpdateFilmRating => "update_film_rating",
            Self::DeleteFilmRating => "delete_film_rating",
            Self::CreateFilmReview => "create_film_review",
            Self::UpdateFilmReview => "update_film_review",
            Self::DeleteFilmReview => "delete_film_review",
            Self::CreateFilmReviewRating => "create_film_review_rating",
            Self::UpdateFilmReviewRating => "update_film_review_rating",
            Self::DeleteFilmReviewRating => "delete_film_review_rating",
            Self::CreateBookmark => "create_bookmark",
            Self::DeleteBookmark => "delete_bookmark",
        }
    }
}

impl fmt::Display for EventSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The uniform outer shape of every event.
///
/// # Invariants
///
/// - `event_id` is unique per envelope.
/// - `event_subtype` is present iff `event_type == custom`.
/// - `payload` validates against the schema dictated by the subtype
///   (see [`Envelope::decode_payload`]).
///
/// Ordering within `(topic, session_id)` is preserved by the log bus but not
/// by the broker bus; consumers must tolerate duplicates (at-least-once).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique id of this envelope, assigned at ingest.
    pub event_id: Uuid,
    /// Id copied from the `X-Request-Id` header.
    pub request_id: Uuid,
    /// Client session id.
    pub session_id: Uuid,
    /// Subject of the authenticated JWT.
    pub user_id: Uuid,
    /// Client-supplied timestamp (untrusted).
    #[serde(with = "chrono::serde::ts_seconds")]
    pub user_ts: DateTime<Utc>,
    /// Assigned at ingest (authoritative).
    #[serde(with = "chrono::serde::ts_seconds")]
    pub server_ts: DateTime<Utc>,
    /// Assigned when the bus adapter accepts the record.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub eventbus_ts: DateTime<Utc>,
    /// Origin page.
    pub url: Url,
    /// Classification; also the bus topic.
    pub event_type: EventType,
    /// Custom subtype; present iff `event_type == custom`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_subtype: Option<EventSubtype>,
    /// Raw payload object; schema dictated by the subtype.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Envelope {
    /// The bus topic this envelope is routed to.
    #[must_use]
    pub const fn topic(&self) -> &'static str {
        self.event_type.as_str()
    }

    /// The partitioning key for the log bus.
    ///
    /// Aggregate-affecting subtypes are keyed on the owning object id
    /// (film or review) so that all events mutating one derived aggregate
    /// land in one partition and are applied by one consumer. Telemetry
    /// events (click, visit, playback) keep the unique `event_id` and
    /// scatter freely.
    #[must_use]
    pub fn partition_key(&self) -> Uuid {
        self.decode_payload()
            .ok()
            .flatten()
            .and_then(|p| p.object_id())
            .unwrap_or(self.event_id)
    }

    /// Decode and validate the payload against the subtype's schema.
    ///
    /// Returns `Ok(None)` for payload-less envelopes (`visit`).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationErrors`] when the subtype is missing for a custom
    /// event, present for a non-custom event, or the payload fields do not
    /// match the variant schema.
    pub fn decode_payload(&self) -> Result<Option<Payload>, ValidationErrors> {
        Payload::decode(self.event_type, self.event_subtype, self.payload.as_ref())
    }

    /// Encode to the canonical JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Encode`] if serialization fails.
    pub fn to_wire(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::Encode)
    }

    /// Decode from the canonical JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Decode`] if the bytes are not a valid envelope.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(bytes).map_err(WireError::Decode)
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Envelope {{ id: {}, type: {}, subtype: {} }}",
            self.event_id,
            self.event_type,
            self.event_subtype.map_or("-", EventSubtype::as_str),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(event_type: EventType, subtype: Option<EventSubtype>, payload: serde_json::Value) -> Envelope {
        Envelope {
            event_id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_ts: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            server_ts: DateTime::from_timestamp(1_700_000_001, 0).unwrap(),
            eventbus_ts: DateTime::from_timestamp(1_700_000_002, 0).unwrap(),
            url: Url::parse("https://practix.example/films/1").unwrap(),
            event_type,
            event_subtype: subtype,
            payload: Some(payload),
        }
    }

    #[test]
    fn topic_follows_event_type() {
        let e = envelope(EventType::Click, None, json!({"element_id": "b", "element_payload": "p"}));
        assert_eq!(e.topic(), "click");
    }

    #[test]
    fn wire_roundtrip_preserves_envelope() {
        let e = envelope(
            EventType::Custom,
            Some(EventSubtype::CreateFilmRating),
            json!({"film_id": Uuid::new_v4(), "value": 7}),
        );
        let bytes = e.to_wire().unwrap();
        let back = Envelope::from_wire(&bytes).unwrap();
        assert_eq!(e, back);
    }

    #[test]
    fn wire_timestamps_are_epoch_seconds() {
        let e = envelope(EventType::Visit, None, json!({}));
        let value: serde_json::Value = serde_json::from_slice(&e.to_wire().unwrap()).unwrap();
        assert_eq!(value["server_ts"], json!(1_700_000_001));
        assert_eq!(value["event_type"], json!("visit"));
    }

    #[test]
    fn rating_events_are_keyed_on_the_film() {
        let film_id = Uuid::new_v4();
        let e = envelope(
            EventType::Custom,
            Some(EventSubtype::CreateFilmRating),
            json!({"film_id": film_id, "value": 10}),
        );
        assert_eq!(e.partition_key(), film_id);
    }

    #[test]
    fn review_rating_events_are_keyed_on_the_review() {
        let review_id = Uuid::new_v4();
        let e = envelope(
            EventType::Custom,
            Some(EventSubtype::DeleteFilmReviewRating),
            json!({"review_id": review_id}),
        );
        assert_eq!(e.partition_key(), review_id);
    }

    #[test]
    fn telemetry_events_are_keyed_on_the_event_id() {
        let e = envelope(
            EventType::Custom,
            Some(EventSubtype::QualityChanged),
            json!({"film_id": Uuid::new_v4(), "previous_quality": "720p", "next_quality": "1080p"}),
        );
        assert_eq!(e.partition_key(), e.event_id);
    }

    #[test]
    fn unknown_subtype_fails_decode() {
        let raw = json!({
            "event_id": Uuid::new_v4(),
            "request_id": Uuid::new_v4(),
            "session_id": Uuid::new_v4(),
            "user_id": Uuid::new_v4(),
            "user_ts": 1_700_000_000,
            "server_ts": 1_700_000_001,
            "eventbus_ts": 1_700_000_002,
            "url": "https://practix.example/",
            "event_type": "custom",
            "event_subtype": "rate_the_rater",
            "payload": {}
        });
        assert!(Envelope::from_wire(raw.to_string().as_bytes()).is_err());
    }
}
