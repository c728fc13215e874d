//! The flat, append-only OLAP row and the envelope transform.

use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::Serialize;
use ugc_core::envelope::{Envelope, EventSubtype};
use uuid::Uuid;

/// One row of `olap.events`.
///
/// Mirrors the envelope plus the ingest-assigned `id` and `event_time`.
/// `DateTime` columns carry epoch seconds; `payload` is flattened to a
/// string-keyed map holding the JSON-encoded payload under `"payload"`.
#[derive(Debug, Clone, PartialEq, Row, Serialize)]
pub struct OlapRow {
    /// Fresh per-row id (ordering key; duplicates from at-least-once
    /// delivery get distinct ids on purpose).
    #[serde(with = "clickhouse::serde::uuid")]
    pub id: Uuid,
    /// Envelope id.
    #[serde(with = "clickhouse::serde::uuid")]
    pub event_id: Uuid,
    /// Ingest request id.
    #[serde(with = "clickhouse::serde::uuid")]
    pub request_id: Uuid,
    /// Client session id.
    #[serde(with = "clickhouse::serde::uuid")]
    pub session_id: Uuid,
    /// Acting user.
    #[serde(with = "clickhouse::serde::uuid")]
    pub user_id: Uuid,
    /// Transform time, epoch seconds.
    pub event_time: u32,
    /// Client timestamp, epoch seconds.
    pub user_ts: u32,
    /// Ingest timestamp, epoch seconds.
    pub server_ts: u32,
    /// Bus-accept timestamp, epoch seconds.
    pub eventbus_ts: u32,
    /// Origin page.
    pub url: String,
    /// Topic the event came from.
    pub event_type: String,
    /// Subtype wire name; empty for non-custom events.
    pub event_subtype: String,
    /// String-keyed map with the JSON payload under `"payload"`.
    pub payload: Vec<(String, String)>,
}

fn epoch_seconds(ts: DateTime<Utc>) -> u32 {
    u32::try_from(ts.timestamp()).unwrap_or(0)
}

/// Transform one envelope into its OLAP row.
#[must_use]
pub fn to_row(envelope: &Envelope, now: DateTime<Utc>) -> OlapRow {
    OlapRow {
        id: Uuid::new_v4(),
        event_id: envelope.event_id,
        request_id: envelope.request_id,
        session_id: envelope.session_id,
        user_id: envelope.user_id,
        event_time: epoch_seconds(now),
        user_ts: epoch_seconds(envelope.user_ts),
        server_ts: epoch_seconds(envelope.server_ts),
        eventbus_ts: epoch_seconds(envelope.eventbus_ts),
        url: envelope.url.to_string(),
        event_type: envelope.event_type.as_str().to_string(),
        event_subtype: envelope
            .event_subtype
            .map_or("", EventSubtype::as_str)
            .to_string(),
        payload: envelope
            .payload
            .as_ref()
            .map(|value| vec![("payload".to_string(), value.to_string())])
            .unwrap_or_default(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use ugc_core::envelope::EventType;
    use url::Url;

    fn envelope() -> Envelope {
        Envelope {
            event_id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_ts: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            server_ts: DateTime::from_timestamp(1_700_000_001, 0).unwrap(),
            eventbus_ts: DateTime::from_timestamp(1_700_000_002, 0).unwrap(),
            url: Url::parse("https://practix.example/films/1").unwrap(),
            event_type: EventType::Click,
            event_subtype: None,
            payload: Some(json!({"element_id": "id-1", "element_payload": "p"})),
        }
    }

    #[test]
    fn envelope_fields_are_copied_and_payload_flattened() {
        let e = envelope();
        let now = DateTime::from_timestamp(1_700_000_100, 0).unwrap();
        let row = to_row(&e, now);

        assert_eq!(row.event_id, e.event_id);
        assert_eq!(row.event_time, 1_700_000_100);
        assert_eq!(row.user_ts, 1_700_000_000);
        assert_eq!(row.event_type, "click");
        assert_eq!(row.event_subtype, "");
        assert_eq!(row.payload.len(), 1);
        assert_eq!(row.payload[0].0, "payload");
        let flattened: serde_json::Value = serde_json::from_str(&row.payload[0].1).unwrap();
        assert_eq!(flattened["element_id"], "id-1");
    }

    #[test]
    fn each_transform_gets_a_fresh_row_id() {
        let e = envelope();
        let now = Utc::now();
        let first = to_row(&e, now);
        let second = to_row(&e, now);
        assert_ne!(first.id, second.id);
        assert_eq!(first.event_id, second.event_id);
    }
}
