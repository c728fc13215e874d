//! The shared ingest contract: enrich, validate, publish.

use crate::error::AppError;
use crate::extract::Identity;
use crate::state::{AppState, BusKind};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;
use ugc_core::envelope::{Envelope, EventSubtype, EventType};
use ugc_core::payload::{Payload, ValidationErrors};
use url::Url;
use uuid::Uuid;

/// Client-supplied half of the envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct EventBody {
    /// Client session id.
    pub session_id: Uuid,
    /// Client timestamp, epoch seconds (untrusted).
    #[serde(with = "chrono::serde::ts_seconds")]
    pub user_ts: DateTime<Utc>,
    /// Origin page.
    pub url: Url,
    /// Route-specific payload object.
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Validate, enrich and publish one event; 200 with an empty body on
/// success.
///
/// `inject` carries path parameters that become payload fields (the route
/// owns the object id, not the body).
///
/// # Errors
///
/// 422 for payload-schema violations, 400 for an unusable `Eventbus`
/// header, 500 when the bus rejects the record after the adapter's retry.
pub async fn ingest_event(
    state: &AppState,
    identity: Identity,
    requested_bus: Option<BusKind>,
    body: EventBody,
    event_type: EventType,
    event_subtype: Option<EventSubtype>,
    inject: &[(&str, Uuid)],
) -> Result<StatusCode, AppError> {
    let mut payload = body.payload;
    if !inject.is_empty() {
        let mut map = match payload.take() {
            None => serde_json::Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(AppError::validation(ValidationErrors::single(
                    "payload",
                    "expected an object",
                )))
            }
        };
        for (field, id) in inject {
            map.insert((*field).to_string(), Value::String(id.to_string()));
        }
        payload = Some(Value::Object(map));
    }

    let validated = Payload::decode(event_type, event_subtype, payload.as_ref())?;
    let canonical = match &validated {
        None => None,
        Some(payload) => Some(
            payload
                .to_value()
                .map_err(|e| AppError::internal(anyhow::anyhow!("payload encode: {e}")))?,
        ),
    };

    let envelope = Envelope {
        event_id: Uuid::new_v4(),
        request_id: identity.request_id,
        session_id: body.session_id,
        user_id: identity.user_id,
        user_ts: body.user_ts,
        server_ts: Utc::now(),
        eventbus_ts: Utc::now(),
        url: body.url,
        event_type,
        event_subtype,
        payload: canonical,
    };

    let topic = envelope.topic();
    // Aggregate-affecting subtypes are keyed on the owning film/review id,
    // not the envelope id: every mutation of one derived aggregate must
    // land in one partition so a single ETL worker owns it.
    let key = envelope.partition_key().to_string();
    let bytes = envelope
        .to_wire()
        .map_err(|e| AppError::internal(anyhow::anyhow!("envelope encode: {e}")))?;

    let (bus, producer) = state.producer(requested_bus)?;
    match producer.publish(topic, &key, &bytes).await {
        Ok(()) => {
            counter!("ugc_events_published_total", "topic" => topic, "bus" => bus.as_str())
                .increment(1);
            tracing::debug!(
                event_id = %envelope.event_id,
                request_id = %envelope.request_id,
                topic,
                bus = bus.as_str(),
                "event accepted"
            );
            Ok(StatusCode::OK)
        }
        Err(err) => {
            counter!("ugc_events_failed_total", "topic" => topic, "bus" => bus.as_str())
                .increment(1);
            Err(AppError::internal(anyhow::anyhow!("bus publish: {err}")))
        }
    }
}
