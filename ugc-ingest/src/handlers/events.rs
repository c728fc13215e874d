//! Telemetry ingest: clicks and visits.

use crate::extract::{BusChoice, Identity, ValidJson};
use crate::publish::{ingest_event, EventBody};
use crate::state::AppState;
use crate::WebResult;
use axum::extract::State;
use axum::http::StatusCode;
use ugc_core::envelope::EventType;

/// `POST /api/v1/events/click`
pub async fn click(
    State(state): State<AppState>,
    identity: Identity,
    BusChoice(bus): BusChoice,
    ValidJson(body): ValidJson<EventBody>,
) -> WebResult<StatusCode> {
    ingest_event(&state, identity, bus, body, EventType::Click, None, &[]).await
}

/// `POST /api/v1/events/visit`
pub async fn visit(
    State(state): State<AppState>,
    identity: Identity,
    BusChoice(bus): BusChoice,
    ValidJson(body): ValidJson<EventBody>,
) -> WebResult<StatusCode> {
    ingest_event(&state, identity, bus, body, EventType::Visit, None, &[]).await
}
