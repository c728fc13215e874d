//! Shared application state for the HTTP handlers.

use crate::auth::TokenVerifier;
use crate::error::AppError;
use std::sync::Arc;
use ugc_core::bus::EventProducer;
use ugc_mongo::UgcReader;

pub use ugc_core::bus::BusKind;

/// State shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Bearer-token verifier.
    pub verifier: Arc<dyn TokenVerifier>,
    /// Log-bus producer, when enabled.
    pub log_bus: Option<Arc<dyn EventProducer>>,
    /// Broker-bus producer, when enabled.
    pub broker_bus: Option<Arc<dyn EventProducer>>,
    /// The pinned backend.
    pub default_bus: BusKind,
    /// Whether the per-request `Eventbus` header may override the pinned
    /// backend (benchmarking only).
    pub header_override: bool,
    /// Read-side view of the document store.
    pub reader: Arc<dyn UgcReader>,
}

impl AppState {
    /// Resolve the producer for one request.
    ///
    /// `requested` comes from the `Eventbus` header and only wins when the
    /// override flag is on.
    ///
    /// # Errors
    ///
    /// Returns 400 when the resolved backend is not enabled.
    pub fn producer(
        &self,
        requested: Option<BusKind>,
    ) -> Result<(BusKind, &Arc<dyn EventProducer>), AppError> {
        let kind = if self.header_override {
            requested.unwrap_or(self.default_bus)
        } else {
            self.default_bus
        };
        let producer = match kind {
            BusKind::Log => self.log_bus.as_ref(),
            BusKind::Broker => self.broker_bus.as_ref(),
        };
        producer
            .map(|p| (kind, p))
            .ok_or_else(|| AppError::bad_request(format!("Eventbus '{}' is not enabled", kind.as_str())))
    }
}
