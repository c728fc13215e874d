//! Core types for the UGC ingestion and fan-out pipeline.
//!
//! This crate defines the pieces every service in the pipeline shares:
//!
//! - The [`envelope::Envelope`] wire type and the event taxonomy
//!   ([`envelope::EventType`], [`envelope::EventSubtype`]).
//! - Strictly-validated payload variants ([`payload::Payload`]) with
//!   machine-readable validation errors.
//! - The bus contracts ([`bus::EventProducer`], [`bus::BatchConsumer`])
//!   implemented by the log and broker adapters.
//!
//! # Data flow
//!
//! ```text
//! ┌──────────┐    ┌─────────────┐    ┌──────────────────┐
//! │  client  │───>│  ingest API │───>│  bus (topic =    │
//! └──────────┘    │  validate + │    │   event_type)    │
//!                 │  enrich     │    └────────┬─────────┘
//!                 └─────────────┘        ┌────┴────┐
//!                                        ▼         ▼
//!                                   ┌────────┐ ┌────────┐
//!                                   │ OLAP   │ │ NoSQL  │
//!                                   │ ETL    │ │ ETL    │
//!                                   └────────┘ └────────┘
//! ```
//!
//! Everything on the bus is the canonical JSON form of an [`envelope::Envelope`];
//! consumers re-validate on the way out and drop rows that can never parse.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bus;
pub mod envelope;
pub mod payload;

pub use bus::{
    BatchConsumer, BusKind, BusRecord, CommitToken, ConsumedBatch, EventBusError, EventProducer,
};
pub use envelope::{Envelope, EventSubtype, EventType, WireError};
pub use payload::{FieldError, Payload, ValidationErrors};
