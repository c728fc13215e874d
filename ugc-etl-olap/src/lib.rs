//! Bus-to-ClickHouse ETL.
//!
//! A single-purpose consumer/loader loop. Batches move through
//! `EXTRACTED → GUARDED → TRANSFORMED → LOADED → COMMITTED`; any failed
//! transition falls back to `EXTRACTED` (the accumulated envelopes are
//! retained, or spilled to disk on shutdown) and nothing is committed on
//! the bus until the rows are in the columnar store.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod pipeline;
pub mod row;
pub mod sink;
pub mod spill;

pub use config::Config;
pub use pipeline::OlapEtl;
pub use row::OlapRow;
pub use sink::{ClickHouseSink, EventSink, SinkError};
pub use spill::SpillStorage;
