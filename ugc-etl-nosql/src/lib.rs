//! Bus-to-document-store ETL.
//!
//! Consumes the same topics as the OLAP ETL under its own consumer group
//! and maintains the UGC primaries and their derived rating aggregates.
//! Every operation is idempotent with respect to its key, so at-least-once
//! redelivery (and replay after a crash before commit) is safe; a periodic
//! reconciler recomputes aggregates from the surviving primaries and
//! repairs drift.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod loader;
pub mod op;
pub mod pipeline;
pub mod reconcile;

pub use config::Config;
pub use loader::Loader;
pub use op::UgcOp;
pub use pipeline::NosqlEtl;
pub use reconcile::Reconciler;
