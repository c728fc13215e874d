//! Bus contracts shared by the log and broker adapters.
//!
//! Two interchangeable backends sit behind these traits: a partitioned,
//! committed-offset log (Kafka-compatible) and a durable AMQP broker. Both
//! provide at-least-once delivery; neither provides cross-partition ordering.
//!
//! # Producer side
//!
//! [`EventProducer::publish`] hands one record to the backend with
//! `topic = event_type` and a partitioning key. The log adapter returns as
//! soon as the record is accepted into its send buffer and logs the delivery
//! report out-of-band; the broker adapter waits for the broker confirm.
//!
//! # Consumer side
//!
//! [`BatchConsumer::consume`] pulls up to `max_batch` records within a poll
//! timeout and returns them together with an opaque [`CommitToken`]. Nothing
//! is acknowledged until [`BatchConsumer::commit`] is called with that token,
//! after the batch has been fully loaded into its sink. A crash before the
//! commit re-delivers the whole batch.
//!
//! # Dyn compatibility
//!
//! The traits use explicit `Pin<Box<dyn Future>>` returns instead of
//! `async fn` so that adapters can be held as `Arc<dyn EventProducer>` /
//! `Arc<dyn BatchConsumer>` and selected from configuration at startup.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Which bus backend to use; selected from configuration at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusKind {
    /// The partitioned, committed-offset log.
    Log,
    /// The durable AMQP broker.
    Broker,
}

impl BusKind {
    /// The wire name used in configuration and the `Eventbus` header.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Broker => "broker",
        }
    }
}

impl std::str::FromStr for BusKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "log" => Ok(Self::Log),
            "broker" => Ok(Self::Broker),
            other => Err(format!("unknown bus kind '{other}' (expected 'log' or 'broker')")),
        }
    }
}

/// Errors that can occur during bus operations.
#[derive(Error, Debug)]
pub enum EventBusError {
    /// Failed to connect to the bus.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a record to a topic.
    #[error("publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed.
        topic: String,
        /// The reason for failure.
        reason: String,
    },

    /// Failed to pull a batch.
    #[error("consume failed: {0}")]
    ConsumeFailed(String),

    /// Failed to commit a batch.
    #[error("commit failed: {0}")]
    CommitFailed(String),

    /// A token was presented to a consumer that did not issue it, or was
    /// already committed.
    #[error("unknown commit token: {0}")]
    UnknownToken(u64),

    /// The adapter was closed.
    #[error("bus connection closed")]
    Closed,
}

/// One raw record pulled off the bus.
#[derive(Clone, Debug)]
pub struct BusRecord {
    /// Topic / queue the record came from.
    pub topic: String,
    /// Partitioning key, when the backend exposes one.
    pub key: Option<String>,
    /// The record body (canonical JSON envelope).
    pub payload: Vec<u8>,
}

/// Handle for acknowledging one pulled batch.
///
/// Tokens are sequence-numbered per consumer and are only meaningful to the
/// consumer that issued them. Committing a token twice is an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommitToken(u64);

impl CommitToken {
    /// Wrap a consumer-local sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// The consumer-local sequence number.
    #[must_use]
    pub const fn seq(self) -> u64 {
        self.0
    }
}

/// A batch of records plus the token that acknowledges all of them.
#[derive(Debug)]
pub struct ConsumedBatch {
    /// The pulled records; may be empty when the poll timed out.
    pub records: Vec<BusRecord>,
    /// Token covering every record in `records`.
    pub token: CommitToken,
}

impl ConsumedBatch {
    /// Whether the poll returned nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Publishing half of the bus contract.
pub trait EventProducer: Send + Sync {
    /// Publish one record to `topic`, partitioned by `key`.
    ///
    /// At-least-once: the record may be delivered to consumers more than
    /// once, and consumers must be idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] when the backend rejects the
    /// record after the adapter's internal retry.
    fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;
}

/// Consuming half of the bus contract.
///
/// A consumer is subscribed to its topic set at construction time and owned
/// by exactly one ETL process (one consumer group member per partition on
/// the log bus, one channel on the broker bus).
pub trait BatchConsumer: Send + Sync {
    /// Pull up to `max_batch` records, waiting at most `timeout`.
    ///
    /// Returns an empty batch (with a valid token) when the poll times out
    /// with nothing buffered.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConsumeFailed`] on transport errors and
    /// [`EventBusError::Closed`] after [`BatchConsumer::close`].
    fn consume(
        &self,
        max_batch: usize,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<ConsumedBatch, EventBusError>> + Send + '_>>;

    /// Acknowledge every record covered by `token`.
    ///
    /// Called only after the batch is durably in its sink. Offsets (log) or
    /// delivery tags (broker) covered by the token are released; the token
    /// is consumed.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::UnknownToken`] for foreign or already
    /// committed tokens, [`EventBusError::CommitFailed`] on transport errors.
    fn commit(
        &self,
        token: CommitToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Close the underlying connection; subsequent calls fail with
    /// [`EventBusError::Closed`].
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_token_roundtrip() {
        let token = CommitToken::new(42);
        assert_eq!(token.seq(), 42);
        assert_eq!(token, CommitToken::new(42));
    }

    #[test]
    fn empty_batch_reports_empty() {
        let batch = ConsumedBatch { records: Vec::new(), token: CommitToken::new(0) };
        assert!(batch.is_empty());
    }

    #[test]
    fn traits_are_dyn_compatible() {
        fn assert_dyn(_: Option<&dyn EventProducer>, _: Option<&dyn BatchConsumer>) {}
        assert_dyn(None, None);
    }
}
