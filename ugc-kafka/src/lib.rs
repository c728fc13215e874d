//! Log-bus adapter: a partitioned, committed-offset Kafka-compatible
//! backend for the UGC event bus.
//!
//! # Delivery semantics
//!
//! - **Producer**: [`KafkaProducer::publish`] returns as soon as the record
//!   is accepted into the client's send buffer; the delivery report is
//!   awaited on a background task and logged with structured fields
//!   (`partition`, `offset`, `latency_ms`, error code). This is the
//!   fire-and-forget contract of the ingest path.
//! - **Consumer**: [`KafkaBatchConsumer`] runs with
//!   `enable.auto.commit = false` and `auto.offset.reset = earliest`.
//!   Offsets are tracked per batch under a [`CommitToken`] and committed
//!   only when the ETL has loaded the batch into its sink, giving
//!   at-least-once delivery.
//!
//! Records are partitioned by the key chosen at ingest; ordering holds
//! within a partition and nowhere else.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use ugc_core::bus::{
    BatchConsumer, BusRecord, CommitToken, ConsumedBatch, EventBusError, EventProducer,
};

/// Producer half of the log adapter.
pub struct KafkaProducer {
    producer: FutureProducer,
    brokers: String,
}

impl KafkaProducer {
    /// Create a producer against `brokers` (comma-separated list).
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] when the client
    /// configuration is rejected.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "1")
            .create()
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!("failed to create producer: {e}"))
            })?;

        tracing::info!(brokers = %brokers, "kafka producer created");

        Ok(Self { producer, brokers: brokers.to_string() })
    }

    /// The configured broker list.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}

impl EventProducer for KafkaProducer {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let key = key.to_string();
        let payload = payload.to_vec();

        Box::pin(async move {
            let record = FutureRecord::to(&topic).key(&key).payload(&payload);
            let enqueued_at = Instant::now();

            // Accepted into the send buffer is enough for the caller; the
            // delivery report is logged out-of-band.
            let delivery = self.producer.send_result(record).map_err(|(err, _)| {
                EventBusError::PublishFailed { topic: topic.clone(), reason: err.to_string() }
            })?;

            tokio::spawn(async move {
                let latency_ms = move || enqueued_at.elapsed().as_millis() as u64;
                match delivery.await {
                    Ok(Ok((partition, offset))) => {
                        tracing::debug!(
                            topic = %topic,
                            key = %key,
                            partition,
                            offset,
                            latency_ms = latency_ms(),
                            "record delivered"
                        );
                    }
                    Ok(Err((err, _msg))) => {
                        tracing::error!(
                            topic = %topic,
                            key = %key,
                            latency_ms = latency_ms(),
                            error = %err,
                            error_code = ?err.rdkafka_error_code(),
                            "record delivery failed"
                        );
                    }
                    Err(_cancelled) => {
                        tracing::error!(topic = %topic, key = %key, "producer dropped before delivery report");
                    }
                }
            });

            Ok(())
        })
    }
}

/// Consumer half of the log adapter.
///
/// One instance per ETL process; the consumer group (`etl_olap`,
/// `etl_nosql`) makes the two pipelines independent readers of the same
/// topics.
pub struct KafkaBatchConsumer {
    consumer: StreamConsumer,
    seq: AtomicU64,
    pending: Mutex<HashMap<u64, Vec<(String, i32, i64)>>>,
    closed: AtomicBool,
}

impl KafkaBatchConsumer {
    /// Create a consumer subscribed to `topics` in `group`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] when the client cannot be
    /// created or the subscription is rejected.
    pub fn new(brokers: &str, group: &str, topics: &[&str]) -> Result<Self, EventBusError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!("failed to create consumer: {e}"))
            })?;

        consumer.subscribe(topics).map_err(|e| {
            EventBusError::ConnectionFailed(format!("failed to subscribe to {topics:?}: {e}"))
        })?;

        tracing::info!(
            brokers = %brokers,
            group = %group,
            topics = ?topics,
            manual_commit = true,
            "kafka consumer subscribed"
        );

        Ok(Self {
            consumer,
            seq: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    fn stash(&self, offsets: Vec<(String, i32, i64)>) -> Result<CommitToken, EventBusError> {
        let token = CommitToken::new(self.seq.fetch_add(1, Ordering::SeqCst));
        self.pending
            .lock()
            .map_err(|_| EventBusError::ConsumeFailed("offset table poisoned".to_string()))?
            .insert(token.seq(), offsets);
        Ok(token)
    }
}

impl BatchConsumer for KafkaBatchConsumer {
    fn consume(
        &self,
        max_batch: usize,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<ConsumedBatch, EventBusError>> + Send + '_>> {
        Box::pin(async move {
            if self.closed.load(Ordering::SeqCst) {
                return Err(EventBusError::Closed);
            }

            let deadline = Instant::now() + timeout;
            let mut records = Vec::new();
            // High-water offset per partition for this batch.
            let mut offsets: HashMap<(String, i32), i64> = HashMap::new();

            while records.len() < max_batch {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                let message = match tokio::time::timeout(remaining, self.consumer.recv()).await {
                    Err(_elapsed) => break,
                    Ok(Err(err)) => {
                        tracing::error!(error = %err, "kafka poll failed");
                        return Err(EventBusError::ConsumeFailed(err.to_string()));
                    }
                    Ok(Ok(message)) => message,
                };

                let entry = offsets
                    .entry((message.topic().to_string(), message.partition()))
                    .or_insert(message.offset());
                *entry = (*entry).max(message.offset());

                let Some(payload) = message.payload() else {
                    tracing::warn!(
                        topic = message.topic(),
                        partition = message.partition(),
                        offset = message.offset(),
                        "record without payload skipped"
                    );
                    continue;
                };

                records.push(BusRecord {
                    topic: message.topic().to_string(),
                    key: message
                        .key()
                        .map(|k| String::from_utf8_lossy(k).into_owned()),
                    payload: payload.to_vec(),
                });
            }

            let token = self.stash(
                offsets
                    .into_iter()
                    .map(|((topic, partition), offset)| (topic, partition, offset))
                    .collect(),
            )?;

            tracing::debug!(count = records.len(), token = token.seq(), "batch pulled");
            Ok(ConsumedBatch { records, token })
        })
    }

    fn commit(
        &self,
        token: CommitToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(async move {
            let offsets = self
                .pending
                .lock()
                .map_err(|_| EventBusError::CommitFailed("offset table poisoned".to_string()))?
                .remove(&token.seq())
                .ok_or(EventBusError::UnknownToken(token.seq()))?;

            if offsets.is_empty() {
                return Ok(());
            }

            let mut tpl = TopicPartitionList::new();
            for (topic, partition, offset) in &offsets {
                tpl.add_partition_offset(topic, *partition, Offset::Offset(offset + 1))
                    .map_err(|e| EventBusError::CommitFailed(e.to_string()))?;
            }

            self.consumer
                .commit(&tpl, CommitMode::Sync)
                .map_err(|e| EventBusError::CommitFailed(e.to_string()))?;

            tracing::debug!(token = token.seq(), partitions = offsets.len(), "offsets committed");
            Ok(())
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            self.consumer.unsubscribe();
            tracing::info!("kafka consumer closed");
            Ok(())
        })
    }
}
