//! Broker-bus adapter: a durable AMQP backend for the UGC event bus.
//!
//! # Topology
//!
//! One direct exchange `events` binds three durable queues (`click`,
//! `visit`, `custom`), one per topic; the routing key equals the topic.
//! Publishes are persistent (`delivery_mode = 2`, JSON content type) and
//! wait for the broker confirm. Consumers acknowledge per message, after
//! the sink has accepted the batch.
//!
//! Unlike the log adapter there is no partitioning: ordering is only what
//! a single queue happens to preserve, and at-least-once is provided by
//! requeue-on-unacked.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use ugc_core::bus::{
    BatchConsumer, BusRecord, CommitToken, ConsumedBatch, EventBusError, EventProducer,
};

/// The single direct exchange every topic binds to.
pub const EXCHANGE: &str = "events";

/// Delivery mode 2: persisted to disk by the broker.
const PERSISTENT: u8 = 2;

async fn connect(url: &str) -> Result<(Connection, Channel), EventBusError> {
    let connection = Connection::connect(url, ConnectionProperties::default())
        .await
        .map_err(|e| EventBusError::ConnectionFailed(format!("amqp connect: {e}")))?;
    let channel = connection
        .create_channel()
        .await
        .map_err(|e| EventBusError::ConnectionFailed(format!("amqp channel: {e}")))?;
    Ok((connection, channel))
}

async fn declare_topology(channel: &Channel, topics: &[&str]) -> Result<(), EventBusError> {
    channel
        .exchange_declare(
            EXCHANGE,
            ExchangeKind::Direct,
            ExchangeDeclareOptions { durable: true, ..ExchangeDeclareOptions::default() },
            FieldTable::default(),
        )
        .await
        .map_err(|e| EventBusError::ConnectionFailed(format!("exchange declare: {e}")))?;

    for topic in topics {
        channel
            .queue_declare(
                topic,
                QueueDeclareOptions { durable: true, ..QueueDeclareOptions::default() },
                FieldTable::default(),
            )
            .await
            .map_err(|e| EventBusError::ConnectionFailed(format!("queue declare {topic}: {e}")))?;
        channel
            .queue_bind(topic, EXCHANGE, topic, QueueBindOptions::default(), FieldTable::default())
            .await
            .map_err(|e| EventBusError::ConnectionFailed(format!("queue bind {topic}: {e}")))?;
    }
    Ok(())
}

/// Producer half of the broker adapter.
///
/// Keeps one connection and channel; a publish that hits a dead channel
/// reconnects and retries once before surfacing the failure.
pub struct AmqpProducer {
    url: String,
    topics: Vec<String>,
    // The connection is held alongside the channel: dropping it closes the
    // channel under us.
    state: tokio::sync::Mutex<Option<(Connection, Channel)>>,
}

impl AmqpProducer {
    /// Connect, declare the topology for `topics` and return the producer.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] when the broker is
    /// unreachable or the topology cannot be declared.
    pub async fn connect(url: &str, topics: &[&str]) -> Result<Self, EventBusError> {
        let state = Self::open(url, topics).await?;
        tracing::info!(exchange = EXCHANGE, topics = ?topics, "amqp producer connected");
        Ok(Self {
            url: url.to_string(),
            topics: topics.iter().map(|t| (*t).to_string()).collect(),
            state: tokio::sync::Mutex::new(Some(state)),
        })
    }

    async fn open(url: &str, topics: &[&str]) -> Result<(Connection, Channel), EventBusError> {
        let (connection, channel) = connect(url).await?;
        declare_topology(&channel, topics).await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| EventBusError::ConnectionFailed(format!("confirm select: {e}")))?;
        Ok((connection, channel))
    }

    async fn publish_once(
        channel: &Channel,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), EventBusError> {
        let confirm = channel
            .basic_publish(
                EXCHANGE,
                topic,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(PERSISTENT),
            )
            .await
            .map_err(|e| EventBusError::PublishFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?
            .await
            .map_err(|e| EventBusError::PublishFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        match confirm {
            Confirmation::Nack(_) => Err(EventBusError::PublishFailed {
                topic: topic.to_string(),
                reason: "broker nacked the publish".to_string(),
            }),
            Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
        }
    }
}

impl EventProducer for AmqpProducer {
    fn publish(
        &self,
        topic: &str,
        _key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let payload = payload.to_vec();

        Box::pin(async move {
            let mut state = self.state.lock().await;

            let first_try = match state.as_ref() {
                Some((_, channel)) => Some(Self::publish_once(channel, &topic, &payload).await),
                None => None,
            };
            match first_try {
                Some(Ok(())) => return Ok(()),
                Some(Err(err)) => {
                    tracing::warn!(topic = %topic, error = %err, "publish failed, reconnecting");
                    *state = None;
                }
                None => {}
            }

            // One reconnect, one retry; a second failure is the caller's 500.
            let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();
            let fresh = Self::open(&self.url, &topics).await?;
            let result = Self::publish_once(&fresh.1, &topic, &payload).await;
            if result.is_ok() {
                *state = Some(fresh);
            }
            result
        })
    }
}

/// Consumer half of the broker adapter.
///
/// Deliveries from all subscribed queues converge on one internal channel;
/// batches remember their ackers under a [`CommitToken`] and ack on commit.
pub struct AmqpBatchConsumer {
    connection: Connection,
    channel: Channel,
    rx: tokio::sync::Mutex<mpsc::Receiver<(String, Vec<u8>, Acker)>>,
    seq: AtomicU64,
    pending: Mutex<HashMap<u64, Vec<Acker>>>,
    closed: AtomicBool,
}

impl AmqpBatchConsumer {
    /// Connect, declare the topology and start consuming `topics`.
    ///
    /// `tag_prefix` names the consumer (e.g. the ETL binary) on the broker.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] when the broker is
    /// unreachable or a consumer cannot be registered.
    pub async fn connect(
        url: &str,
        tag_prefix: &str,
        topics: &[&str],
    ) -> Result<Self, EventBusError> {
        let (connection, channel) = connect(url).await?;
        declare_topology(&channel, topics).await?;

        let (tx, rx) = mpsc::channel(1024);

        for topic in topics {
            let mut consumer = channel
                .basic_consume(
                    topic,
                    &format!("{tag_prefix}-{topic}"),
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    EventBusError::ConnectionFailed(format!("basic consume {topic}: {e}"))
                })?;

            let tx = tx.clone();
            let topic = (*topic).to_string();
            tokio::spawn(async move {
                while let Some(delivery) = consumer.next().await {
                    match delivery {
                        Ok(delivery) => {
                            if tx
                                .send((topic.clone(), delivery.data, delivery.acker))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(err) => {
                            tracing::error!(queue = %topic, error = %err, "amqp delivery error");
                        }
                    }
                }
                tracing::debug!(queue = %topic, "amqp consumer task exiting");
            });
        }

        tracing::info!(topics = ?topics, "amqp consumer subscribed");

        Ok(Self {
            connection,
            channel,
            rx: tokio::sync::Mutex::new(rx),
            seq: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    fn stash(&self, ackers: Vec<Acker>) -> Result<CommitToken, EventBusError> {
        let token = CommitToken::new(self.seq.fetch_add(1, Ordering::SeqCst));
        self.pending
            .lock()
            .map_err(|_| EventBusError::ConsumeFailed("acker table poisoned".to_string()))?
            .insert(token.seq(), ackers);
        Ok(token)
    }
}

impl BatchConsumer for AmqpBatchConsumer {
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
            let mut ackers = Vec::new();
            let mut rx = self.rx.lock().await;

            while records.len() < max_batch {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match tokio::time::timeout(remaining, rx.recv()).await {
                    Err(_elapsed) => break,
                    Ok(None) => {
                        return Err(EventBusError::Closed);
                    }
                    Ok(Some((topic, payload, acker))) => {
                        records.push(BusRecord { topic, key: None, payload });
                        ackers.push(acker);
                    }
                }
            }
            drop(rx);

            let token = self.stash(ackers)?;
            tracing::debug!(count = records.len(), token = token.seq(), "batch pulled");
            Ok(ConsumedBatch { records, token })
        })
    }

    fn commit(
        &self,
        token: CommitToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(async move {
            let ackers = self
                .pending
                .lock()
                .map_err(|_| EventBusError::CommitFailed("acker table poisoned".to_string()))?
                .remove(&token.seq())
                .ok_or(EventBusError::UnknownToken(token.seq()))?;

            let count = ackers.len();
            for acker in ackers {
                acker
                    .ack(lapin::options::BasicAckOptions::default())
                    .await
                    .map_err(|e| EventBusError::CommitFailed(e.to_string()))?;
            }

            tracing::debug!(token = token.seq(), count, "deliveries acked");
            Ok(())
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            if let Err(err) = self.channel.close(200, "shutdown").await {
                tracing::warn!(error = %err, "amqp channel close failed");
            }
            self.connection
                .close(200, "shutdown")
                .await
                .map_err(|e| EventBusError::CommitFailed(e.to_string()))?;
            tracing::info!("amqp consumer closed");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AmqpProducer>();
        assert_send_sync::<AmqpBatchConsumer>();
    }
}
