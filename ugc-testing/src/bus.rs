//! In-memory event bus implementing both bus contracts.

use crate::lock;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use ugc_core::bus::{
    BatchConsumer, BusRecord, CommitToken, ConsumedBatch, EventBusError, EventProducer,
};

/// A bus whose records live in a VecDeque.
///
/// `publish` appends to the queue (and to a capture log for assertions);
/// `consume` drains immediately without waiting; `commit` retires the
/// token. Records pulled but never committed can be pushed back with
/// [`InMemoryBus::redeliver_uncommitted`] to simulate a crash before
/// commit.
#[derive(Default)]
pub struct InMemoryBus {
    queue: Mutex<VecDeque<BusRecord>>,
    published: Mutex<Vec<BusRecord>>,
    pending: Mutex<HashMap<u64, Vec<BusRecord>>>,
    seq: AtomicU64,
}

impl InMemoryBus {
    /// An empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record ever published, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<BusRecord> {
        lock(&self.published).clone()
    }

    /// Number of records waiting to be consumed.
    #[must_use]
    pub fn depth(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Push every pulled-but-uncommitted record back onto the queue front,
    /// oldest first, as a crash-and-restart would.
    pub fn redeliver_uncommitted(&self) {
        let mut pending = lock(&self.pending);
        let mut queue = lock(&self.queue);
        let mut tokens: Vec<u64> = pending.keys().copied().collect();
        tokens.sort_unstable();
        for token in tokens.into_iter().rev() {
            if let Some(records) = pending.remove(&token) {
                for record in records.into_iter().rev() {
                    queue.push_front(record);
                }
            }
        }
    }
}

impl EventProducer for InMemoryBus {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let record = BusRecord {
            topic: topic.to_string(),
            key: Some(key.to_string()),
            payload: payload.to_vec(),
        };
        Box::pin(async move {
            lock(&self.published).push(record.clone());
            lock(&self.queue).push_back(record);
            Ok(())
        })
    }
}

impl BatchConsumer for InMemoryBus {
    fn consume(
        &self,
        max_batch: usize,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<ConsumedBatch, EventBusError>> + Send + '_>> {
        Box::pin(async move {
            let mut queue = lock(&self.queue);
            let take = max_batch.min(queue.len());
            let records: Vec<BusRecord> = queue.drain(..take).collect();
            drop(queue);

            let token = CommitToken::new(self.seq.fetch_add(1, Ordering::SeqCst));
            lock(&self.pending).insert(token.seq(), records.clone());
            Ok(ConsumedBatch { records, token })
        })
    }

    fn commit(
        &self,
        token: CommitToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(async move {
            lock(&self.pending)
                .remove(&token.seq())
                .map(|_| ())
                .ok_or(EventBusError::UnknownToken(token.seq()))
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(async move { Ok(()) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_consume_commit_roundtrip() {
        let bus = InMemoryBus::new();
        bus.publish("click", "k1", b"one").await.unwrap();
        bus.publish("visit", "k2", b"two").await.unwrap();

        let batch = bus.consume(10, Duration::from_millis(1)).await.unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0].topic, "click");
        bus.commit(batch.token).await.unwrap();

        assert!(bus.consume(10, Duration::from_millis(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn committing_twice_fails() {
        let bus = InMemoryBus::new();
        bus.publish("custom", "k", b"x").await.unwrap();
        let batch = bus.consume(10, Duration::from_millis(1)).await.unwrap();
        bus.commit(batch.token).await.unwrap();
        assert!(bus.commit(batch.token).await.is_err());
    }

    #[tokio::test]
    async fn uncommitted_batches_are_redelivered_in_order() {
        let bus = InMemoryBus::new();
        bus.publish("custom", "a", b"1").await.unwrap();
        bus.publish("custom", "b", b"2").await.unwrap();

        let first = bus.consume(1, Duration::from_millis(1)).await.unwrap();
        assert_eq!(first.records[0].key.as_deref(), Some("a"));
        // No commit: simulate the crash.
        bus.redeliver_uncommitted();

        let again = bus.consume(10, Duration::from_millis(1)).await.unwrap();
        let keys: Vec<_> = again.records.iter().filter_map(|r| r.key.as_deref()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
