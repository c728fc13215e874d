//! The extract → guard → transform → apply → commit loop.

use crate::loader::Loader;
use crate::op::transform;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use ugc_core::bus::{BatchConsumer, CommitToken};
use ugc_core::envelope::Envelope;
use ugc_mongo::store::{StoreError, UgcStore};
use ugc_runtime::retry::{retry_with_backoff, RetryPolicy};
use ugc_runtime::Shutdown;

/// Tuning knobs for the loop.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Maximum records pulled per poll.
    pub batch_size: usize,
    /// Do not apply until this many envelopes have accumulated.
    pub min_batch: usize,
    /// Bus poll timeout.
    pub poll_timeout: Duration,
    /// Backoff schedule for the guard and store retries.
    pub retry: RetryPolicy,
    /// Retries per op before the batch is abandoned to redelivery.
    pub apply_retries: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            min_batch: 10,
            poll_timeout: Duration::from_secs(5),
            retry: RetryPolicy::etl(),
            apply_retries: 6,
        }
    }
}

/// The NoSQL ETL loop.
pub struct NosqlEtl<S> {
    consumer: Arc<dyn BatchConsumer>,
    loader: Loader<S>,
    settings: PipelineSettings,
}

impl<S: UgcStore> NosqlEtl<S> {
    /// Assemble the loop.
    pub fn new(consumer: Arc<dyn BatchConsumer>, loader: Loader<S>, settings: PipelineSettings) -> Self {
        Self { consumer, loader, settings }
    }

    /// Run until the shutdown signal fires.
    ///
    /// On shutdown the in-flight batch is finished and committed before
    /// the consumer closes; there is no spill here, redelivery of an
    /// uncommitted batch is harmless because every op is idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShapeMismatch`] when a stored document no
    /// longer decodes (schema drift); deliberately fatal so an operator
    /// notices. Transient store failures are retried and never surface.
    pub async fn run(&self, shutdown: Shutdown) -> Result<(), StoreError> {
        let mut events: Vec<Envelope> = Vec::new();
        let mut tokens: Vec<CommitToken> = Vec::new();
        let mut guard_attempt = 0usize;

        loop {
            if shutdown.is_triggered() {
                if !events.is_empty() {
                    match self.process(&events).await {
                        Ok(()) => self.commit_all(&mut tokens).await,
                        Err(err) => {
                            tracing::error!(
                                error = %err,
                                "final batch apply failed, leaving offsets uncommitted"
                            );
                        }
                    }
                }
                if let Err(err) = self.consumer.close().await {
                    tracing::warn!(error = %err, "consumer close failed");
                }
                return Ok(());
            }

            if events.len() < self.settings.batch_size {
                match self
                    .consumer
                    .consume(self.settings.batch_size - events.len(), self.settings.poll_timeout)
                    .await
                {
                    Ok(batch) => {
                        tokens.push(batch.token);
                        for record in &batch.records {
                            match Envelope::from_wire(&record.payload) {
                                Ok(envelope) => events.push(envelope),
                                Err(err) => {
                                    counter!("ugc_nosql_rows_dropped_total").increment(1);
                                    tracing::warn!(
                                        topic = %record.topic,
                                        error = %err,
                                        "invalid envelope dropped"
                                    );
                                }
                            }
                        }
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "bus poll failed");
                    }
                }
            }

            if events.len() < self.settings.min_batch {
                let delay = self.settings.retry.delay_for_attempt(guard_attempt);
                guard_attempt = guard_attempt.saturating_add(1);
                tracing::info!(
                    accumulated = events.len(),
                    floor = self.settings.min_batch,
                    delay_ms = delay.as_millis() as u64,
                    "batch below floor, backing off"
                );
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = shutdown.clone().wait() => {}
                }
                continue;
            }
            guard_attempt = 0;

            match self.process(&events).await {
                Ok(()) => {
                    self.commit_all(&mut tokens).await;
                    events.clear();
                }
                Err(err @ StoreError::ShapeMismatch { .. }) => return Err(err),
                Err(err) => {
                    // Transient sink trouble: keep the batch, re-apply on the
                    // next pass (ops tolerate re-application).
                    tracing::error!(error = %err, "batch apply failed, will retry");
                }
            }
        }
    }

    /// Apply every envelope of the batch, serially.
    async fn process(&self, events: &[Envelope]) -> Result<(), StoreError> {
        let policy = self.settings.retry.clone().with_max_retries(self.settings.apply_retries);
        let mut applied = 0u64;
        for envelope in events {
            let Some(op) = transform(envelope) else { continue };
            retry_with_backoff(&policy, || async { self.loader.apply(&op).await }).await?;
            applied += 1;
        }
        counter!("ugc_nosql_ops_applied_total").increment(applied);
        tracing::info!(events = events.len(), ops = applied, "batch applied");
        Ok(())
    }

    async fn commit_all(&self, tokens: &mut Vec<CommitToken>) {
        for token in tokens.drain(..) {
            if let Err(err) = self.consumer.commit(token).await {
                tracing::warn!(error = %err, "commit failed (batch may be redelivered)");
            }
        }
    }
}
