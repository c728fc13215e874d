//! The extract → guard → transform → load → commit loop.

use crate::row::to_row;
use crate::sink::EventSink;
use crate::spill::SpillStorage;
use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use ugc_core::bus::{BatchConsumer, CommitToken};
use ugc_core::envelope::Envelope;
use ugc_runtime::retry::{retry_with_backoff, RetryPolicy};
use ugc_runtime::Shutdown;

/// Tuning knobs for the loop.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Maximum records pulled per poll.
    pub batch_size: usize,
    /// Do not load until this many envelopes have accumulated; keeps
    /// merge-tree parts large.
    pub min_batch_before_load: usize,
    /// Bus poll timeout.
    pub poll_timeout: Duration,
    /// Backoff schedule for the guard and the load retries.
    pub retry: RetryPolicy,
    /// Retries per load attempt before the batch goes back to the
    /// accumulator for the next pass.
    pub load_retries: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            min_batch_before_load: 1000,
            poll_timeout: Duration::from_secs(5),
            retry: RetryPolicy::etl(),
            load_retries: 6,
        }
    }
}

/// The OLAP ETL loop.
pub struct OlapEtl<S: EventSink> {
    consumer: Arc<dyn BatchConsumer>,
    sink: S,
    spill: SpillStorage,
    settings: PipelineSettings,
}

impl<S: EventSink> OlapEtl<S> {
    /// Assemble the loop.
    pub fn new(
        consumer: Arc<dyn BatchConsumer>,
        sink: S,
        spill: SpillStorage,
        settings: PipelineSettings,
    ) -> Self {
        Self { consumer, sink, spill, settings }
    }

    /// Run until the shutdown signal fires.
    ///
    /// Envelopes pulled but not yet loaded when the signal arrives are
    /// written to the spill and their bus offsets committed (the spill is
    /// the durable hand-off); the next startup reads the spill first.
    pub async fn run(&self, shutdown: Shutdown) {
        let mut events: Vec<Envelope> = self.spill.read();
        if !events.is_empty() {
            tracing::info!(count = events.len(), "spill restored");
        }
        let mut tokens: Vec<CommitToken> = Vec::new();
        let mut guard_attempt = 0usize;

        loop {
            if shutdown.is_triggered() {
                self.stop(&events, &mut tokens).await;
                return;
            }

            // Extract; keep pulling only while the accumulator has room.
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
                                    // Unparsable forever; drop it but keep it
                                    // under the token so it is not redelivered.
                                    counter!("ugc_olap_rows_dropped_total").increment(1);
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

            // Guard: batches below the floor wait on the backoff schedule.
            if events.len() < self.settings.min_batch_before_load {
                let delay = self.settings.retry.delay_for_attempt(guard_attempt);
                guard_attempt = guard_attempt.saturating_add(1);
                tracing::info!(
                    accumulated = events.len(),
                    floor = self.settings.min_batch_before_load,
                    delay_ms = delay.as_millis() as u64,
                    "batch below load floor, backing off"
                );
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = shutdown.clone().wait() => {}
                }
                continue;
            }
            guard_attempt = 0;

            // Transform.
            let now = Utc::now();
            let rows: Vec<_> = events.iter().map(|envelope| to_row(envelope, now)).collect();

            // Load; bounded retries per pass, the batch survives failure.
            let policy = self.settings.retry.clone().with_max_retries(self.settings.load_retries);
            let load = retry_with_backoff(&policy, || async { self.sink.load(&rows).await });
            let loaded = tokio::select! {
                result = load => result.is_ok(),
                () = shutdown.clone().wait() => false,
            };
            if !loaded {
                tracing::error!(rows = rows.len(), "load failed, batch retained");
                continue;
            }
            counter!("ugc_olap_rows_loaded_total").increment(rows.len() as u64);

            // Commit only now; a crash above re-delivers the whole batch.
            self.commit_all(&mut tokens).await;
            events.clear();
            if let Err(err) = self.spill.clear() {
                tracing::warn!(error = %err, "spill clear failed");
            }
        }
    }

    async fn commit_all(&self, tokens: &mut Vec<CommitToken>) {
        for token in tokens.drain(..) {
            if let Err(err) = self.consumer.commit(token).await {
                tracing::warn!(error = %err, "offset commit failed (batch may be redelivered)");
            }
        }
    }

    async fn stop(&self, events: &[Envelope], tokens: &mut Vec<CommitToken>) {
        tracing::info!(unloaded = events.len(), "stopping etl loop");
        if events.is_empty() {
            if let Err(err) = self.spill.clear() {
                tracing::warn!(error = %err, "spill clear failed");
            }
            self.commit_all(tokens).await;
        } else {
            match self.spill.write(events) {
                // The spill now owns the batch; releasing the offsets is safe.
                Ok(()) => self.commit_all(tokens).await,
                Err(err) => {
                    tracing::error!(error = %err, "spill write failed, leaving offsets uncommitted");
                }
            }
        }
        if let Err(err) = self.consumer.close().await {
            tracing::warn!(error = %err, "consumer close failed");
        }
    }
}
