//! NoSQL ETL entry point.

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use ugc_amqp::AmqpBatchConsumer;
use ugc_core::bus::{BatchConsumer, BusKind};
use ugc_etl_nosql::pipeline::PipelineSettings;
use ugc_etl_nosql::{Config, Loader, NosqlEtl, Reconciler};
use ugc_kafka::KafkaBatchConsumer;
use ugc_mongo::MongoStore;
use ugc_runtime::retry::{retry_with_backoff, RetryPolicy};
use ugc_runtime::Shutdown;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env().context("configuration")?;
    let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();

    let consumer: Arc<dyn BatchConsumer> = match config.eventbus {
        BusKind::Log => Arc::new(
            KafkaBatchConsumer::new(&config.kafka_brokers, &config.consumer_group, &topics)
                .context("log bus")?,
        ),
        BusKind::Broker => Arc::new(
            AmqpBatchConsumer::connect(&config.rabbit_url, &config.consumer_group, &topics)
                .await
                .context("broker bus")?,
        ),
    };

    let store = Arc::new(
        MongoStore::connect(&config.mongo_url, &config.mongo_database)
            .await
            .context("document store")?,
    );
    // Unreachable sink at startup is fatal once the retry budget runs out.
    retry_with_backoff(&RetryPolicy::etl().with_max_retries(6), || async { store.ping().await })
        .await
        .context("document store ping")?;

    let shutdown = Shutdown::listen();

    if !config.reconcile_interval.is_zero() {
        let reconciler = Reconciler::new(store.clone());
        let interval = config.reconcile_interval;
        let reconcile_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    () = reconcile_shutdown.clone().wait() => return,
                }
                if let Err(err) = reconciler.run_once().await {
                    tracing::error!(error = %err, "reconciliation pass failed");
                }
            }
        });
    }

    let settings = PipelineSettings {
        batch_size: config.batch_size,
        min_batch: config.min_batch,
        poll_timeout: config.poll_timeout,
        ..PipelineSettings::default()
    };
    let etl = NosqlEtl::new(consumer, Loader::new(store), settings);

    tracing::info!(
        eventbus = config.eventbus.as_str(),
        topics = ?config.topics,
        batch_size = config.batch_size,
        min_batch = config.min_batch,
        "nosql etl started"
    );

    etl.run(shutdown).await.context("document schema drift")?;
    tracing::info!("nosql etl stopped");
    Ok(())
}
