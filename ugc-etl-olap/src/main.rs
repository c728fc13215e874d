//! OLAP ETL entry point.

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use ugc_amqp::AmqpBatchConsumer;
use ugc_core::bus::{BatchConsumer, BusKind};
use ugc_etl_olap::pipeline::PipelineSettings;
use ugc_etl_olap::{ClickHouseSink, Config, OlapEtl, SpillStorage};
use ugc_kafka::KafkaBatchConsumer;
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

    let sink = ClickHouseSink::new(&config.clickhouse_url);
    // Unreachable sink at startup is fatal once the retry budget runs out.
    retry_with_backoff(&RetryPolicy::etl().with_max_retries(6), || async {
        sink.ensure_schema().await
    })
    .await
    .context("columnar store schema")?;

    let settings = PipelineSettings {
        batch_size: config.batch_size,
        min_batch_before_load: config.min_batch_before_load,
        poll_timeout: config.poll_timeout,
        ..PipelineSettings::default()
    };
    let etl = OlapEtl::new(consumer, sink, SpillStorage::new(config.spill_path.clone()), settings);

    tracing::info!(
        eventbus = config.eventbus.as_str(),
        topics = ?config.topics,
        batch_size = config.batch_size,
        min_batch_before_load = config.min_batch_before_load,
        "olap etl started"
    );

    etl.run(Shutdown::listen()).await;
    tracing::info!("olap etl stopped");
    Ok(())
}
