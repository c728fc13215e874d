//! UGC ingest service entry point.

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use ugc_amqp::AmqpProducer;
use ugc_core::envelope::EventType;
use ugc_ingest::auth::RsaJwtVerifier;
use ugc_ingest::config::Config;
use ugc_ingest::{router, AppState, BusKind};
use ugc_kafka::KafkaProducer;
use ugc_mongo::MongoStore;
use ugc_runtime::Shutdown;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env().context("configuration")?;

    let verifier = RsaJwtVerifier::from_pem_file(
        &config.jwt_public_key_path,
        &config.service_audience,
    )
    .context("JWT public key")?;

    let topics: Vec<&str> = EventType::ALL.iter().map(|t| t.as_str()).collect();

    // The pinned backend must come up; the other one is only dialled when
    // the per-request override is enabled.
    let want_log = config.eventbus == BusKind::Log || config.eventbus_header_override;
    let want_broker = config.eventbus == BusKind::Broker || config.eventbus_header_override;

    let log_bus = if want_log {
        Some(Arc::new(KafkaProducer::new(&config.kafka_brokers).context("log bus")?)
            as Arc<dyn ugc_core::bus::EventProducer>)
    } else {
        None
    };
    let broker_bus = if want_broker {
        Some(Arc::new(
            AmqpProducer::connect(&config.rabbit_url, &topics)
                .await
                .context("broker bus")?,
        ) as Arc<dyn ugc_core::bus::EventProducer>)
    } else {
        None
    };

    let store = MongoStore::connect(&config.mongo_url, &config.mongo_database)
        .await
        .context("document store")?;

    let state = AppState {
        verifier: Arc::new(verifier),
        log_bus,
        broker_bus,
        default_bus: config.eventbus,
        header_override: config.eventbus_header_override,
        reader: Arc::new(store),
    };

    let app = router(state, config.request_timeout);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %config.bind_addr,
        eventbus = config.eventbus.as_str(),
        header_override = config.eventbus_header_override,
        "ingest service listening"
    );

    let shutdown = Shutdown::listen();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.wait())
        .await
        .context("server")?;

    tracing::info!("ingest service stopped");
    Ok(())
}
