//! The columnar sink: schema management and bulk inserts.

use crate::row::OlapRow;
use clickhouse::Client;
use thiserror::Error;

/// Sink failure; retried with backoff by the pipeline.
#[derive(Error, Debug)]
#[error("columnar sink: {0}")]
pub struct SinkError(pub String);

impl From<clickhouse::error::Error> for SinkError {
    fn from(err: clickhouse::error::Error) -> Self {
        Self(err.to_string())
    }
}

/// Where transformed rows go. The production impl is [`ClickHouseSink`];
/// tests substitute an in-memory one.
#[allow(async_fn_in_trait)]
pub trait EventSink: Send + Sync {
    /// Load one batch in a single bulk insert.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] on transport or schema failures; the caller
    /// retries and must not commit the bus offsets.
    async fn load(&self, rows: &[OlapRow]) -> Result<(), SinkError>;
}

/// ClickHouse-backed sink writing `olap.events ON CLUSTER`.
#[derive(Clone)]
pub struct ClickHouseSink {
    client: Client,
}

const CREATE_DATABASE: &str = "CREATE DATABASE IF NOT EXISTS olap ON CLUSTER company_cluster";

const CREATE_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS olap.events ON CLUSTER company_cluster (
    id UUID,
    event_id UUID,
    request_id UUID,
    session_id UUID,
    user_id UUID,
    event_time DateTime,
    user_ts DateTime,
    server_ts DateTime,
    eventbus_ts DateTime,
    url String,
    event_type String,
    event_subtype String,
    payload Map(String, String)
) Engine=MergeTree() ORDER BY id";

impl ClickHouseSink {
    /// Create a sink against the ClickHouse HTTP endpoint.
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self { client: Client::default().with_url(url) }
    }

    /// Create the `olap` database and the replicated `events` table.
    ///
    /// Called once at startup, under the startup retry budget; failure
    /// after retries is fatal so an operator notices schema drift.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the server is unreachable or rejects the
    /// DDL.
    pub async fn ensure_schema(&self) -> Result<(), SinkError> {
        self.client.query(CREATE_DATABASE).execute().await?;
        tracing::info!("database olap is present");
        self.client.query(CREATE_TABLE).execute().await?;
        tracing::info!("table olap.events is present");
        Ok(())
    }
}

impl EventSink for ClickHouseSink {
    async fn load(&self, rows: &[OlapRow]) -> Result<(), SinkError> {
        let mut insert = self.client.insert("olap.events")?;
        for row in rows {
            insert.write(row).await?;
        }
        insert.end().await?;
        tracing::info!(rows = rows.len(), "batch loaded into olap.events");
        Ok(())
    }
}
