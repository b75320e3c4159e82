//! Access records for completed tunnels
//!
//! One [`AccessRecord`] is emitted per tunnel after both relay directions have
//! finished. Sinks decide where it goes; a failing sink never affects the
//! tunnel it describes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tollgate_relay_db::entities::tunnel_session;
use tracing::{info, warn};

use crate::RelayStats;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub session_id: String,
    /// Free-text label from the credential, never authenticated
    pub attribution: String,
    pub account_id: String,
    pub destination: String,
    pub client_addr: SocketAddr,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub bytes_from_client: u64,
    pub bytes_from_destination: u64,
}

impl AccessRecord {
    pub fn new(
        attribution: impl Into<String>,
        account_id: impl Into<String>,
        destination: impl Into<String>,
        client_addr: SocketAddr,
        started_at: DateTime<Utc>,
        stats: &RelayStats,
    ) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            attribution: attribution.into(),
            account_id: account_id.into(),
            destination: destination.into(),
            client_addr,
            started_at,
            duration: stats.duration,
            bytes_from_client: stats.client_to_destination,
            bytes_from_destination: stats.destination_to_client,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_from_client + self.bytes_from_destination
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Access sink error: {0}")]
pub struct SinkError(pub String);

#[async_trait]
pub trait AccessSink: Send + Sync {
    async fn record(&self, record: &AccessRecord) -> Result<(), SinkError>;
}

/// Emits each record as a structured `tracing` event
#[derive(Debug, Default, Clone)]
pub struct TracingAccessSink;

#[async_trait]
impl AccessSink for TracingAccessSink {
    async fn record(&self, record: &AccessRecord) -> Result<(), SinkError> {
        info!(
            session_id = %record.session_id,
            attribution = %record.attribution,
            account_id = %record.account_id,
            destination = %record.destination,
            client_addr = %record.client_addr,
            duration_ms = record.duration.as_millis() as u64,
            bytes_from_client = record.bytes_from_client,
            bytes_from_destination = record.bytes_from_destination,
            total_bytes = record.total_bytes(),
            "Tunnel closed"
        );
        Ok(())
    }
}

/// Persists each record as a `tunnel_session` row
#[derive(Clone)]
pub struct DbAccessSink {
    db: DatabaseConnection,
}

impl DbAccessSink {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccessSink for DbAccessSink {
    async fn record(&self, record: &AccessRecord) -> Result<(), SinkError> {
        let session = tunnel_session::ActiveModel {
            id: Set(record.session_id.clone()),
            account_id: Set(record.account_id.clone()),
            attribution: Set(record.attribution.clone()),
            destination: Set(record.destination.clone()),
            client_addr: Set(record.client_addr.to_string()),
            bytes_from_client: Set(record.bytes_from_client as i64),
            bytes_from_destination: Set(record.bytes_from_destination as i64),
            connected_at: Set(record.started_at),
            duration_ms: Set(record.duration.as_millis() as i64),
        };

        session
            .insert(&self.db)
            .await
            .map_err(|e| SinkError(e.to_string()))?;
        Ok(())
    }
}

/// Keeps records in memory so tests can inspect what a tunnel reported
#[derive(Debug, Default)]
pub struct RecordingAccessSink {
    records: Mutex<Vec<AccessRecord>>,
    recorded: Notify,
}

impl RecordingAccessSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AccessRecord> {
        self.lock().clone()
    }

    /// Wait until at least `count` records have arrived
    pub async fn wait_for_records(&self, count: usize) -> Vec<AccessRecord> {
        loop {
            let notified = self.recorded.notified();
            {
                let records = self.lock();
                if records.len() >= count {
                    return records.clone();
                }
            }
            notified.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AccessRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AccessSink for RecordingAccessSink {
    async fn record(&self, record: &AccessRecord) -> Result<(), SinkError> {
        self.lock().push(record.clone());
        self.recorded.notify_waiters();
        Ok(())
    }
}

/// Delivers every record to each inner sink in turn
#[derive(Clone, Default)]
pub struct FanoutAccessSink {
    sinks: Vec<Arc<dyn AccessSink>>,
}

impl FanoutAccessSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn AccessSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Record to all sinks; failures are logged and otherwise ignored
    pub async fn emit(&self, record: &AccessRecord) {
        if let Err(e) = self.record(record).await {
            warn!("Failed to record tunnel {}: {}", record.session_id, e);
        }
    }
}

#[async_trait]
impl AccessSink for FanoutAccessSink {
    async fn record(&self, record: &AccessRecord) -> Result<(), SinkError> {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.record(record).await {
                failures.push(e.0);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(SinkError(failures.join("; ")))
        }
    }
}
