//! Audit sinks and the committing wrapper used by every pipeline stage.

use super::error::VaultError;
use crate::models::{AuditEventType, AuditRecord};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Append-only destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> anyhow::Result<()>;
}

/// One JSON object per line, appended to a file.
pub struct JsonLinesAuditSink {
    path: PathBuf,
    guard: tokio::sync::Mutex<()>,
}

impl JsonLinesAuditSink {
    pub async fn new(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(Self {
            path,
            guard: tokio::sync::Mutex::new(()),
        })
    }
}

#[async_trait]
impl AuditSink for JsonLinesAuditSink {
    async fn append(&self, record: &AuditRecord) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.guard.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Emits each record as a structured tracing event on the `audit` target.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn append(&self, record: &AuditRecord) -> anyhow::Result<()> {
        let line = serde_json::to_string(record)?;
        tracing::info!(target: "audit", record = %line);
        Ok(())
    }
}

/// Keeps records in memory. Used by tests and local tooling.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn of_type(&self, event_type: AuditEventType) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.event_type == event_type)
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: &AuditRecord) -> anyhow::Result<()> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("audit buffer poisoned"))?
            .push(record.clone());
        Ok(())
    }
}

/// Front door to the sink. Never fails the caller.
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
}

impl AuditLog {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub async fn record(&self, record: AuditRecord) {
        if record.event_type.is_violation() {
            tracing::warn!(
                event_type = %record.event_type,
                ingest_id = ?record.ingest_id,
                lease_id = ?record.lease_id,
                failure_reason = ?record.failure_reason,
                "Audit event"
            );
        } else {
            tracing::info!(
                event_type = %record.event_type,
                ingest_id = ?record.ingest_id,
                lease_id = ?record.lease_id,
                "Audit event"
            );
        }

        if let Err(e) = self.sink.append(&record).await {
            tracing::error!(
                error = %e,
                event_type = %record.event_type,
                "Failed to write audit record"
            );
        }
    }

    pub async fn record_all(&self, records: Vec<AuditRecord>) {
        for record in records {
            self.record(record).await;
        }
    }
}

/// A pipeline outcome paired with the audit records it produced.
///
/// Decision code builds these without touching the sink; `commit` is the
/// only place records are written.
#[must_use]
pub struct Audited<T> {
    pub result: Result<T, VaultError>,
    pub records: Vec<AuditRecord>,
}

impl<T> Audited<T> {
    pub fn ok(value: T, records: Vec<AuditRecord>) -> Self {
        Self {
            result: Ok(value),
            records,
        }
    }

    pub fn err(error: VaultError, records: Vec<AuditRecord>) -> Self {
        Self {
            result: Err(error),
            records,
        }
    }

    pub async fn commit(self, log: &AuditLog) -> Result<T, VaultError> {
        log.record_all(self.records).await;
        self.result
    }
}
