//! Audit record flushing.
//!
//! Every write outcome, successful or not, is reported to a flush sink together with
//! the failed rows and their error trace. Sinks are best-effort receivers: the data
//! path reports and moves on, it never retries a flush.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::types::{Row, WriteOutcome};

/// One audit record describing the outcome of a write.
#[derive(Debug, Clone)]
pub struct FlushRecord {
    pub mapping_id: u64,
    /// Operation the record accounts for: `full` for page writes, else the event op.
    pub operation: String,
    /// Rows written successfully.
    pub success: u64,
    /// Rows that failed, echoed back for audit.
    pub failed_rows: Vec<Row>,
    pub error_trace: String,
    pub flushed_at: DateTime<Utc>,
}

impl FlushRecord {
    pub fn from_outcome(
        mapping_id: u64,
        operation: impl Into<String>,
        outcome: &WriteOutcome,
    ) -> Self {
        Self {
            mapping_id,
            operation: operation.into(),
            success: outcome.success,
            failed_rows: outcome.failed_rows.clone(),
            error_trace: outcome.error_trace.clone(),
            flushed_at: Utc::now(),
        }
    }

    /// Number of rows that failed.
    pub fn failed(&self) -> u64 {
        self.failed_rows.len() as u64
    }
}

/// Receiver for write audit records.
///
/// Implementations must not block the data path indefinitely and must swallow their
/// own delivery errors.
#[async_trait]
pub trait FlushSink: Send + Sync {
    async fn flush(&self, record: FlushRecord);
}

impl fmt::Debug for dyn FlushSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FlushSink")
    }
}

/// Sink that retains every record in memory.
///
/// Used by tests to assert on audit output and by ephemeral deployments. Clones share
/// the same record list.
#[derive(Debug, Clone)]
pub struct MemoryFlushSink {
    records: Arc<Mutex<Vec<FlushRecord>>>,
}

impl MemoryFlushSink {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Snapshot of the records flushed so far, in arrival order.
    pub async fn records(&self) -> Vec<FlushRecord> {
        self.records.lock().await.clone()
    }
}

impl Default for MemoryFlushSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FlushSink for MemoryFlushSink {
    async fn flush(&self, record: FlushRecord) {
        self.records.lock().await.push(record);
    }
}

/// Sink that reports records through the tracing subscriber.
///
/// The default sink for the daemon when no external audit store is wired up.
#[derive(Debug, Clone, Default)]
pub struct LogFlushSink;

impl LogFlushSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FlushSink for LogFlushSink {
    async fn flush(&self, record: FlushRecord) {
        if record.failed_rows.is_empty() {
            info!(
                "mapping {} {}: {} rows written",
                record.mapping_id, record.operation, record.success
            );
        } else {
            warn!(
                "mapping {} {}: {} rows written, {} failed: {}",
                record.mapping_id,
                record.operation,
                record.success,
                record.failed(),
                record.error_trace
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::row_from;

    #[tokio::test]
    async fn test_memory_sink_keeps_arrival_order() {
        let sink = MemoryFlushSink::new();
        let clone = sink.clone();

        sink.flush(FlushRecord::from_outcome(1, "full", &WriteOutcome::succeeded(3)))
            .await;
        let mut outcome = WriteOutcome::succeeded(1);
        outcome.record_failure(row_from([("id", 9)]), "duplicate key");
        clone
            .flush(FlushRecord::from_outcome(1, "insert", &outcome))
            .await;

        let records = sink.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].operation, "full");
        assert_eq!(records[0].success, 3);
        assert_eq!(records[1].failed(), 1);
        assert!(records[1].error_trace.contains("duplicate key"));
    }
}
