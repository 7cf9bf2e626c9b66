use std::fmt;

use crate::types::Row;

/// Result of one write call against a connector.
///
/// Row-level failures never surface as errors; they are accounted here instead. The
/// failed rows are echoed back verbatim so callers can audit or replay them, and the
/// error trace keeps the human-readable reason for each failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOutcome {
    /// Number of rows written successfully.
    pub success: u64,
    /// Rows that failed, echoed back for audit and replay.
    pub failed_rows: Vec<Row>,
    /// Accumulated failure reasons, one line per failure.
    pub error_trace: String,
}

impl WriteOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome for a write where every row succeeded.
    pub fn succeeded(count: u64) -> Self {
        Self {
            success: count,
            ..Self::default()
        }
    }

    /// Outcome for a batch whose statement execution failed.
    ///
    /// Every row of the batch is marked failed; the statement error applies to all
    /// of them.
    pub fn all_failed(rows: Vec<Row>, error: impl fmt::Display) -> Self {
        Self {
            success: 0,
            failed_rows: rows,
            error_trace: error.to_string(),
        }
    }

    /// Records a single failed row with its reason.
    pub fn record_failure(&mut self, row: Row, error: impl fmt::Display) {
        if !self.error_trace.is_empty() {
            self.error_trace.push('\n');
        }
        self.error_trace.push_str(&error.to_string());
        self.failed_rows.push(row);
    }

    /// Number of rows that failed.
    pub fn failed(&self) -> u64 {
        self.failed_rows.len() as u64
    }

    /// Folds another outcome into this one.
    ///
    /// Success counts add up, failed rows concatenate, and error traces join line by
    /// line. Used when a page fans out into concurrently written chunks.
    pub fn merge(&mut self, other: WriteOutcome) {
        self.success += other.success;
        self.failed_rows.extend(other.failed_rows);
        if !other.error_trace.is_empty() {
            if !self.error_trace.is_empty() {
                self.error_trace.push('\n');
            }
            self.error_trace.push_str(&other.error_trace);
        }
    }
}
