use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Checkpoint key under which the full sync persists its page position.
pub const PAGE_INDEX_KEY: &str = "pageIndex";

/// Lifecycle state of a run record.
///
/// Transitions follow `Ready -> Running -> Stopping -> Ready`; a run that completes on
/// its own skips `Stopping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaState {
    /// No run is live; the record holds the last run's accounting.
    Ready,
    /// A live run owns the record.
    Running,
    /// A stop was requested; the run winds down at its next boundary.
    Stopping,
}

impl MetaState {
    /// Whether a run currently owns the record.
    pub fn is_live(&self) -> bool {
        matches!(self, MetaState::Running | MetaState::Stopping)
    }
}

impl fmt::Display for MetaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaState::Ready => write!(f, "ready"),
            MetaState::Running => write!(f, "running"),
            MetaState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Accounting record of one mapping's runs.
///
/// Keyed by the mapping id; at most one live run owns the record at a time. The owning
/// run increments the counters and mutates the checkpoint map through the
/// [`super::store::MetaStore`]; everything resets when a new run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub mapping_id: u64,
    pub state: MetaState,
    /// Rows written successfully.
    pub success: u64,
    /// Rows that failed to write.
    pub fail: u64,
    /// Expected row total, set from source counts when a full sync starts.
    pub total: u64,
    /// Position markers: [`PAGE_INDEX_KEY`] for the full sync, capture positions for
    /// change sources. Values are stored in textual form.
    pub checkpoint: HashMap<String, String>,
    pub begin_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

impl Meta {
    pub fn new(mapping_id: u64) -> Self {
        Self {
            mapping_id,
            state: MetaState::Ready,
            success: 0,
            fail: 0,
            total: 0,
            checkpoint: HashMap::new(),
            begin_at: None,
            end_at: None,
        }
    }

    /// Resets the accounting for a fresh run.
    ///
    /// The lifecycle state is left untouched; the caller transitions it separately.
    pub fn clear(&mut self) {
        self.success = 0;
        self.fail = 0;
        self.total = 0;
        self.checkpoint.clear();
        self.begin_at = None;
        self.end_at = None;
    }

    /// Page index persisted by the full sync, defaulting to the first page.
    ///
    /// Page indexes are one-based; a marker that does not parse as one reads as the
    /// first page.
    pub fn page_index(&self) -> u64 {
        self.checkpoint
            .get(PAGE_INDEX_KEY)
            .and_then(|raw| raw.parse().ok())
            .filter(|index| *index >= 1)
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_resets_accounting_but_not_state() {
        let mut meta = Meta::new(7);
        meta.state = MetaState::Running;
        meta.success = 10;
        meta.fail = 2;
        meta.total = 12;
        meta.checkpoint
            .insert(PAGE_INDEX_KEY.to_string(), "4".to_string());
        meta.begin_at = Some(Utc::now());

        meta.clear();

        assert_eq!(meta.state, MetaState::Running);
        assert_eq!(meta.success, 0);
        assert_eq!(meta.fail, 0);
        assert_eq!(meta.total, 0);
        assert!(meta.checkpoint.is_empty());
        assert!(meta.begin_at.is_none());
    }

    #[test]
    fn test_page_index_defaults_to_first_page() {
        let mut meta = Meta::new(1);
        assert_eq!(meta.page_index(), 1);

        meta.checkpoint
            .insert(PAGE_INDEX_KEY.to_string(), "9".to_string());
        assert_eq!(meta.page_index(), 9);

        meta.checkpoint
            .insert(PAGE_INDEX_KEY.to_string(), "not a number".to_string());
        assert_eq!(meta.page_index(), 1);

        meta.checkpoint
            .insert(PAGE_INDEX_KEY.to_string(), "0".to_string());
        assert_eq!(meta.page_index(), 1);
    }

    #[test]
    fn test_liveness() {
        assert!(!MetaState::Ready.is_live());
        assert!(MetaState::Running.is_live());
        assert!(MetaState::Stopping.is_live());
    }
}
