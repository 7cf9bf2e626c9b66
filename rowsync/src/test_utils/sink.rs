use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::flush::{FlushRecord, FlushSink};

type RecordCondition = Box<dyn Fn(&[FlushRecord]) -> bool + Send + Sync>;

struct Inner {
    records: Vec<FlushRecord>,
    conditions: Vec<(RecordCondition, Arc<Notify>)>,
}

impl Inner {
    fn check_conditions(&mut self) {
        let records = &self.records;
        self.conditions.retain(|(condition, notify)| {
            let satisfied = condition(records);
            if satisfied {
                notify.notify_one();
            }
            !satisfied
        });
    }
}

/// Flush sink that fires notifications when the flushed records meet a condition.
///
/// Incremental runs only finish when stopped, so tests cannot join them to observe
/// progress. Registering a condition before starting the run and awaiting its
/// [`Notify`] replaces sleep-and-poll loops.
#[derive(Clone)]
pub struct NotifyingFlushSink {
    inner: Arc<Mutex<Inner>>,
}

impl NotifyingFlushSink {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                records: Vec::new(),
                conditions: Vec::new(),
            })),
        }
    }

    /// Records flushed so far, in arrival order.
    pub async fn records(&self) -> Vec<FlushRecord> {
        self.inner.lock().await.records.clone()
    }

    /// Registers a condition over all flushed records.
    ///
    /// The returned [`Notify`] fires once, the first time the condition holds after a
    /// flush. A condition that already holds fires at registration.
    pub async fn notify_on_records<F>(&self, condition: F) -> Arc<Notify>
    where
        F: Fn(&[FlushRecord]) -> bool + Send + Sync + 'static,
    {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.lock().await;
        inner.conditions.push((Box::new(condition), notify.clone()));
        inner.check_conditions();

        notify
    }

    /// Fires once the summed success count reaches `count`.
    pub async fn wait_for_success_total(&self, count: u64) -> Arc<Notify> {
        self.notify_on_records(move |records| {
            records.iter().map(|record| record.success).sum::<u64>() >= count
        })
        .await
    }

    /// Fires once `count` records carry the given operation label.
    pub async fn wait_for_records(&self, operation: &str, count: usize) -> Arc<Notify> {
        let operation = operation.to_string();
        self.notify_on_records(move |records| {
            records
                .iter()
                .filter(|record| record.operation == operation)
                .count()
                >= count
        })
        .await
    }
}

impl Default for NotifyingFlushSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FlushSink for NotifyingFlushSink {
    async fn flush(&self, record: FlushRecord) {
        let mut inner = self.inner.lock().await;
        inner.records.push(record);
        inner.check_conditions();
    }
}
