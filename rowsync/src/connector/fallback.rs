use std::future::Future;

use tracing::{debug, warn};

use crate::bail;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::types::{EventOp, Row, RowChangeEvent, WriteOutcome};

/// Single-statement access a connector lends to [`apply_with_fallback`].
///
/// Implementations bind one row against one prepared operation; the fallback driver
/// owns the resubmission policy so every store shares it.
pub(crate) trait SingleWriter {
    /// Executes the statement for `op` bound from `row`, returning the affected row
    /// count.
    fn execute(&mut self, op: EventOp, row: &Row)
    -> impl Future<Output = SyncResult<u64>> + Send;

    /// Runs the existence probe for the row's key.
    fn exists(&mut self, row: &Row) -> impl Future<Output = SyncResult<bool>> + Send;
}

/// Applies one change event, resubmitting it once when the target disagrees about the
/// row's presence.
///
/// An update that reaches no row is probed and resubmitted as an insert when the key is
/// absent; an insert that fails or reaches no row is resubmitted as an update. A
/// resubmission is final: its result stands and the first attempt's error is dropped.
/// Deletes are never resubmitted, and deleting an already absent row counts as applied.
///
/// Events flagged `force_update` swallow failure accounting entirely: the statements
/// still run, but an error is logged instead of recorded and the event counts as
/// applied.
pub(crate) async fn apply_with_fallback<W>(
    writer: &mut W,
    event: &RowChangeEvent,
) -> SyncResult<WriteOutcome>
where
    W: SingleWriter + Send,
{
    let Some(row) = event.image() else {
        bail!(
            ErrorKind::InvalidData,
            "Change event carries no row image",
            event.to_string()
        );
    };

    let attempt = writer.execute(event.op, row).await;

    let outcome = match event.op {
        EventOp::Delete => match attempt {
            Ok(_) => WriteOutcome::succeeded(1),
            Err(err) => account_failure(event, row, err),
        },

        EventOp::Update => match attempt {
            Ok(affected) if affected > 0 => WriteOutcome::succeeded(1),
            attempt => {
                // The row may not exist yet. A failed probe counts as absent so the
                // insert still gets its chance.
                let exists = match writer.exists(row).await {
                    Ok(exists) => exists,
                    Err(err) => {
                        warn!("existence probe failed for {event}: {err}");
                        false
                    }
                };

                if exists {
                    match attempt {
                        Ok(_) => WriteOutcome::succeeded(1),
                        Err(err) => account_failure(event, row, err),
                    }
                } else {
                    warn!("update reached no row for {event}, resubmitting as insert");
                    resubmit(writer, EventOp::Insert, event, row).await
                }
            }
        },

        EventOp::Insert => match attempt {
            Ok(affected) if affected > 0 => WriteOutcome::succeeded(1),
            attempt => {
                if let Err(err) = attempt {
                    warn!("insert failed for {event}, resubmitting as update: {err}");
                }
                resubmit(writer, EventOp::Update, event, row).await
            }
        },
    };

    Ok(outcome)
}

/// Runs the fallback statement. Its result is final.
async fn resubmit<W>(writer: &mut W, op: EventOp, event: &RowChangeEvent, row: &Row) -> WriteOutcome
where
    W: SingleWriter + Send,
{
    match writer.execute(op, row).await {
        Ok(_) => WriteOutcome::succeeded(1),
        Err(err) => account_failure(event, row, err),
    }
}

/// Records the failure, unless the event swallows failure accounting.
fn account_failure(event: &RowChangeEvent, row: &Row, err: SyncError) -> WriteOutcome {
    if event.force_update {
        debug!("swallowed write failure for {event}: {err}");
        return WriteOutcome::succeeded(1);
    }

    let mut outcome = WriteOutcome::new();
    outcome.record_failure(row.clone(), err);
    outcome
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::sync_error;
    use crate::types::row_from;

    /// Scripted writer that replays canned statement results and records the call order.
    struct ScriptedWriter {
        executions: VecDeque<SyncResult<u64>>,
        probes: VecDeque<SyncResult<bool>>,
        calls: Vec<String>,
    }

    impl ScriptedWriter {
        fn new(
            executions: impl IntoIterator<Item = SyncResult<u64>>,
            probes: impl IntoIterator<Item = SyncResult<bool>>,
        ) -> Self {
            Self {
                executions: executions.into_iter().collect(),
                probes: probes.into_iter().collect(),
                calls: Vec::new(),
            }
        }
    }

    impl SingleWriter for ScriptedWriter {
        async fn execute(&mut self, op: EventOp, _row: &Row) -> SyncResult<u64> {
            self.calls.push(op.to_string());
            self.executions
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected {op} statement"))
        }

        async fn exists(&mut self, _row: &Row) -> SyncResult<bool> {
            self.calls.push("exists".into());
            self.probes.pop_front().expect("unexpected existence probe")
        }
    }

    fn statement_error() -> SyncError {
        sync_error!(ErrorKind::TargetQueryFailed, "statement failed")
    }

    #[tokio::test]
    async fn update_that_reaches_a_row_is_applied() {
        let event = RowChangeEvent::update("USER", None, row_from([("id", 1)]));
        let mut writer = ScriptedWriter::new([Ok(1)], []);

        let outcome = apply_with_fallback(&mut writer, &event).await.unwrap();

        assert_eq!(outcome.success, 1);
        assert_eq!(outcome.failed(), 0);
        assert_eq!(writer.calls, vec!["update"]);
    }

    #[tokio::test]
    async fn update_miss_resubmits_as_insert() {
        let event = RowChangeEvent::update("USER", None, row_from([("id", 1)]));
        let mut writer = ScriptedWriter::new([Ok(0), Ok(1)], [Ok(false)]);

        let outcome = apply_with_fallback(&mut writer, &event).await.unwrap();

        assert_eq!(outcome.success, 1);
        assert_eq!(writer.calls, vec!["update", "exists", "insert"]);
    }

    #[tokio::test]
    async fn update_miss_on_present_row_counts_as_applied() {
        let event = RowChangeEvent::update("USER", None, row_from([("id", 1)]));
        let mut writer = ScriptedWriter::new([Ok(0)], [Ok(true)]);

        let outcome = apply_with_fallback(&mut writer, &event).await.unwrap();

        assert_eq!(outcome.success, 1);
        assert_eq!(outcome.failed(), 0);
        assert_eq!(writer.calls, vec!["update", "exists"]);
    }

    #[tokio::test]
    async fn update_error_on_present_row_is_recorded() {
        let event = RowChangeEvent::update("USER", None, row_from([("id", 1)]));
        let mut writer = ScriptedWriter::new([Err(statement_error())], [Ok(true)]);

        let outcome = apply_with_fallback(&mut writer, &event).await.unwrap();

        assert_eq!(outcome.success, 0);
        assert_eq!(outcome.failed(), 1);
        assert!(outcome.error_trace.contains("statement failed"));
    }

    #[tokio::test]
    async fn failed_probe_counts_as_absent() {
        let event = RowChangeEvent::update("USER", None, row_from([("id", 1)]));
        let mut writer = ScriptedWriter::new([Ok(0), Ok(1)], [Err(statement_error())]);

        let outcome = apply_with_fallback(&mut writer, &event).await.unwrap();

        assert_eq!(outcome.success, 1);
        assert_eq!(writer.calls, vec!["update", "exists", "insert"]);
    }

    #[tokio::test]
    async fn insert_conflict_resubmits_as_update() {
        let event = RowChangeEvent::insert("USER", row_from([("id", 1)]));
        let mut writer = ScriptedWriter::new([Err(statement_error()), Ok(1)], []);

        let outcome = apply_with_fallback(&mut writer, &event).await.unwrap();

        assert_eq!(outcome.success, 1);
        assert_eq!(outcome.failed(), 0);
        assert_eq!(writer.calls, vec!["insert", "update"]);
    }

    #[tokio::test]
    async fn resubmission_failure_is_recorded_once() {
        let event = RowChangeEvent::insert("USER", row_from([("id", 1)]));
        let mut writer = ScriptedWriter::new([Err(statement_error()), Err(statement_error())], []);

        let outcome = apply_with_fallback(&mut writer, &event).await.unwrap();

        assert_eq!(outcome.success, 0);
        assert_eq!(outcome.failed(), 1);
    }

    #[tokio::test]
    async fn delete_is_never_resubmitted() {
        let event = RowChangeEvent::delete("USER", row_from([("id", 1)]));
        let mut writer = ScriptedWriter::new([Err(statement_error())], []);

        let outcome = apply_with_fallback(&mut writer, &event).await.unwrap();

        assert_eq!(outcome.failed(), 1);
        assert_eq!(writer.calls, vec!["delete"]);
    }

    #[tokio::test]
    async fn delete_of_absent_row_counts_as_applied() {
        let event = RowChangeEvent::delete("USER", row_from([("id", 1)]));
        let mut writer = ScriptedWriter::new([Ok(0)], []);

        let outcome = apply_with_fallback(&mut writer, &event).await.unwrap();

        assert_eq!(outcome.success, 1);
        assert_eq!(outcome.failed(), 0);
    }

    #[tokio::test]
    async fn forced_event_swallows_failures() {
        let mut event = RowChangeEvent::delete("USER", row_from([("id", 1)]));
        event.force_update = true;
        let mut writer = ScriptedWriter::new([Err(statement_error())], []);

        let outcome = apply_with_fallback(&mut writer, &event).await.unwrap();

        assert_eq!(outcome.success, 1);
        assert_eq!(outcome.failed(), 0);
        assert!(outcome.error_trace.is_empty());
    }

    #[tokio::test]
    async fn event_without_image_is_rejected() {
        let event = RowChangeEvent {
            table_name: "USER".into(),
            op: EventOp::Insert,
            before: None,
            after: None,
            force_update: false,
        };
        let mut writer = ScriptedWriter::new([], []);

        let err = apply_with_fallback(&mut writer, &event).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(writer.calls.is_empty());
    }
}
