use std::future::Future;

use crate::commands::CommandSet;
use crate::error::SyncResult;
use crate::types::{Field, Row, RowChangeEvent, Table, WriteOutcome};

/// One connected store endpoint.
///
/// A connector wraps a single source or target store and exposes the operations the
/// sync workers drive: liveness, introspection, paged reads, counted reads, batched
/// inserts, and single-event writes. Statements arrive pre-rendered in the store's
/// dialect; `table_name` travels alongside them for stores that address tables
/// directly instead of parsing SQL.
///
/// Row-level write failures never surface as errors. They are accounted in the
/// returned [`WriteOutcome`] so a bad row cannot abort a page or stall the event loop.
pub trait Connector {
    /// Probes the store and reports whether it is reachable.
    fn is_alive(&self) -> impl Future<Output = bool> + Send;

    /// Reads the structural description of a table, including its primary key.
    fn introspect(&self, table_name: &str) -> impl Future<Output = SyncResult<Table>> + Send;

    /// Runs one page read.
    ///
    /// `page_args` carries the two pagination binds in the statement's parameter order,
    /// as produced by the dialect that rendered `query`.
    fn read(
        &self,
        table_name: &str,
        query: &str,
        page_args: [u64; 2],
    ) -> impl Future<Output = SyncResult<Vec<Row>>> + Send;

    /// Runs a count statement and returns its single value.
    fn count(&self, table_name: &str, query: &str)
    -> impl Future<Output = SyncResult<u64>> + Send;

    /// Inserts a batch of rows with one prepared statement.
    ///
    /// `fields` lists the bound columns in statement order; rows missing a column bind
    /// NULL for it. A statement that fails mid-batch marks every row of the batch
    /// failed in the outcome.
    fn write_batch(
        &self,
        table_name: &str,
        insert: &str,
        fields: &[Field],
        rows: Vec<Row>,
    ) -> impl Future<Output = SyncResult<WriteOutcome>> + Send;

    /// Applies a single change event through the update/insert fallback.
    fn write_one(
        &self,
        table_name: &str,
        commands: &CommandSet,
        fields: &[Field],
        event: &RowChangeEvent,
    ) -> impl Future<Output = SyncResult<WriteOutcome>> + Send;
}
