use std::fmt;

use crate::types::Row;

/// Row-level change operations applied to a target store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventOp {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for EventOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventOp::Insert => write!(f, "insert"),
            EventOp::Update => write!(f, "update"),
            EventOp::Delete => write!(f, "delete"),
        }
    }
}

/// A normalized change notification produced by a capture source.
///
/// [`RowChangeEvent`] is the uniform shape every capture mechanism reduces to: log
/// mining, database notifications, and timer polling all emit it. The incremental
/// worker applies events in arrival order through the same projection and write path
/// the full sync uses.
#[derive(Debug, Clone, PartialEq)]
pub struct RowChangeEvent {
    /// Source table the change originated from.
    pub table_name: String,
    pub op: EventOp,
    /// Row image before the change, when the source provides one.
    pub before: Option<Row>,
    /// Row image after the change.
    pub after: Option<Row>,
    /// Runs the target write but swallows its failure accounting.
    ///
    /// Set by replay-safe sources such as timer polling, where a re-emitted event may
    /// legitimately collide with an already-applied row.
    pub force_update: bool,
}

impl RowChangeEvent {
    pub fn insert(table_name: impl Into<String>, after: Row) -> Self {
        Self {
            table_name: table_name.into(),
            op: EventOp::Insert,
            before: None,
            after: Some(after),
            force_update: false,
        }
    }

    pub fn update(table_name: impl Into<String>, before: Option<Row>, after: Row) -> Self {
        Self {
            table_name: table_name.into(),
            op: EventOp::Update,
            before,
            after: Some(after),
            force_update: false,
        }
    }

    pub fn delete(table_name: impl Into<String>, before: Row) -> Self {
        Self {
            table_name: table_name.into(),
            op: EventOp::Delete,
            before: Some(before),
            after: None,
            force_update: false,
        }
    }

    /// Row image the write should use.
    ///
    /// Deletes address the target by the before image; inserts and updates carry the
    /// after image.
    pub fn image(&self) -> Option<&Row> {
        match self.op {
            EventOp::Delete => self.before.as_ref(),
            EventOp::Insert | EventOp::Update => self.after.as_ref(),
        }
    }
}

// Display shows the op and table only; row images can be wide and belong in debug logs.
impl fmt::Display for RowChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.op, self.table_name)
    }
}
