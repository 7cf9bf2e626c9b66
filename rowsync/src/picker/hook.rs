use std::fmt;

use crate::types::Row;

/// Callback invoked on every projected row after the converter chain.
///
/// The hook sees the original source row and may rewrite fields of the target row in
/// place. It runs once per row, so the batch cardinality is fixed by construction.
pub trait RowHook: Send + Sync {
    fn rewrite(&self, source: &Row, target: &mut Row);
}

impl fmt::Debug for dyn RowHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RowHook")
    }
}

/// Applies an optional hook across a projected batch.
///
/// `sources` and `targets` are parallel: the picker produced `targets[i]` from
/// `sources[i]`.
pub fn apply_hook(hook: Option<&dyn RowHook>, sources: &[Row], targets: &mut [Row]) {
    let Some(hook) = hook else {
        return;
    };
    for (source, target) in sources.iter().zip(targets.iter_mut()) {
        hook.rewrite(source, target);
    }
}
