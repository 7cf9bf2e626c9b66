use std::future::Future;

use crate::error::SyncResult;
use crate::state::Meta;

/// Persistence seam for run records.
///
/// The engine goes through this trait every time it bumps counters or moves a
/// checkpoint, so implementations are expected to be cheap to call and to keep their
/// own cache when the backing store is remote. Implementations must be safe to clone
/// and share across workers.
pub trait MetaStore {
    /// Returns the record for a mapping, if one was ever created.
    fn get_meta(&self, mapping_id: u64) -> impl Future<Output = SyncResult<Option<Meta>>> + Send;

    /// Returns the record for a mapping, creating an empty one if absent.
    fn get_or_create_meta(&self, mapping_id: u64)
    -> impl Future<Output = SyncResult<Meta>> + Send;

    /// Replaces the record for `meta.mapping_id`.
    fn update_meta(&self, meta: Meta) -> impl Future<Output = SyncResult<()>> + Send;

    /// Applies a mutation to the record in place and returns the updated copy.
    ///
    /// Creates the record if absent. The mutation runs under the store's own lock, so
    /// concurrent counter bumps from different workers never lose updates.
    fn mutate_meta<F>(
        &self,
        mapping_id: u64,
        mutate: F,
    ) -> impl Future<Output = SyncResult<Meta>> + Send
    where
        F: FnOnce(&mut Meta) + Send;
}
