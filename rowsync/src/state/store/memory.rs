use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::SyncResult;
use crate::state::Meta;
use crate::state::store::MetaStore;

/// In-memory [`MetaStore`].
///
/// Keeps run records in a shared map for the lifetime of the process. Used by tests and
/// by deployments that do not need run accounting to survive a restart. Clones share
/// the same map.
#[derive(Debug, Clone)]
pub struct MemoryMetaStore {
    inner: Arc<Mutex<HashMap<u64, Meta>>>,
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for MemoryMetaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaStore for MemoryMetaStore {
    async fn get_meta(&self, mapping_id: u64) -> SyncResult<Option<Meta>> {
        let inner = self.inner.lock().await;

        Ok(inner.get(&mapping_id).cloned())
    }

    async fn get_or_create_meta(&self, mapping_id: u64) -> SyncResult<Meta> {
        let mut inner = self.inner.lock().await;

        Ok(inner
            .entry(mapping_id)
            .or_insert_with(|| Meta::new(mapping_id))
            .clone())
    }

    async fn update_meta(&self, meta: Meta) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        inner.insert(meta.mapping_id, meta);

        Ok(())
    }

    async fn mutate_meta<F>(&self, mapping_id: u64, mutate: F) -> SyncResult<Meta>
    where
        F: FnOnce(&mut Meta) + Send,
    {
        let mut inner = self.inner.lock().await;
        let meta = inner
            .entry(mapping_id)
            .or_insert_with(|| Meta::new(mapping_id));
        mutate(meta);

        Ok(meta.clone())
    }
}
