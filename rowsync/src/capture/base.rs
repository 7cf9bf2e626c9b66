use std::fmt;

use async_trait::async_trait;

use crate::capture::queue::EventTx;
use crate::concurrency::stop::StopRx;
use crate::error::SyncResult;

/// A producer of row-change events.
///
/// Log miners, notification listeners, and timer polling all reduce to this: a loop
/// that pushes [`crate::types::RowChangeEvent`]s into the queue until told to stop.
/// Sources are heterogeneous, so the trait is object safe and consumed boxed.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Runs the capture loop.
    ///
    /// Returns when the stop signal fires or the queue consumer goes away. Transient
    /// source errors are the source's own business; an error return means the source
    /// cannot continue at all.
    async fn run(self: Box<Self>, events: EventTx, stop: StopRx) -> SyncResult<()>;
}

impl fmt::Debug for dyn ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChangeSource")
    }
}
