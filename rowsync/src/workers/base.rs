use std::future::Future;

use crate::error::SyncResult;

/// A trait for types that can be started as run workers.
///
/// The generic parameter `H` represents the handle type returned when the worker starts,
/// and `S` the state type that can be read through the handle.
pub trait Worker<H, S>
where
    H: WorkerHandle<S>,
{
    /// Starts the worker and returns a future that resolves to its handle.
    fn start(self) -> impl Future<Output = SyncResult<H>> + Send;
}

/// A handle to a running worker that provides access to its state and completion.
pub trait WorkerHandle<S> {
    /// Returns the current state of the worker.
    fn state(&self) -> S;

    /// Returns a future that resolves when the worker completes.
    ///
    /// A worker that panicked surfaces the panic here as an error in the same channel
    /// as run failures.
    fn wait(self) -> impl Future<Output = SyncResult<()>> + Send;
}
