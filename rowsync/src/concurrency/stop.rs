use tokio::sync::watch;

/// Type alias to abstract a watch channel of `()`.
pub type SignalTx = watch::Sender<()>;

/// Type alias to abstract a watch channel of `()`.
pub type SignalRx = watch::Receiver<()>;

/// Sending half of a run stop signal.
///
/// A run observes the signal between pages or events, never mid-batch, so a stop
/// request lets in-flight writes finish before the run winds down.
#[derive(Debug, Clone)]
pub struct StopTx(SignalTx);

impl StopTx {
    pub fn wrap(tx: SignalTx) -> Self {
        Self(tx)
    }

    /// Signals every subscribed receiver that the run should stop.
    pub fn stop(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    pub fn subscribe(&self) -> StopRx {
        self.0.subscribe()
    }
}

pub type StopRx = SignalRx;

/// Outcome of an operation that races against a stop signal.
pub enum StopResult<T, I> {
    Ok(T),
    Stopped(I),
}

impl<T, I> StopResult<T, I> {
    pub fn is_stopped(&self) -> bool {
        matches!(self, StopResult::Stopped(_))
    }
}

/// Creates a connected [`StopTx`] / [`StopRx`] pair.
pub fn create_stop_channel() -> (StopTx, StopRx) {
    let (tx, rx) = watch::channel(());
    (StopTx::wrap(tx), rx)
}
