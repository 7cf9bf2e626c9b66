use tokio::sync::mpsc;

use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::sync_error;
use crate::types::RowChangeEvent;

/// Sending half of the change-event queue.
///
/// Capture sources hold clones of this; the queue itself closes when the last clone
/// drops.
#[derive(Debug, Clone)]
pub struct EventTx(mpsc::Sender<RowChangeEvent>);

impl EventTx {
    /// Enqueues an event, waiting while the queue is at capacity.
    ///
    /// Backpressure works by waiting, never by dropping. Fails only when the consumer
    /// is gone.
    pub async fn send(&self, event: RowChangeEvent) -> SyncResult<()> {
        self.0.send(event).await.map_err(|_| {
            sync_error!(
                ErrorKind::EventQueueClosed,
                "Change-event queue consumer is gone"
            )
        })
    }
}

/// Receiving half of the change-event queue.
///
/// Single consumer: events come out one at a time in arrival order. After every
/// producer is dropped the remaining events drain and then [`EventRx::recv`] returns
/// `None`.
#[derive(Debug)]
pub struct EventRx(mpsc::Receiver<RowChangeEvent>);

impl EventRx {
    pub async fn recv(&mut self) -> Option<RowChangeEvent> {
        self.0.recv().await
    }
}

/// Creates a connected event queue bounded at `capacity` events.
pub fn create_event_queue(capacity: usize) -> (EventTx, EventRx) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventTx(tx), EventRx(rx))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::types::row_from;

    fn event(id: i64) -> RowChangeEvent {
        RowChangeEvent::insert("USER", row_from([("id", id)]))
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (tx, mut rx) = create_event_queue(2);

        for id in 1..=3 {
            let tx = tx.clone();
            tokio::spawn(async move {
                // Stagger the sends so arrival order is deterministic.
                tokio::time::sleep(Duration::from_millis(id as u64 * 20)).await;
                tx.send(event(id)).await.unwrap();
            });
        }

        for id in 1..=3i64 {
            let received = rx.recv().await.unwrap();
            assert_eq!(received.image(), Some(&row_from([("id", id)])));
        }
    }

    #[tokio::test]
    async fn test_full_queue_blocks_producers_without_dropping() {
        let (tx, mut rx) = create_event_queue(1);
        tx.send(event(1)).await.unwrap();

        // The queue is full, so the next send waits instead of dropping.
        let blocked = timeout(Duration::from_millis(50), tx.send(event(2))).await;
        assert!(blocked.is_err());

        assert!(rx.recv().await.is_some());
        timeout(Duration::from_secs(1), tx.send(event(2)))
            .await
            .expect("send should proceed once a slot frees up")
            .unwrap();
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_send_after_consumer_drop_is_rejected() {
        let (tx, rx) = create_event_queue(1);
        drop(rx);

        let err = tx.send(event(1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EventQueueClosed);
    }

    #[tokio::test]
    async fn test_queue_drains_after_producers_drop() {
        let (tx, mut rx) = create_event_queue(4);
        tx.send(event(1)).await.unwrap();
        tx.send(event(2)).await.unwrap();
        drop(tx);

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
