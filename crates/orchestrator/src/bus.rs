//! In-process multicast of lifecycle events.

use tokio::sync::broadcast;

use cloudferry_protocol::TransferEvent;

const DEFAULT_CAPACITY: usize = 256;

/// Fan-out event stream for pipeline observers.
///
/// Built on a broadcast channel: publishing never blocks the pipeline,
/// and a subscriber that falls behind sees a `Lagged` gap instead of
/// stalling producers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TransferEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Opens a new subscription receiving all events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event to every current subscriber.
    pub fn publish(&self, event: TransferEvent) {
        // No subscribers is fine; events are advisory.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fan_out_to_multiple_subscribers() {
        let bus = EventBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(TransferEvent::JobCompleted {
            job_id: "j1".into(),
        });

        assert!(matches!(
            a.recv().await.unwrap(),
            TransferEvent::JobCompleted { .. }
        ));
        assert!(matches!(
            b.recv().await.unwrap(),
            TransferEvent::JobCompleted { .. }
        ));
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(TransferEvent::JobCompleted {
            job_id: "j1".into(),
        });
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();

        for i in 0..32 {
            bus.publish(TransferEvent::JobCompleted {
                job_id: format!("j{i}"),
            });
        }

        // The first recv reports the gap; the stream then resumes.
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(skipped)) => assert!(skipped > 0),
            other => panic!("expected lag, got {other:?}"),
        }
        assert!(rx.recv().await.is_ok());
    }
}
