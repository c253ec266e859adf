//! Runtime event fan-out.
//!
//! Agent lifecycle, persistence, and cancellation notices go out on a
//! `tokio::sync::broadcast` channel. Observers are optional: a run with no
//! subscriber publishes into the void, and a subscriber that falls more than
//! `capacity` events behind gets `RecvError::Lagged` and skips ahead.

use miniagents_types::event::RuntimeEvent;
use tokio::sync::broadcast;

/// Sender side of the run's event channel. Clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RuntimeEvent>,
}

impl EventBus {
    /// A bus retaining up to `capacity` undelivered events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Observe events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: RuntimeEvent) {
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};
    use uuid::Uuid;

    fn persisted(key: &str) -> RuntimeEvent {
        RuntimeEvent::MessagePersisted {
            hash_key: key.to_string(),
        }
    }

    fn key_of(event: RuntimeEvent) -> String {
        match event {
            RuntimeEvent::MessagePersisted { hash_key } => hash_key,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn every_observer_sees_events_in_order() {
        let bus = EventBus::new(8);
        let mut audit = bus.subscribe();
        let mut ui = bus.clone().subscribe();

        bus.publish(persisted("a"));
        bus.clone().publish(persisted("b"));

        for rx in [&mut audit, &mut ui] {
            assert_eq!(key_of(rx.recv().await.unwrap()), "a");
            assert_eq!(key_of(rx.recv().await.unwrap()), "b");
        }
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::new(8);
        bus.publish(persisted("before"));
        let mut rx = bus.subscribe();
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(bus.receiver_count(), 1);
    }

    #[tokio::test]
    async fn slow_observer_lags_then_resumes() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for key in ["1", "2", "3", "4"] {
            bus.publish(persisted(key));
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(2))));
        assert_eq!(key_of(rx.recv().await.unwrap()), "3");
        assert_eq!(key_of(rx.recv().await.unwrap()), "4");
    }

    #[test]
    fn zero_capacity_still_delivers() {
        let bus = EventBus::new(0);
        let mut rx = bus.subscribe();
        bus.publish(RuntimeEvent::RunCancelled {
            run_id: Uuid::now_v7(),
        });
        assert!(matches!(rx.try_recv(), Ok(RuntimeEvent::RunCancelled { .. })));
        assert!(format!("{bus:?}").contains("receiver_count: 1"));
    }
}
