//! Event Broadcaster
//!
//! Fans `ObserverEvent`s out to every live subscription. Each subscriber owns a
//! bounded queue; publishing never waits on a subscriber. A queue that is full
//! or whose receiver is gone gets its subscriber dropped on the spot, so one
//! slow dashboard can never hold up a dispatch. There is no replay: late
//! subscribers only see events published after they joined.

use crate::events::ObserverEvent;
use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Opaque identity of one subscription.
pub type ObserverId = u64;

/// The receiving half handed to an observer.
#[derive(Debug)]
pub struct Subscription {
    id: ObserverId,
    receiver: mpsc::Receiver<ObserverEvent>,
}

impl Subscription {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Waits for the next event. `None` means the broadcaster dropped us.
    pub async fn recv(&mut self) -> Option<ObserverEvent> {
        self.receiver.recv().await
    }

    /// Returns an already-queued event without waiting.
    pub fn try_recv(&mut self) -> Option<ObserverEvent> {
        self.receiver.try_recv().ok()
    }
}

pub struct EventBroadcaster {
    observers: Mutex<HashMap<ObserverId, mpsc::Sender<ObserverEvent>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl EventBroadcaster {
    /// Per-observer queue depth used by `Default`.
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn new(capacity: usize) -> Self {
        Self {
            observers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    fn observers(&self) -> MutexGuard<'_, HashMap<ObserverId, mpsc::Sender<ObserverEvent>>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.observers().insert(id, sender);
        debug!(observer_id = id, "Observer subscribed");
        Subscription { id, receiver }
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let removed = self.observers().remove(&id).is_some();
        if removed {
            debug!(observer_id = id, "Observer unsubscribed");
        }
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.observers().len()
    }

    /// Delivers `event` to every current subscriber and returns how many
    /// accepted it. Undeliverable subscribers are dropped.
    pub fn publish(&self, event: ObserverEvent) -> usize {
        let snapshot: Vec<(ObserverId, mpsc::Sender<ObserverEvent>)> = self
            .observers()
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, sender) in snapshot {
            match sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(observer_id = id, event = event.name(), "Observer queue full; dropping observer");
                    dead.push(id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(observer_id = id, "Observer gone; dropping observer");
                    dead.push(id);
                }
            }
        }

        if !dead.is_empty() {
            let mut observers = self.observers();
            for id in dead {
                observers.remove(&id);
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CampaignStatus;
    use std::time::{Duration, Instant};

    fn event(n: usize) -> ObserverEvent {
        ObserverEvent::CampaignStatus(CampaignStatus {
            phone: "9876543210".into(),
            status: format!("step {n}"),
        })
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_in_order() {
        let broadcaster = EventBroadcaster::default();
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();

        for n in 0..5 {
            assert_eq!(broadcaster.publish(event(n)), 2);
        }

        for n in 0..5 {
            assert_eq!(a.recv().await, Some(event(n)));
            assert_eq!(b.recv().await, Some(event(n)));
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_no_replay() {
        let broadcaster = EventBroadcaster::default();
        broadcaster.publish(event(0));

        let mut late = broadcaster.subscribe();
        assert!(late.try_recv().is_none());

        broadcaster.publish(event(1));
        assert_eq!(late.recv().await, Some(event(1)));
    }

    #[tokio::test]
    async fn test_full_observer_is_dropped_without_blocking_others() {
        let broadcaster = EventBroadcaster::new(2);
        let mut stalled = broadcaster.subscribe();
        let mut healthy = broadcaster.subscribe();

        let started = Instant::now();
        for n in 0..10 {
            broadcaster.publish(event(n));
            assert_eq!(healthy.recv().await, Some(event(n)));
        }
        assert!(started.elapsed() < Duration::from_secs(1));

        assert_eq!(broadcaster.observer_count(), 1);
        // The two events queued before the overflow are still readable, then the queue closes.
        assert_eq!(stalled.recv().await, Some(event(0)));
        assert_eq!(stalled.recv().await, Some(event(1)));
        assert_eq!(stalled.recv().await, None);
    }

    #[tokio::test]
    async fn test_closed_observer_is_dropped() {
        let broadcaster = EventBroadcaster::default();
        let gone = broadcaster.subscribe();
        let _kept = broadcaster.subscribe();
        drop(gone);

        assert_eq!(broadcaster.publish(event(0)), 1);
        assert_eq!(broadcaster.observer_count(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let broadcaster = EventBroadcaster::default();
        let sub = broadcaster.subscribe();

        assert!(broadcaster.unsubscribe(sub.id()));
        assert!(!broadcaster.unsubscribe(sub.id()));
        assert_eq!(broadcaster.publish(event(0)), 0);
    }
}
