//! Sample delivery feed with token-based subscriptions
//!
//! ```text
//! Control thread                         Audio thread
//!     │                                       │
//!     ▼                                       ▼
//! subscribe() / unsubscribe()          deliver(samples, direction)
//!     │   rcu: copy, edit, swap               │   load(): lock-free snapshot
//!     └──────────► ArcSwap<Vec<Entry>> ◄──────┘
//! ```
//!
//! Registration and removal may race with delivery. A subscriber removed
//! while a delivery is in flight can still observe that one buffer.
//!
//! Replaced snapshots are parked on the control side until no delivery holds
//! them, so the last reference is never dropped on the audio thread.

use crate::config::Capability;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Receiver of buffers published on a [`DeliveryFeed`].
///
/// Called synchronously on the real-time thread: must not block or allocate.
pub trait SampleSubscriber: Send + Sync {
    fn on_samples_delivered(&self, samples: &[f32], direction: Capability);
}

/// Opaque handle returned by [`DeliveryFeed::subscribe`], consumed by
/// [`DeliveryFeed::unsubscribe`]
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a subscription leaves the subscriber attached"]
pub struct Subscription {
    id: u64,
}

type Entry = (u64, Arc<dyn SampleSubscriber>);

/// Ids are unique across feeds so a token can't remove another feed's entry
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

pub struct DeliveryFeed {
    subscribers: ArcSwap<Vec<Entry>>,

    /// Superseded snapshots awaiting release; control threads only
    retired: Mutex<Vec<Arc<Vec<Entry>>>>,
}

impl Default for DeliveryFeed {
    fn default() -> Self {
        Self {
            subscribers: ArcSwap::from_pointee(Vec::new()),
            retired: Mutex::new(Vec::new()),
        }
    }
}

impl DeliveryFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Process-wide feed driven by the device backend
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<DeliveryFeed>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(DeliveryFeed::new))
    }

    pub fn subscribe(&self, subscriber: Arc<dyn SampleSubscriber>) -> Subscription {
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        let previous = self.subscribers.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push((id, Arc::clone(&subscriber)));
            next
        });
        self.retire(previous);
        debug!(id, "feed subscriber registered");
        Subscription { id }
    }

    /// Remove a subscriber. Returns false if the token was not registered here.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let id = subscription.id;
        let previous = self.subscribers.rcu(|current| {
            current
                .iter()
                .filter(|(entry_id, _)| *entry_id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
        let removed = previous.iter().any(|(entry_id, _)| *entry_id == id);
        self.retire(previous);
        debug!(id, removed, "feed subscriber removed");
        removed
    }

    /// Park a replaced snapshot and free those no delivery still holds
    fn retire(&self, snapshot: Arc<Vec<Entry>>) {
        let mut retired = self.retired.lock();
        retired.retain(|old| Arc::strong_count(old) > 1);
        retired.push(snapshot);
    }

    /// Publish one buffer to every subscriber, in registration order
    pub fn deliver(&self, samples: &[f32], direction: Capability) {
        let subscribers = self.subscribers.load();
        for (_, subscriber) in subscribers.iter() {
            subscriber.on_samples_delivered(samples, direction);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counter {
        buffers: AtomicUsize,
        samples: AtomicUsize,
    }

    impl SampleSubscriber for Counter {
        fn on_samples_delivered(&self, samples: &[f32], _direction: Capability) {
            self.buffers.fetch_add(1, Ordering::SeqCst);
            self.samples.fetch_add(samples.len(), Ordering::SeqCst);
        }
    }

    #[test]
    fn test_deliver_reaches_subscribers() {
        let feed = DeliveryFeed::new();
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        let sub_a = feed.subscribe(a.clone());
        let _sub_b = feed.subscribe(b.clone());

        feed.deliver(&[0.0; 64], Capability::Recording);
        assert_eq!(a.buffers.load(Ordering::SeqCst), 1);
        assert_eq!(b.samples.load(Ordering::SeqCst), 64);

        assert!(feed.unsubscribe(sub_a));
        feed.deliver(&[0.0; 64], Capability::Recording);
        assert_eq!(a.buffers.load(Ordering::SeqCst), 1);
        assert_eq!(b.buffers.load(Ordering::SeqCst), 2);
        assert_eq!(feed.subscriber_count(), 1);
    }

    #[test]
    fn test_foreign_token_is_rejected() {
        let feed_a = DeliveryFeed::new();
        let feed_b = DeliveryFeed::new();
        let sub = feed_a.subscribe(Arc::new(Counter::default()));
        let _other = feed_b.subscribe(Arc::new(Counter::default()));

        assert!(!feed_b.unsubscribe(sub));
        assert_eq!(feed_a.subscriber_count(), 1);
        assert_eq!(feed_b.subscriber_count(), 1);
    }

    #[test]
    fn test_snapshot_held_by_delivery_is_freed_on_control_side() {
        let feed = DeliveryFeed::new();
        let counter = Arc::new(Counter::default());
        let sub = feed.subscribe(counter.clone());

        // A delivery in flight holds the snapshot across the removal
        let in_flight = feed.subscribers.load_full();
        assert!(feed.unsubscribe(sub));
        drop(in_flight);

        // Still parked: the audio side's drop did not release the subscriber
        assert_eq!(Arc::strong_count(&counter), 2);

        // The next control operation frees it
        let other = feed.subscribe(Arc::new(Counter::default()));
        assert_eq!(Arc::strong_count(&counter), 1);
        assert!(feed.unsubscribe(other));
    }

    #[test]
    fn test_concurrent_subscribe_while_delivering() {
        let feed = DeliveryFeed::new();
        let counter = Arc::new(Counter::default());
        let _base = feed.subscribe(counter.clone());

        let control = {
            let feed = Arc::clone(&feed);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    let sub = feed.subscribe(Arc::new(Counter::default()));
                    feed.unsubscribe(sub);
                }
            })
        };

        for _ in 0..1000 {
            feed.deliver(&[0.0; 16], Capability::Mixed);
        }
        control.join().unwrap();

        assert_eq!(counter.buffers.load(Ordering::SeqCst), 1000);
        assert_eq!(feed.subscriber_count(), 1);
    }
}
