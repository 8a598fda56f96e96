//! Process-wide broadcast hub.
//!
//! Every live session subscribes a bounded channel. Publishing is
//! non-blocking: a subscriber whose channel is full is marked overflowed and
//! woken, and its event loop ends the session, so one slow browser never
//! stalls the rest. Dropping a [`Subscription`] removes it from the hub.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::message::Message;
use crate::session::SessionKey;

/// Hub errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// The hub has been shut down.
    #[error("Hub is shut down")]
    Closed,
}

/// Identifies one subscription.
pub type SubscriptionId = u64;

struct Subscriber {
    key: SessionKey,
    tx: mpsc::Sender<Arc<Message>>,
    overflowed: Arc<AtomicBool>,
    overflow: Arc<Notify>,
}

#[derive(Default)]
struct HubState {
    subscribers: HashMap<SubscriptionId, Subscriber>,
    closed: bool,
}

/// A session's end of the hub. Unsubscribes on drop.
pub struct Subscription {
    id: SubscriptionId,
    hub: Arc<Hub>,
    rx: mpsc::Receiver<Arc<Message>>,
    overflowed: Arc<AtomicBool>,
    overflow: Arc<Notify>,
}

impl Subscription {
    /// The subscription id, for [`Hub::unsubscribe`].
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Receive the next published message. `None` once the hub dropped this
    /// subscriber.
    pub async fn recv(&mut self) -> Option<Arc<Message>> {
        self.rx.recv().await
    }

    /// Receive a message if one is queued.
    pub fn try_recv(&mut self) -> Option<Arc<Message>> {
        self.rx.try_recv().ok()
    }

    /// Whether a publish found this subscriber's channel full.
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.overflowed.load(Ordering::Acquire)
    }

    /// Notified once when a publish finds the channel full. The permit is
    /// kept if nobody is waiting yet.
    #[must_use]
    pub fn overflow_signal(&self) -> Arc<Notify> {
        self.overflow.clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}

/// The broadcast hub.
pub struct Hub {
    state: Mutex<HubState>,
    next_id: AtomicU64,
}

impl Hub {
    /// Create a hub with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a session's channel of `capacity` messages.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] after [`Hub::shutdown`].
    pub fn subscribe(
        self: &Arc<Self>,
        key: SessionKey,
        capacity: usize,
    ) -> Result<Subscription, HubError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(HubError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let overflowed = Arc::new(AtomicBool::new(false));
        let overflow = Arc::new(Notify::new());
        state.subscribers.insert(
            id,
            Subscriber {
                key,
                tx,
                overflowed: overflowed.clone(),
                overflow: overflow.clone(),
            },
        );

        debug!(session = %key, subscribers = state.subscribers.len(), "Subscribed");
        Ok(Subscription {
            id,
            hub: self.clone(),
            rx,
            overflowed,
            overflow,
        })
    }

    /// Remove a subscription. Removing twice is harmless.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.state.lock().subscribers.remove(&id);
        if let Some(sub) = &removed {
            debug!(session = %sub.key, "Unsubscribed");
        }
        removed.is_some()
    }

    /// Deliver `message` to every subscriber except its origin.
    ///
    /// Returns the number of subscribers that accepted it.
    pub fn publish(&self, message: Message) -> usize {
        let message = Arc::new(message);
        let state = self.state.lock();
        let mut delivered = 0;

        for sub in state.subscribers.values() {
            if message.is_from(sub.key) {
                continue;
            }
            match sub.tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    if !sub.overflowed.swap(true, Ordering::AcqRel) {
                        warn!(session = %sub.key, "Broadcast queue full");
                        sub.overflow.notify_one();
                    }
                }
                Err(TrySendError::Closed(_)) => {
                    trace!(session = %sub.key, "Subscriber already gone");
                }
            }
        }

        trace!(recipients = delivered, "Published message");
        delivered
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Close every subscriber channel and refuse new subscriptions.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        let count = state.subscribers.len();
        state.subscribers.clear();
        debug!(subscribers = count, "Hub shut down");
    }

    /// Whether [`Hub::shutdown`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::Tag;
    use std::time::Duration;

    fn dirty() -> Message {
        Message::dirty(vec![Tag::from("x")])
    }

    fn hub() -> Arc<Hub> {
        Arc::new(Hub::new())
    }

    #[test]
    fn test_hub_publish() {
        let hub = hub();

        let mut a = hub.subscribe(SessionKey(1), 8).unwrap();
        let mut b = hub.subscribe(SessionKey(2), 8).unwrap();
        assert_eq!(hub.subscriber_count(), 2);

        assert_eq!(hub.publish(dirty()), 2);
        assert!(a.try_recv().is_some());
        assert!(b.try_recv().is_some());
    }

    #[test]
    fn test_hub_skips_origin() {
        let hub = hub();

        let mut a = hub.subscribe(SessionKey(1), 8).unwrap();
        let mut b = hub.subscribe(SessionKey(2), 8).unwrap();

        assert_eq!(hub.publish(dirty().with_origin(SessionKey(1))), 1);
        assert!(a.try_recv().is_none());
        assert!(b.try_recv().is_some());
    }

    #[tokio::test]
    async fn test_hub_overflow_signals_subscriber() {
        let hub = hub();

        let slow = hub.subscribe(SessionKey(1), 2).unwrap();
        let mut fast = hub.subscribe(SessionKey(2), 16).unwrap();

        for _ in 0..5 {
            hub.publish(dirty());
        }

        assert!(slow.overflowed());
        assert!(!fast.overflowed());
        // the permit waits for the event loop
        tokio::time::timeout(Duration::from_secs(1), slow.overflow_signal().notified())
            .await
            .expect("overflow was not signalled");
        // the hub does not drop the subscriber itself
        assert_eq!(hub.subscriber_count(), 2);

        let mut got = 0;
        while fast.try_recv().is_some() {
            got += 1;
        }
        assert_eq!(got, 5);
    }

    #[test]
    fn test_hub_unsubscribe_idempotent() {
        let hub = hub();
        let sub = hub.subscribe(SessionKey(1), 8).unwrap();

        assert!(hub.unsubscribe(sub.id()));
        assert!(!hub.unsubscribe(sub.id()));
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(dirty()), 0);
    }

    #[test]
    fn test_dropped_subscription_unsubscribes() {
        let hub = hub();
        let a = hub.subscribe(SessionKey(1), 8).unwrap();
        let b = hub.subscribe(SessionKey(2), 8).unwrap();

        drop(a);
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(hub.publish(dirty()), 1);

        let id = b.id();
        drop(b);
        assert_eq!(hub.subscriber_count(), 0);
        assert!(!hub.unsubscribe(id));
    }

    #[tokio::test]
    async fn test_hub_shutdown() {
        let hub = hub();
        let mut sub = hub.subscribe(SessionKey(1), 8).unwrap();

        hub.shutdown();
        assert!(hub.is_closed());
        // channel closes with the hub
        assert!(sub.recv().await.is_none());
        assert_eq!(hub.subscribe(SessionKey(2), 8).err(), Some(HubError::Closed));
    }
}
