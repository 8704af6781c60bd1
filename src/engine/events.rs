//! Engine events and the notifier that publishes them.
//!
//! Subscribers are registered explicitly and called synchronously after the
//! mutation that produced the event. There is no implicit reactivity: a view
//! that wants to re-render subscribes to `WindowChanged`.

use crate::model::{IsolationId, ItemIndex, SnapshotId};
use crate::worker::NotificationLevel;
use serde::Serialize;
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::debug;

/// Something observable changed in an engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The visible window was recomputed and differs from the last one.
    WindowChanged {
        /// Isolation context.
        isolation: IsolationId,
        /// Scroll offset of the new window.
        scroll_top: i64,
        /// Number of rows in the new window.
        rows: usize,
    },
    /// A row height change moved the scroll position.
    ScrollCorrected {
        /// Isolation context.
        isolation: IsolationId,
        /// Applied shift in pixels.
        delta: i64,
    },
    /// Item metadata was committed.
    MetadataArrived {
        /// Isolation context.
        isolation: IsolationId,
        /// Items that arrived, in index order.
        items: Vec<ItemIndex>,
    },
    /// A message for the user.
    Notification {
        /// Isolation context.
        isolation: IsolationId,
        /// Severity.
        level: NotificationLevel,
        /// Message text.
        message: String,
    },
    /// All layout state was discarded.
    Reset {
        /// Isolation context.
        isolation: IsolationId,
        /// Snapshot now in effect, if any.
        snapshot: Option<SnapshotId>,
    },
}

/// Handle returned by [`Notifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(usize);

type Callback = Box<dyn FnMut(&EngineEvent) + Send>;

enum Subscriber {
    Callback(Callback),
    Channel(Sender<EngineEvent>),
}

impl Subscriber {
    /// Deliver one event. Returns false once the subscriber can never receive again.
    fn deliver(&mut self, event: &EngineEvent) -> bool {
        match self {
            Subscriber::Callback(callback) => {
                callback(event);
                true
            }
            Subscriber::Channel(tx) => tx.send(event.clone()).is_ok(),
        }
    }
}

/// Explicit publish/subscribe over [`EngineEvent`].
#[derive(Default)]
pub struct Notifier {
    next_id: usize,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl Notifier {
    /// Create a notifier without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `callback` for every later event.
    pub fn subscribe(&mut self, callback: impl FnMut(&EngineEvent) + Send + 'static) -> SubscriptionId {
        self.register(Subscriber::Callback(Box::new(callback)))
    }

    /// Deliver later events on a channel.
    ///
    /// The subscription is dropped on the first publish after the receiver is.
    pub fn channel(&mut self) -> (SubscriptionId, Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel();
        (self.register(Subscriber::Channel(tx)), rx)
    }

    fn register(&mut self, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, subscriber));
        id
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Call every subscriber in registration order, pruning closed channels.
    pub fn publish(&mut self, event: EngineEvent) {
        self.subscribers.retain_mut(|(id, subscriber)| {
            let live = subscriber.deliver(&event);
            if !live {
                debug!(subscription = id.0, "Dropping closed event channel");
            }
            live
        });
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// True without subscribers.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn reset_event() -> EngineEvent {
        EngineEvent::Reset {
            isolation: IsolationId::main(),
            snapshot: None,
        }
    }

    #[test]
    fn subscribers_receive_events_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut notifier = Notifier::new();
        let first = Arc::clone(&seen);
        notifier.subscribe(move |_| first.lock().unwrap().push(1));
        let second = Arc::clone(&seen);
        notifier.subscribe(move |_| second.lock().unwrap().push(2));

        notifier.publish(reset_event());

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn unsubscribed_callback_is_not_called() {
        let mut notifier = Notifier::new();
        let (id, rx) = notifier.channel();
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));

        notifier.publish(reset_event());

        assert!(rx.try_recv().is_err());
        assert!(notifier.is_empty());
    }

    #[test]
    fn dropped_receiver_is_pruned_on_publish() {
        let mut notifier = Notifier::new();
        let (_, kept) = notifier.channel();
        let (_, dropped) = notifier.channel();
        notifier.subscribe(|_| {});
        drop(dropped);
        assert_eq!(notifier.len(), 3);

        notifier.publish(reset_event());

        assert_eq!(notifier.len(), 2);
        assert_eq!(kept.try_recv().unwrap(), reset_event());

        drop(kept);
        notifier.publish(reset_event());
        assert_eq!(notifier.len(), 1);
    }

    #[test]
    fn channel_delivers_clones() {
        let mut notifier = Notifier::new();
        let (_, rx) = notifier.channel();
        notifier.publish(reset_event());
        assert_eq!(rx.try_recv().unwrap(), reset_event());
    }
}
