//! # Subscriptions and their handles.
//!
//! The bus keeps subscriptions in registration order; that order is the delivery
//! order among all subscriptions matching one event.
//!
//! ## Rules
//! - A subscription lives until [`Unsubscribe::unsubscribe`] is called. Dropping
//!   the handle does **not** unsubscribe.
//! - Unsubscribing marks the subscription inactive immediately, so a delivery pass
//!   that already took its snapshot skips it for the remaining events.
//! - `deliver_to_sender = false` skips a subscription only when both the sender and
//!   the subscriber are named and the names are equal.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use crate::error::HandlerError;

use super::event::{ANONYMOUS, EventKind, EventMeta, QueuedEvent};
use super::topic::TopicPattern;

/// Subscriber callback: receives the payload and the event metadata.
///
/// Returning `Err` (or panicking) is reported as a subscriber fault; delivery to
/// other subscribers continues.
pub type Callback = Arc<dyn Fn(&Value, &EventMeta) -> Result<(), HandlerError> + Send + Sync>;

/// One registered subscription.
pub(crate) struct Subscription {
    pub id: u64,
    pub pattern: TopicPattern,
    pub subscriber: Option<String>,
    pub callback: Callback,
    pub delivery_errors: bool,
    active: AtomicBool,
}

impl Subscription {
    pub fn new(
        id: u64,
        pattern: TopicPattern,
        subscriber: Option<String>,
        callback: Callback,
        delivery_errors: bool,
    ) -> Self {
        Self {
            id,
            pattern,
            subscriber,
            callback,
            delivery_errors,
            active: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        self.subscriber.as_deref().unwrap_or(ANONYMOUS)
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Whether `event` should be handed to this subscription.
    pub fn accepts(&self, event: &QueuedEvent) -> bool {
        if !self.is_active() {
            return false;
        }
        if event.kind == EventKind::DeliveryError && !self.delivery_errors {
            return false;
        }
        if !event.deliver_to_sender {
            if let (Some(sender), Some(subscriber)) = (&event.sender, &self.subscriber) {
                if sender == subscriber {
                    return false;
                }
            }
        }
        self.pattern.matches(&event.name)
    }
}

/// Ordered set of subscriptions.
#[derive(Default)]
pub(crate) struct SubscriptionSet {
    items: Vec<Arc<Subscription>>,
}

impl SubscriptionSet {
    pub fn add(&mut self, subscription: Arc<Subscription>) {
        self.items.push(subscription);
    }

    pub fn remove(&mut self, id: u64) {
        if let Some(pos) = self.items.iter().position(|s| s.id == id) {
            self.items.remove(pos).deactivate();
        }
    }

    /// Stable copy used for one delivery cycle.
    pub fn snapshot(&self) -> Vec<Arc<Subscription>> {
        self.items.clone()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

struct HandleInner {
    done: AtomicBool,
    remove: Box<dyn Fn() + Send + Sync>,
}

/// Handle returned by [`EventBus::subscribe`](crate::EventBus::subscribe) and
/// [`EventBus::add_inspector`](crate::EventBus::add_inspector).
///
/// Cheap to clone; all clones refer to the same registration. Calling
/// [`unsubscribe`](Self::unsubscribe) more than once is a no-op.
#[derive(Clone)]
pub struct Unsubscribe {
    inner: Arc<HandleInner>,
}

impl Unsubscribe {
    pub(crate) fn new(remove: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                done: AtomicBool::new(false),
                remove: Box::new(remove),
            }),
        }
    }

    /// Removes exactly this registration.
    pub fn unsubscribe(&self) {
        if !self.inner.done.swap(true, Ordering::AcqRel) {
            (self.inner.remove)();
        }
    }

    /// True until [`unsubscribe`](Self::unsubscribe) has been called.
    pub fn is_active(&self) -> bool {
        !self.inner.done.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event::PublishOptions;
    use std::sync::atomic::AtomicUsize;

    fn subscription(id: u64, pattern: &str, subscriber: Option<&str>) -> Subscription {
        Subscription::new(
            id,
            TopicPattern::new(pattern),
            subscriber.map(str::to_string),
            Arc::new(|_: &Value, _: &EventMeta| Ok(())),
            false,
        )
    }

    #[test]
    fn test_deliver_to_sender_needs_both_names() {
        let own = subscription(1, "a", Some("w1"));
        let anon = subscription(2, "a", None);
        let opts = PublishOptions::from_sender("w1").without_delivery_to_sender();
        let ev = QueuedEvent::new("a", Value::Null, &opts);
        assert!(!own.accepts(&ev));
        assert!(anon.accepts(&ev));

        let unnamed = QueuedEvent::new("a", Value::Null, &PublishOptions::default().without_delivery_to_sender());
        assert!(own.accepts(&unnamed));
    }

    #[test]
    fn test_delivery_errors_need_opt_in() {
        let plain = subscription(1, "*", None);
        let mut opted = subscription(2, "*", None);
        opted.delivery_errors = true;
        let ev = QueuedEvent::delivery_error(Value::Null);
        assert!(!plain.accepts(&ev));
        assert!(opted.accepts(&ev));
    }

    #[test]
    fn test_removed_subscription_is_inactive_in_snapshots() {
        let mut set = SubscriptionSet::default();
        set.add(Arc::new(subscription(1, "a", None)));
        set.add(Arc::new(subscription(2, "a", None)));
        let snapshot = set.snapshot();

        set.remove(1);
        assert_eq!(set.len(), 1);
        assert!(!snapshot[0].is_active());
        assert!(snapshot[1].is_active());
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = Unsubscribe::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let clone = handle.clone();

        handle.unsubscribe();
        clone.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!handle.is_active());
    }
}
