//! # Event data model: metadata, options and replies.
//!
//! Payloads are [`serde_json::Value`]s. The bus wraps each payload in an `Arc`
//! at publish time and hands every recipient a shared, immutable reference, so a
//! subscriber can never observe another subscriber's changes.
//!
//! ## Example
//! ```rust
//! use widgetry::{PublishOptions, SubscribeOptions};
//!
//! let sub = SubscribeOptions::named("w1").with_delivery_errors();
//! assert_eq!(sub.subscriber.as_deref(), Some("w1"));
//!
//! let publish = PublishOptions::from_sender("w1").without_delivery_to_sender();
//! assert!(!publish.deliver_to_sender);
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;

/// Name used for subscribers and senders that did not identify themselves.
pub const ANONYMOUS: &str = "anonymous";

/// Topic under which subscriber faults are announced to opted-in subscriptions.
pub const DELIVERY_ERROR_TOPIC: &str = "didEncounterError.DELIVERY";

/// Metadata passed to every subscriber callback next to the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMeta {
    /// Full topic of the delivered event.
    pub name: String,
    /// Logical sender, if the publisher named one.
    pub sender: Option<String>,
    /// Delivery cycle in which the event is being delivered.
    pub cycle_id: u64,
}

impl EventMeta {
    /// Sender name, falling back to [`ANONYMOUS`].
    pub fn sender_name(&self) -> &str {
        self.sender.as_deref().unwrap_or(ANONYMOUS)
    }
}

/// Options for [`EventBus::subscribe`](crate::EventBus::subscribe).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Logical subscriber name, used for diagnostics and `deliver_to_sender` checks.
    pub subscriber: Option<String>,
    /// Also receive `didEncounterError.DELIVERY` events matching the pattern.
    pub subscribe_to_delivery_errors: bool,
}

impl SubscribeOptions {
    /// Options for a named subscriber.
    pub fn named(subscriber: impl Into<String>) -> Self {
        Self {
            subscriber: Some(subscriber.into()),
            ..Self::default()
        }
    }

    /// Opts into delivery-error events.
    pub fn with_delivery_errors(mut self) -> Self {
        self.subscribe_to_delivery_errors = true;
        self
    }
}

/// Options for [`EventBus::publish`](crate::EventBus::publish) and
/// [`EventBus::publish_and_gather_replies`](crate::EventBus::publish_and_gather_replies).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    /// Logical sender name.
    pub sender: Option<String>,
    /// Deliver to subscriptions registered under the sender's own name (default `true`).
    pub deliver_to_sender: bool,
    /// Overrides the bus-wide gathering timeout for this request.
    pub pending_did_timeout: Option<Duration>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            sender: None,
            deliver_to_sender: true,
            pending_did_timeout: None,
        }
    }
}

impl PublishOptions {
    /// Options for a named sender.
    pub fn from_sender(sender: impl Into<String>) -> Self {
        Self {
            sender: Some(sender.into()),
            ..Self::default()
        }
    }

    /// Skips subscriptions registered under the sender's name.
    pub fn without_delivery_to_sender(mut self) -> Self {
        self.deliver_to_sender = false;
        self
    }

    /// Sets the gathering timeout for this request.
    pub fn with_pending_did_timeout(mut self, timeout: Duration) -> Self {
        self.pending_did_timeout = Some(timeout);
        self
    }
}

/// One reply collected by a gathering request.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Reply payload.
    pub event: Value,
    /// Reply metadata (topic, sender, cycle).
    pub meta: EventMeta,
}

/// What happened to one published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct DeliveryReport {
    /// Number of subscriptions the event was handed to.
    pub recipients: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventKind {
    Regular,
    DeliveryError,
}

/// An event waiting for the next delivery cycle.
pub(crate) struct QueuedEvent {
    pub name: String,
    pub payload: Arc<Value>,
    pub sender: Option<String>,
    pub deliver_to_sender: bool,
    pub kind: EventKind,
    pub done: Option<oneshot::Sender<DeliveryReport>>,
}

impl QueuedEvent {
    pub fn new(name: &str, payload: Value, options: &PublishOptions) -> Self {
        Self {
            name: name.to_string(),
            payload: Arc::new(payload),
            sender: options.sender.clone(),
            deliver_to_sender: options.deliver_to_sender,
            kind: EventKind::Regular,
            done: None,
        }
    }

    pub fn delivery_error(payload: Value) -> Self {
        Self {
            name: DELIVERY_ERROR_TOPIC.to_string(),
            payload: Arc::new(payload),
            sender: None,
            deliver_to_sender: true,
            kind: EventKind::DeliveryError,
            done: None,
        }
    }
}

/// Bus activity reported to inspectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectAction {
    /// A subscription was registered.
    Subscribe,
    /// An event was queued.
    Publish,
    /// An event was handed to one subscriber.
    Deliver,
}

/// One observation handed to inspectors registered with
/// [`EventBus::add_inspector`](crate::EventBus::add_inspector).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    /// What happened.
    pub action: InspectAction,
    /// Publisher (for `Publish`/`Deliver`) or subscriber (for `Subscribe`).
    pub source: String,
    /// Receiving subscriber for `Deliver`, empty otherwise.
    pub target: String,
    /// Topic, or the pattern for `Subscribe`.
    pub topic: String,
    /// Current cycle id.
    pub cycle_id: u64,
}
