//! Event bus: topics, subscriptions, delivery cycles and request/reply gathering.
//!
//! ## Contents
//! - [`TopicPattern`] and [`reply_topics`] topic matching and `will`/`did` derivation
//! - [`EventBus`] cycle-batched publish/subscribe, driven by a [`Heartbeat`](crate::Heartbeat)
//! - [`EventMeta`], [`SubscribeOptions`], [`PublishOptions`], [`Reply`] the event data model
//! - [`Unsubscribe`] handle returned by every registration
//!
//! ## Quick reference
//! - **Publishers**: widgets (through [`WidgetContext`](crate::WidgetContext)),
//!   [`VisibilityCoordinator`](crate::visibility::VisibilityCoordinator) and
//!   [`VisibilityEventManager`](crate::visibility::VisibilityEventManager).
//! - **Consumers**: any subscription; delivery faults go to the bus error handler
//!   (see [`diagnostics`](crate::diagnostics)).

mod bus;
mod event;
mod gather;
mod subscription;
mod topic;

pub use bus::{EventBus, EventBusConfig, Inspector};
pub use event::{
    ANONYMOUS, DELIVERY_ERROR_TOPIC, EventMeta, InspectAction, Inspection, PublishOptions, Reply,
    SubscribeOptions,
};
pub use subscription::{Callback, Unsubscribe};
pub use topic::{TopicPattern, reply_topics};
