//! # widgetry
//!
//! **Widgetry** is the runtime core of a widget composition framework.
//!
//! It provides the event bus widgets talk through, the heartbeat that batches
//! delivery into cycles, and the visibility protocol that lets independent
//! widgets agree on which areas of a page are shown, without any central lock.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   Widget A   │   │   Widget B   │   │   Widget C   │
//!     │ WidgetContext│   │ WidgetContext│   │ WidgetContext│
//!     │ Visibility-  │   │ Visibility-  │   │ Visibility-  │
//!     │  Coordinator │   │  Coordinator │   │  Coordinator │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │ publish / subscribe / publish_and_gather_replies
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  EventBus (queue + ordered subscription set)                      │
//! │  - wildcard topics (`+` one segment, trailing `*` the rest)       │
//! │  - will/did gathering with timeout                                │
//! │  - faults ──► ErrorHandler (LogWriter by default)                 │
//! └──────┬─────────────────────────────────────────────────────▲──────┘
//!        │ first event since last cycle: on_next(run_cycle)    │
//!        ▼                                                     │
//! ┌──────────────────────────────┐                             │
//! │  Heartbeat                   │    deliver every queued     │
//! │  before_next ► next ► after  │ ──── event to a snapshot ───┘
//! └──────────────────────────────┘      of the subscriptions
//!
//!            VisibilityEventManager (page level, subscribed to the bus)
//!            └─► AreaRegistry ◄── AreaHelper (per widget, read only)
//! ```
//!
//! ### Delivery cycle
//! ```text
//! publish(topic) ──► queue ──► heartbeat tick:
//!   for event in queue (FIFO):
//!     for subscription in snapshot (registration order):
//!       ├─ pattern matches? deliver_to_sender? delivery-error opt-in?
//!       ├─ callback(&payload, &meta)
//!       │    └─ Err / panic ─► error handler, didEncounterError.DELIVERY
//!       └─ next
//!   events published during the cycle ─► next cycle
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types                                  |
//! |-------------------|--------------------------------------------------------------|--------------------------------------------|
//! | **Event bus**     | Cycle-batched pub/sub with wildcard topics and gathering.    | [`EventBus`], [`TopicPattern`]             |
//! | **Scheduling**    | Next-tick batching with before/after hooks.                  | [`Heartbeat`]                              |
//! | **Visibility**    | Per-widget listeners, area requests, page propagation.       | [`visibility::VisibilityCoordinator`]      |
//! | **Diagnostics**   | Titled, redactable fault reports.                            | [`diagnostics::ErrorInfo`], [`LogWriter`]  |
//! | **Errors**        | Typed errors for subscribers, delivery and configuration.    | [`HandlerError`], [`DeliveryError`]        |
//! | **Configuration** | JSON configuration with defaults.                            | [`Config`], [`Paths`]                      |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use widgetry::visibility::AreaUpdateOptions;
//! use widgetry::{Config, ServicesBuilder};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let services = ServicesBuilder::new(Config::default())
//!         .with_page_areas(["content"])
//!         .build();
//!     services.visibility_manager().register_widget("tabs", "content", ["first", "second"]);
//!
//!     let ctx = services.widget_context("tabs", "content");
//!     let visibility = services.visibility(&ctx);
//!     visibility.on_show(Arc::new(|_| println!("tabs shown")));
//!     visibility
//!         .update_area_visibility([("first", true), ("second", false)], AreaUpdateOptions::default())
//!         .await;
//!
//!     services.visibility_manager().set_page_visibility(true).await;
//!     services.global_event_bus().flush().await;
//!
//!     let areas = services.area_helper("tabs");
//!     assert!(areas.is_visible("tabs.first"));
//!     assert!(!areas.is_visible("tabs.second"));
//!
//!     visibility.release();
//!     services.dispose();
//! }
//! ```
mod config;
mod error;
mod heartbeat;
mod services;
mod sync;
mod widget;

pub mod diagnostics;
pub mod events;
pub mod visibility;

// ---- Public re-exports ----

pub use config::{Config, Paths};
pub use diagnostics::{ErrorInfo, LogWriter};
pub use error::{ConfigError, DeliveryError, HandlerError};
pub use events::{
    EventBus, EventBusConfig, EventMeta, PublishOptions, Reply, SubscribeOptions, TopicPattern,
    Unsubscribe,
};
pub use heartbeat::Heartbeat;
pub use services::{Services, ServicesBuilder};
pub use widget::{WidgetContext, WidgetInfo};
