//! # Per-widget visibility coordinator.
//!
//! A [`VisibilityCoordinator`] tracks the visibility of one widget and drives the
//! visibility of the areas the widget owns.
//!
//! ## Two roles
//! ```text
//! listener side (lazy):
//!   didChangeAreaVisibility.<ownArea>.+ ──► state differs? ──► is_visible = v
//!                                                             ├─► tracking property = v
//!                                                             └─► show / hide listeners
//!
//! driver + responder side (after the first update_area_visibility):
//!   update_area_visibility({a: true}) ──► changeAreaVisibilityRequest.<W>.a.true (gathered)
//!   changeAreaVisibilityRequest.<W>.* {area, visible: container}
//!        └─► resolve(area, container) = Some(v) ──► didChangeAreaVisibility.<area>.<v>
//! ```
//!
//! ## Rules
//! - Registering a listener never fires it for the current state.
//! - The change subscription exists only while there is a listener or a tracking
//!   property.
//! - An area without an explicit request inherits the container visibility exactly.
//! - An explicit `true` needs a visible container unless the area has an override;
//!   the override sticks until an update for that area omits it.
//! - `release` is idempotent and final: it clears listeners and tracking, and a
//!   released coordinator never subscribes or publishes again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde_json::Value;

use crate::error::HandlerError;
use crate::events::{EventMeta, PublishOptions, SubscribeOptions, Unsubscribe};
use crate::sync::lock;
use crate::widget::WidgetContext;

use super::area::AreaHelper;
use super::topics::{AREA_CHANGED, AREA_REQUEST, AreaVisibility, VisibilityTopic};

/// Callback receiving the new visibility.
pub type VisibilityListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Property written by [`VisibilityCoordinator::track_visibility`].
pub const DEFAULT_TRACKING_PROPERTY: &str = "isVisible";

/// Options for [`VisibilityCoordinator::update_area_visibility`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AreaUpdateOptions {
    /// Let the updated areas be visible while the widget's container is hidden.
    pub override_container: bool,
}

#[derive(Default)]
struct CoordinatorState {
    is_visible: bool,
    tracking: Option<String>,
    show: Vec<VisibilityListener>,
    hide: Vec<VisibilityListener>,
    changes: Option<Unsubscribe>,
    visibility_by_area: HashMap<String, bool>,
    override_by_area: HashMap<String, bool>,
    area_requests: Option<Unsubscribe>,
    released: bool,
}

impl CoordinatorState {
    fn needs_changes(&self) -> bool {
        !self.released
            && (self.tracking.is_some() || !self.show.is_empty() || !self.hide.is_empty())
    }

    /// Visibility of a local area given the visibility its container proposes.
    fn resolve(&self, local: &str, container: Option<bool>) -> Option<bool> {
        match self.visibility_by_area.get(local) {
            None => container,
            Some(false) => Some(false),
            Some(true) if self.override_by_area.get(local).copied().unwrap_or(false) => Some(true),
            Some(true) => container,
        }
    }
}

struct Inner {
    context: WidgetContext,
    areas: AreaHelper,
    state: Mutex<CoordinatorState>,
}

/// Visibility handler of one widget instance.
///
/// Cheap to clone; clones share state. Call [`release`](Self::release) when the
/// widget goes away.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use widgetry::{Config, ServicesBuilder};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let services = ServicesBuilder::new(Config::default()).build();
///     let ctx = services.widget_context("tabs", "content");
///     let visibility = services.visibility(&ctx);
///
///     let listener: widgetry::visibility::VisibilityListener = Arc::new(|v| println!("now {v}"));
///     visibility.on_change(listener.clone()).track_visibility();
///     visibility.unsubscribe(&listener);
///     visibility.release();
///     services.dispose();
/// }
/// ```
#[derive(Clone)]
pub struct VisibilityCoordinator {
    inner: Arc<Inner>,
}

impl VisibilityCoordinator {
    /// Creates a coordinator; the initial state is what `areas` reports for the widget's area.
    pub fn new(context: WidgetContext, areas: AreaHelper) -> Self {
        let is_visible = areas.is_visible(&context.widget.area);
        Self {
            inner: Arc::new(Inner {
                context,
                areas,
                state: Mutex::new(CoordinatorState {
                    is_visible,
                    ..CoordinatorState::default()
                }),
            }),
        }
    }

    /// Current visibility of the widget's area as known to the area registry.
    pub fn is_visible(&self) -> bool {
        self.inner.areas.is_visible(&self.inner.context.widget.area)
    }

    /// Registers `listener` for hidden → visible transitions.
    pub fn on_show(&self, listener: VisibilityListener) -> &Self {
        self.register(|st| st.show.push(listener));
        self
    }

    /// Registers `listener` for visible → hidden transitions.
    pub fn on_hide(&self, listener: VisibilityListener) -> &Self {
        self.register(|st| st.hide.push(listener));
        self
    }

    /// Registers `listener` for both transitions.
    pub fn on_change(&self, listener: VisibilityListener) -> &Self {
        self.register(|st| {
            st.show.push(Arc::clone(&listener));
            st.hide.push(listener);
        });
        self
    }

    /// Removes every registration of `listener` from both lists.
    ///
    /// Unknown listeners are ignored.
    pub fn unsubscribe(&self, listener: &VisibilityListener) -> &Self {
        {
            let mut st = lock(&self.inner.state);
            st.show.retain(|l| !Arc::ptr_eq(l, listener));
            st.hide.retain(|l| !Arc::ptr_eq(l, listener));
        }
        self.update_change_subscription();
        self
    }

    /// Mirrors the visibility into the context property `property`.
    ///
    /// Switching to another property stops updating the previous one but leaves
    /// its last value in place.
    pub fn track(&self, property: &str) -> &Self {
        self.register(|st| {
            st.tracking = Some(property.to_string());
            self.inner.context.set_property(property, st.is_visible);
        });
        self
    }

    /// [`track`](Self::track) with [`DEFAULT_TRACKING_PROPERTY`].
    pub fn track_visibility(&self) -> &Self {
        self.track(DEFAULT_TRACKING_PROPERTY)
    }

    /// Stops mirroring into the tracking property.
    pub fn stop_tracking(&self) -> &Self {
        lock(&self.inner.state).tracking = None;
        self.update_change_subscription();
        self
    }

    /// Requests new visibility for some of this widget's local areas.
    ///
    /// Areas whose requested visibility and override are unchanged publish nothing.
    /// The returned future resolves once all issued requests have been gathered.
    pub fn update_area_visibility<I, S>(&self, areas: I, options: AreaUpdateOptions) -> BoxFuture<'static, ()>
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        self.ensure_area_responder();

        let mut requests = Vec::new();
        {
            let mut st = lock(&self.inner.state);
            if st.released {
                tracing::debug!(widget = %self.inner.context.widget.id, "area update on released coordinator ignored");
                return futures::future::ready(()).boxed();
            }
            for (name, visible) in areas {
                let name = name.into();
                let old_visible = st.visibility_by_area.insert(name.clone(), visible);
                let old_override = if options.override_container {
                    st.override_by_area.insert(name.clone(), true)
                } else {
                    st.override_by_area.remove(&name)
                };
                let new_override = st.override_by_area.get(&name).copied();
                if old_visible != Some(visible) || old_override != new_override {
                    requests.push(VisibilityTopic::AreaRequest {
                        area: self.inner.areas.full_name(&name),
                        visible,
                    });
                }
            }
        }

        let bus = &self.inner.context.event_bus;
        let pending: Vec<_> = requests
            .into_iter()
            .map(|topic| {
                tracing::debug!(widget = %self.inner.context.widget.id, topic = %topic, "area visibility request");
                bus.publish_and_gather_replies(&topic.encode(), topic.payload(), self.request_options())
            })
            .collect();
        async move {
            join_all(pending).await;
        }
        .boxed()
    }

    /// Shows or hides the whole widget, overriding its container.
    pub fn update_widget_visibility(&self, visible: bool) -> BoxFuture<'static, ()> {
        let topic = VisibilityTopic::WidgetRequest {
            widget: self.inner.context.widget.id.clone(),
            visible,
        };
        let gathered = self.inner.context.event_bus.publish_and_gather_replies(
            &topic.encode(),
            topic.payload(),
            self.request_options(),
        );
        async move {
            gathered.await;
        }
        .boxed()
    }

    /// Drops both bus subscriptions, every listener and the tracking property.
    ///
    /// Later registrations and area updates are ignored.
    pub fn release(&self) {
        let (changes, requests) = {
            let mut st = lock(&self.inner.state);
            st.released = true;
            st.show.clear();
            st.hide.clear();
            st.tracking = None;
            (st.changes.take(), st.area_requests.take())
        };
        for handle in [changes, requests].into_iter().flatten() {
            handle.unsubscribe();
        }
    }

    /// Applies a listener or tracking change unless the coordinator is released.
    fn register(&self, change: impl FnOnce(&mut CoordinatorState)) {
        {
            let mut st = lock(&self.inner.state);
            if st.released {
                tracing::debug!(widget = %self.inner.context.widget.id, "registration on released coordinator ignored");
                return;
            }
            change(&mut st);
        }
        self.update_change_subscription();
    }

    fn request_options(&self) -> PublishOptions {
        PublishOptions::from_sender(self.inner.context.widget.id.as_str()).without_delivery_to_sender()
    }

    fn update_change_subscription(&self) {
        let stale = {
            let mut st = lock(&self.inner.state);
            let needed = st.needs_changes();
            if needed && st.changes.is_none() {
                let pattern = format!("{AREA_CHANGED}.{}.+", self.inner.context.widget.area);
                let weak = Arc::downgrade(&self.inner);
                st.changes = Some(self.inner.context.event_bus.subscribe(
                    &pattern,
                    move |_, meta| match weak.upgrade() {
                        Some(inner) => on_area_changed(&inner, meta),
                        None => Ok(()),
                    },
                    SubscribeOptions::named(self.inner.context.widget.id.as_str()),
                ));
            }
            if needed { None } else { st.changes.take() }
        };
        if let Some(handle) = stale {
            handle.unsubscribe();
        }
    }

    fn ensure_area_responder(&self) {
        let mut st = lock(&self.inner.state);
        if st.released || st.area_requests.is_some() {
            return;
        }
        let pattern = format!("{AREA_REQUEST}.{}.*", self.inner.areas.widget_id());
        let weak = Arc::downgrade(&self.inner);
        st.area_requests = Some(self.inner.context.event_bus.subscribe(
            &pattern,
            move |event, _| match weak.upgrade() {
                Some(inner) => respond(&inner, event),
                None => Ok(()),
            },
            SubscribeOptions::named(self.inner.context.widget.id.as_str()),
        ));
    }
}

fn on_area_changed(inner: &Inner, meta: &EventMeta) -> Result<(), HandlerError> {
    let Some(VisibilityTopic::AreaChanged { visible, .. }) = VisibilityTopic::decode(&meta.name) else {
        return Err(HandlerError::fail(format!("not an area visibility fact: {}", meta.name)));
    };
    let listeners = {
        let mut st = lock(&inner.state);
        if st.is_visible == visible {
            return Ok(());
        }
        st.is_visible = visible;
        if let Some(property) = &st.tracking {
            inner.context.set_property(property, visible);
        }
        if visible { st.show.clone() } else { st.hide.clone() }
    };
    tracing::debug!(widget = %inner.context.widget.id, visible, "widget visibility changed");
    for listener in listeners {
        listener(visible);
    }
    Ok(())
}

fn respond(inner: &Inner, event: &Value) -> Result<(), HandlerError> {
    let request: AreaVisibility = serde_json::from_value(event.clone())
        .map_err(|e| HandlerError::fail(format!("malformed area request: {e}")))?;
    let local = inner.areas.local_name(&request.area);
    let resolved = lock(&inner.state).resolve(&local, Some(request.visible));

    if let Some(visible) = resolved {
        let fact = VisibilityTopic::AreaChanged {
            area: request.area,
            visible,
        };
        let options =
            PublishOptions::from_sender(inner.context.widget.id.as_str()).without_delivery_to_sender();
        let _ = inner
            .context
            .event_bus
            .publish(&fact.encode(), fact.payload(), options);
    }
    Ok(())
}
