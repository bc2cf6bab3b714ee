//! # Page-level visibility manager.
//!
//! The [`VisibilityEventManager`] is the counterpart of every widget's
//! [`VisibilityCoordinator`](super::VisibilityCoordinator). It keeps the
//! [`AreaRegistry`] in sync with the facts on the bus and pushes container
//! visibility down the widget tree.
//!
//! ## Flow
//! ```text
//! didChangeAreaVisibility.<A>.<v>        ──► record fact; if changed, for each widget X in A:
//!                                              ├─ X drives its own areas ─► changeAreaVisibilityRequest.<X.a>.<cv(X)>
//!                                              └─ otherwise               ─► didChangeAreaVisibility.<X.a>.<cv(X)>
//! changeAreaVisibilityRequest.<W.a>.<v>  ──► W drives its own areas: forward as changeAreaVisibilityRequest.<W.a>.<cv(W)>
//!                                            otherwise: didChangeAreaVisibility.<W.a>.<cv(W)>
//! changeAreaVisibilityRequest.<A>.<v>    ──► (page area) didChangeAreaVisibility.<A>.<v>
//! changeWidgetVisibilityRequest.<W>.<v>  ──► willChangeWidgetVisibility, override cv(W) = v,
//!                                            cascade to W's areas, didChangeWidgetVisibility
//! ```
//! `cv(X)` is the effective container visibility of widget `X`.
//!
//! Cascades stop at facts that do not change anything, so repeated facts are cheap.

use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};

use crate::error::HandlerError;
use crate::events::{EventBus, EventMeta, PublishOptions, SubscribeOptions, Unsubscribe};
use crate::sync::lock;

use super::area::AreaRegistry;
use super::topics::{AREA_CHANGED, AREA_REQUEST, VisibilityTopic, WIDGET_REQUEST, widget_reply_topics};

/// Subscriber and sender name of the manager.
pub const MANAGER_NAME: &str = "AxVisibilityEventManager";

type Handler = fn(&ManagerInner, &EventMeta) -> Result<(), HandlerError>;

struct ManagerInner {
    bus: EventBus,
    registry: AreaRegistry,
    subscriptions: Mutex<Vec<Unsubscribe>>,
}

impl ManagerInner {
    fn publish(&self, topic: &VisibilityTopic, options: PublishOptions) -> BoxFuture<'static, ()> {
        self.bus.publish(&topic.encode(), topic.payload(), options)
    }

    /// Pushes the container visibility of `widget` into its areas.
    fn propagate(&self, widget: &str) {
        let visible = self.registry.container_visible(widget);
        let self_managed = self.registry.is_self_managed(widget);
        for local in self.registry.areas_of(widget) {
            let area = format!("{widget}.{local}");
            if self_managed {
                let request = VisibilityTopic::AreaRequest { area, visible };
                let _ = self.publish(&request, forward_options());
            } else {
                let fact = VisibilityTopic::AreaChanged { area, visible };
                let _ = self.publish(&fact, PublishOptions::from_sender(MANAGER_NAME));
            }
        }
    }
}

fn forward_options() -> PublishOptions {
    PublishOptions::from_sender(MANAGER_NAME).without_delivery_to_sender()
}

/// Keeps area visibility consistent across the page.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct VisibilityEventManager {
    inner: Arc<ManagerInner>,
}

impl VisibilityEventManager {
    /// Subscribes to all visibility topics on `bus`.
    pub fn new(bus: EventBus, registry: AreaRegistry) -> Self {
        let inner = Arc::new(ManagerInner {
            bus,
            registry,
            subscriptions: Mutex::new(Vec::new()),
        });
        let subscriptions = vec![
            subscribe(&inner, &format!("{AREA_CHANGED}.*"), on_area_changed),
            subscribe(&inner, &format!("{AREA_REQUEST}.*"), on_area_request),
            subscribe(&inner, &format!("{WIDGET_REQUEST}.*"), on_widget_request),
        ];
        *lock(&inner.subscriptions) = subscriptions;
        Self { inner }
    }

    /// Registry this manager writes to.
    pub fn registry(&self) -> &AreaRegistry {
        &self.inner.registry
    }

    /// Declares top-level page areas.
    pub fn register_page_areas<I, S>(&self, areas: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.registry.register_page_areas(areas);
    }

    /// Declares widget `id`, rendered into `container`, owning the given local areas.
    pub fn register_widget<I, S>(&self, id: &str, container: &str, areas: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.registry.register_widget(id, container, areas);
    }

    /// Publishes a visibility fact for every page area.
    ///
    /// Resolves once the facts themselves are delivered; the cascade into nested
    /// areas continues in later cycles (see [`EventBus::flush`]).
    pub fn set_page_visibility(&self, visible: bool) -> BoxFuture<'static, ()> {
        let facts: Vec<_> = self
            .inner
            .registry
            .page_areas()
            .into_iter()
            .map(|area| {
                let fact = VisibilityTopic::AreaChanged { area, visible };
                self.inner.publish(&fact, PublishOptions::from_sender(MANAGER_NAME))
            })
            .collect();
        tracing::debug!(visible, areas = facts.len(), "page visibility");
        async move {
            join_all(facts).await;
        }
        .boxed()
    }

    /// Drops all bus subscriptions; safe to call more than once.
    pub fn release(&self) {
        let subscriptions = std::mem::take(&mut *lock(&self.inner.subscriptions));
        for handle in subscriptions {
            handle.unsubscribe();
        }
    }
}

fn subscribe(inner: &Arc<ManagerInner>, pattern: &str, handler: Handler) -> Unsubscribe {
    let weak = Arc::downgrade(inner);
    inner.bus.subscribe(
        pattern,
        move |_, meta| match weak.upgrade() {
            Some(inner) => handler(&inner, meta),
            None => Ok(()),
        },
        SubscribeOptions::named(MANAGER_NAME),
    )
}

fn decode(meta: &EventMeta) -> Result<VisibilityTopic, HandlerError> {
    VisibilityTopic::decode(&meta.name)
        .ok_or_else(|| HandlerError::fail(format!("malformed visibility topic: {}", meta.name)))
}

fn on_area_changed(inner: &ManagerInner, meta: &EventMeta) -> Result<(), HandlerError> {
    let VisibilityTopic::AreaChanged { area, visible } = decode(meta)? else {
        return Ok(());
    };
    if !inner.registry.record(&area, visible) {
        return Ok(());
    }
    tracing::debug!(%area, visible, "area visibility recorded");
    for widget in inner.registry.widgets_in(&area) {
        inner.propagate(&widget);
    }
    Ok(())
}

fn on_area_request(inner: &ManagerInner, meta: &EventMeta) -> Result<(), HandlerError> {
    let VisibilityTopic::AreaRequest { area, visible } = decode(meta)? else {
        return Ok(());
    };
    match area.split_once('.') {
        None => {
            let fact = VisibilityTopic::AreaChanged { area, visible };
            let _ = inner.publish(&fact, PublishOptions::from_sender(MANAGER_NAME));
        }
        Some((widget, local)) => {
            if meta.sender.as_deref() == Some(widget) {
                inner.registry.add_area(widget, local);
                inner.registry.mark_self_managed(widget);
            }
            let container = inner.registry.container_visible(widget);
            if inner.registry.is_self_managed(widget) {
                let forward = VisibilityTopic::AreaRequest {
                    area: area.clone(),
                    visible: container,
                };
                let _ = inner.publish(&forward, forward_options());
            } else {
                tracing::debug!(%area, "request for a passive widget area answered with inherited fact");
                let fact = VisibilityTopic::AreaChanged {
                    area: area.clone(),
                    visible: container,
                };
                let _ = inner.publish(&fact, PublishOptions::from_sender(MANAGER_NAME));
            }
        }
    }
    Ok(())
}

fn on_widget_request(inner: &ManagerInner, meta: &EventMeta) -> Result<(), HandlerError> {
    let VisibilityTopic::WidgetRequest { widget, visible } = decode(meta)? else {
        return Ok(());
    };
    let (will, did) = widget_reply_topics(&widget, visible);
    let options = PublishOptions::from_sender(MANAGER_NAME);
    let request = VisibilityTopic::WidgetRequest {
        widget: widget.clone(),
        visible,
    };

    let _ = inner.bus.publish(&will, request.payload(), options.clone());
    inner.registry.set_override(&widget, Some(visible));
    inner.propagate(&widget);
    let _ = inner.bus.publish(&did, request.payload(), options);
    Ok(())
}
