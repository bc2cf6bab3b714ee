//! Composition root.
//!
//! [`Services`] is the bag handed to the host: configuration, the heartbeat,
//! the page-wide event bus and the visibility manager, plus factories for the
//! per-widget services. Build it once with [`ServicesBuilder`] and tear it down
//! with [`Services::dispose`].
//!
//! ```text
//! ServicesBuilder::build
//!   Heartbeat ──► EventBus ──► AreaRegistry ──► VisibilityEventManager
//!
//! per widget:
//!   widget_context(id, area) ──► WidgetContext
//!   area_helper(id)          ──► AreaHelper
//!   visibility(&ctx)         ──► VisibilityCoordinator
//! ```

mod builder;

pub use builder::ServicesBuilder;

use crate::config::{Config, Paths};
use crate::events::EventBus;
use crate::heartbeat::Heartbeat;
use crate::visibility::{AreaHelper, VisibilityCoordinator, VisibilityEventManager};
use crate::widget::WidgetContext;

/// Services shared by every widget of a page.
pub struct Services {
    configuration: Config,
    heartbeat: Heartbeat,
    global_event_bus: EventBus,
    visibility_manager: VisibilityEventManager,
}

impl Services {
    pub(crate) fn new_internal(
        configuration: Config,
        heartbeat: Heartbeat,
        global_event_bus: EventBus,
        visibility_manager: VisibilityEventManager,
    ) -> Self {
        Self {
            configuration,
            heartbeat,
            global_event_bus,
            visibility_manager,
        }
    }

    /// Configuration the bag was built with.
    pub fn configuration(&self) -> &Config {
        &self.configuration
    }

    /// Resource locations for the loaders.
    pub fn paths(&self) -> &Paths {
        &self.configuration.paths
    }

    /// Heartbeat driving the bus.
    pub fn heartbeat(&self) -> &Heartbeat {
        &self.heartbeat
    }

    /// Page-wide event bus.
    pub fn global_event_bus(&self) -> &EventBus {
        &self.global_event_bus
    }

    /// Page-level visibility manager.
    pub fn visibility_manager(&self) -> &VisibilityEventManager {
        &self.visibility_manager
    }

    /// Context for widget `id` rendered into `area`.
    pub fn widget_context(&self, id: &str, area: &str) -> WidgetContext {
        WidgetContext::new(self.global_event_bus.clone(), id, area)
    }

    /// Area helper for widget `id`, backed by the page registry.
    pub fn area_helper(&self, id: &str) -> AreaHelper {
        AreaHelper::new(id, self.visibility_manager.registry().clone())
    }

    /// Visibility coordinator for the widget behind `context`.
    pub fn visibility(&self, context: &WidgetContext) -> VisibilityCoordinator {
        VisibilityCoordinator::new(context.clone(), self.area_helper(&context.widget.id))
    }

    /// Releases the manager's subscriptions and forgets all recorded areas.
    pub fn dispose(&self) {
        self.visibility_manager.release();
        self.visibility_manager.registry().clear();
        tracing::debug!("services disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visibility::AreaUpdateOptions;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_bag_exposes_configuration() {
        let cfg = Config::from_json(r#"{ "eventBusTimeoutMs": 250, "theme": "blue" }"#).unwrap();
        let services = ServicesBuilder::new(cfg).build();

        assert_eq!(services.configuration().theme, "blue");
        assert_eq!(services.paths().pages, "application/pages");
        assert_eq!(
            services.global_event_bus().pending_did_timeout(),
            std::time::Duration::from_millis(250)
        );
        assert_eq!(services.global_event_bus().subscription_count(), 3);
    }

    #[tokio::test]
    async fn test_widgets_see_page_visibility() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let services = ServicesBuilder::new(Config::default())
            .with_error_handler(move |message, _| sink.lock().unwrap().push(message.to_string()))
            .with_page_areas(["content"])
            .build();
        services
            .visibility_manager()
            .register_widget("tabs", "content", ["first"]);

        let ctx = services.widget_context("tabs", "content");
        let visibility = services.visibility(&ctx);
        visibility.track_visibility();
        visibility
            .update_area_visibility([("first", true)], AreaUpdateOptions::default())
            .await;

        services.visibility_manager().set_page_visibility(true).await;
        services.global_event_bus().flush().await;

        assert_eq!(ctx.property("isVisible"), Some(serde_json::Value::Bool(true)));
        assert!(services.area_helper("tabs").is_visible("tabs.first"));
        assert!(errors.lock().unwrap().is_empty());

        visibility.release();
        services.dispose();
        assert_eq!(services.global_event_bus().subscription_count(), 0);
    }
}
