use std::sync::Arc;

use crate::config::Config;
use crate::diagnostics::{ErrorHandler, ErrorInfo};
use crate::events::{EventBus, EventBusConfig};
use crate::heartbeat::Heartbeat;
use crate::visibility::{AreaRegistry, VisibilityEventManager};

use super::Services;

/// Builder for the [`Services`] bag.
pub struct ServicesBuilder {
    cfg: Config,
    error_handler: Option<ErrorHandler>,
    page_areas: Vec<String>,
}

impl ServicesBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            error_handler: None,
            page_areas: Vec::new(),
        }
    }

    /// Replaces the default [`LogWriter`](crate::diagnostics::LogWriter) error handler.
    pub fn with_error_handler(
        mut self,
        handler: impl Fn(&str, &ErrorInfo) + Send + Sync + 'static,
    ) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Declares the top-level areas of the page.
    pub fn with_page_areas<I, S>(mut self, areas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.page_areas.extend(areas.into_iter().map(Into::into));
        self
    }

    /// Builds the bag.
    ///
    /// Construction order:
    /// - Heartbeat
    /// - Event bus (with the error handler installed)
    /// - Area registry
    /// - Visibility event manager
    pub fn build(self) -> Services {
        let heartbeat = Heartbeat::new();
        let bus = EventBus::new(
            heartbeat.clone(),
            EventBusConfig {
                pending_did_timeout: self.cfg.pending_did_timeout(),
            },
        );
        if let Some(handler) = self.error_handler {
            bus.set_error_handler(move |message, info| handler(message, info));
        }

        let registry = AreaRegistry::new();
        registry.register_page_areas(self.page_areas);
        let visibility_manager = VisibilityEventManager::new(bus.clone(), registry);

        tracing::debug!(theme = %self.cfg.theme, timeout = ?self.cfg.pending_did_timeout(), "services built");
        Services::new_internal(self.cfg, heartbeat, bus, visibility_manager)
    }
}
