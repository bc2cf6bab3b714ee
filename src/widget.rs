//! Per-widget context handed to widget services.
//!
//! A [`WidgetContext`] carries the widget's identity, the event bus it talks
//! through and a small set of observable properties. The visibility coordinator
//! mirrors the widget's visibility into one of these properties when tracking is
//! enabled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::events::EventBus;
use crate::sync::lock;

/// Identity of a widget instance inside the composed page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetInfo {
    /// Unique widget id; also the prefix of the widget's full area names.
    pub id: String,
    /// Full name of the area the widget is rendered into.
    pub area: String,
}

/// Context of one widget instance.
///
/// Cheap to clone; clones share the property slots.
#[derive(Clone)]
pub struct WidgetContext {
    /// Bus shared by all widgets of the page.
    pub event_bus: EventBus,
    /// Who this widget is and where it lives.
    pub widget: WidgetInfo,
    properties: Arc<Mutex<HashMap<String, Value>>>,
}

impl WidgetContext {
    /// Creates a context for widget `id` living in `area`.
    pub fn new(event_bus: EventBus, id: impl Into<String>, area: impl Into<String>) -> Self {
        Self {
            event_bus,
            widget: WidgetInfo {
                id: id.into(),
                area: area.into(),
            },
            properties: Arc::default(),
        }
    }

    /// Current value of a property, if it was ever set.
    pub fn property(&self, name: &str) -> Option<Value> {
        lock(&self.properties).get(name).cloned()
    }

    /// Sets (or replaces) a property.
    pub fn set_property(&self, name: &str, value: impl Into<Value>) {
        lock(&self.properties).insert(name.to_string(), value.into());
    }
}

impl std::fmt::Debug for WidgetContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetContext")
            .field("widget", &self.widget)
            .field("properties", &*lock(&self.properties))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBusConfig;
    use crate::heartbeat::Heartbeat;

    #[test]
    fn test_clones_share_properties() {
        let bus = EventBus::new(Heartbeat::new(), EventBusConfig::default());
        let ctx = WidgetContext::new(bus, "w1", "content");
        let clone = ctx.clone();

        assert_eq!(ctx.property("isVisible"), None);
        clone.set_property("isVisible", true);
        assert_eq!(ctx.property("isVisible"), Some(Value::Bool(true)));
        assert_eq!(ctx.widget.area, "content");
    }
}
