//! # Area names and the page-wide area registry.
//!
//! Areas are named slots of the composed page. Page areas are top-level
//! (`content`, `footer`); widget areas are qualified with the owning widget id
//! (`<widgetId>.<localArea>`).
//!
//! ```text
//! page area "content" ──contains──► widget "w1" ──owns──► "w1.tabs", "w1.panel"
//!                                                            │
//!                                        widget "w2" ◄──contains
//! ```
//!
//! ## Visibility lookup
//! 1. A recorded `didChangeAreaVisibility` fact for the area wins.
//! 2. Otherwise a widget area inherits the *effective container visibility* of its
//!    owner: the owner's widget override if one is set, else the visibility of the
//!    area the owner lives in (recursively).
//! 3. Anything else (unknown page areas, unregistered owners) is hidden.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::sync::lock;

#[derive(Debug, Default)]
struct WidgetEntry {
    container: String,
    areas: Vec<String>,
    override_visible: Option<bool>,
    self_managed: bool,
}

#[derive(Debug, Default)]
struct RegistryState {
    facts: HashMap<String, bool>,
    page_areas: Vec<String>,
    widgets: HashMap<String, WidgetEntry>,
}

impl RegistryState {
    fn is_visible(&self, area: &str) -> bool {
        let mut seen = HashSet::new();
        let mut area = area.to_string();
        loop {
            if let Some(visible) = self.facts.get(&area) {
                return *visible;
            }
            let Some((owner, _)) = area.split_once('.') else {
                return false;
            };
            let Some(entry) = self.widgets.get(owner) else {
                return false;
            };
            if let Some(visible) = entry.override_visible {
                return visible;
            }
            if !seen.insert(owner.to_string()) {
                return false;
            }
            area = entry.container.clone();
        }
    }

    fn container_visible(&self, widget: &str) -> bool {
        match self.widgets.get(widget) {
            Some(WidgetEntry {
                override_visible: Some(visible),
                ..
            }) => *visible,
            Some(entry) => self.is_visible(&entry.container),
            None => false,
        }
    }
}

/// Page-wide record of areas, widgets and the last known visibility facts.
///
/// Cheap to clone; all clones share state. Written by the
/// [`VisibilityEventManager`](super::VisibilityEventManager), read by
/// [`AreaHelper`]s.
#[derive(Debug, Clone, Default)]
pub struct AreaRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl AreaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares top-level page areas.
    pub fn register_page_areas<I, S>(&self, areas: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut st = lock(&self.state);
        for area in areas {
            let area = area.into();
            if !st.page_areas.contains(&area) {
                st.page_areas.push(area);
            }
        }
    }

    /// Declares widget `id`, rendered into `container`, owning the given local areas.
    ///
    /// Registering an id again replaces its container and areas but keeps its
    /// override and self-managed flag.
    pub fn register_widget<I, S>(&self, id: &str, container: &str, areas: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut st = lock(&self.state);
        let entry = st.widgets.entry(id.to_string()).or_default();
        entry.container = container.to_string();
        entry.areas = areas.into_iter().map(Into::into).collect();
    }

    /// Adds one local area to `widget`, registering the widget if needed.
    pub fn add_area(&self, widget: &str, local: &str) {
        let mut st = lock(&self.state);
        let entry = st.widgets.entry(widget.to_string()).or_default();
        if !entry.areas.iter().any(|a| a == local) {
            entry.areas.push(local.to_string());
        }
    }

    /// Top-level page areas in registration order.
    pub fn page_areas(&self) -> Vec<String> {
        lock(&self.state).page_areas.clone()
    }

    /// Ids of the widgets rendered into `area`, sorted.
    pub fn widgets_in(&self, area: &str) -> Vec<String> {
        let st = lock(&self.state);
        let mut ids: Vec<String> = st
            .widgets
            .iter()
            .filter(|(_, entry)| entry.container == area)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Local area names owned by `widget`.
    pub fn areas_of(&self, widget: &str) -> Vec<String> {
        lock(&self.state)
            .widgets
            .get(widget)
            .map(|entry| entry.areas.clone())
            .unwrap_or_default()
    }

    /// Stores a visibility fact; returns `true` if it changed the recorded value.
    pub fn record(&self, area: &str, visible: bool) -> bool {
        lock(&self.state).facts.insert(area.to_string(), visible) != Some(visible)
    }

    /// Recorded fact for `area`, without inheritance.
    pub fn fact(&self, area: &str) -> Option<bool> {
        lock(&self.state).facts.get(area).copied()
    }

    /// Resolved visibility of `area` (see the module docs).
    pub fn is_visible(&self, area: &str) -> bool {
        lock(&self.state).is_visible(area)
    }

    /// Visibility of the area `widget` lives in, honouring its override.
    pub fn container_visible(&self, widget: &str) -> bool {
        lock(&self.state).container_visible(widget)
    }

    /// Forces the container visibility of `widget`; `None` removes the override.
    pub fn set_override(&self, widget: &str, visible: Option<bool>) {
        lock(&self.state)
            .widgets
            .entry(widget.to_string())
            .or_default()
            .override_visible = visible;
    }

    /// Marks `widget` as answering requests for its own areas.
    pub fn mark_self_managed(&self, widget: &str) {
        if let Some(entry) = lock(&self.state).widgets.get_mut(widget) {
            entry.self_managed = true;
        }
    }

    /// Whether `widget` answers requests for its own areas.
    pub fn is_self_managed(&self, widget: &str) -> bool {
        lock(&self.state)
            .widgets
            .get(widget)
            .is_some_and(|entry| entry.self_managed)
    }

    /// Drops everything.
    pub fn clear(&self) {
        *lock(&self.state) = RegistryState::default();
    }
}

/// Qualifies and resolves area names for one widget.
///
/// # Example
/// ```rust
/// use widgetry::visibility::{AreaHelper, AreaRegistry};
///
/// let areas = AreaHelper::new("w1", AreaRegistry::new());
/// assert_eq!(areas.full_name("content"), "w1.content");
/// assert_eq!(areas.local_name("w1.content"), "content");
/// assert!(!areas.is_visible("w1.content"));
/// ```
#[derive(Debug, Clone)]
pub struct AreaHelper {
    widget_id: String,
    registry: AreaRegistry,
}

impl AreaHelper {
    /// Creates a helper for `widget_id` backed by `registry`.
    pub fn new(widget_id: impl Into<String>, registry: AreaRegistry) -> Self {
        Self {
            widget_id: widget_id.into(),
            registry,
        }
    }

    /// `<widgetId>.<local>`
    pub fn full_name(&self, local: &str) -> String {
        format!("{}.{local}", self.widget_id)
    }

    /// Strips the widget prefix; names of other widgets are returned unchanged.
    pub fn local_name(&self, full: &str) -> String {
        full.strip_prefix(self.widget_id.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(full)
            .to_string()
    }

    /// Resolved visibility of a full area name.
    pub fn is_visible(&self, area: &str) -> bool {
        self.registry.is_visible(area)
    }

    /// Widget this helper qualifies names for.
    pub fn widget_id(&self) -> &str {
        &self.widget_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AreaRegistry {
        let registry = AreaRegistry::new();
        registry.register_page_areas(["content", "popups"]);
        registry.register_widget("tabs", "content", ["first", "second"]);
        registry.register_widget("inner", "tabs.first", ["body"]);
        registry.register_widget("layer", "popups", ["body"]);
        registry
    }

    #[test]
    fn test_untouched_areas_inherit_container() {
        let registry = registry();
        assert!(!registry.is_visible("tabs.first"));

        registry.record("content", true);
        assert!(registry.is_visible("tabs.first"));
        assert!(registry.is_visible("inner.body"));

        registry.record("tabs.first", false);
        assert!(!registry.is_visible("inner.body"));
        assert!(registry.is_visible("tabs.second"));
    }

    #[test]
    fn test_override_beats_hidden_container() {
        let registry = registry();
        registry.record("popups", false);
        assert!(!registry.container_visible("layer"));

        registry.set_override("layer", Some(true));
        assert!(registry.container_visible("layer"));
        assert!(registry.is_visible("layer.body"));

        registry.set_override("layer", None);
        assert!(!registry.is_visible("layer.body"));
    }

    #[test]
    fn test_unknown_areas_are_hidden() {
        let registry = registry();
        assert!(!registry.is_visible("nowhere"));
        assert!(!registry.is_visible("ghost.area"));
        assert!(!registry.container_visible("ghost"));
    }

    #[test]
    fn test_container_cycle_terminates() {
        let registry = AreaRegistry::new();
        registry.register_widget("a", "b.x", ["x"]);
        registry.register_widget("b", "a.x", ["x"]);
        assert!(!registry.is_visible("a.x"));
    }

    #[test]
    fn test_record_reports_changes_only() {
        let registry = registry();
        assert!(registry.record("content", true));
        assert!(!registry.record("content", true));
        assert!(registry.record("content", false));
        assert_eq!(registry.fact("content"), Some(false));
    }

    #[test]
    fn test_widgets_in_and_self_managed() {
        let registry = registry();
        assert_eq!(registry.widgets_in("content"), vec!["tabs"]);
        assert_eq!(registry.areas_of("tabs"), vec!["first", "second"]);

        assert!(!registry.is_self_managed("tabs"));
        registry.mark_self_managed("tabs");
        registry.mark_self_managed("ghost");
        assert!(registry.is_self_managed("tabs"));
        assert!(!registry.is_self_managed("ghost"));
    }

    #[test]
    fn test_local_name_only_strips_own_prefix() {
        let helper = AreaHelper::new("w1", AreaRegistry::new());
        assert_eq!(helper.local_name("w1.a.b"), "a.b");
        assert_eq!(helper.local_name("w10.a"), "w10.a");
        assert_eq!(helper.local_name("content"), "content");
        assert_eq!(helper.widget_id(), "w1");
    }
}
