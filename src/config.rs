//! # Runtime configuration.
//!
//! Provides [`Config`], the settings read once when the [`Services`](crate::Services)
//! bag is built, and [`Paths`], the resource locations handed to the (external) loaders.
//!
//! Config is read from a JSON document whose keys use camelCase:
//! ```json
//! {
//!   "eventBusTimeoutMs": 5000,
//!   "theme": "blue",
//!   "paths": { "pages": "app/pages" }
//! }
//! ```
//! Every field is optional; missing fields take the defaults listed on [`Config::default`].
//!
//! ## Sentinel values
//! - `eventBusTimeoutMs = 0` → clamped to 1ms (a gathering request always gets one timer tick)

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Global configuration for the runtime.
///
/// ## Field semantics
/// - `event_bus_timeout_ms`: how long `publish_and_gather_replies` waits for pending replies
/// - `theme`: name of the theme handed to the theme manager
/// - `paths`: resource locations for the loaders
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Timeout for gathering replies, in milliseconds.
    pub event_bus_timeout_ms: u64,

    /// Theme name.
    pub theme: String,

    /// Resource locations.
    pub paths: Paths,
}

impl Config {
    /// Parses a configuration document.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use widgetry::Config;
    ///
    /// let cfg = Config::from_json(r#"{ "eventBusTimeoutMs": 250 }"#).unwrap();
    /// assert_eq!(cfg.pending_did_timeout(), Duration::from_millis(250));
    /// assert_eq!(cfg.theme, "default");
    /// ```
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns the gathering timeout, clamped to a minimum of 1ms.
    #[inline]
    pub fn pending_did_timeout(&self) -> Duration {
        Duration::from_millis(self.event_bus_timeout_ms.max(1))
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `event_bus_timeout_ms = 120_000` (two minutes)
    /// - `theme = "default"`
    /// - `paths = Paths::default()`
    fn default() -> Self {
        Self {
            event_bus_timeout_ms: 120 * 1000,
            theme: "default".to_string(),
            paths: Paths::default(),
        }
    }
}

/// Resource locations, relative to the application root.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Paths {
    /// Prefix for all product resources.
    pub product: String,
    /// Theme directories.
    pub themes: String,
    /// Layout definitions.
    pub layouts: String,
    /// Control implementations.
    pub controls: String,
    /// Widget implementations.
    pub widgets: String,
    /// Page definitions.
    pub pages: String,
    /// Flow definition file.
    pub flow_json: String,
    /// Theme used when no other theme provides a resource.
    pub default_theme: String,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            product: String::new(),
            themes: "includes/themes".to_string(),
            layouts: "application/layouts".to_string(),
            controls: "includes/controls".to_string(),
            widgets: "includes/widgets".to_string(),
            pages: "application/pages".to_string(),
            flow_json: "application/flow/flow.json".to_string(),
            default_theme: "includes/themes/default.theme".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.pending_did_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_partial_paths_keep_other_defaults() {
        let cfg = Config::from_json(r#"{ "paths": { "pages": "app/pages", "flowJson": "f.json" } }"#)
            .unwrap();
        assert_eq!(cfg.paths.pages, "app/pages");
        assert_eq!(cfg.paths.flow_json, "f.json");
        assert_eq!(cfg.paths.layouts, "application/layouts");
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let cfg = Config::from_json(r#"{ "eventBusTimeoutMs": 0 }"#).unwrap();
        assert_eq!(cfg.pending_did_timeout(), Duration::from_millis(1));
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let err = Config::from_json(r#"{ "theme": 3 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
