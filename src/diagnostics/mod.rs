//! # Diagnostics handed to the event bus error handler.
//!
//! When a subscriber fails or a gathering request goes unanswered, the bus calls
//! its [`ErrorHandler`] with a message and an [`ErrorInfo`]: an ordered list of
//! titled values. Values that may carry user data (the published event) are
//! flagged [`Diagnostic::sensitive`] so sinks redact them.
//!
//! ## Architecture
//! ```text
//! EventBus ── fault ──► ErrorHandler(message, &ErrorInfo)
//!                              │
//!                              ├──► LogWriter (default: tracing, redacts sensitive values)
//!                              └──► custom handler (metrics, test recorders, ...)
//! ```

mod log;

use std::sync::Arc;

use serde_json::Value;

pub use log::LogWriter;

/// Title under which the bus attaches the event that triggered a fault.
pub const PUBLISHED_EVENT: &str = "Published event";

/// Process-wide error handler installed on the bus.
pub type ErrorHandler = Arc<dyn Fn(&str, &ErrorInfo) + Send + Sync>;

/// One titled diagnostic value.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Human readable title, e.g. `"Published event"`.
    pub title: String,
    /// The value.
    pub value: Value,
    /// Sinks must not print this value verbatim.
    pub sensitive: bool,
}

/// Ordered collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorInfo {
    entries: Vec<Diagnostic>,
}

impl ErrorInfo {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value that may be printed as is.
    pub fn with(mut self, title: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push(Diagnostic {
            title: title.into(),
            value: value.into(),
            sensitive: false,
        });
        self
    }

    /// Appends a value that sinks must redact.
    pub fn with_sensitive(mut self, title: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push(Diagnostic {
            title: title.into(),
            value: value.into(),
            sensitive: true,
        });
        self
    }

    /// Looks up a diagnostic by title.
    pub fn get(&self, title: &str) -> Option<&Diagnostic> {
        self.entries.iter().find(|d| d.title == title)
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// True if no diagnostics were attached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
