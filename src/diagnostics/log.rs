//! # LogWriter: the default error handler
//!
//! Writes bus faults through `tracing` at error level, one line for the message
//! and one per diagnostic.
//!
//! ## Example output
//! ```text
//! EventBus: error while calling subscriber "w1" for event didSave.doc
//!    - Exception: "subscriber failed: boom"
//!    - Published event: <anonymized object, 2 keys>
//!    - Caused by Subscriber: "w1"
//! ```

use serde_json::Value;

use super::{Diagnostic, ErrorHandler, ErrorInfo, PUBLISHED_EVENT};

/// Error sink that logs through `tracing` and redacts sensitive diagnostics.
#[derive(Debug, Clone)]
pub struct LogWriter {
    sensitive_titles: Vec<String>,
}

impl Default for LogWriter {
    fn default() -> Self {
        Self {
            sensitive_titles: vec![PUBLISHED_EVENT.to_string()],
        }
    }
}

impl LogWriter {
    /// Creates a writer that redacts `"Published event"`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the set of titles that are always redacted.
    #[must_use]
    pub fn with_sensitive_titles<I, S>(mut self, titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive_titles = titles.into_iter().map(Into::into).collect();
        self
    }

    /// Logs one fault.
    pub fn write(&self, message: &str, info: &ErrorInfo) {
        tracing::error!("EventBus: {message}");
        for diagnostic in info.iter() {
            tracing::error!("{}", self.render(diagnostic));
        }
    }

    /// Wraps this writer as a bus error handler.
    pub fn into_handler(self) -> ErrorHandler {
        std::sync::Arc::new(move |message: &str, info: &ErrorInfo| self.write(message, info))
    }

    /// Formats one diagnostic line.
    pub fn render(&self, diagnostic: &Diagnostic) -> String {
        let redact = diagnostic.sensitive
            || self
                .sensitive_titles
                .iter()
                .any(|title| *title == diagnostic.title);
        let value = if redact {
            anonymize(&diagnostic.value)
        } else {
            diagnostic.value.to_string()
        };
        format!("   - {}: {}", diagnostic.title, value)
    }
}

fn anonymize(value: &Value) -> String {
    match value {
        Value::Object(map) => format!("<anonymized object, {} keys>", map.len()),
        Value::Array(items) => format!("<anonymized array, {} items>", items.len()),
        Value::String(_) => "<anonymized string>".to_string(),
        _ => "<anonymized>".to_string(),
    }
}
