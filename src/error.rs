//! Error types used by the widgetry runtime and its subscribers.
//!
//! This module defines three enums:
//!
//! - [`HandlerError`]: returned by subscriber callbacks to signal a fault.
//! - [`DeliveryError`]: problems detected by the event bus while delivering
//!   events or gathering replies. These are never returned to publishers; the
//!   bus forwards them to its error handler and keeps going.
//! - [`ConfigError`]: failures while reading a [`Config`](crate::Config).
//!
//! `HandlerError` and `DeliveryError` provide helper methods (`as_label`,
//! `as_message`) for logs and diagnostics.

use std::time::Duration;
use thiserror::Error;

/// # Errors raised by subscriber callbacks.
///
/// A callback returning `Err` is treated exactly like a panicking callback:
/// the fault is reported and delivery continues with the next subscriber.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The subscriber could not process the event.
    #[error("subscriber failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Fail`].
    ///
    /// # Example
    /// ```
    /// use widgetry::HandlerError;
    ///
    /// let err = HandlerError::fail("boom");
    /// assert_eq!(err.to_string(), "subscriber failed: boom");
    /// assert_eq!(err.as_label(), "handler_failed");
    /// ```
    pub fn fail(error: impl Into<String>) -> Self {
        HandlerError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Fail { .. } => "handler_failed",
        }
    }
}

/// # Faults detected by the event bus.
///
/// None of these abort delivery. They are handed to the installed error handler
/// (see [`EventBus::set_error_handler`](crate::EventBus::set_error_handler)) and,
/// for subscriber faults, announced to subscriptions that opted into delivery
/// errors.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// A subscriber callback returned an error.
    #[error("subscriber \"{subscriber}\" failed on {topic}: {error}")]
    SubscriberFailed {
        /// Name the subscription was registered with.
        subscriber: String,
        /// Topic of the event being delivered.
        topic: String,
        /// Message of the returned [`HandlerError`].
        error: String,
    },

    /// A subscriber callback panicked.
    #[error("subscriber \"{subscriber}\" panicked on {topic}: {info}")]
    SubscriberPanicked {
        /// Name the subscription was registered with.
        subscriber: String,
        /// Topic of the event being delivered.
        topic: String,
        /// Panic payload, if it was a string.
        info: String,
    },

    /// Some subscribers announced a reply (`will…`) but did not send it (`did…`) in time.
    #[error("timeout after {timeout:?} waiting for {did_topic} on {topic}; missing: {missing:?}")]
    PendingDidTimeout {
        /// The request topic.
        topic: String,
        /// The reply topic that was awaited.
        did_topic: String,
        /// The timeout that elapsed.
        timeout: Duration,
        /// Senders that announced but never answered.
        missing: Vec<String>,
    },

    /// Nobody received a gathering request and no reply arrived before the timeout.
    #[error("no subscriber answered {topic} within {timeout:?}")]
    NoResponders {
        /// The request topic.
        topic: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },
}

impl DeliveryError {
    /// Returns a short stable label (snake_case) for use in logs and error events.
    ///
    /// # Example
    /// ```
    /// use widgetry::DeliveryError;
    /// use std::time::Duration;
    ///
    /// let err = DeliveryError::NoResponders { topic: "x".into(), timeout: Duration::from_millis(10) };
    /// assert_eq!(err.as_label(), "no_responders");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            DeliveryError::SubscriberFailed { .. } => "subscriber_failed",
            DeliveryError::SubscriberPanicked { .. } => "subscriber_panicked",
            DeliveryError::PendingDidTimeout { .. } => "pending_did_timeout",
            DeliveryError::NoResponders { .. } => "no_responders",
        }
    }

    /// Returns the message handed to the error handler.
    pub fn as_message(&self) -> String {
        match self {
            DeliveryError::SubscriberFailed {
                subscriber, topic, ..
            }
            | DeliveryError::SubscriberPanicked {
                subscriber, topic, ..
            } => {
                format!("error while calling subscriber \"{subscriber}\" for event {topic}")
            }
            DeliveryError::PendingDidTimeout {
                topic, did_topic, ..
            } => {
                format!("Timeout while waiting for pending {did_topic} on {topic}.")
            }
            DeliveryError::NoResponders { topic, timeout } => {
                format!(
                    "No subscriber answered {topic} within {}ms.",
                    timeout.as_millis()
                )
            }
        }
    }

    /// True for faults raised by a subscriber callback (as opposed to gathering problems).
    pub fn is_subscriber_fault(&self) -> bool {
        matches!(
            self,
            DeliveryError::SubscriberFailed { .. } | DeliveryError::SubscriberPanicked { .. }
        )
    }
}

/// # Errors produced while reading configuration.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration document is not valid JSON or has wrong field types.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
