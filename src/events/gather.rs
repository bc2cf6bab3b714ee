//! # Request/reply gathering (`will…` / `did…`).
//!
//! [`EventBus::publish_and_gather_replies`] publishes a request and collects the
//! replies of every subscriber that announced one.
//!
//! ## Choreography
//! ```text
//! requester                          bus                              responder
//!    │ publish fooRequest.x ──────────►│──────── fooRequest.x ──────────►│
//!    │                                 │◄─────── willFoo.x (announce) ───│
//!    │  will collector: pending += R   │                                 │
//!    │                                 │◄─────── didFoo.x (reply) ───────│
//!    │  did collector: replies += …,   │                                 │
//!    │                 pending -= R    │                                 │
//!    ▼ resolves with replies once pending is empty (or the timeout elapses)
//! ```
//!
//! ## Rules
//! - Announcements are collected until the request and everything published
//!   while delivering it have been delivered; later announcements are ignored.
//! - Replies are returned in arrival order; replies from senders that never
//!   announced are kept too.
//! - **Never fails**: on timeout the future resolves with whatever arrived, and the
//!   error handler is told which senders stayed silent.
//! - A request nobody received waits for the timeout (or a first reply) and is
//!   reported as unanswered.
//! - Dropping the returned future removes both collectors.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::Notify;

use crate::diagnostics::ErrorInfo;
use crate::error::DeliveryError;
use crate::sync::lock;

use super::bus::EventBus;
use super::event::{ANONYMOUS, PublishOptions, QueuedEvent, Reply, SubscribeOptions};
use super::subscription::Unsubscribe;
use super::topic::reply_topics;

#[derive(Default)]
struct Gathering {
    pending: Vec<String>,
    replies: Vec<Reply>,
}

/// The `will…` and `did…` collectors of one gathering, removed on drop.
struct Collectors {
    will: Unsubscribe,
    did: Unsubscribe,
}

impl Drop for Collectors {
    fn drop(&mut self) {
        self.will.unsubscribe();
        self.did.unsubscribe();
    }
}

impl EventBus {
    /// Publishes a request and gathers the `did…` replies of all announced responders.
    ///
    /// Reply topics are derived with [`reply_topics`]. The timeout is
    /// `options.pending_did_timeout`, or the bus default.
    ///
    /// # Example
    /// ```rust
    /// use std::time::Duration;
    /// use serde_json::{Value, json};
    /// use widgetry::{EventBus, EventBusConfig, Heartbeat, PublishOptions, SubscribeOptions};
    ///
    /// #[tokio::main(flavor = "current_thread")]
    /// async fn main() {
    ///     let bus = EventBus::new(Heartbeat::new(), EventBusConfig::default());
    ///     let responder = bus.clone();
    ///     bus.subscribe(
    ///         "saveRequest.+",
    ///         move |_, meta| {
    ///             let doc = meta.name.trim_start_matches("saveRequest.");
    ///             let opts = PublishOptions::from_sender("storage");
    ///             let _ = responder.publish(&format!("willSave.{doc}"), Value::Null, opts.clone());
    ///             let _ = responder.publish(&format!("didSave.{doc}"), json!({ "ok": true }), opts);
    ///             Ok(())
    ///         },
    ///         SubscribeOptions::named("storage"),
    ///     );
    ///
    ///     let replies = bus
    ///         .publish_and_gather_replies(
    ///             "saveRequest.doc",
    ///             Value::Null,
    ///             PublishOptions::from_sender("editor").with_pending_did_timeout(Duration::from_secs(1)),
    ///         )
    ///         .await;
    ///     assert_eq!(replies.len(), 1);
    ///     assert_eq!(replies[0].event["ok"], true);
    /// }
    /// ```
    pub fn publish_and_gather_replies(
        &self,
        name: &str,
        payload: Value,
        options: PublishOptions,
    ) -> BoxFuture<'static, Vec<Reply>> {
        let (will_topic, did_topic) = reply_topics(name);
        let timeout = options
            .pending_did_timeout
            .unwrap_or(self.shared.config.pending_did_timeout);
        let collector = SubscribeOptions {
            subscriber: options.sender.clone(),
            ..SubscribeOptions::default()
        };
        let state = Arc::new(Mutex::new(Gathering::default()));
        let notify = Arc::new(Notify::new());

        let will = {
            let state = Arc::clone(&state);
            self.subscribe(
                &will_topic,
                move |_, meta| {
                    lock(&state).pending.push(meta.sender_name().to_string());
                    Ok(())
                },
                collector.clone(),
            )
        };
        let did = {
            let state = Arc::clone(&state);
            let notify = Arc::clone(&notify);
            self.subscribe(
                &did_topic,
                move |event, meta| {
                    {
                        let mut g = lock(&state);
                        if let Some(pos) = g.pending.iter().position(|s| s == meta.sender_name()) {
                            g.pending.remove(pos);
                        }
                        g.replies.push(Reply {
                            event: event.clone(),
                            meta: meta.clone(),
                        });
                    }
                    notify.notify_one();
                    Ok(())
                },
                collector,
            )
        };

        let collectors = Collectors { will, did };

        let delivered = self.enqueue(QueuedEvent::new(name, payload, &options));
        let bus = self.clone();
        let request = name.to_string();
        let sender = options.sender.unwrap_or_else(|| ANONYMOUS.to_string());

        async move {
            let recipients = delivered.await.map(|r| r.recipients).unwrap_or_default();
            bus.settled().await;
            collectors.will.unsubscribe();

            let answered = |g: &Gathering| {
                g.pending.is_empty() && (recipients > 0 || !g.replies.is_empty())
            };
            let wait = async {
                loop {
                    if answered(&lock(&state)) {
                        break;
                    }
                    notify.notified().await;
                }
            };
            let timed_out = tokio::time::timeout(timeout, wait).await.is_err();
            drop(collectors);

            let gathering = std::mem::take(&mut *lock(&state));
            if timed_out {
                report_unanswered(&bus, &request, &did_topic, &sender, timeout, gathering.pending);
            }
            gathering.replies
        }
        .boxed()
    }
}

fn report_unanswered(
    bus: &EventBus,
    request: &str,
    did_topic: &str,
    sender: &str,
    timeout: Duration,
    missing: Vec<String>,
) {
    let fault = if missing.is_empty() {
        DeliveryError::NoResponders {
            topic: request.to_string(),
            timeout,
        }
    } else {
        DeliveryError::PendingDidTimeout {
            topic: request.to_string(),
            did_topic: did_topic.to_string(),
            timeout,
            missing: missing.clone(),
        }
    };
    tracing::warn!(label = fault.as_label(), topic = request, "gathering request unanswered");

    let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    let mut info = ErrorInfo::new()
        .with("Sender", sender)
        .with("After milliseconds timeout", millis);
    if !missing.is_empty() {
        info = info.with("Responses missing from", missing.join(", "));
    }
    bus.report(&fault.as_message(), &info);
}
