//! # Cycle-batched publish/subscribe bus.
//!
//! [`EventBus`] queues published events and delivers them in *cycles* driven by
//! the [`Heartbeat`]. Publishing never runs a subscriber synchronously.
//!
//! ## Architecture
//! ```text
//! publish(topic) ──► queue ──► (first event since last cycle) heartbeat.on_next(run_cycle)
//!
//! run_cycle (one heartbeat tick):
//!   ├─► take every queued event + snapshot of the subscription set
//!   ├─► for each event (FIFO):
//!   │     for each subscription in registration order that accepts it:
//!   │        callback(&payload, &meta)
//!   │          ├─ Err / panic ─► error handler + didEncounterError.DELIVERY (next cycle)
//!   │          └─ Ok          ─► next subscription
//!   │     resolve the event's publish future
//!   └─► resolve settle waiters whose events are all delivered
//! ```
//!
//! ## Rules
//! - **No re-entry**: events published by a callback go to the next cycle.
//! - **Serial cycles**: a cycle never starts while another one delivers, whatever
//!   thread the publisher runs on.
//! - **Snapshot isolation**: subscriptions added during a cycle first receive
//!   events in the next cycle; subscriptions removed during a cycle are skipped
//!   for the rest of it.
//! - **Fault isolation**: a failing or panicking subscriber never stops delivery
//!   to the remaining subscribers, and never fails an unrelated publisher.
//! - **No locks held across callbacks**: callbacks may subscribe, unsubscribe and
//!   publish freely.
//!
//! Requires a Tokio runtime (the heartbeat spawns its ticks).

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use tokio::sync::oneshot;

use crate::diagnostics::{ErrorHandler, ErrorInfo, LogWriter, PUBLISHED_EVENT};
use crate::error::{DeliveryError, HandlerError};
use crate::heartbeat::Heartbeat;
use crate::sync::{lock, panic_message};

use super::event::{
    ANONYMOUS, DeliveryReport, EventKind, EventMeta, InspectAction, Inspection, PublishOptions,
    QueuedEvent, SubscribeOptions,
};
use super::subscription::{Callback, Subscription, SubscriptionSet, Unsubscribe};
use super::topic::TopicPattern;

/// Observer of bus activity, see [`EventBus::add_inspector`].
pub type Inspector = Arc<dyn Fn(&Inspection) + Send + Sync>;

/// Bus settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventBusConfig {
    /// Default time a gathering request waits for pending replies.
    pub pending_did_timeout: Duration,
}

impl Default for EventBusConfig {
    /// `pending_did_timeout = 120s`
    fn default() -> Self {
        Self {
            pending_did_timeout: Duration::from_secs(120),
        }
    }
}

struct BusState {
    subscriptions: SubscriptionSet,
    queue: VecDeque<QueuedEvent>,
    /// Id of the last cycle that started.
    cycle: u64,
    /// Id of the last cycle that finished.
    finished: u64,
    /// A cycle is registered with the heartbeat and has not started yet.
    scheduled: bool,
    /// A cycle is calling subscribers.
    delivering: bool,
    settle_waiters: Vec<(u64, oneshot::Sender<()>)>,
    error_handler: ErrorHandler,
    inspectors: Vec<(u64, Inspector)>,
}

pub(crate) struct Shared {
    state: Mutex<BusState>,
    heartbeat: Heartbeat,
    pub(crate) config: EventBusConfig,
    next_id: AtomicU64,
}

/// Asynchronous, cycle-batched message broker.
///
/// Cheap to clone; all clones share subscriptions and the queue.
///
/// # Example
/// ```rust
/// use serde_json::json;
/// use widgetry::{EventBus, EventBusConfig, Heartbeat, PublishOptions, SubscribeOptions};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let bus = EventBus::new(Heartbeat::new(), EventBusConfig::default());
///     let handle = bus.subscribe(
///         "didSave.+",
///         |event, meta| {
///             println!("{} saved {}", meta.sender_name(), event);
///             Ok(())
///         },
///         SubscribeOptions::named("logger"),
///     );
///
///     bus.publish("didSave.document", json!({ "id": 7 }), PublishOptions::from_sender("editor"))
///         .await;
///     handle.unsubscribe();
/// }
/// ```
#[derive(Clone)]
pub struct EventBus {
    pub(crate) shared: Arc<Shared>,
}

impl EventBus {
    /// Creates a bus that delivers on `heartbeat` ticks and logs faults with [`LogWriter`].
    pub fn new(heartbeat: Heartbeat, config: EventBusConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BusState {
                    subscriptions: SubscriptionSet::default(),
                    queue: VecDeque::new(),
                    cycle: 0,
                    finished: 0,
                    scheduled: false,
                    delivering: false,
                    settle_waiters: Vec::new(),
                    error_handler: LogWriter::new().into_handler(),
                    inspectors: Vec::new(),
                }),
                heartbeat,
                config,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Installs the handler invoked for every subscriber fault and unanswered request.
    pub fn set_error_handler(&self, handler: impl Fn(&str, &ErrorInfo) + Send + Sync + 'static) {
        lock(&self.shared.state).error_handler = Arc::new(handler);
    }

    /// Registers `callback` for all future events matching `pattern`.
    ///
    /// See [`TopicPattern`] for the matching rules. The returned handle removes
    /// exactly this subscription; dropping it keeps the subscription alive.
    pub fn subscribe<F>(&self, pattern: &str, callback: F, options: SubscribeOptions) -> Unsubscribe
    where
        F: Fn(&Value, &EventMeta) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: Callback = Arc::new(callback);
        let subscription = Arc::new(Subscription::new(
            id,
            TopicPattern::new(pattern),
            options.subscriber,
            callback,
            options.subscribe_to_delivery_errors,
        ));

        let (inspectors, cycle_id) = {
            let mut st = lock(&self.shared.state);
            st.subscriptions.add(Arc::clone(&subscription));
            (inspectors_of(&st), st.cycle)
        };
        tracing::debug!(pattern, subscriber = subscription.name(), "subscribed");
        inspect(
            &inspectors,
            &Inspection {
                action: InspectAction::Subscribe,
                source: subscription.name().to_string(),
                target: String::new(),
                topic: pattern.to_string(),
                cycle_id,
            },
        );

        let weak = Arc::downgrade(&self.shared);
        Unsubscribe::new(move || {
            if let Some(shared) = weak.upgrade() {
                lock(&shared.state).subscriptions.remove(id);
            }
        })
    }

    /// Queues an event; the returned future resolves once it has been delivered.
    ///
    /// Awaiting is optional: the event is queued before this method returns.
    pub fn publish(&self, name: &str, payload: Value, options: PublishOptions) -> BoxFuture<'static, ()> {
        let delivered = self.enqueue(QueuedEvent::new(name, payload, &options));
        async move {
            let _ = delivered.await;
        }
        .boxed()
    }

    /// Resolves once every event queued before this call has been delivered.
    pub fn settled(&self) -> BoxFuture<'static, ()> {
        let waiter = {
            let mut st = lock(&self.shared.state);
            let target = if st.queue.is_empty() {
                st.cycle
            } else {
                st.cycle + 1
            };
            if target <= st.finished {
                None
            } else {
                let (tx, rx) = oneshot::channel();
                st.settle_waiters.push((target, tx));
                Some(rx)
            }
        };
        async move {
            if let Some(rx) = waiter {
                let _ = rx.await;
            }
        }
        .boxed()
    }

    /// Waits until no events are queued or being delivered, including events
    /// published by subscribers along the way.
    pub async fn flush(&self) {
        loop {
            self.settled().await;
            let idle = {
                let st = lock(&self.shared.state);
                st.queue.is_empty() && st.finished == st.cycle
            };
            if idle {
                break;
            }
        }
    }

    /// Registers an observer for subscribe/publish/deliver activity.
    pub fn add_inspector(&self, inspector: impl Fn(&Inspection) + Send + Sync + 'static) -> Unsubscribe {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.shared.state)
            .inspectors
            .push((id, Arc::new(inspector)));
        let weak = Arc::downgrade(&self.shared);
        Unsubscribe::new(move || {
            if let Some(shared) = weak.upgrade() {
                lock(&shared.state).inspectors.retain(|(i, _)| *i != id);
            }
        })
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        lock(&self.shared.state).subscriptions.len()
    }

    /// Id of the most recently started delivery cycle (`0` before the first one).
    pub fn cycle_id(&self) -> u64 {
        lock(&self.shared.state).cycle
    }

    /// The heartbeat driving this bus.
    pub fn heartbeat(&self) -> &Heartbeat {
        &self.shared.heartbeat
    }

    /// Bus-wide default for gathering timeouts.
    pub fn pending_did_timeout(&self) -> Duration {
        self.shared.config.pending_did_timeout
    }

    pub(crate) fn enqueue(&self, mut event: QueuedEvent) -> oneshot::Receiver<DeliveryReport> {
        let (tx, rx) = oneshot::channel();
        event.done = Some(tx);

        let inspection = Inspection {
            action: InspectAction::Publish,
            source: event.sender.clone().unwrap_or_else(|| ANONYMOUS.to_string()),
            target: String::new(),
            topic: event.name.clone(),
            cycle_id: 0,
        };
        let (schedule, inspectors, cycle_id) = {
            let mut st = lock(&self.shared.state);
            st.queue.push_back(event);
            (schedule_cycle(&mut st), inspectors_of(&st), st.cycle)
        };
        inspect(&inspectors, &Inspection { cycle_id, ..inspection });

        if schedule {
            register_cycle(&self.shared);
        }
        rx
    }

    /// Hands a fault to the error handler.
    pub(crate) fn report(&self, message: &str, info: &ErrorInfo) {
        report(&self.shared, message, info);
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = lock(&self.shared.state);
        f.debug_struct("EventBus")
            .field("subscriptions", &st.subscriptions.len())
            .field("queued", &st.queue.len())
            .field("cycle", &st.cycle)
            .finish()
    }
}

fn inspectors_of(st: &BusState) -> Vec<Inspector> {
    st.inspectors.iter().map(|(_, i)| Arc::clone(i)).collect()
}

fn inspect(inspectors: &[Inspector], inspection: &Inspection) {
    for inspector in inspectors {
        inspector(inspection);
    }
}

fn report(shared: &Shared, message: &str, info: &ErrorInfo) {
    let handler = Arc::clone(&lock(&shared.state).error_handler);
    handler(message, info);
}

/// Marks a cycle as scheduled unless one is pending or running.
///
/// A running cycle schedules its successor itself once it is done, so cycles
/// never overlap even when publishers live on other worker threads.
fn schedule_cycle(st: &mut BusState) -> bool {
    if st.scheduled || st.delivering || st.queue.is_empty() {
        return false;
    }
    st.scheduled = true;
    true
}

fn register_cycle(shared: &Arc<Shared>) {
    let me = Arc::clone(shared);
    shared.heartbeat.on_next(move || run_cycle(&me));
}

/// Delivers everything queued since the previous cycle.
fn run_cycle(shared: &Arc<Shared>) {
    let (cycle_id, events, subscriptions, inspectors) = {
        let mut st = lock(&shared.state);
        st.scheduled = false;
        st.delivering = true;
        st.cycle += 1;
        let events: Vec<QueuedEvent> = st.queue.drain(..).collect();
        (st.cycle, events, st.subscriptions.snapshot(), inspectors_of(&st))
    };
    tracing::debug!(cycle_id, events = events.len(), "delivery cycle");

    let bus = EventBus {
        shared: Arc::clone(shared),
    };
    for mut event in events {
        let meta = EventMeta {
            name: event.name.clone(),
            sender: event.sender.clone(),
            cycle_id,
        };
        let mut recipients = 0;

        for subscription in &subscriptions {
            if !subscription.accepts(&event) {
                continue;
            }
            recipients += 1;
            inspect(
                &inspectors,
                &Inspection {
                    action: InspectAction::Deliver,
                    source: meta.sender_name().to_string(),
                    target: subscription.name().to_string(),
                    topic: event.name.clone(),
                    cycle_id,
                },
            );

            let callback = &subscription.callback;
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                callback(&*event.payload, &meta)
            }));
            let fault = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => {
                    tracing::debug!(label = err.as_label(), subscriber = subscription.name(), "handler returned an error");
                    Some(DeliveryError::SubscriberFailed {
                        subscriber: subscription.name().to_string(),
                        topic: event.name.clone(),
                        error: err.to_string(),
                    })
                }
                Err(panic) => Some(DeliveryError::SubscriberPanicked {
                    subscriber: subscription.name().to_string(),
                    topic: event.name.clone(),
                    info: panic_message(&*panic),
                }),
            };
            if let Some(fault) = fault {
                subscriber_fault(&bus, &fault, &event, subscription);
            }
        }

        if let Some(done) = event.done.take() {
            let _ = done.send(DeliveryReport { recipients });
        }
    }

    let (ready, schedule) = {
        let mut st = lock(&shared.state);
        st.finished = cycle_id;
        st.delivering = false;
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut st.settle_waiters)
            .into_iter()
            .partition(|(target, _)| *target <= cycle_id);
        st.settle_waiters = waiting;
        (ready, schedule_cycle(&mut st))
    };
    for (_, waiter) in ready {
        let _ = waiter.send(());
    }
    if schedule {
        register_cycle(shared);
    }
}

fn subscriber_fault(
    bus: &EventBus,
    fault: &DeliveryError,
    event: &QueuedEvent,
    subscription: &Subscription,
) {
    let sender = event.sender.as_deref().unwrap_or(ANONYMOUS);
    tracing::warn!(label = fault.as_label(), subscriber = subscription.name(), topic = %event.name, "subscriber fault");

    let message = format!(
        "{} published by \"{}\" (subscribed with: {})",
        fault.as_message(),
        sender,
        subscription.pattern
    );
    let exception = match fault {
        DeliveryError::SubscriberFailed { error, .. } => error.clone(),
        DeliveryError::SubscriberPanicked { info, .. } => format!("panic: {info}"),
        other => other.to_string(),
    };
    let payload: Value = (*event.payload).clone();
    let info = ErrorInfo::new()
        .with("Exception", exception)
        .with_sensitive(
            PUBLISHED_EVENT,
            json!({ "name": event.name, "sender": sender, "payload": payload }),
        )
        .with(
            "Caused by Subscriber",
            json!({ "name": subscription.name(), "pattern": subscription.pattern.as_str() }),
        );
    bus.report(&message, &info);

    if event.kind == EventKind::Regular {
        bus.enqueue(QueuedEvent::delivery_error(json!({
            "code": fault.as_label(),
            "subscriber": subscription.name(),
            "topic": event.name,
            "message": fault.to_string(),
        })));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    fn bus() -> EventBus {
        EventBus::new(Heartbeat::new(), EventBusConfig::default())
    }

    fn record(bus: &EventBus, pattern: &str, label: &str, log: &Log) -> Unsubscribe {
        let log = Arc::clone(log);
        let name = label.to_string();
        let label = label.to_string();
        bus.subscribe(
            pattern,
            move |_, meta| {
                log.lock().unwrap().push(format!("{label}:{}", meta.name));
                Ok(())
            },
            SubscribeOptions::named(name),
        )
    }

    fn errors(bus: &EventBus) -> Arc<Mutex<Vec<(String, ErrorInfo)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.set_error_handler(move |message, info| {
            sink.lock().unwrap().push((message.to_string(), info.clone()));
        });
        seen
    }

    #[tokio::test]
    async fn test_pattern_decides_delivery() {
        let bus = bus();
        let log: Log = Arc::default();
        record(&bus, "didChangeAreaVisibility.+.true", "s", &log);

        bus.publish("didChangeAreaVisibility.page.true", Value::Null, PublishOptions::default())
            .await;
        bus.publish(
            "didChangeAreaVisibility.page.nested.true",
            Value::Null,
            PublishOptions::default(),
        )
        .await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["s:didChangeAreaVisibility.page.true"]
        );
    }

    #[tokio::test]
    async fn test_subscribers_run_in_registration_order() {
        let bus = bus();
        let log: Log = Arc::default();
        for label in ["A", "B", "C"] {
            record(&bus, "topic", label, &log);
        }
        bus.publish("topic", Value::Null, PublishOptions::default()).await;
        assert_eq!(*log.lock().unwrap(), vec!["A:topic", "B:topic", "C:topic"]);
    }

    #[tokio::test]
    async fn test_events_are_delivered_fifo_and_never_synchronously() {
        let bus = bus();
        let log: Log = Arc::default();
        record(&bus, "*", "s", &log);

        let first = bus.publish("one", Value::Null, PublishOptions::default());
        let second = bus.publish("two", Value::Null, PublishOptions::default());
        assert!(log.lock().unwrap().is_empty());

        second.await;
        first.await;
        assert_eq!(*log.lock().unwrap(), vec!["s:one", "s:two"]);
    }

    #[tokio::test]
    async fn test_subscription_added_during_delivery_waits_for_next_publish() {
        let bus = bus();
        let log: Log = Arc::default();
        let inner_bus = bus.clone();
        let inner_log = Arc::clone(&log);
        bus.subscribe(
            "ping",
            move |_, _| {
                record(&inner_bus, "ping", "late", &inner_log);
                Ok(())
            },
            SubscribeOptions::named("first"),
        );

        bus.publish("ping", Value::Null, PublishOptions::default()).await;
        assert!(log.lock().unwrap().is_empty());

        bus.publish("ping", Value::Null, PublishOptions::default()).await;
        assert_eq!(*log.lock().unwrap(), vec!["late:ping"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_during_delivery_skips_removed_subscriber() {
        let bus = bus();
        let log: Log = Arc::default();
        let victim: Arc<Mutex<Option<Unsubscribe>>> = Arc::default();
        let slot = Arc::clone(&victim);
        bus.subscribe(
            "e",
            move |_, _| {
                if let Some(handle) = slot.lock().unwrap().as_ref() {
                    handle.unsubscribe();
                }
                Ok(())
            },
            SubscribeOptions::default(),
        );
        *victim.lock().unwrap() = Some(record(&bus, "e", "victim", &log));

        bus.publish("e", Value::Null, PublishOptions::default()).await;
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(bus.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_publish_from_handler_lands_in_next_cycle() {
        let bus = bus();
        let cycles = Arc::new(Mutex::new(Vec::new()));
        let inner_bus = bus.clone();
        bus.subscribe(
            "first",
            move |_, _| {
                let _ = inner_bus.publish("second", Value::Null, PublishOptions::default());
                Ok(())
            },
            SubscribeOptions::default(),
        );
        let seen = Arc::clone(&cycles);
        bus.subscribe(
            "*",
            move |_, meta| {
                seen.lock().unwrap().push((meta.name.clone(), meta.cycle_id));
                Ok(())
            },
            SubscribeOptions::default(),
        );

        bus.publish("first", Value::Null, PublishOptions::default()).await;
        bus.flush().await;

        let cycles = cycles.lock().unwrap();
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0].0, "first");
        assert_eq!(cycles[1].0, "second");
        assert_eq!(cycles[1].1, cycles[0].1 + 1);
    }

    #[tokio::test]
    async fn test_faulty_subscriber_does_not_block_others() {
        let bus = bus();
        let seen = errors(&bus);
        let log: Log = Arc::default();
        record(&bus, "e", "A", &log);
        bus.subscribe(
            "e",
            |_, _| Err(HandlerError::fail("boom")),
            SubscribeOptions::named("B"),
        );
        bus.subscribe("e", |_, _| panic!("kaboom"), SubscribeOptions::named("P"));
        record(&bus, "e", "C", &log);

        bus.publish("e", json!({"secret": 1}), PublishOptions::from_sender("pub"))
            .await;

        assert_eq!(*log.lock().unwrap(), vec!["A:e", "C:e"]);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].0.contains("\"B\""));
        assert!(seen[0].0.contains("published by \"pub\""));
        let published = seen[0].1.get(PUBLISHED_EVENT).unwrap();
        assert!(published.sensitive);
        assert_eq!(published.value["payload"]["secret"], 1);
        assert_eq!(seen[1].1.get("Exception").unwrap().value, "panic: kaboom");
    }

    #[tokio::test]
    async fn test_delivery_errors_reach_only_opted_in_subscribers() {
        let bus = bus();
        let _ = errors(&bus);
        let plain: Log = Arc::default();
        record(&bus, "*", "plain", &plain);
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        bus.subscribe(
            "didEncounterError.*",
            move |event, _| {
                sink.lock().unwrap().push(event.clone());
                Ok(())
            },
            SubscribeOptions::named("monitor").with_delivery_errors(),
        );
        bus.subscribe("e", |_, _| Err(HandlerError::fail("boom")), SubscribeOptions::named("bad"));

        bus.publish("e", Value::Null, PublishOptions::default()).await;
        bus.flush().await;

        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0]["code"], "subscriber_failed");
        assert_eq!(reports[0]["subscriber"], "bad");
        assert_eq!(*plain.lock().unwrap(), vec!["plain:e"]);
    }

    #[tokio::test]
    async fn test_deliver_to_sender_false_skips_own_subscription() {
        let bus = bus();
        let log: Log = Arc::default();
        record(&bus, "e", "w1", &log);
        record(&bus, "e", "w2", &log);

        bus.publish(
            "e",
            Value::Null,
            PublishOptions::from_sender("w1").without_delivery_to_sender(),
        )
        .await;
        assert_eq!(*log.lock().unwrap(), vec!["w2:e"]);
    }

    #[tokio::test]
    async fn test_settled_is_immediate_when_idle() {
        let bus = bus();
        bus.settled().await;
        bus.flush().await;
        assert_eq!(bus.cycle_id(), 0);
    }

    #[tokio::test]
    async fn test_inspectors_see_activity() {
        let bus = bus();
        let actions = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&actions);
        let handle = bus.add_inspector(move |i| {
            sink.lock().unwrap().push((i.action, i.source.clone(), i.target.clone()));
        });
        record(&bus, "e", "sub", &Log::default());
        bus.publish("e", Value::Null, PublishOptions::from_sender("pub")).await;
        handle.unsubscribe();
        bus.publish("e", Value::Null, PublishOptions::default()).await;

        let actions = actions.lock().unwrap();
        assert_eq!(
            *actions,
            vec![
                (InspectAction::Subscribe, "sub".to_string(), String::new()),
                (InspectAction::Publish, "pub".to_string(), String::new()),
                (InspectAction::Deliver, "pub".to_string(), "sub".to_string()),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cycles_never_overlap_across_worker_threads() {
        use std::sync::atomic::{AtomicBool, AtomicUsize};

        let bus = bus();
        let busy = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let flag = Arc::clone(&busy);
        bus.subscribe(
            "slow",
            move |_, _| {
                flag.store(true, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(150));
                flag.store(false, Ordering::SeqCst);
                Ok(())
            },
            SubscribeOptions::named("slow"),
        );
        let flag = Arc::clone(&busy);
        let count = Arc::clone(&overlaps);
        let sink = Arc::clone(&seen);
        bus.subscribe(
            "*",
            move |_, meta| {
                if flag.load(Ordering::SeqCst) {
                    count.fetch_add(1, Ordering::SeqCst);
                }
                sink.lock().unwrap().push((meta.name.clone(), meta.cycle_id));
                Ok(())
            },
            SubscribeOptions::named("watcher"),
        );

        let first = bus.publish("slow", Value::Null, PublishOptions::default());
        let other = bus.clone();
        let second = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            other.publish("fast", Value::Null, PublishOptions::default()).await;
        });
        first.await;
        second.await.unwrap();
        bus.flush().await;

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "slow");
        assert_eq!(seen[1].0, "fast");
        assert!(seen[1].1 > seen[0].1);
        assert_eq!(bus.cycle_id(), seen[1].1);
    }
}
