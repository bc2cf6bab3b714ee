//! # Heartbeat: cooperative "next tick" scheduling.
//!
//! [`Heartbeat`] batches work into ticks. The event bus registers its delivery
//! cycle with [`Heartbeat::on_next`]; instrumentation hooks run around it.
//!
//! ## Tick layout
//! ```text
//! on_next(f) ──► first registration spawns one tick task (tokio::spawn)
//!
//! tick:
//!   ├─► before_next hooks   (registered before the tick started)
//!   ├─► on_next callbacks   (registered before the tick started)
//!   └─► after_next hooks    (including hooks registered during this tick)
//! ```
//!
//! ## Rules
//! - **No polling**: a tick is only scheduled by `on_next`; hooks alone never schedule one.
//! - **One tick per request**: any number of `on_next` calls before a tick runs share it.
//! - **No re-entry**: `on_next` called from inside a tick lands in the following tick.
//! - **Serial ticks**: a tick requested while another one runs is spawned when the
//!   running tick ends, even on a multi-threaded runtime.
//! - **Isolation**: a panicking callback is logged and does not stop the tick.
//!
//! Requires a Tokio runtime: the tick task is spawned with [`tokio::spawn`].

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use crate::sync::{lock, panic_message};

type Callback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Queues {
    before: Vec<Callback>,
    next: Vec<Callback>,
    after: VecDeque<Callback>,
    requested: bool,
    running: bool,
    ticks: u64,
}

/// Cooperative scheduler handing out "next tick" slots.
///
/// Cheap to clone; all clones share the same queues.
#[derive(Clone, Default)]
pub struct Heartbeat {
    queues: Arc<Mutex<Queues>>,
}

impl Heartbeat {
    /// Creates an idle heartbeat.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `callback` on the next tick, scheduling one if none is pending.
    ///
    /// # Panics
    /// Panics if called outside of a Tokio runtime while no tick is pending.
    pub fn on_next(&self, callback: impl FnOnce() + Send + 'static) {
        let schedule = {
            let mut q = lock(&self.queues);
            q.next.push(Box::new(callback));
            !std::mem::replace(&mut q.requested, true) && !q.running
        };
        if schedule {
            self.spawn_tick();
        }
    }

    /// Runs `callback` right before the next tick's `on_next` callbacks.
    pub fn before_next(&self, callback: impl FnOnce() + Send + 'static) {
        lock(&self.queues).before.push(Box::new(callback));
    }

    /// Runs `callback` right after the next tick's `on_next` callbacks.
    pub fn after_next(&self, callback: impl FnOnce() + Send + 'static) {
        lock(&self.queues).after.push_back(Box::new(callback));
    }

    /// True while a tick is scheduled but has not started yet.
    pub fn is_pending(&self) -> bool {
        lock(&self.queues).requested
    }

    /// Number of ticks run so far.
    pub fn ticks(&self) -> u64 {
        lock(&self.queues).ticks
    }

    fn spawn_tick(&self) {
        let me = self.clone();
        tokio::spawn(async move { me.tick() });
    }

    fn tick(&self) {
        let (before, next) = {
            let mut q = lock(&self.queues);
            q.requested = false;
            q.running = true;
            q.ticks += 1;
            (std::mem::take(&mut q.before), std::mem::take(&mut q.next))
        };

        for callback in before.into_iter().chain(next) {
            run_guarded(callback);
        }

        loop {
            let callback = lock(&self.queues).after.pop_front();
            match callback {
                Some(callback) => run_guarded(callback),
                None => break,
            }
        }

        let follow_up = {
            let mut q = lock(&self.queues);
            q.running = false;
            q.requested
        };
        if follow_up {
            self.spawn_tick();
        }
    }
}

impl std::fmt::Debug for Heartbeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let q = lock(&self.queues);
        f.debug_struct("Heartbeat")
            .field("requested", &q.requested)
            .field("running", &q.running)
            .field("ticks", &q.ticks)
            .field("next", &q.next.len())
            .finish()
    }
}

fn run_guarded(callback: Callback) {
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(callback)) {
        tracing::error!(info = %panic_message(&*panic), "heartbeat callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Callback) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log2 = Arc::clone(&log);
        let make = move |label: &'static str| -> Callback {
            let log = Arc::clone(&log2);
            Box::new(move || log.lock().unwrap().push(label))
        };
        (log, make)
    }

    #[tokio::test]
    async fn test_hooks_run_around_next_callbacks() {
        let hb = Heartbeat::new();
        let (log, make) = recorder();
        let (tx, rx) = oneshot::channel();

        hb.after_next(make("after"));
        hb.on_next(make("next"));
        hb.before_next(make("before"));
        hb.after_next(move || {
            let _ = tx.send(());
        });

        rx.await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["before", "next", "after"]);
        assert_eq!(hb.ticks(), 1);
    }

    #[tokio::test]
    async fn test_callbacks_are_deferred_to_a_tick() {
        let hb = Heartbeat::new();
        let (log, make) = recorder();
        hb.on_next(make("a"));
        hb.on_next(make("b"));

        assert!(log.lock().unwrap().is_empty());
        assert!(hb.is_pending());

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(hb.ticks(), 1);
        assert!(!hb.is_pending());
    }

    #[tokio::test]
    async fn test_hooks_alone_do_not_schedule() {
        let hb = Heartbeat::new();
        let (log, make) = recorder();
        hb.before_next(make("before"));
        hb.after_next(make("after"));

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(hb.ticks(), 0);
    }

    #[tokio::test]
    async fn test_on_next_inside_tick_runs_on_following_tick() {
        let hb = Heartbeat::new();
        let (tx, rx) = oneshot::channel();
        let inner = hb.clone();
        hb.on_next(move || {
            let seen = inner.ticks();
            inner.on_next(move || {
                let _ = tx.send(seen);
            });
        });

        let first_tick = rx.await.unwrap();
        assert_eq!(first_tick, 1);
        assert_eq!(hb.ticks(), 2);
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_stop_tick() {
        let hb = Heartbeat::new();
        let (tx, rx) = oneshot::channel();
        hb.on_next(|| panic!("boom"));
        hb.on_next(move || {
            let _ = tx.send(());
        });
        rx.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_tick_requested_from_another_thread_waits_for_running_tick() {
        let hb = Heartbeat::new();
        let (log, make) = recorder();
        let (started_tx, started_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        let slow = make("slow-end");
        hb.on_next(move || {
            let _ = started_tx.send(());
            std::thread::sleep(Duration::from_millis(100));
            slow();
        });
        started_rx.await.unwrap();

        let other = hb.clone();
        let fast = make("fast");
        tokio::spawn(async move {
            other.on_next(move || {
                fast();
                let _ = done_tx.send(());
            });
        })
        .await
        .unwrap();

        done_rx.await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["slow-end", "fast"]);
        assert_eq!(hb.ticks(), 2);
    }
}
