//! # Non-blocking event fan-out to multiple observers.
//!
//! [`ObserverSet`] distributes monitor events to every registered observer
//! without ever blocking the publisher (the monitor's read loops).
//!
//! ## Architecture
//! ```text
//! emit(event)
//!     │
//!     ├──► [queue 1] ──► worker 1 ──► observer1.on_event()
//!     │    (bounded)         └──────► panic → warn!, continue
//!     ├──► [queue 2] ──► worker 2 ──► observer2.on_event()
//!     │    (bounded)
//!     └──► [queue N] ──► worker N ──► observerN.on_event()
//! ```
//!
//! ## Rules
//! - **Non-blocking**: `emit()` uses `try_send` and returns immediately
//! - **Overflow**: the event is dropped for that observer only and counted
//! - **Per-observer FIFO**: each observer sees events in emission order
//! - **Dynamic membership**: observers can be added and removed while events flow
//! - **After shutdown**: `emit()` and `add()` are no-ops
//! - **Bounded shutdown**: workers still busy when the shutdown window closes are aborted
//!
//! **Warning**: `AssertUnwindSafe` is used, which can leave shared state inconsistent
//! if an observer uses `Arc<Mutex<T>>` and panics while holding the lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::warn;

use crate::error::panic_message;
use crate::events::MonitorEvent;
use crate::observers::Observe;

/// Per-observer channel metadata.
struct ObserverChannel {
    name: Arc<str>,
    sender: mpsc::Sender<Arc<MonitorEvent>>,
    worker: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    channels: Vec<ObserverChannel>,
    closed: bool,
}

/// Fan-out coordinator for the observers of one monitor.
#[derive(Default)]
pub struct ObserverSet {
    inner: Mutex<Inner>,
    dropped: AtomicU64,
}

impl ObserverSet {
    /// Creates a set and spawns one worker per observer.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(observers: impl IntoIterator<Item = Arc<dyn Observe>>) -> Self {
        let set = Self::default();
        for obs in observers {
            set.add(obs);
        }
        set
    }

    /// Registers an observer; returns `false` if the set was already shut down.
    pub fn add(&self, observer: Arc<dyn Observe>) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }
        inner.channels.push(spawn_worker(observer));
        true
    }

    /// Unregisters every observer named `name`; returns `true` if one was removed.
    ///
    /// Events already queued for a removed observer are still delivered.
    pub fn remove(&self, name: &str) -> bool {
        let mut inner = self.lock();
        let before = inner.channels.len();
        inner.channels.retain(|ch| &*ch.name != name);
        before != inner.channels.len()
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.lock().channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of events dropped because an observer queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Emits an event to all observers (wraps it in `Arc`).
    pub fn emit(&self, event: MonitorEvent) {
        self.emit_arc(Arc::new(event));
    }

    /// Emits a shared event to all observers.
    pub fn emit_arc(&self, event: Arc<MonitorEvent>) {
        let inner = self.lock();
        for ch in &inner.channels {
            match ch.sender.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        observer = %ch.name,
                        kind = event.kind.as_label(),
                        execution_id = %event.execution_id,
                        "observer queue full, event dropped"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(observer = %ch.name, "observer worker gone, event dropped");
                }
            }
        }
    }

    /// Stops accepting events, closes every queue and lets the workers deliver
    /// what is still queued for at most `within` in total.
    ///
    /// Workers still running afterwards are aborted; either way no observer
    /// receives an event once this returns.
    pub async fn shutdown(&self, within: Duration) {
        let channels = {
            let mut inner = self.lock();
            inner.closed = true;
            std::mem::take(&mut inner.channels)
        };

        let mut workers = Vec::with_capacity(channels.len());
        for ch in channels {
            drop(ch.sender);
            workers.push((ch.name, ch.worker));
        }

        let deadline = tokio::time::Instant::now() + within;
        for (name, mut worker) in workers {
            if tokio::time::timeout_at(deadline, &mut worker).await.is_err() {
                warn!(observer = %name, ?within, "observer still busy at shutdown, aborting");
                worker.abort();
                let _ = worker.await;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn spawn_worker(observer: Arc<dyn Observe>) -> ObserverChannel {
    let cap = observer.queue_capacity().max(1);
    let name: Arc<str> = observer.name().into();
    let (tx, mut rx) = mpsc::channel::<Arc<MonitorEvent>>(cap);

    let worker_name = Arc::clone(&name);
    let worker = tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            let fut = observer.on_event(ev.as_ref());
            if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                warn!(
                    observer = %worker_name,
                    info = %panic_message(&*panic_err),
                    "observer panicked"
                );
            }
        }
    });

    ObserverChannel {
        name,
        sender: tx,
        worker,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observers::ObserverFn;
    use crate::process::ExecutionId;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    const WINDOW: Duration = Duration::from_secs(5);

    fn counter(name: &'static str) -> (Arc<dyn Observe>, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let obs: Arc<dyn Observe> = ObserverFn::arc(name, move |_ev: &MonitorEvent| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (obs, hits)
    }

    struct Panicky;

    #[async_trait]
    impl Observe for Panicky {
        async fn on_event(&self, _event: &MonitorEvent) {
            panic!("observer bug");
        }
    }

    struct Slow;

    #[async_trait]
    impl Observe for Slow {
        async fn on_event(&self, _event: &MonitorEvent) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn test_fan_out_survives_panicking_observer() {
        let id = ExecutionId::from("proc_fan");
        let (a, a_hits) = counter("a");
        let set = ObserverSet::new([a, Arc::new(Panicky) as Arc<dyn Observe>]);

        for i in 0..5 {
            set.emit(MonitorEvent::stdout_line(&id, &format!("line {i}")));
        }
        set.shutdown(WINDOW).await;

        assert_eq!(a_hits.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_remove_and_emit_after_shutdown() {
        let id = ExecutionId::from("proc_rm");
        let (a, a_hits) = counter("a");
        let (b, b_hits) = counter("b");
        let set = ObserverSet::new([a, b]);

        set.emit(MonitorEvent::started(&id, None));
        assert!(set.remove("b"));
        assert!(!set.remove("b"));
        set.emit(MonitorEvent::completed(&id, 0));
        set.shutdown(WINDOW).await;

        set.emit(MonitorEvent::completed(&id, 0));
        let (late, _) = counter("late");
        assert!(!set.add(late));

        assert_eq!(a_hits.load(Ordering::SeqCst), 2);
        assert_eq!(b_hits.load(Ordering::SeqCst), 1);
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_drops_for_that_observer_only() {
        let id = ExecutionId::from("proc_slow");
        let (fast, fast_hits) = counter("fast");
        let set = ObserverSet::new([Arc::new(Slow) as Arc<dyn Observe>, fast]);

        for _ in 0..10 {
            set.emit(MonitorEvent::stdout_line(&id, "x"));
            tokio::task::yield_now().await;
        }
        assert!(set.dropped_events() >= 1);

        set.remove(std::any::type_name::<Slow>());
        set.shutdown(WINDOW).await;
        assert_eq!(fast_hits.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_stuck_observer() {
        let id = ExecutionId::from("proc_stuck");
        let (fast, fast_hits) = counter("fast");
        let set = ObserverSet::new([Arc::new(Slow) as Arc<dyn Observe>, fast]);

        set.emit(MonitorEvent::started(&id, None));
        set.emit(MonitorEvent::completed(&id, 0));

        let started = Instant::now();
        set.shutdown(Duration::from_millis(100)).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(fast_hits.load(Ordering::SeqCst), 2);
        assert!(set.is_empty());
    }
}
