//! # Monitor event observers.
//!
//! [`Observe`] is the extension point for reacting to what a
//! [`ProcessMonitor`](crate::ProcessMonitor) sees: progress bars, metrics,
//! persisting output, alerting.
//!
//! Each observer gets:
//! - **Dedicated worker task** (runs independently of the read loops)
//! - **Bounded queue** (capacity via [`Observe::queue_capacity`])
//! - **Panic isolation** (panics are caught and logged, the worker keeps going)
//!
//! ## Architecture
//! ```text
//! ProcessMonitor ──► ObserverSet ──► [bounded queue] ──► worker ──► observer.on_event()
//!                                                           └─► panic caught → warn!
//! ```
//!
//! ## Rules
//! - Queue overflow drops the event **for this observer only** and is logged.
//! - Events are processed sequentially (FIFO) per observer.
//! - Observers never block the monitor's read loops or each other.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use procvisor::{MonitorEvent, MonitorEventKind, Observe};
//!
//! struct ProgressBar;
//!
//! #[async_trait]
//! impl Observe for ProgressBar {
//!     async fn on_event(&self, ev: &MonitorEvent) {
//!         if ev.kind == MonitorEventKind::Progress {
//!             // redraw
//!         }
//!     }
//!
//!     fn name(&self) -> &str { "progress-bar" }
//! }
//! ```

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;

use crate::events::MonitorEvent;

/// Receiver of monitor events.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; panics are caught but the event is lost.
#[async_trait]
pub trait Observe: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from the observer's worker task, never from a read loop.
    async fn on_event(&self, event: &MonitorEvent);

    /// Returns the observer name used in logs and by
    /// [`ProcessMonitor::remove_observer`](crate::ProcessMonitor::remove_observer).
    ///
    /// The default uses `type_name::<Self>()`; override it when possible.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity (clamped to at least 1).
    ///
    /// Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}

/// Closure-backed observer.
///
/// ```rust
/// use std::sync::Arc;
/// use procvisor::{MonitorEvent, Observe, ObserverFn};
///
/// let printer: Arc<dyn Observe> = ObserverFn::arc("printer", |ev: &MonitorEvent| {
///     if let Some(line) = ev.line() {
///         println!("{line}");
///     }
/// });
/// assert_eq!(printer.name(), "printer");
/// ```
pub struct ObserverFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> ObserverFn<F>
where
    F: Fn(&MonitorEvent) + Send + Sync + 'static,
{
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the observer and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F> Observe for ObserverFn<F>
where
    F: Fn(&MonitorEvent) + Send + Sync + 'static,
{
    async fn on_event(&self, event: &MonitorEvent) {
        (self.f)(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
