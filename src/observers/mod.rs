//! # Observers of monitor events.
//!
//! ```text
//!   ProcessMonitor read loops ── emit(MonitorEvent) ──► ObserverSet
//!                                                          │
//!              ┌───────────────────────────┬───────────────┴──────────┐
//!              ▼                           ▼                          ▼
//!          LogWriter                ObserverFn(closure)         CustomObserver
//!          (tracing)                  (progress bars)            (user logic)
//! ```
//!
//! - [`Observe`] is the trait to implement.
//! - [`ObserverFn`] adapts a plain closure.
//! - [`ObserverSet`] owns the per-observer queues and workers.
//! - [`LogWriter`] (feature `logging`) forwards events to `tracing`.

#[cfg(feature = "logging")]
mod log;
mod observe;
mod set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use observe::{Observe, ObserverFn};
pub use set::ObserverSet;
