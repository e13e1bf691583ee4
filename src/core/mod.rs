//! Supervision core: engine, monitor and their bookkeeping.
//!
//! Internal modules:
//! - [`engine`]: admission gate, spawn, timeout, termination and result assembly;
//! - [`monitor`]: stdout/stderr/state loops and observer fan-out for one execution;
//! - [`registry`]: running executions by id;
//! - [`stats`]: execution counters;
//! - [`config`]: engine settings;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod config;
mod engine;
mod monitor;
mod registry;
mod shutdown;
mod stats;

pub use config::EngineConfig;
pub use engine::SupervisionEngine;
pub use monitor::{CapturedOutput, ProcessMonitor};
pub use shutdown::{ShutdownSignal, wait_for_shutdown_signal};
pub use stats::EngineStats;
