//! # procvisor
//!
//! **Procvisor** supervises external processes and retries fallible operations.
//!
//! It pairs two engines:
//! - a **supervision engine** that runs child processes under a concurrency
//!   ceiling, streams their output to observers, enforces per-process
//!   timeouts and stops processes through staged termination;
//! - a **retry executor** that wraps any fallible operation (typically "run
//!   this process to completion") in a bounded-attempt loop with configurable
//!   backoff, retry eligibility and an overall deadline.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌────────────────┐  ┌────────────────┐  ┌────────────────┐
//!     │ ProcessRequest │  │ ProcessRequest │  │ ProcessRequest │
//!     └───────┬────────┘  └───────┬────────┘  └───────┬────────┘
//!             ▼                   ▼                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  RetryExecutor (optional, per operation)                          │
//! │  - RetryConditionChecker (continue / stop)                        │
//! │  - DelayCalculator (backoff between attempts)                     │
//! │  - abort checker + overall timeout                                │
//! └───────────────────────────────┬───────────────────────────────────┘
//!                                 ▼ one call per attempt
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  SupervisionEngine                                                │
//! │  - Semaphore (admission gate, EngineConfig::max_concurrent)       │
//! │  - Registry (running executions by id)                            │
//! │  - ProcessTerminator (TERM ─► KILL ─► OS kill)                    │
//! └──────┬─────────────────────────────────────────────────┬──────────┘
//!        ▼                                                 ▼
//!  ┌──────────────┐   stdout/stderr    ┌──────────────────────────────┐
//!  │ProcessHandle │ ─────────────────► │ ProcessMonitor               │
//!  │ (owner task) │   exit state       │ - stdout loop (+ parsers)    │
//!  └──────────────┘ ─────────────────► │ - stderr loop                │
//!                                      │ - state loop                 │
//!                                      └──────────────┬───────────────┘
//!                                                     ▼
//!                                          ObserverSet (per-observer queues)
//!                                           ┌─────────┼─────────┐
//!                                           ▼         ▼         ▼
//!                                       LogWriter  ObserverFn  custom
//! ```
//!
//! ### Lifecycle of one execution
//! ```text
//! execute(request)
//!   ├─► acquire permit (suspends while max_concurrent are running)
//!   ├─► spawn ── error ──► Failed { metadata.exception }
//!   ├─► register + ProcessMonitor::attach ─► Started
//!   ├─► wait for exit, bounded by request.timeout
//!   │       ├─ exited(0)   ─► Completed
//!   │       ├─ exited(n)   ─► Failed { exit_code: n }
//!   │       └─ timed out   ─► ProcessTerminator::escalate ─► Terminated
//!   ├─► drain monitor loops (bounded), stop observers
//!   └─► deregister, release permit
//! ```
//!
//! ## Features
//! | Area             | Description                                                     | Key types / traits                                  |
//! |------------------|-----------------------------------------------------------------|-----------------------------------------------------|
//! | **Supervision**  | Run processes with a concurrency ceiling and timeouts.          | [`SupervisionEngine`], [`EngineConfig`]             |
//! | **Monitoring**   | Stream output lines, parser progress and completion events.     | [`ProcessMonitor`], [`MonitorEvent`], [`LineParser`]|
//! | **Observer API** | Consume monitor events (logging, progress bars, custom sinks).  | [`Observe`], [`ObserverFn`]                         |
//! | **Termination**  | Staged stop of a single process or of all running ones.         | [`ProcessTerminator`], [`Terminable`]               |
//! | **Retry**        | Bounded attempts, backoff policies, presets and error checkers. | [`RetryExecutor`], [`RetryConfiguration`]           |
//! | **Errors**       | Typed errors for attempts, configuration and monitors.          | [`OperationError`], [`ConfigError`]                 |
//!
//! ## Optional features
//! - `logging` (default): exports the built-in [`LogWriter`] observer.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use procvisor::{
//!     EngineConfig, Observe, ProcessRequest, RetryConfiguration, RetryExecutor, RetryPreset,
//!     SupervisionEngine,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let engine = SupervisionEngine::new(EngineConfig::default());
//!     let request = ProcessRequest::new(["sh", "-c", "echo hello"])
//!         .with_timeout(Duration::from_secs(10));
//!
//!     #[cfg(feature = "logging")]
//!     let observers: Vec<Arc<dyn Observe>> = vec![Arc::new(procvisor::LogWriter::default())];
//!     #[cfg(not(feature = "logging"))]
//!     let observers: Vec<Arc<dyn Observe>> = Vec::new();
//!
//!     let cfg = RetryConfiguration::preset(RetryPreset::Quick);
//!     let result = RetryExecutor::new()
//!         .execute_with_retry(
//!             || async {
//!                 engine
//!                     .execute(&request, observers.clone(), Vec::new())
//!                     .await
//!                     .into_result()
//!             },
//!             &cfg,
//!             None,
//!             None,
//!         )
//!         .await;
//!
//!     println!("{:?} after {} attempt(s)", result.outcome, result.attempt_count());
//! }
//! ```
mod core;
mod error;
mod events;
mod observers;
mod policies;
mod process;
mod retry;

// ---- Public re-exports ----

pub use core::{
    CapturedOutput, EngineConfig, EngineStats, ProcessMonitor, ShutdownSignal, SupervisionEngine,
    wait_for_shutdown_signal,
};
pub use error::{ConfigError, DelayError, MonitorError, OperationError, ParseError, RetryError};
pub use events::{MonitorEvent, MonitorEventKind, Payload};
pub use observers::{Observe, ObserverFn, ObserverSet};
pub use policies::{
    DelayCalculator, DelayFn, ErrorChecker, JitterSample, RetryConditionChecker,
    RetryConfiguration, RetryConfigurationBuilder, RetryPolicy, RetryPreset, checkers,
};
pub use process::{
    ChildOutput, DEFAULT_GRACE, DEFAULT_KILL_WAIT, ExecutionId, ExitState, LineParser, ParserFn,
    ParserRef, ProcessHandle, ProcessRequest, ProcessResult, ProcessState, ProcessTerminator,
    Terminable, TerminationState,
};
pub use retry::{
    AbortChecker, RetryAttempt, RetryExecutionResult, RetryExecutor, RetryOutcome, RetryStats,
    abort_on_cancel, retry_async, retry_blocking,
};

// Optional: built-in observer that renders monitor events through `tracing`.
// Enabled by default; disable with `default-features = false`.
#[cfg(feature = "logging")]
pub use observers::LogWriter;
