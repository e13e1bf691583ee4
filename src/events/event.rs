//! # Monitor events emitted while a process is supervised.
//!
//! The [`MonitorEventKind`] enum classifies what a [`ProcessMonitor`](crate::ProcessMonitor)
//! observed about one execution: lifecycle (started, completed), raw output
//! lines, structured progress from line parsers, and monitoring errors.
//!
//! The [`MonitorEvent`] struct carries a timestamp, the owning execution
//! identifier and a key/value [`Payload`].
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Observers receive events of one execution in FIFO order; use `seq` to merge
//! events of several executions.
//!
//! ## Example
//! ```rust
//! use procvisor::{ExecutionId, MonitorEvent, MonitorEventKind};
//!
//! let id = ExecutionId::from("proc_1");
//! let ev = MonitorEvent::stdout_line(&id, "frame=  42");
//!
//! assert_eq!(ev.kind, MonitorEventKind::StdoutLine);
//! assert_eq!(ev.line(), Some("frame=  42"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use serde_json::Value;

use crate::process::ExecutionId;

/// Key/value payload attached to a [`MonitorEvent`] and produced by line parsers.
pub type Payload = serde_json::Map<String, Value>;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of monitor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorEventKind {
    /// The monitor attached to a freshly spawned process.
    ///
    /// Sets `data.pid` when the OS reported one.
    Started,

    /// One non-blank line read from standard output.
    ///
    /// Sets `data.line` (trimmed).
    StdoutLine,

    /// One non-blank line read from standard error.
    ///
    /// Sets `data.line` (trimmed).
    StderrLine,

    /// Structured data produced by a line parser for a stdout line.
    ///
    /// `data` is the parser's payload plus `data.parser` (parser name).
    Progress,

    /// The process was observed to exit.
    ///
    /// Sets `data.exit_code`.
    Completed,

    /// A parser or a read loop failed; monitoring continues.
    ///
    /// Sets one of `parser_error`, `stdout_monitor_error`,
    /// `stderr_monitor_error`, `state_monitor_error`.
    Error,
}

impl MonitorEventKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            MonitorEventKind::Started => "started",
            MonitorEventKind::StdoutLine => "stdout_line",
            MonitorEventKind::StderrLine => "stderr_line",
            MonitorEventKind::Progress => "progress",
            MonitorEventKind::Completed => "completed",
            MonitorEventKind::Error => "error",
        }
    }
}

/// Monitor event with payload.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp
/// - `data`: fields depending on the [`MonitorEventKind`]
#[derive(Clone, Debug)]
pub struct MonitorEvent {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Execution this event belongs to.
    pub execution_id: ExecutionId,
    /// Event classification.
    pub kind: MonitorEventKind,
    /// Event payload.
    pub data: Payload,
}

impl MonitorEvent {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: MonitorEventKind, execution_id: &ExecutionId) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            execution_id: execution_id.clone(),
            kind,
            data: Payload::new(),
        }
    }

    /// Attaches one payload field.
    #[inline]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Merges a payload into this event (existing keys are overwritten).
    #[inline]
    pub fn with_data(mut self, data: Payload) -> Self {
        self.data.extend(data);
        self
    }

    #[inline]
    pub fn started(execution_id: &ExecutionId, pid: Option<u32>) -> Self {
        let ev = MonitorEvent::new(MonitorEventKind::Started, execution_id);
        match pid {
            Some(pid) => ev.with_field("pid", pid),
            None => ev,
        }
    }

    #[inline]
    pub fn stdout_line(execution_id: &ExecutionId, line: &str) -> Self {
        MonitorEvent::new(MonitorEventKind::StdoutLine, execution_id).with_field("line", line)
    }

    #[inline]
    pub fn stderr_line(execution_id: &ExecutionId, line: &str) -> Self {
        MonitorEvent::new(MonitorEventKind::StderrLine, execution_id).with_field("line", line)
    }

    #[inline]
    pub fn progress(execution_id: &ExecutionId, parser: &str, data: Payload) -> Self {
        MonitorEvent::new(MonitorEventKind::Progress, execution_id)
            .with_data(data)
            .with_field("parser", parser)
    }

    #[inline]
    pub fn completed(execution_id: &ExecutionId, exit_code: i32) -> Self {
        MonitorEvent::new(MonitorEventKind::Completed, execution_id).with_field("exit_code", exit_code)
    }

    /// Creates an error event; `source` is the payload key (e.g. `parser_error`).
    #[inline]
    pub fn error(execution_id: &ExecutionId, source: &'static str, message: impl Into<String>) -> Self {
        MonitorEvent::new(MonitorEventKind::Error, execution_id).with_field(source, message.into())
    }

    /// Returns the `line` field of line events.
    pub fn line(&self) -> Option<&str> {
        self.data.get("line").and_then(Value::as_str)
    }

    /// Returns the `exit_code` field of completion events.
    pub fn exit_code(&self) -> Option<i32> {
        self.data
            .get("exit_code")
            .and_then(Value::as_i64)
            .and_then(|c| i32::try_from(c).ok())
    }

    /// Returns the `pid` field of start events.
    pub fn pid(&self) -> Option<u32> {
        self.data
            .get("pid")
            .and_then(Value::as_u64)
            .and_then(|p| u32::try_from(p).ok())
    }
}
