//! # ProcessMonitor: live output and state watching for one execution.
//!
//! Once [`attach`](ProcessMonitor::attach)ed to a running child, the monitor
//! runs three tasks under one cancellation token:
//!
//! ```text
//!              ┌─► stdout loop ─► StdoutLine ─► parsers ─► Progress | Error{parser_error}
//! attach() ────┼─► stderr loop ─► StderrLine
//!   │          └─► state loop ──► (every poll_interval) exit? ─► Completed{exit_code}
//!   └─► Started{pid}
//!
//! every event ─► ObserverSet ─► [queue] ─► worker ─► observer.on_event()
//! ```
//!
//! ## Rules
//! - Blank lines are captured but never emitted or parsed.
//! - Parsers run on stdout lines only; an empty payload is ignored.
//! - Read errors become `Error` events and end that loop only.
//! - Captured output is bounded; the most recent bytes are kept.
//! - After [`stop`](ProcessMonitor::stop) or [`drain`](ProcessMonitor::drain)
//!   returns, every loop and every observer worker has finished or been aborted;
//!   no event is delivered afterwards.
//! - A monitor serves exactly one execution.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{MonitorError, panic_message};
use crate::events::MonitorEvent;
use crate::observers::{Observe, ObserverSet};
use crate::process::{ChildOutput, ExecutionId, ExitState, ParserRef, ProcessHandle};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_MAX_CAPTURED_BYTES: usize = 1024 * 1024;
const DEFAULT_OBSERVER_GRACE: Duration = Duration::from_secs(2);

/// Output collected by a monitor during one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    /// `true` if older output was discarded to respect the capture limit.
    pub truncated: bool,
}

/// Bounded text buffer keeping the most recent output.
#[derive(Debug)]
struct Capture {
    limit: usize,
    text: String,
    truncated: bool,
}

impl Capture {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            text: String::new(),
            truncated: false,
        }
    }

    fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        if self.text.len() > self.limit {
            let mut cut = self.text.len() - self.limit;
            while !self.text.is_char_boundary(cut) {
                cut += 1;
            }
            self.text.drain(..cut);
            self.truncated = true;
        }
    }
}

type SharedCapture = Arc<Mutex<Capture>>;

fn lock(capture: &SharedCapture) -> MutexGuard<'_, Capture> {
    capture.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn error_key(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout_monitor_error",
            Stream::Stderr => "stderr_monitor_error",
        }
    }
}

/// Live loops of an attached monitor.
struct Session {
    execution_id: ExecutionId,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    stdout: SharedCapture,
    stderr: SharedCapture,
}

enum Attachment {
    Idle,
    Attached(Session),
    Finished(ExecutionId),
}

/// Watches one execution and fans its events out to observers.
pub struct ProcessMonitor {
    observers: Arc<ObserverSet>,
    poll_interval: Duration,
    max_captured_bytes: usize,
    observer_grace: Duration,
    attachment: Mutex<Attachment>,
}

impl ProcessMonitor {
    /// Creates a monitor with the given observers.
    ///
    /// Must be called inside a tokio runtime (observer workers are spawned immediately).
    pub fn new(observers: impl IntoIterator<Item = Arc<dyn Observe>>) -> Self {
        Self {
            observers: Arc::new(ObserverSet::new(observers)),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_captured_bytes: DEFAULT_MAX_CAPTURED_BYTES,
            observer_grace: DEFAULT_OBSERVER_GRACE,
            attachment: Mutex::new(Attachment::Idle),
        }
    }

    /// Sets how often the state loop checks for process exit (at least 1ms).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Sets the per-stream capture limit in bytes.
    pub fn with_max_captured_bytes(mut self, bytes: usize) -> Self {
        self.max_captured_bytes = bytes;
        self
    }

    /// Sets how long observers may take to finish queued events when the monitor stops.
    ///
    /// Observer workers still busy after that are aborted.
    pub fn with_observer_grace(mut self, grace: Duration) -> Self {
        self.observer_grace = grace;
        self
    }

    /// Registers an observer; returns `false` once the monitor has stopped.
    pub fn add_observer(&self, observer: Arc<dyn Observe>) -> bool {
        self.observers.add(observer)
    }

    /// Unregisters observers by [`Observe::name`]; returns `true` if one was removed.
    pub fn remove_observer(&self, name: &str) -> bool {
        self.observers.remove(name)
    }

    /// Number of events dropped because an observer queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.observers.dropped_events()
    }

    /// Identifier of the execution this monitor is (or was) attached to.
    pub fn execution_id(&self) -> Option<ExecutionId> {
        match &*self.lock_attachment() {
            Attachment::Idle => None,
            Attachment::Attached(s) => Some(s.execution_id.clone()),
            Attachment::Finished(id) => Some(id.clone()),
        }
    }

    /// Starts monitoring `handle`: emits `Started` and spawns the three loops.
    pub fn attach(
        &self,
        execution_id: ExecutionId,
        handle: Arc<ProcessHandle>,
        output: ChildOutput,
        parsers: Vec<ParserRef>,
    ) -> Result<(), MonitorError> {
        let mut attachment = self.lock_attachment();
        match &*attachment {
            Attachment::Idle => {}
            Attachment::Attached(Session {
                execution_id: current,
                ..
            })
            | Attachment::Finished(current) => {
                return Err(MonitorError::AlreadyAttached {
                    execution_id: current.to_string(),
                });
            }
        }
        let stdout = output
            .stdout
            .ok_or(MonitorError::MissingStream { stream: "stdout" })?;
        let stderr = output
            .stderr
            .ok_or(MonitorError::MissingStream { stream: "stderr" })?;

        self.observers
            .emit(MonitorEvent::started(&execution_id, handle.pid()));

        let cancel = CancellationToken::new();
        let stdout_capture = Arc::new(Mutex::new(Capture::new(self.max_captured_bytes)));
        let stderr_capture = Arc::new(Mutex::new(Capture::new(self.max_captured_bytes)));
        let mut tasks = JoinSet::new();

        tasks.spawn(read_lines(
            LoopCtx::new(&execution_id, &cancel, &self.observers),
            stdout,
            Stream::Stdout,
            Arc::clone(&stdout_capture),
            parsers,
        ));
        tasks.spawn(read_lines(
            LoopCtx::new(&execution_id, &cancel, &self.observers),
            stderr,
            Stream::Stderr,
            Arc::clone(&stderr_capture),
            Vec::new(),
        ));
        tasks.spawn(watch_state(
            LoopCtx::new(&execution_id, &cancel, &self.observers),
            handle,
            self.poll_interval,
        ));

        debug!(execution_id = %execution_id, "monitor attached");
        *attachment = Attachment::Attached(Session {
            execution_id,
            cancel,
            tasks,
            stdout: stdout_capture,
            stderr: stderr_capture,
        });
        Ok(())
    }

    /// Lets the loops finish on their own for at most `within`, then stops.
    ///
    /// Returns the captured output.
    pub async fn drain(&self, within: Duration) -> CapturedOutput {
        let Some(mut session) = self.take_session() else {
            self.observers.shutdown(self.observer_grace).await;
            return CapturedOutput::default();
        };

        let drained = tokio::time::timeout(within, async {
            while session.tasks.join_next().await.is_some() {}
        })
        .await
        .is_ok();
        if !drained {
            debug!(execution_id = %session.execution_id, ?within, "drain window elapsed, cancelling loops");
        }

        self.finish(session).await
    }

    /// Cancels the loops immediately, waits for them and (bounded by the observer
    /// grace) for every observer worker.
    ///
    /// Returns the captured output.
    pub async fn stop(&self) -> CapturedOutput {
        match self.take_session() {
            Some(session) => self.finish(session).await,
            None => {
                self.observers.shutdown(self.observer_grace).await;
                CapturedOutput::default()
            }
        }
    }

    async fn finish(&self, mut session: Session) -> CapturedOutput {
        session.cancel.cancel();
        while session.tasks.join_next().await.is_some() {}
        self.observers.shutdown(self.observer_grace).await;
        trace!(execution_id = %session.execution_id, "monitor stopped");

        let stdout = lock(&session.stdout);
        let stderr = lock(&session.stderr);
        CapturedOutput {
            stdout: stdout.text.clone(),
            stderr: stderr.text.clone(),
            truncated: stdout.truncated || stderr.truncated,
        }
    }

    fn take_session(&self) -> Option<Session> {
        let mut attachment = self.lock_attachment();
        match std::mem::replace(&mut *attachment, Attachment::Idle) {
            Attachment::Attached(session) => {
                *attachment = Attachment::Finished(session.execution_id.clone());
                Some(session)
            }
            other => {
                *attachment = other;
                None
            }
        }
    }

    fn lock_attachment(&self) -> MutexGuard<'_, Attachment> {
        self.attachment.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// State shared by the three loops of one session.
struct LoopCtx {
    execution_id: ExecutionId,
    cancel: CancellationToken,
    observers: Arc<ObserverSet>,
}

impl LoopCtx {
    fn new(id: &ExecutionId, cancel: &CancellationToken, observers: &Arc<ObserverSet>) -> Self {
        Self {
            execution_id: id.clone(),
            cancel: cancel.clone(),
            observers: Arc::clone(observers),
        }
    }

    fn emit(&self, event: MonitorEvent) {
        self.observers.emit(event);
    }
}

async fn read_lines<R>(
    ctx: LoopCtx,
    reader: R,
    stream: Stream,
    capture: SharedCapture,
    parsers: Vec<ParserRef>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);

    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            r = reader.read_until(b'\n', &mut buf) => r,
        };

        match read {
            Ok(0) => break,
            Ok(_) => {
                let chunk = String::from_utf8_lossy(&buf);
                lock(&capture).push(&chunk);

                let line = chunk.trim();
                if line.is_empty() {
                    continue;
                }
                match stream {
                    Stream::Stdout => {
                        ctx.emit(MonitorEvent::stdout_line(&ctx.execution_id, line));
                        run_parsers(&ctx, &parsers, line);
                    }
                    Stream::Stderr => {
                        ctx.emit(MonitorEvent::stderr_line(&ctx.execution_id, line));
                    }
                }
            }
            Err(err) => {
                ctx.emit(MonitorEvent::error(
                    &ctx.execution_id,
                    stream.error_key(),
                    err.to_string(),
                ));
                break;
            }
        }
    }
}

fn run_parsers(ctx: &LoopCtx, parsers: &[ParserRef], line: &str) {
    for parser in parsers {
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| parser.parse(line)));
        match outcome {
            Ok(Ok(Some(data))) if !data.is_empty() => {
                ctx.emit(MonitorEvent::progress(&ctx.execution_id, parser.name(), data));
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                ctx.emit(MonitorEvent::error(
                    &ctx.execution_id,
                    "parser_error",
                    format!("{}: {err}", parser.name()),
                ));
            }
            Err(panic) => {
                ctx.emit(MonitorEvent::error(
                    &ctx.execution_id,
                    "parser_error",
                    format!("{} panicked: {}", parser.name(), panic_message(&*panic)),
                ));
            }
        }
    }
}

async fn watch_state(ctx: LoopCtx, handle: Arc<ProcessHandle>, poll_interval: Duration) {
    loop {
        match handle.exit_state() {
            ExitState::Running => {}
            ExitState::Exited(code) => {
                ctx.emit(MonitorEvent::completed(&ctx.execution_id, code));
                break;
            }
            ExitState::Lost(err) => {
                ctx.emit(MonitorEvent::error(
                    &ctx.execution_id,
                    "state_monitor_error",
                    err,
                ));
                break;
            }
        }

        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}
