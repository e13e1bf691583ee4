//! # SupervisionEngine: bounded, monitored execution of external processes.
//!
//! One call to [`execute`](SupervisionEngine::execute) runs one child to
//! completion and always returns a [`ProcessResult`]:
//!
//! ```text
//! execute(request)
//!   ├─► id = ExecutionId::generate()
//!   ├─► semaphore.acquire_owned()          (suspends while max_concurrent are running)
//!   ├─► ProcessHandle::spawn(request) ─────► Err → Failed{exception}
//!   ├─► registry.insert(id, handle)
//!   ├─► monitor.attach(...)                (Started, stdout/stderr/state loops)
//!   ├─► timeout(request.timeout, handle.wait())
//!   │       └─► elapsed → ProcessTerminator (TERM → KILL → OS kill) → Terminated
//!   ├─► monitor.drain(drain_timeout)       (loops awaited, stuck observers aborted)
//!   ├─► registry.remove(id)
//!   └─► permit released, stats updated
//! ```
//!
//! ## Rules
//! - The permit is held for the whole execution and acquired exactly once.
//! - Registry guards are never held while waiting on the child or terminating it.
//! - [`terminate`](SupervisionEngine::terminate) marks a still-running execution
//!   so its result is reported as `Terminated`, whatever exit status the stop
//!   produced. An execution whose child already exited keeps its own outcome.
//!
//! ## Example
//! ```rust,no_run
//! use std::time::Duration;
//! use procvisor::{EngineConfig, ProcessRequest, SupervisionEngine};
//!
//! # async fn demo() {
//! let engine = SupervisionEngine::new(EngineConfig::default());
//! let req = ProcessRequest::new(["sleep", "5"]).with_timeout(Duration::from_secs(1));
//!
//! let res = engine.execute(&req, Vec::new(), Vec::new()).await;
//! assert_eq!(res.state, procvisor::ProcessState::Terminated);
//! # }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::core::config::EngineConfig;
use crate::core::monitor::{CapturedOutput, ProcessMonitor};
use crate::core::registry::Registry;
use crate::core::shutdown::{ShutdownSignal, wait_for_shutdown_signal};
use crate::core::stats::{EngineStats, StatsCounters};
use crate::observers::Observe;
use crate::process::{
    ExecutionId, ExitState, ParserRef, ProcessHandle, ProcessRequest, ProcessResult, ProcessState,
    ProcessTerminator, TerminationState,
};

/// How waiting for the child ended.
enum Waited {
    Exited(ExitState),
    TimedOut {
        limit: Duration,
        stop: TerminationState,
    },
}

/// Supervises external processes behind one admission gate.
pub struct SupervisionEngine {
    cfg: EngineConfig,
    semaphore: Arc<Semaphore>,
    registry: Registry,
    counters: StatsCounters,
}

impl SupervisionEngine {
    /// Creates an engine; the admission gate gets `cfg.concurrency_limit()` permits.
    pub fn new(cfg: EngineConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(cfg.concurrency_limit())),
            cfg,
            registry: Registry::default(),
            counters: StatsCounters::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Runs `request` under a fresh monitor fed to `observers`.
    ///
    /// Never fails: spawn and wait errors are reported as `Failed` results.
    pub async fn execute(
        &self,
        request: &ProcessRequest,
        observers: Vec<Arc<dyn Observe>>,
        parsers: Vec<ParserRef>,
    ) -> ProcessResult {
        let monitor = ProcessMonitor::new(observers)
            .with_poll_interval(self.cfg.poll_interval_clamped())
            .with_max_captured_bytes(self.cfg.max_captured_bytes)
            .with_observer_grace(self.cfg.drain_timeout);
        self.execute_monitored(request, &monitor, parsers).await
    }

    /// Runs `request` under a caller-provided monitor.
    ///
    /// The monitor is consumed by this execution: it is stopped before returning,
    /// and attaching it a second time yields a `Failed` result.
    pub async fn execute_monitored(
        &self,
        request: &ProcessRequest,
        monitor: &ProcessMonitor,
        parsers: Vec<ParserRef>,
    ) -> ProcessResult {
        let execution_id = ExecutionId::generate();
        let started_at = SystemTime::now();
        self.counters.requested();

        let mut metadata = BTreeMap::new();
        metadata.insert("command".to_string(), request.command_line());
        if let Some(dir) = &request.working_directory {
            metadata.insert("working_directory".to_string(), dir.display().to_string());
        }

        let _permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(err) => {
                monitor.stop().await;
                return self.failed(execution_id, started_at, metadata, err.to_string());
            }
        };

        let (handle, output) = match ProcessHandle::spawn(request) {
            Ok(spawned) => spawned,
            Err(err) => {
                warn!(execution_id = %execution_id, command = %request.command_line(), error = %err, "spawn failed");
                monitor.stop().await;
                return self.failed(execution_id, started_at, metadata, err.to_string());
            }
        };
        let handle = Arc::new(handle);
        if let Some(pid) = handle.pid() {
            metadata.insert("pid".to_string(), pid.to_string());
        }
        info!(execution_id = %execution_id, pid = ?handle.pid(), command = %request.command_line(), "process spawned");

        let entry = self
            .registry
            .insert(execution_id.clone(), Arc::clone(&handle))
            .await;
        self.counters.started();

        if let Err(err) = monitor.attach(execution_id.clone(), Arc::clone(&handle), output, parsers) {
            warn!(execution_id = %execution_id, error = %err, "monitor attach failed, killing child");
            ProcessTerminator::terminate_gracefully(&*handle, Duration::ZERO, self.cfg.kill_wait).await;
            self.deregister(&execution_id).await;
            return self.failed(execution_id, started_at, metadata, err.to_string());
        }

        let waited = match request.effective_timeout() {
            Some(limit) => match tokio::time::timeout(limit, handle.wait()).await {
                Ok(state) => Waited::Exited(state),
                Err(_) => {
                    warn!(execution_id = %execution_id, ?limit, "timeout hit, terminating");
                    let stop =
                        ProcessTerminator::escalate(&*handle, self.cfg.grace, self.cfg.kill_wait)
                            .await;
                    Waited::TimedOut { limit, stop }
                }
            },
            None => Waited::Exited(handle.wait().await),
        };
        let stopped_on_request = entry.is_terminated();

        let captured = monitor.drain(self.cfg.drain_timeout).await;
        self.deregister(&execution_id).await;
        if captured.truncated {
            metadata.insert("output_truncated".to_string(), "true".to_string());
        }

        let CapturedOutput { stdout, stderr, .. } = captured;
        let (state, exit_code, stderr) = match waited {
            Waited::TimedOut { limit, stop } => {
                metadata.insert("timeout_ms".to_string(), limit.as_millis().to_string());
                metadata.insert("termination".to_string(), termination_status(&handle, stop));
                (ProcessState::Terminated, None, stderr)
            }
            Waited::Exited(ExitState::Exited(code)) if stopped_on_request => {
                metadata.insert("termination".to_string(), format!("exited({code})"));
                (ProcessState::Terminated, None, stderr)
            }
            Waited::Exited(ExitState::Exited(0)) => (ProcessState::Completed, Some(0), stderr),
            Waited::Exited(ExitState::Exited(code)) => (ProcessState::Failed, Some(code), stderr),
            Waited::Exited(other) => {
                let err = match other {
                    ExitState::Lost(err) => err,
                    _ => "exit status unavailable".to_string(),
                };
                warn!(execution_id = %execution_id, error = %err, "wait failed");
                metadata.insert("exception".to_string(), err.clone());
                (ProcessState::Failed, None, append_line(stderr, &err))
            }
        };

        let result = ProcessResult {
            execution_id,
            state,
            exit_code,
            stdout,
            stderr,
            started_at,
            ended_at: SystemTime::now(),
            metadata,
        };
        self.record(&result);
        result
    }

    /// Terminates a running execution by id; `false` if it is unknown or could not be stopped.
    pub async fn terminate(&self, execution_id: &ExecutionId) -> bool {
        let Some(entry) = self.registry.get(execution_id).await else {
            debug!(execution_id = %execution_id, "terminate: unknown execution");
            return false;
        };
        if entry.handle.exit_state() != ExitState::Running {
            debug!(execution_id = %execution_id, "terminate: child already exited");
            return true;
        }
        entry.mark_terminated();
        info!(execution_id = %execution_id, pid = ?entry.handle.pid(), "terminate requested");
        ProcessTerminator::terminate_gracefully(&*entry.handle, self.cfg.grace, self.cfg.kill_wait)
            .await
    }

    /// Terminates every running execution concurrently; returns how many stopped.
    pub async fn terminate_all(&self) -> usize {
        let entries = self.registry.snapshot().await;
        if entries.is_empty() {
            return 0;
        }
        info!(count = entries.len(), "terminating all active executions");

        let grace = self.cfg.grace;
        let kill_wait = self.cfg.kill_wait;
        let stops = entries.iter().map(|(_, entry)| {
            if entry.handle.exit_state() == ExitState::Running {
                entry.mark_terminated();
            }
            ProcessTerminator::terminate_gracefully(&*entry.handle, grace, kill_wait)
        });
        join_all(stops).await.into_iter().filter(|ok| *ok).count()
    }

    /// Waits for an OS shutdown signal, then terminates every active execution.
    ///
    /// Returns the signal and how many executions were stopped.
    pub async fn terminate_all_on_signal(&self) -> io::Result<(ShutdownSignal, usize)> {
        let signal = wait_for_shutdown_signal().await?;
        info!(?signal, "shutdown signal received");
        Ok((signal, self.terminate_all().await))
    }

    /// Returns the identifiers of the executions currently running.
    pub async fn list_active(&self) -> HashSet<ExecutionId> {
        self.registry.ids().await
    }

    /// Returns a snapshot of the execution counters.
    pub fn stats(&self) -> EngineStats {
        self.counters.snapshot()
    }

    async fn deregister(&self, execution_id: &ExecutionId) {
        if self.registry.remove(execution_id).await {
            self.counters.stopped();
        }
    }

    fn failed(
        &self,
        execution_id: ExecutionId,
        started_at: SystemTime,
        mut metadata: BTreeMap<String, String>,
        error: String,
    ) -> ProcessResult {
        metadata.insert("exception".to_string(), error.clone());
        let result = ProcessResult {
            execution_id,
            state: ProcessState::Failed,
            exit_code: None,
            stdout: String::new(),
            stderr: error,
            started_at,
            ended_at: SystemTime::now(),
            metadata,
        };
        self.record(&result);
        result
    }

    fn record(&self, result: &ProcessResult) {
        self.counters.finished(result.state);
        debug!(
            execution_id = %result.execution_id,
            state = result.state.as_label(),
            exit_code = ?result.exit_code,
            duration = ?result.duration(),
            "execution finished"
        );
    }
}

/// Raw status observed after a timeout-driven stop, kept in `metadata.termination`.
fn termination_status(handle: &ProcessHandle, stop: TerminationState) -> String {
    match handle.exit_state() {
        ExitState::Exited(code) => format!("exited({code})"),
        _ => match stop {
            TerminationState::OsKillSent => "os_kill_sent".to_string(),
            TerminationState::KillSent => "kill_sent".to_string(),
            TerminationState::TermSent => "term_sent".to_string(),
            TerminationState::Running => "signal_failed".to_string(),
            TerminationState::Exited => "exited".to_string(),
        },
    }
}

fn append_line(mut text: String, line: &str) -> String {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(line);
    text
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::OperationError;
    use crate::events::{MonitorEvent, MonitorEventKind};
    use crate::observers::ObserverFn;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Instant;

    struct Stuck;

    #[async_trait]
    impl Observe for Stuck {
        async fn on_event(&self, _event: &MonitorEvent) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }

    fn test_config(max_concurrent: usize) -> EngineConfig {
        EngineConfig {
            max_concurrent,
            grace: Duration::from_millis(500),
            kill_wait: Duration::from_millis(500),
            poll_interval: Duration::from_millis(20),
            drain_timeout: Duration::from_millis(300),
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_true_completes_with_zero() {
        let engine = SupervisionEngine::new(test_config(5));
        let res = engine
            .execute(&ProcessRequest::new(["true"]), Vec::new(), Vec::new())
            .await;

        assert_eq!(res.state, ProcessState::Completed);
        assert_eq!(res.exit_code, Some(0));
        assert!(res.is_success());
        assert_eq!(res.metadata.get("command").map(String::as_str), Some("true"));
        assert!(res.metadata.contains_key("pid"));
        assert!(engine.list_active().await.is_empty());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failed() {
        let engine = SupervisionEngine::new(test_config(5));
        let req = ProcessRequest::new(["sh", "-c", "echo out; echo 'disk full' >&2; exit 4"]);
        let res = engine.execute(&req, Vec::new(), Vec::new()).await;

        assert_eq!(res.state, ProcessState::Failed);
        assert_eq!(res.exit_code, Some(4));
        assert_eq!(res.stdout, "out\n");
        assert_eq!(
            res.into_result().unwrap_err(),
            OperationError::Process {
                exit_code: Some(4),
                error: "disk full".into()
            }
        );
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported_not_raised() {
        let engine = SupervisionEngine::new(test_config(5));

        let res = engine
            .execute(&ProcessRequest::new(["/no/such/binary"]), Vec::new(), Vec::new())
            .await;
        assert_eq!(res.state, ProcessState::Failed);
        assert_eq!(res.exit_code, None);
        assert!(res.metadata.contains_key("exception"));
        assert!(!res.stderr.is_empty());

        let empty = engine
            .execute(&ProcessRequest::default(), Vec::new(), Vec::new())
            .await;
        assert_eq!(empty.state, ProcessState::Failed);

        let stats = engine.stats();
        assert_eq!(stats.total_executions, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.active, 0);
    }

    #[tokio::test]
    async fn test_timeout_terminates_quickly() {
        let engine = SupervisionEngine::new(test_config(5));
        let req = ProcessRequest::new(["sleep", "5"]).with_timeout(Duration::from_secs(1));

        let started = Instant::now();
        let res = engine.execute(&req, Vec::new(), Vec::new()).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(res.state, ProcessState::Terminated);
        assert_eq!(res.exit_code, None);
        assert_eq!(res.metadata.get("timeout_ms").map(String::as_str), Some("1000"));
        assert!(res.metadata.contains_key("termination"));
        assert_eq!(
            res.into_result().unwrap_err(),
            OperationError::Timeout {
                timeout: Duration::from_secs(1)
            }
        );
    }

    #[tokio::test]
    async fn test_admission_gate_serializes_excess_jobs() {
        let engine = Arc::new(SupervisionEngine::new(test_config(2)));
        let started = Instant::now();

        let mut jobs = Vec::new();
        for _ in 0..6 {
            let engine = Arc::clone(&engine);
            jobs.push(tokio::spawn(async move {
                let req = ProcessRequest::new(["sh", "-c", "sleep 0.2"]);
                engine.execute(&req, Vec::new(), Vec::new()).await
            }));
        }

        for job in jobs {
            assert!(job.await.unwrap().is_success());
        }
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(550), "elapsed {elapsed:?}");
        assert_eq!(engine.stats().successful, 6);
        assert_eq!(engine.stats().active, 0);
    }

    #[tokio::test]
    async fn test_sampled_active_never_exceeds_limit() {
        let engine = Arc::new(SupervisionEngine::new(test_config(2)));

        let mut jobs = Vec::new();
        for _ in 0..6 {
            let engine = Arc::clone(&engine);
            jobs.push(tokio::spawn(async move {
                let req = ProcessRequest::new(["sleep", "0.2"]);
                engine.execute(&req, Vec::new(), Vec::new()).await
            }));
        }

        let mut peak = 0;
        while !jobs.iter().all(|j| j.is_finished()) {
            peak = peak.max(engine.list_active().await.len());
            peak = peak.max(engine.stats().active);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(peak >= 1);
        assert!(peak <= 2, "peak {peak}");
    }

    #[tokio::test]
    async fn test_terminate_by_id() {
        let engine = Arc::new(SupervisionEngine::new(test_config(5)));
        assert!(!engine.terminate(&ExecutionId::from("proc_unknown")).await);

        let runner = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let req = ProcessRequest::new(["sleep", "30"]);
                engine.execute(&req, Vec::new(), Vec::new()).await
            })
        };

        let id = loop {
            if let Some(id) = engine.list_active().await.into_iter().next() {
                break id;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        assert!(engine.terminate(&id).await);

        let res = runner.await.unwrap();
        assert_eq!(res.execution_id, id);
        assert_eq!(res.state, ProcessState::Terminated);
        assert_eq!(res.exit_code, None);
        assert_eq!(
            res.metadata.get("termination").map(String::as_str),
            Some("exited(-15)")
        );
        assert_eq!(res.into_result().unwrap_err(), OperationError::Interrupted);
    }

    #[tokio::test]
    async fn test_terminate_all() {
        let engine = Arc::new(SupervisionEngine::new(test_config(5)));
        let mut runners = Vec::new();
        for _ in 0..3 {
            let engine = Arc::clone(&engine);
            runners.push(tokio::spawn(async move {
                engine
                    .execute(&ProcessRequest::new(["sleep", "30"]), Vec::new(), Vec::new())
                    .await
            }));
        }
        while engine.list_active().await.len() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(engine.terminate_all().await, 3);
        for r in runners {
            assert_eq!(r.await.unwrap().state, ProcessState::Terminated);
        }
        assert_eq!(engine.terminate_all().await, 0);
        assert_eq!(engine.stats().terminated, 3);
    }

    #[tokio::test]
    async fn test_observers_see_lifecycle_and_working_directory() {
        let engine = SupervisionEngine::new(test_config(5));
        let seen: Arc<Mutex<Vec<MonitorEventKind>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let obs: Arc<dyn Observe> = ObserverFn::arc("kinds", move |ev: &MonitorEvent| {
            sink.lock().unwrap().push(ev.kind);
        });

        let req = ProcessRequest::new(["pwd"]).with_working_directory("/");
        let res = engine.execute(&req, vec![obs], Vec::new()).await;

        assert_eq!(res.stdout, "/\n");
        assert_eq!(res.metadata.get("working_directory").map(String::as_str), Some("/"));
        let kinds = seen.lock().unwrap().clone();
        assert_eq!(kinds.first(), Some(&MonitorEventKind::Started));
        assert!(kinds.contains(&MonitorEventKind::StdoutLine));
        assert!(kinds.contains(&MonitorEventKind::Completed));
    }

    #[tokio::test]
    async fn test_grandchild_holding_pipes_is_bounded_by_drain() {
        let engine = SupervisionEngine::new(test_config(5));
        let req = ProcessRequest::new(["sh", "-c", "sleep 3 & echo hi"]);

        let started = Instant::now();
        let res = engine.execute(&req, Vec::new(), Vec::new()).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(res.is_success());
        assert_eq!(res.stdout, "hi\n");
    }

    #[tokio::test]
    async fn test_reused_monitor_fails_second_execution() {
        let engine = SupervisionEngine::new(test_config(5));
        let monitor = ProcessMonitor::new(Vec::<Arc<dyn Observe>>::new())
            .with_poll_interval(Duration::from_millis(10));

        let first = engine
            .execute_monitored(&ProcessRequest::new(["true"]), &monitor, Vec::new())
            .await;
        assert!(first.is_success());

        let second = engine
            .execute_monitored(&ProcessRequest::new(["true"]), &monitor, Vec::new())
            .await;
        assert_eq!(second.state, ProcessState::Failed);
        assert!(second.stderr.contains("already attached"));
        assert!(engine.list_active().await.is_empty());
    }

    #[tokio::test]
    async fn test_stuck_observer_does_not_hold_the_slot() {
        let engine = SupervisionEngine::new(test_config(1));
        let stuck: Arc<dyn Observe> = Arc::new(Stuck);

        let first = tokio::time::timeout(
            Duration::from_secs(5),
            engine.execute(&ProcessRequest::new(["true"]), vec![stuck], Vec::new()),
        )
        .await
        .expect("execute must not wait on a stuck observer");
        assert!(first.is_success());
        assert_eq!(engine.stats().active, 0);

        let second = tokio::time::timeout(
            Duration::from_secs(5),
            engine.execute(&ProcessRequest::new(["true"]), Vec::new(), Vec::new()),
        )
        .await
        .expect("slot released");
        assert!(second.is_success());
    }

    #[tokio::test]
    async fn test_terminate_after_clean_exit_keeps_completed() {
        let engine = Arc::new(SupervisionEngine::new(EngineConfig {
            drain_timeout: Duration::from_secs(2),
            ..test_config(5)
        }));

        let runner = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                // The background sleep keeps the pipes open, so the drain window stays open.
                let req = ProcessRequest::new(["sh", "-c", "sleep 3 & exit 0"]);
                engine.execute(&req, Vec::new(), Vec::new()).await
            })
        };

        let id = loop {
            if let Some(id) = engine.list_active().await.into_iter().next() {
                break id;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(engine.terminate(&id).await);

        let res = runner.await.unwrap();
        assert_eq!(res.state, ProcessState::Completed);
        assert_eq!(res.exit_code, Some(0));
        assert!(!res.metadata.contains_key("termination"));
        assert!(res.into_result().is_ok());
    }
}
