//! # Execution results.
//!
//! [`ProcessResult`] is created exactly once per execution attempt by the
//! [`SupervisionEngine`](crate::SupervisionEngine) and is immutable afterwards.
//!
//! ## State rules
//! ```text
//! exit 0                          → Completed  exit_code = Some(0)
//! exit != 0 (signal → -signal)    → Failed     exit_code = Some(code)
//! spawn / wait failure            → Failed     exit_code = None, metadata.exception
//! timeout or engine.terminate()   → Terminated exit_code = None, metadata.termination
//! ```

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use crate::error::OperationError;
use crate::process::ExecutionId;

/// Terminal state of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    /// The process exited with code 0.
    Completed,
    /// The process exited unsuccessfully or could not be run.
    Failed,
    /// The engine forcibly terminated the process (timeout or explicit request).
    Terminated,
}

impl ProcessState {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessState::Completed => "completed",
            ProcessState::Failed => "failed",
            ProcessState::Terminated => "terminated",
        }
    }
}

/// Outcome of one supervised execution.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// Identifier of the execution.
    pub execution_id: ExecutionId,
    /// Terminal state.
    pub state: ProcessState,
    /// Exit code (see the module docs for when it is present).
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error (or the failure text for spawn/wait failures).
    pub stderr: String,
    /// When the execution was requested.
    pub started_at: SystemTime,
    /// When the result was materialized.
    pub ended_at: SystemTime,
    /// Free-form metadata (`command`, `working_directory`, `pid`, `exception`, `termination`).
    pub metadata: BTreeMap<String, String>,
}

impl ProcessResult {
    /// `true` when the process completed with exit code 0.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.state == ProcessState::Completed && self.exit_code == Some(0)
    }

    /// Wall-clock duration of the execution.
    pub fn duration(&self) -> Duration {
        self.ended_at
            .duration_since(self.started_at)
            .unwrap_or(Duration::ZERO)
    }

    /// Converts the result into `Ok(self)` on success, otherwise an [`OperationError`].
    ///
    /// Lets a retry closure use `?`-style control flow around
    /// [`SupervisionEngine::execute`](crate::SupervisionEngine::execute):
    /// - `Terminated` → [`OperationError::Timeout`] when the request had a timeout,
    ///   otherwise [`OperationError::Interrupted`]
    /// - `Failed` → [`OperationError::Process`] carrying the last stderr line
    pub fn into_result(self) -> Result<ProcessResult, OperationError> {
        match self.state {
            ProcessState::Completed if self.exit_code == Some(0) => Ok(self),
            ProcessState::Terminated => match self.metadata.get("timeout_ms") {
                Some(ms) => Err(OperationError::Timeout {
                    timeout: Duration::from_millis(ms.parse().unwrap_or(0)),
                }),
                None => Err(OperationError::Interrupted),
            },
            _ => Err(OperationError::Process {
                exit_code: self.exit_code,
                error: self.failure_summary(),
            }),
        }
    }

    fn failure_summary(&self) -> String {
        if let Some(exc) = self.metadata.get("exception") {
            return exc.clone();
        }
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("exit code {:?}", self.exit_code))
    }
}
