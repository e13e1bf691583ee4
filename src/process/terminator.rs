//! # Staged process termination.
//!
//! [`ProcessTerminator`] escalates through increasingly forceful stop requests
//! until the target exits:
//!
//! ```text
//! Running ──(already exited)──────────────────────────────► Exited
//!    │
//!    ├─► send_graceful (SIGTERM) ─► TermSent ─ wait(grace) ─► Exited
//!    │                                  │
//!    ├─► send_forceful (SIGKILL) ─► KillSent ─ wait(kill) ──► Exited
//!    │                                  │
//!    └─► send_os_kill (kill(2) / taskkill) ─► OsKillSent      (no re-wait)
//! ```
//!
//! ## Rules
//! - A failing stage is logged and the escalation falls through to the next stage.
//! - Only the OS-level stage decides the overall result when reached:
//!   `true` if the primitive could be issued, `false` otherwise.
//! - [`Terminable`] is the seam between the state machine and a real process;
//!   [`ProcessHandle`](crate::ProcessHandle) implements it.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Default wait after the graceful stop signal.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);
/// Default wait after the forceful stop signal.
pub const DEFAULT_KILL_WAIT: Duration = Duration::from_secs(3);

/// Something that can be asked to stop, with escalating force.
#[async_trait]
pub trait Terminable: Send + Sync {
    /// OS process id, if known (used in logs only).
    fn pid(&self) -> Option<u32> {
        None
    }

    /// `true` once the target was observed to exit.
    fn has_exited(&self) -> bool;

    /// Sends the cooperative "please stop" request.
    fn send_graceful(&self) -> io::Result<()>;

    /// Sends the forceful "stop now" request.
    async fn send_forceful(&self) -> io::Result<()>;

    /// Issues the platform's last-resort kill primitive.
    fn send_os_kill(&self) -> io::Result<()>;

    /// Waits up to `within` for the target to exit; `true` if it did.
    async fn wait_exit(&self, within: Duration) -> bool;
}

/// Escalation state of one termination run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationState {
    Running,
    TermSent,
    KillSent,
    OsKillSent,
    Exited,
}

impl TerminationState {
    /// `true` for the states that count as a successful termination.
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, TerminationState::Exited | TerminationState::OsKillSent)
    }
}

/// Stateless staged-termination procedure.
pub struct ProcessTerminator;

impl ProcessTerminator {
    /// Terminates `target`, escalating as needed. See the module docs.
    pub async fn terminate_gracefully(
        target: &dyn Terminable,
        grace: Duration,
        kill_wait: Duration,
    ) -> bool {
        Self::escalate(target, grace, kill_wait).await.is_success()
    }

    /// Runs the escalation and returns the state it ended in.
    pub async fn escalate(
        target: &dyn Terminable,
        grace: Duration,
        kill_wait: Duration,
    ) -> TerminationState {
        if target.has_exited() {
            return TerminationState::Exited;
        }
        let pid = target.pid();
        let mut state = TerminationState::Running;

        match target.send_graceful() {
            Ok(()) => {
                state = TerminationState::TermSent;
                debug!(?pid, ?grace, "graceful stop sent");
                if target.wait_exit(grace).await {
                    return TerminationState::Exited;
                }
            }
            Err(err) => {
                warn!(?pid, error = %err, "graceful stop failed");
                if target.has_exited() {
                    return TerminationState::Exited;
                }
            }
        }

        match target.send_forceful().await {
            Ok(()) => {
                state = TerminationState::KillSent;
                debug!(?pid, ?kill_wait, "forceful stop sent");
                if target.wait_exit(kill_wait).await {
                    return TerminationState::Exited;
                }
            }
            Err(err) => {
                warn!(?pid, error = %err, "forceful stop failed");
                if target.has_exited() {
                    return TerminationState::Exited;
                }
            }
        }

        match target.send_os_kill() {
            Ok(()) => {
                debug!(?pid, "os-level kill issued");
                TerminationState::OsKillSent
            }
            Err(err) => {
                warn!(?pid, error = %err, ?state, "os-level kill failed");
                state
            }
        }
    }
}
