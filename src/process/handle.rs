//! # Shared handle to a spawned child process.
//!
//! A [`ProcessHandle`] gives several tasks (the engine, the monitor's state
//! loop, the terminator) concurrent access to one child without sharing a
//! mutable `Child`:
//!
//! ```text
//!   ProcessHandle ──kill request──► owner task ──► Child::start_kill()
//!        ▲                              │
//!        └──────── watch<ExitState> ◄───┘ Child::wait()
//! ```
//!
//! - The owner task is the only code that touches the `Child`.
//! - The exit state is published once through a `watch` channel and never changes afterwards.
//! - Dropping the last handle kills the child (the owner sees its request channel close).

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace};

use crate::process::request::ProcessRequest;
use crate::process::terminator::Terminable;

type KillReply = oneshot::Sender<io::Result<()>>;

/// Observed lifecycle of the child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitState {
    /// Not observed to exit yet.
    Running,
    /// Exited; signal deaths are reported as the negated signal number.
    Exited(i32),
    /// Waiting on the child failed; the exit code is unknown.
    Lost(String),
}

/// Concurrent-safe handle to one running child.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    exit_rx: watch::Receiver<ExitState>,
    kill_tx: mpsc::Sender<KillReply>,
}

/// Piped output streams taken from a freshly spawned child.
#[derive(Debug)]
pub struct ChildOutput {
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

impl ProcessHandle {
    /// Spawns `request` with piped stdout/stderr and a null stdin.
    ///
    /// When the request carries an environment override, the inherited
    /// environment is cleared first.
    pub fn spawn(request: &ProcessRequest) -> io::Result<(Self, ChildOutput)> {
        let Some(program) = request.program() else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "command must not be empty",
            ));
        };

        let mut cmd = Command::new(program);
        cmd.args(&request.command[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &request.working_directory {
            cmd.current_dir(dir);
        }
        if let Some(env) = &request.environment {
            cmd.env_clear().envs(env);
        }

        let child = cmd.spawn()?;
        Ok(Self::adopt(child))
    }

    /// Takes ownership of an already spawned child.
    ///
    /// Must be called inside a tokio runtime.
    pub fn adopt(mut child: Child) -> (Self, ChildOutput) {
        let pid = child.id();
        let output = ChildOutput {
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
        };
        let (exit_tx, exit_rx) = watch::channel(ExitState::Running);
        let (kill_tx, kill_rx) = mpsc::channel(4);
        tokio::spawn(own_child(child, pid, exit_tx, kill_rx));

        (
            Self {
                pid,
                exit_rx,
                kill_tx,
            },
            output,
        )
    }

    /// OS process id, when the OS reported one at spawn time.
    #[inline]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns a snapshot of the exit state.
    pub fn exit_state(&self) -> ExitState {
        self.exit_rx.borrow().clone()
    }

    /// Returns the exit code once the child has exited.
    pub fn exit_code(&self) -> Option<i32> {
        match *self.exit_rx.borrow() {
            ExitState::Exited(code) => Some(code),
            _ => None,
        }
    }

    /// Waits until the child is no longer running.
    pub async fn wait(&self) -> ExitState {
        let mut rx = self.exit_rx.clone();
        match rx.wait_for(|s| *s != ExitState::Running).await {
            Ok(state) => (*state).clone(),
            Err(_) => ExitState::Lost("process owner task ended".into()),
        }
    }

    /// Asks the owner task to kill the child (SIGKILL / TerminateProcess).
    pub async fn kill(&self) -> io::Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.kill_tx.send(reply_tx).await.is_err() {
            return self.already_gone();
        }
        match reply_rx.await {
            Ok(res) => res,
            Err(_) => self.already_gone(),
        }
    }

    fn already_gone(&self) -> io::Result<()> {
        if self.exit_state() == ExitState::Running {
            Err(io::Error::other("process owner task ended"))
        } else {
            Ok(())
        }
    }
}

async fn own_child(
    mut child: Child,
    pid: Option<u32>,
    exit_tx: watch::Sender<ExitState>,
    mut kill_rx: mpsc::Receiver<KillReply>,
) {
    let status = loop {
        tokio::select! {
            res = child.wait() => break res,
            req = kill_rx.recv() => match req {
                Some(reply) => {
                    trace!(?pid, "kill requested");
                    let _ = reply.send(child.start_kill());
                }
                None => {
                    let _ = child.start_kill();
                    break child.wait().await;
                }
            },
        }
    };

    let state = match status {
        Ok(status) => ExitState::Exited(exit_code_of(status)),
        Err(err) => ExitState::Lost(err.to_string()),
    };
    debug!(?pid, ?state, "child exited");
    let _ = exit_tx.send(state);
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| -sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[async_trait]
impl Terminable for ProcessHandle {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn has_exited(&self) -> bool {
        self.exit_state() != ExitState::Running
    }

    #[cfg(unix)]
    fn send_graceful(&self) -> io::Result<()> {
        use nix::sys::signal::{Signal, kill};
        kill(raw_pid(self.pid)?, Signal::SIGTERM).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    fn send_graceful(&self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "no graceful stop signal on this platform",
        ))
    }

    async fn send_forceful(&self) -> io::Result<()> {
        self.kill().await
    }

    #[cfg(unix)]
    fn send_os_kill(&self) -> io::Result<()> {
        use nix::sys::signal::{Signal, kill};
        kill(raw_pid(self.pid)?, Signal::SIGKILL).map_err(io::Error::from)
    }

    #[cfg(windows)]
    fn send_os_kill(&self) -> io::Result<()> {
        let pid = self
            .pid
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "process has no pid"))?;
        let status = std::process::Command::new("taskkill")
            .args(["/F", "/T", "/PID", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("taskkill exited with {status}")))
        }
    }

    #[cfg(not(any(unix, windows)))]
    fn send_os_kill(&self) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    async fn wait_exit(&self, within: Duration) -> bool {
        tokio::time::timeout(within, self.wait()).await.is_ok()
    }
}

#[cfg(unix)]
fn raw_pid(pid: Option<u32>) -> io::Result<nix::unistd::Pid> {
    let pid = pid.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "process has no pid"))?;
    let raw = i32::try_from(pid).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    Ok(nix::unistd::Pid::from_raw(raw))
}
