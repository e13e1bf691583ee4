//! # LogWriter: monitor events rendered through `tracing`.
//!
//! A minimal observer that forwards every [`MonitorEvent`] to the `tracing`
//! pipeline under the `procvisor::monitor` target. Output lines go to `DEBUG`,
//! lifecycle and progress to `INFO`, failures to `WARN`.
//!
//! ## Example output (with `tracing_subscriber::fmt`)
//! ```text
//! INFO procvisor::monitor: [started] execution_id=proc_1718 pid=4242
//! DEBUG procvisor::monitor: [stdout] execution_id=proc_1718 line="frame=  42"
//! INFO procvisor::monitor: [progress] execution_id=proc_1718 data={"frame":42,"parser":"ffmpeg"}
//! INFO procvisor::monitor: [completed] execution_id=proc_1718 exit_code=0
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{MonitorEvent, MonitorEventKind};
use crate::observers::Observe;

/// Event writer observer.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Observe for LogWriter {
    async fn on_event(&self, e: &MonitorEvent) {
        let id = e.execution_id.as_str();
        match e.kind {
            MonitorEventKind::Started => {
                info!(target: "procvisor::monitor", execution_id = id, pid = ?e.pid(), "[started]");
            }
            MonitorEventKind::StdoutLine => {
                debug!(target: "procvisor::monitor", execution_id = id, line = ?e.line().unwrap_or_default(), "[stdout]");
            }
            MonitorEventKind::StderrLine => {
                debug!(target: "procvisor::monitor", execution_id = id, line = ?e.line().unwrap_or_default(), "[stderr]");
            }
            MonitorEventKind::Progress => {
                info!(target: "procvisor::monitor", execution_id = id, data = %serde_json::Value::Object(e.data.clone()), "[progress]");
            }
            MonitorEventKind::Completed => {
                info!(target: "procvisor::monitor", execution_id = id, exit_code = ?e.exit_code(), "[completed]");
            }
            MonitorEventKind::Error => {
                warn!(target: "procvisor::monitor", execution_id = id, data = %serde_json::Value::Object(e.data.clone()), "[error]");
            }
        }
    }

    fn name(&self) -> &str {
        "LogWriter"
    }
}
