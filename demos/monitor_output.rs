//! # Example: monitor_output
//!
//! Streams a child's output through a custom observer and a progress parser,
//! and stops every running process on Ctrl-C.
//!
//! Demonstrates how to:
//! - Implement [`Observe`] for a custom sink.
//! - Turn `progress=NN` lines into `Progress` events with a [`ParserFn`].
//! - Attach observers to a caller-owned [`ProcessMonitor`].
//! - Race an execution against [`SupervisionEngine::terminate_all_on_signal`].
//!
//! ## Run
//! ```bash
//! cargo run --example monitor_output
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use procvisor::{
    EngineConfig, MonitorEvent, MonitorEventKind, Observe, ParseError, ParserFn, ParserRef,
    Payload, ProcessMonitor, ProcessRequest, SupervisionEngine,
};

/// Prints a textual progress bar for `Progress` events.
struct ProgressBar;

#[async_trait]
impl Observe for ProgressBar {
    async fn on_event(&self, ev: &MonitorEvent) {
        match ev.kind {
            MonitorEventKind::Started => println!("[{}] started pid={:?}", ev.execution_id, ev.pid()),
            MonitorEventKind::Progress => {
                let pct = ev.data.get("percent").and_then(|v| v.as_u64()).unwrap_or(0);
                let filled = usize::try_from(pct / 5).unwrap_or(20).min(20);
                println!("[{}] [{:<20}] {pct}%", ev.execution_id, "#".repeat(filled));
            }
            MonitorEventKind::StderrLine => {
                eprintln!("[{}] stderr: {}", ev.execution_id, ev.line().unwrap_or_default())
            }
            MonitorEventKind::Completed => {
                println!("[{}] completed exit={:?}", ev.execution_id, ev.exit_code())
            }
            MonitorEventKind::Error => eprintln!("[{}] monitor error: {:?}", ev.execution_id, ev.data),
            MonitorEventKind::StdoutLine => {}
        }
    }

    fn name(&self) -> &str {
        "progress-bar"
    }
}

fn percent_parser() -> ParserRef {
    ParserFn::arc("percent", |line: &str| {
        let Some(raw) = line.strip_prefix("progress=") else {
            return Ok(None);
        };
        let pct: u64 = raw
            .trim()
            .parse()
            .map_err(|e| ParseError::new(format!("bad progress {raw:?}: {e}")))?;
        let mut data = Payload::new();
        data.insert("percent".into(), pct.into());
        Ok(Some(data))
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("warn").init();

    let engine = SupervisionEngine::new(EngineConfig {
        poll_interval: Duration::from_millis(100),
        ..EngineConfig::default()
    });

    let monitor = ProcessMonitor::new([Arc::new(ProgressBar) as Arc<dyn Observe>])
        .with_poll_interval(Duration::from_millis(100));

    let request = ProcessRequest::new([
        "sh",
        "-c",
        "for p in 0 20 40 60 80 100; do echo progress=$p; sleep 0.3; done; \
         echo progress=oops; echo 'done' >&2",
    ])
    .with_timeout(Duration::from_secs(30));

    tokio::select! {
        res = engine.execute_monitored(&request, &monitor, vec![percent_parser()]) => {
            println!("state={:?} exit={:?} took={:?}", res.state, res.exit_code, res.duration());
        }
        stopped = engine.terminate_all_on_signal() => {
            let (signal, count) = stopped?;
            println!("received {signal:?}, stopped {count} process(es)");
        }
    }

    println!("dropped events: {}", monitor.dropped_events());
    Ok(())
}
