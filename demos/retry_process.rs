//! # Example: retry_process
//!
//! Runs a flaky shell command under the supervision engine and retries it
//! with jittered exponential backoff until it succeeds.
//!
//! Demonstrates how to:
//! - Build a [`RetryConfiguration`] from a preset and tweak it.
//! - Turn a [`ProcessResult`](procvisor::ProcessResult) into a `Result` for the retry loop.
//! - Restrict retries to transient failures with a keyword [`checkers`] predicate.
//! - Abort the retry session on Ctrl-C through a [`CancellationToken`].
//!
//! ## Flow
//! ```text
//! RetryExecutor::execute_with_retry()
//!     ├─► attempt 1 ─► SupervisionEngine::execute() ─► exit 1 ("temporarily unavailable")
//!     ├─► checker: transient? yes ─► sleep(backoff)
//!     ├─► attempt 2 ─► ... exit 1
//!     └─► attempt 3 ─► exit 0 ─► Success
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example retry_process
//! ```

use std::sync::Arc;
use std::time::Duration;

use procvisor::{
    EngineConfig, LogWriter, Observe, ProcessRequest, RetryConfiguration, RetryExecutor,
    RetryPreset, SupervisionEngine, abort_on_cancel, checkers,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 1. Engine with default limits
    let engine = SupervisionEngine::new(EngineConfig::default());

    // 2. A command that fails twice, then succeeds (state kept in a temp file)
    let marker = std::env::temp_dir().join(format!("procvisor-demo-{}", std::process::id()));
    let script = format!(
        r#"n=$(cat "{m}" 2>/dev/null || echo 0); n=$((n+1)); echo $n > "{m}";
           echo "attempt $n";
           if [ $n -lt 3 ]; then echo "service temporarily unavailable" >&2; exit 1; fi
           echo "recorded 42 frames""#,
        m = marker.display()
    );
    let request = ProcessRequest::new(["sh", "-c", script.as_str()])
        .with_timeout(Duration::from_secs(10));

    // 3. Network preset, shortened for the demo
    let cfg = RetryConfiguration::preset(RetryPreset::NetworkOperation)
        .to_builder()
        .with_base_delay(Duration::from_millis(200))
        .with_max_delay(Duration::from_secs(2))
        .build()?;

    // 4. Only retry failures that look transient; stop on Ctrl-C
    let transient = checkers::keywords(["temporarily", "unavailable", "timeout"]);
    let cancel = CancellationToken::new();
    let abort = abort_on_cancel(cancel.clone());
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let observers: Vec<Arc<dyn Observe>> = vec![Arc::new(LogWriter::default())];
    let executor = RetryExecutor::new();
    let result = executor
        .execute_with_retry(
            || async {
                engine
                    .execute(&request, observers.clone(), Vec::new())
                    .await
                    .into_result()
            },
            &cfg,
            Some(&transient),
            Some(&abort),
        )
        .await;
    let _ = std::fs::remove_file(&marker);

    for attempt in &result.attempts {
        println!(
            "attempt #{} success={} waited={:?} took={:?} error={:?}",
            attempt.attempt_number,
            attempt.success,
            attempt.delay_before,
            attempt.duration(),
            attempt.error
        );
    }
    println!("outcome: {:?} in {:?}", result.outcome, result.total_duration);
    if let Some(res) = &result.value {
        print!("stdout:\n{}", res.stdout);
    }
    println!("engine stats: {:?}", engine.stats());
    println!("retry stats: {:?}", executor.stats());
    Ok(())
}
