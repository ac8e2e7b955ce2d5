use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::control;
use crate::error::Result;
use crate::reconciler::Reconciler;

const SHUTDOWN_BUDGET: Duration = Duration::from_secs(5);

/// Top-level process wiring: creates the root cancellation scope and runs
/// the control server, the reconciler, and the signal watcher as siblings.
/// When any one of them cancels the root, all three unwind and the process
/// exits cleanly.
pub async fn run(socket_spec: String, manifest_path: PathBuf, kubeconfig: Option<PathBuf>, logfile: PathBuf) -> Result<()> {
    let root_cancel = CancellationToken::new();
    let reconciler = Arc::new(Reconciler::new(manifest_path, kubeconfig));

    let signal_cancel = root_cancel.clone();
    let signal_task = tokio::spawn(async move {
        wait_for_signal().await;
        info!("received shutdown signal");
        signal_cancel.cancel();
    });

    let reconciler_for_run = Arc::clone(&reconciler);
    let reconciler_cancel = root_cancel.clone();
    let reconciler_task = tokio::spawn(async move {
        if let Err(e) = reconciler_for_run.run(reconciler_cancel.clone()).await {
            warn!(error = %e, "reconciler exited with a fatal error");
            reconciler_cancel.cancel();
        }
    });

    let control_cancel = root_cancel.clone();
    let control_reconciler = Arc::clone(&reconciler);
    let control_task = tokio::spawn(async move {
        if let Err(e) = control::run(&socket_spec, control_reconciler, logfile, control_cancel).await {
            warn!(error = %e, "control server exited with a fatal error");
        }
    });

    // Give the control server up to SHUTDOWN_BUDGET to drain once the root
    // is cancelled; the other two tasks are expected to unwind promptly.
    root_cancel.cancelled().await;
    let _ = tokio::time::timeout(SHUTDOWN_BUDGET, control_task).await;
    let _ = reconciler_task.await;
    signal_task.abort();

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
