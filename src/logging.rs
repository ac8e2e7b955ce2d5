use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

/// Handle to the installed log pipeline. Dropping it flushes and stops the
/// background writer thread, so the caller must keep it alive for the
/// process lifetime (typically by leaking it into `main`'s stack frame).
pub struct LogHandle {
    pub path: PathBuf,
    _guard: WorkerGuard,
}

/// Build the daemon's log file path: `server-{pid}.log` under `logdir`, per
/// §6.3.
pub fn log_file_path(logdir: &Path) -> PathBuf {
    logdir.join(format!("server-{}.log", std::process::id()))
}

/// Install a `tracing` subscriber that writes to the log file determined at
/// startup, and, when `debug` is set, mirrors events to stderr. There is no
/// process-wide logger singleton beyond the `tracing` dispatcher itself;
/// every component receives its scoped logger through its constructor.
pub fn init(logdir: &Path, debug: bool) -> anyhow::Result<LogHandle> {
    std::fs::create_dir_all(logdir)?;
    let path = log_file_path(logdir);

    let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));

    let file_layer = fmt::layer().with_writer(writer).with_ansi(false);

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    if debug {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(file_layer).init();
    }

    Ok(LogHandle { path, _guard: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_path_includes_pid() {
        let dir = Path::new("/tmp/kube-porter-test");
        let path = log_file_path(dir);
        assert!(path.to_string_lossy().contains(&std::process::id().to_string()));
    }
}
