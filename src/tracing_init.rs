//! Tracing initialization — every invocation appends to the per-project
//! log file.
//!
//! The engine runs as a short-lived subprocess per event, so many processes
//! share one `guardrail.log`; append mode keeps short writes (< PIPE_BUF)
//! atomic on Linux/macOS.

use std::sync::Mutex;

use crate::storage::path_utils;

/// Initialize tracing to `{project_dir}/guardrail.log` (append mode).
pub fn init_file_tracing(project_hash: &str) {
    use tracing_subscriber::EnvFilter;

    let project_dir = path_utils::project_dir(project_hash);
    std::fs::create_dir_all(&project_dir).ok();
    let log_path = path_utils::log_path(&project_dir);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .unwrap_or_else(|_| {
            let null = if cfg!(windows) { "NUL" } else { "/dev/null" };
            std::fs::File::create(null).expect("Cannot create log fallback")
        });

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(log_file))
        .with_target(true)
        .with_ansi(false)
        .init();
}

/// Stderr tracing for interactive CLI commands (report, cleanup).
pub fn init_stderr_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
