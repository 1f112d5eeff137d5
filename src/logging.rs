//! Tracing configuration and log routing.
//!
//! Events go to stdout through a compact formatter and to a log file. `IDP_LOG_FILE` names the
//! file explicitly; otherwise a daily-rolling `logs/idp-pipeline.log` is used. Work done for a
//! job runs inside [`job_span`], so every event it emits carries the `job_id`.
use std::path::Path;
use std::sync::OnceLock;

use tracing::Span;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "idp-pipeline.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the stdout and file subscribers.
///
/// Filtering follows `RUST_LOG` and defaults to `info`. The file layer is skipped with a message
/// on stderr when its directory cannot be created.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let file_layer = file_writer().map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

/// Span wrapping all processing of one job.
pub fn job_span(job_id: &str) -> Span {
    tracing::info_span!("job", job_id = %job_id)
}

fn file_writer() -> Option<NonBlocking> {
    let appender = match std::env::var("IDP_LOG_FILE") {
        Ok(path) if !path.trim().is_empty() => {
            let path = Path::new(&path);
            let dir = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name()?;
            ensure_dir(dir)?;
            tracing_appender::rolling::never(dir, file_name)
        }
        _ => {
            ensure_dir(Path::new(DEFAULT_LOG_DIR))?;
            tracing_appender::rolling::daily(DEFAULT_LOG_DIR, DEFAULT_LOG_FILE)
        }
    };

    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Some(writer)
}

fn ensure_dir(dir: &Path) -> Option<()> {
    match std::fs::create_dir_all(dir) {
        Ok(()) => Some(()),
        Err(err) => {
            eprintln!("Failed to create log directory {}: {err}", dir.display());
            None
        }
    }
}
