//! Logging and tracing configuration
//!
//! Provides structured logging for the one-shot CLI commands and for the
//! long-running debugging session. The session also logs to a file so a
//! run can be inspected after the terminal scrolled away.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use super::paths;

/// Name of the session log file inside the log directory
const SESSION_LOG: &str = "session.log";

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stepdeck=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Initialize tracing for a debugging session (stderr + file logging)
///
/// The session logs to both:
/// 1. stderr, compact, for the person running the tests
/// 2. `<data dir>/logs/session.log`, with thread ids for the test thread /
///    control thread hand-off
///
/// The returned guard must be held until the session ends so buffered
/// lines are flushed.
pub fn init_session() -> (Option<PathBuf>, Option<WorkerGuard>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stepdeck=debug,info"));

    if let Some(log_dir) = paths::log_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let appender = tracing_appender::rolling::never(&log_dir, SESSION_LOG);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true);

            // stderr gets INFO at most, the file gets everything the filter allows
            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .with(session_stderr_layer().with_filter(LevelFilter::INFO))
                .init();

            return (Some(log_dir.join(SESSION_LOG)), Some(guard));
        }
    }

    eprintln!("Warning: Could not create log directory, logging to stderr only");

    // Fallback: stderr only
    tracing_subscriber::registry()
        .with(filter)
        .with(session_stderr_layer())
        .init();

    (None, None)
}

/// Compact stderr output of a session; each subscriber stack builds its own
fn session_stderr_layer<S>() -> impl Layer<S> + Send + Sync + 'static
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
}

/// Get the path to the session log file
pub fn session_log_path() -> Option<PathBuf> {
    paths::log_dir().map(|d| d.join(SESSION_LOG))
}
