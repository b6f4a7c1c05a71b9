//! Logging Infrastructure
//!
//! `RUST_LOG` wins over the level passed in.

use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize the logger with optional daily rolling file output
pub fn init_logger_with_file(log_level: Option<&str>, log_dir: Option<&Path>) {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    if let Some(dir) = log_dir
        && dir.is_dir()
    {
        let file_appender = tracing_appender::rolling::daily(dir, "fastorder");
        let _ = subscriber.with_ansi(false).with_writer(file_appender).try_init();
        return;
    }

    // A second init (tests, embedding) keeps the first subscriber
    let _ = subscriber.with_writer(std::io::stderr).try_init();
}
