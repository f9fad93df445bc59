//! Logging Infrastructure
//!
//! `RUST_LOG` takes precedence; otherwise `order_server` and `tower_http` log at
//! the configured level. Output goes to stdout, or to a daily rolling file when
//! a log directory is configured and exists.

use std::path::Path;

use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::EnvFilter;

/// Initialize the logger with optional JSON format and file output
pub fn init_logger_with_file(log_level: Option<&str>, json: bool, log_dir: Option<&str>) {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("order_server={level},tower_http={level}")));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    match (json, log_dir.and_then(file_appender)) {
        (true, Some(appender)) => subscriber.json().with_writer(appender).init(),
        (true, None) => subscriber.json().init(),
        (false, Some(appender)) => subscriber.with_ansi(false).with_writer(appender).init(),
        (false, None) => subscriber.init(),
    }
}

/// Daily rolling appender in `dir`, if the directory exists
pub fn file_appender(dir: &str) -> Option<RollingFileAppender> {
    let log_path = Path::new(dir);
    if !log_path.is_dir() {
        return None;
    }
    Some(tracing_appender::rolling::daily(log_path, "order-server"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_appender_requires_existing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();
        assert!(file_appender(path).is_some());

        let missing = dir.path().join("missing");
        assert!(file_appender(missing.to_str().unwrap()).is_none());
    }
}
