//! Tracing subscriber setup.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use vmforge_shared::errors::{VmforgeError, VmforgeResult};

pub const LOG_FILE_NAME: &str = "vmforge.log";

#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Filter directive used when `RUST_LOG` is unset (e.g. `"vmforge=debug"`).
    pub directive: String,
    /// Write logs to `<log_dir>/vmforge.log` instead of stderr.
    pub log_dir: Option<PathBuf>,
    pub ansi: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            directive: "info".to_string(),
            log_dir: None,
            ansi: true,
        }
    }
}

fn build_filter(env_directive: Option<&str>, fallback: &str) -> VmforgeResult<EnvFilter> {
    let directive = env_directive.filter(|d| !d.is_empty()).unwrap_or(fallback);
    EnvFilter::try_new(directive).map_err(|e| {
        VmforgeError::Config(format!("Invalid log filter '{}': {}", directive, e))
    })
}

/// Install the global subscriber.
///
/// Returns the file writer guard when logging to a directory; logs are
/// flushed when it is dropped. Fails if a global subscriber is already set.
pub fn init_logging(options: &LogOptions) -> VmforgeResult<Option<WorkerGuard>> {
    let env_directive = std::env::var("RUST_LOG").ok();
    let filter = build_filter(env_directive.as_deref(), &options.directive)?;

    match options.log_dir {
        Some(ref dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|e| VmforgeError::Internal(format!("Failed to init logging: {}", e)))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(options.ansi)
                .try_init()
                .map_err(|e| VmforgeError::Internal(format!("Failed to init logging: {}", e)))?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_directive_overrides_fallback() {
        let filter = build_filter(Some("vmforge=trace"), "info").unwrap();
        assert_eq!(filter.to_string(), "vmforge=trace");

        let filter = build_filter(Some(""), "warn").unwrap();
        assert_eq!(filter.to_string(), "warn");

        let filter = build_filter(None, "vmforge=debug").unwrap();
        assert_eq!(filter.to_string(), "vmforge=debug");
    }

    #[test]
    fn test_invalid_directive_rejected() {
        let err = build_filter(None, "vmforge=[").unwrap_err();
        assert!(matches!(err, VmforgeError::Config(_)));
    }

    #[test]
    fn test_init_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let options = LogOptions {
            log_dir: Some(log_dir.clone()),
            ..Default::default()
        };

        let guard = init_logging(&options).unwrap();
        assert!(guard.is_some());
        assert!(log_dir.is_dir());

        // Only one global subscriber per process.
        assert!(init_logging(&LogOptions::default()).is_err());
    }
}
