use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILE_NAME: &str = "jobscout.log";

fn default_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("{level},hyper=warn,hyper_util=warn,reqwest=warn,thirtyfour=warn,html5ever=warn,selectors=warn")
}

fn open_log_file(log_dir: &Path) -> Result<(File, PathBuf)> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let path = log_dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    Ok((file, path))
}

/// Installs the global subscriber: compact stderr output plus a plain-text log file.
/// `RUST_LOG` overrides the default filter. Returns the log file path when file logging is active.
pub fn init(log_dir: &Path, verbose: bool) -> Option<PathBuf> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    let stderr_layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file_layer, log_path, file_error) = match open_log_file(log_dir) {
        Ok((file, path)) => (
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))),
            Some(path),
            None,
        ),
        Err(e) => (None, None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        warn!("File logging disabled: {:#}", e);
    }

    log_path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_respect_verbose() {
        assert!(default_directives(false).starts_with("info,"));
        assert!(default_directives(true).starts_with("debug,"));
        assert!(EnvFilter::try_new(default_directives(true)).is_ok());
    }

    #[test]
    fn test_open_log_file_creates_directory() {
        let dir = std::env::temp_dir().join(format!("jobscout-logs-{}", uuid::Uuid::new_v4()));
        let (_file, path) = open_log_file(&dir).unwrap();
        assert!(path.exists());
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some(LOG_FILE_NAME));
        fs::remove_dir_all(&dir).ok();
    }
}
