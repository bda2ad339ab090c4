//! Console and optional file logging
//!
//! Console output always goes to stdout. When a log file is configured the
//! same events are also written, without ANSI colours and with thread and
//! source location, through a non-blocking appender whose worker lives as
//! long as the returned guard.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keeps the file writer alive. Dropping it flushes pending lines.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// `default_filter` applies when `RUST_LOG` is unset.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or the log file
/// cannot be truncated.
pub fn init_logging(default_filter: &str, log_file: Option<&str>) -> io::Result<LoggingGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let console_layer = tracing_subscriber::fmt::layer().with_writer(io::stdout);

    let Some(raw) = log_file else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        return Ok(LoggingGuard { _file_guard: None });
    };

    let (dir, file_name) = prepare_log_file(&expand_log_path(raw))?;
    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_thread_names(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: Some(guard),
    })
}

// ============================================================================
// SBIO: Log file path handling
// ============================================================================

pub fn expand_log_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

/// Split a log path into the directory and file name the appender expects.
/// A bare file name lives in the current directory.
pub fn split_log_path(path: &Path) -> io::Result<(PathBuf, PathBuf)> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("log path {} has no file name", path.display()),
        )
    })?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, PathBuf::from(file_name)))
}

/// Create the log directory and start the file empty for this session.
pub fn prepare_log_file(path: &Path) -> io::Result<(PathBuf, PathBuf)> {
    let (dir, file_name) = split_log_path(path)?;
    fs::create_dir_all(&dir)?;
    fs::write(dir.join(&file_name), "")?;
    Ok((dir, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_log_path_with_directory() {
        let (dir, file) = split_log_path(Path::new("logs/predictflow.log")).unwrap();
        assert_eq!(dir, PathBuf::from("logs"));
        assert_eq!(file, PathBuf::from("predictflow.log"));
    }

    #[test]
    fn test_split_log_path_bare_file_name() {
        let (dir, file) = split_log_path(Path::new("predictflow.log")).unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(file, PathBuf::from("predictflow.log"));
    }

    #[test]
    fn test_split_log_path_without_file_name() {
        let err = split_log_path(Path::new("/")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_prepare_log_file_creates_dir_and_truncates() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("run.log");

        prepare_log_file(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");

        fs::write(&path, "previous session\n").unwrap();
        let (dir, file) = prepare_log_file(&path).unwrap();
        assert_eq!(dir, tmp.path().join("nested"));
        assert_eq!(file, PathBuf::from("run.log"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_expand_log_path_keeps_plain_paths() {
        assert_eq!(expand_log_path("logs/a.log"), PathBuf::from("logs/a.log"));
    }
}
