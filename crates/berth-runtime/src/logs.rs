//! Service log management.
//!
//! Each service writes stdout and stderr to `<logs_dir>/<service>.log`;
//! the supervisor appends its own lifecycle lines to the same file.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use berth_common::error::{BerthError, Result};

/// Returns the log file path for a service.
#[must_use]
pub fn log_path(logs_dir: &Path, service: &str) -> PathBuf {
    logs_dir.join(format!("{service}.log"))
}

/// Opens a service's log file for appending, creating it if needed.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created.
pub fn open_log(logs_dir: &Path, service: &str) -> Result<File> {
    std::fs::create_dir_all(logs_dir).map_err(|e| BerthError::Io {
        path: logs_dir.to_path_buf(),
        source: e,
    })?;
    let path = log_path(logs_dir, service);
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| BerthError::Io { path, source: e })
}

/// Reads a service's logs from disk.
///
/// Returns an empty string if the log file does not exist yet.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_logs(logs_dir: &Path, service: &str) -> Result<String> {
    let path = log_path(logs_dir, service);
    if !path.exists() {
        return Ok(String::new());
    }
    std::fs::read_to_string(&path).map_err(|e| BerthError::Io { path, source: e })
}

/// Appends a line to a service's log.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created or written.
pub fn append_log(logs_dir: &Path, service: &str, line: &str) -> Result<()> {
    let mut file = open_log(logs_dir, service)?;
    writeln!(file, "{line}").map_err(|e| BerthError::Io {
        path: log_path(logs_dir, service),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_path_is_constructed_correctly() {
        let p = log_path(Path::new("/srv/foodgram/.berth/logs"), "nginx");
        assert_eq!(p, PathBuf::from("/srv/foodgram/.berth/logs/nginx.log"));
    }

    #[test]
    fn read_logs_missing_file_returns_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let content = read_logs(dir.path(), "nonexistent").expect("should succeed");
        assert!(content.is_empty());
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        append_log(dir.path(), "db", "line one").expect("append 1");
        append_log(dir.path(), "db", "line two").expect("append 2");

        let content = read_logs(dir.path(), "db").expect("read");
        assert_eq!(content, "line one\nline two\n");
    }

    #[test]
    fn append_creates_log_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let logs_dir = dir.path().join("logs");
        assert!(!logs_dir.exists());

        append_log(&logs_dir, "backend", "first line").expect("append");
        assert!(logs_dir.exists());
    }

    #[test]
    fn separate_services_have_separate_logs() {
        let dir = tempfile::tempdir().expect("tempdir");
        append_log(dir.path(), "backend", "from backend").expect("append backend");
        append_log(dir.path(), "frontend", "from frontend").expect("append frontend");

        let backend = read_logs(dir.path(), "backend").expect("read backend");
        let frontend = read_logs(dir.path(), "frontend").expect("read frontend");

        assert!(backend.contains("from backend"));
        assert!(!backend.contains("from frontend"));
        assert!(frontend.contains("from frontend"));
        assert!(!frontend.contains("from backend"));
    }
}
