use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{JobError, Result};
use crate::job::{LogEntry, LogLevel};

/// Directory of append-only `job-<id>.log` files, one JSON entry per line.
#[derive(Clone, Debug)]
pub struct LogStore {
    dir: PathBuf,
}

impl LogStore {
    /// Open a log store rooted at `dir` (created if missing).
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| JobError::storage(&dir, e))?;
        Ok(Self { dir })
    }

    /// Log file for `job_id`, or `None` if the id cannot name a file safely.
    pub fn path_for(&self, job_id: &str) -> Option<PathBuf> {
        valid_id(job_id).then(|| self.dir.join(format!("job-{job_id}.log")))
    }

    /// Append one entry. Errors are logged and swallowed.
    pub fn append(&self, job_id: &str, level: LogLevel, message: impl Into<String>) {
        let Some(path) = self.path_for(job_id) else {
            warn!(job_id, "refusing to log for malformed job id");
            return;
        };
        let entry = LogEntry { timestamp: Utc::now(), level, message: message.into() };
        debug!(job_id, level = %entry.level, "{}", entry.message);
        if let Err(e) = write_line(&self.dir, &path, &entry) {
            warn!(job_id, error = %e, "job log append failed");
        }
    }

    /// All entries for `job_id`, newest first. Missing file means no entries.
    pub fn read(&self, job_id: &str) -> Vec<LogEntry> {
        let Some(path) = self.path_for(job_id) else { return Vec::new() };
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(job_id, error = %e, "job log read failed");
                return Vec::new();
            }
        };
        let mut out: Vec<LogEntry> = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| match serde_json::from_str(l) {
                Ok(e) => Some(e),
                Err(_) => {
                    debug!(job_id, "skipping undecodable log line");
                    None
                }
            })
            .collect();
        out.reverse();
        out
    }

    /// Whether any log file exists for `job_id`.
    pub fn exists(&self, job_id: &str) -> bool {
        self.path_for(job_id).is_some_and(|p| p.is_file())
    }
}

fn write_line(dir: &Path, path: &Path, entry: &LogEntry) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    // single write so concurrent appenders never interleave within a line
    f.write_all(line.as_bytes())
}

fn valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn read_is_newest_first() {
        let tmp = TempDir::new().unwrap();
        let logs = LogStore::open(tmp.path()).unwrap();
        logs.append("j1", LogLevel::Info, "first");
        logs.append("j1", LogLevel::Success, "second");

        let got = logs.read("j1");
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].message, "second");
        assert_eq!(got[0].level, LogLevel::Success);
        assert_eq!(got[1].message, "first");
    }

    #[test]
    fn missing_log_is_empty_not_error() {
        let tmp = TempDir::new().unwrap();
        let logs = LogStore::open(tmp.path()).unwrap();
        assert!(logs.read("nobody").is_empty());
        assert!(!logs.exists("nobody"));
    }

    #[test]
    fn append_recreates_removed_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("logs");
        let logs = LogStore::open(&dir).unwrap();
        fs::remove_dir_all(&dir).unwrap();

        logs.append("j2", LogLevel::Error, "boom");
        assert!(logs.exists("j2"));
    }

    #[test]
    fn unwritable_dir_is_swallowed() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("logs");
        let logs = LogStore::open(&dir).unwrap();
        fs::remove_dir_all(&dir).unwrap();
        fs::write(&dir, "not a directory").unwrap();

        logs.append("j4", LogLevel::Info, "lost");
        assert!(!logs.exists("j4"));
        assert!(logs.read("j4").is_empty());
    }

    #[test]
    fn foreign_lines_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let logs = LogStore::open(tmp.path()).unwrap();
        logs.append("j3", LogLevel::Info, "kept");
        let path = logs.path_for("j3").unwrap();
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "plain text from a worker").unwrap();

        let got = logs.read("j3");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].message, "kept");
    }

    #[test]
    fn traversal_ids_never_touch_disk() {
        let tmp = TempDir::new().unwrap();
        let logs = LogStore::open(tmp.path()).unwrap();
        assert!(logs.path_for("../etc/passwd").is_none());
        logs.append("../x", LogLevel::Info, "nope");
        assert!(logs.read("../x").is_empty());
        assert!(!logs.exists("../x"));
    }
}
