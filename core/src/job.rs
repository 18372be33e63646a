use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its next cron fire. Also assumed when absent on disk.
    #[default]
    Scheduled,
    /// The worker program is executing.
    Running,
    /// The last run exited 0.
    Completed,
    /// The last run failed (spawn error, stderr output or non-zero exit).
    Failed,
    /// Deleted; absorbing.
    Canceled,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Scheduled => "scheduled",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// A persisted job definition plus its current status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Unique, immutable id.
    pub id: String,
    /// Cron expression as submitted. Empty only in damaged records.
    #[serde(default)]
    pub cron_expression: String,
    /// Script name as submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_name: Option<String>,
    /// Resolved script path, fixed at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_path: Option<PathBuf>,
    /// Current status.
    #[serde(default)]
    pub status: JobStatus,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Last time the job entered `running`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    /// Next fire time of the live timer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
    /// Tombstone; once set the record is inert.
    #[serde(default)]
    pub canceled: bool,
}

impl JobRecord {
    /// Fresh record in `scheduled` state with a new random id.
    pub fn new(cron_expression: impl Into<String>, script_name: impl Into<String>, script_path: PathBuf) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            cron_expression: cron_expression.into(),
            script_name: Some(script_name.into()),
            script_path: Some(script_path),
            status: JobStatus::Scheduled,
            created: Utc::now(),
            last_run: None,
            next_run: None,
            canceled: false,
        }
    }
}

/// Record as shown to callers, with the derived `hasLogs` flag.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    /// The stored record.
    #[serde(flatten)]
    pub record: JobRecord,
    /// Whether a log file exists for this job.
    pub has_logs: bool,
}

/// Severity of a per-job log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Progress output.
    Info,
    /// Failure output.
    Error,
    /// Successful completion.
    Success,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Info => "info",
            LogLevel::Error => "error",
            LogLevel::Success => "success",
        })
    }
}

/// One line of a job log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: LogLevel,
    /// Text.
    pub message: String,
}
