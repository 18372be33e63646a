use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the job scheduler.
///
/// Each variant carries a stable [`code`](JobError::code), an HTTP-style
/// [`status`](JobError::status) and a human message (its `Display`).
#[derive(Debug, Error)]
pub enum JobError {
    /// The cron expression is missing or cannot be parsed.
    #[error("invalid cron expression `{expression}`: {reason}")]
    InvalidCronExpression {
        /// Expression as received.
        expression: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// The script name is missing or would escape the scripts directory.
    #[error("invalid script name: {0}")]
    InvalidScriptName(String),

    /// No job with this id exists.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Reading or writing durable state failed.
    #[error("storage error at {}: {source}", .path.display())]
    Storage {
        /// File involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The durable job table exists but cannot be decoded.
    #[error("corrupt job table at {}: {source}", .path.display())]
    Corrupt {
        /// File involved.
        path: PathBuf,
        /// Decode error.
        #[source]
        source: serde_json::Error,
    },

    /// The worker program could not be started.
    #[error("Error starting job: {0}")]
    SpawnFailure(#[source] std::io::Error),

    /// The worker exited unsuccessfully (`None` when killed by a signal).
    #[error("{}", worker_exit_message(.code))]
    WorkerExit {
        /// Exit code, if any.
        code: Option<i32>,
    },

    /// The worker exited 0 but wrote to stderr during the run.
    #[error("Script exited with code 0 after writing to stderr")]
    WorkerStderr,
}

fn worker_exit_message(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("Script failed with exit code {c}"),
        None => "Script terminated by signal".to_string(),
    }
}

impl JobError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            JobError::InvalidCronExpression { .. } => "INVALID_CRON_EXPRESSION",
            JobError::InvalidScriptName(_) => "INVALID_SCRIPT_NAME",
            JobError::JobNotFound(_) => "JOB_NOT_FOUND",
            JobError::Storage { .. } | JobError::Corrupt { .. } => "STORAGE_IO_ERROR",
            JobError::SpawnFailure(_) => "SPAWN_FAILURE",
            JobError::WorkerExit { .. } | JobError::WorkerStderr => "WORKER_RUNTIME_ERROR",
        }
    }

    /// HTTP-equivalent status for callers of the API.
    pub fn status(&self) -> u16 {
        match self {
            JobError::InvalidCronExpression { .. } | JobError::InvalidScriptName(_) => 400,
            JobError::JobNotFound(_) => 404,
            _ => 500,
        }
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        JobError::Storage { path: path.into(), source }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, JobError>;
