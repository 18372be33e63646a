use std::path::Path;
use std::process::Stdio;

use jobs_core::job::{JobRecord, JobStatus, LogLevel};
use jobs_core::joblog::LogStore;
use jobs_core::JobError;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Durable view of jobs as the supervisor needs it.
pub trait JobLedger: Send + Sync {
    /// Fresh copy of the record from durable state.
    fn current(&self, job_id: &str) -> Option<JobRecord>;
    /// Apply a status transition; `None` if the job is gone or canceled.
    fn transition(&self, job_id: &str, status: JobStatus) -> Option<JobRecord>;
}

/// How one fire ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The job was missing or canceled at fire time; nothing ran.
    Skipped,
    Completed,
    Failed,
}

/// Runs worker scripts for jobs and records what they do.
#[derive(Clone, Debug)]
pub struct Supervisor {
    logs: LogStore,
    interpreter: Option<String>,
    debug: bool,
}

impl Supervisor {
    pub fn new(logs: LogStore, interpreter: Option<String>, debug: bool) -> Self {
        Self { logs, interpreter, debug }
    }

    pub fn logs(&self) -> &LogStore {
        &self.logs
    }

    /// One fire of `job_id`: re-check durable state, run the worker, resolve the status.
    ///
    /// Never returns an error; every failure ends as a log entry plus a
    /// `failed` transition.
    pub async fn run<L: JobLedger + ?Sized>(&self, ledger: &L, job_id: &str) -> RunOutcome {
        let record = match ledger.current(job_id) {
            Some(r) if !r.canceled => r,
            _ => {
                info!(job_id, "skipping execution, job was deleted or canceled");
                return RunOutcome::Skipped;
            }
        };

        info!(job_id, "job started");
        self.logs.append(job_id, LogLevel::Info, "Job started execution");
        ledger.transition(job_id, JobStatus::Running);

        let result = match record.script_path.as_deref() {
            Some(script) => self.execute(ledger, job_id, script).await,
            None => Err(JobError::SpawnFailure(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "job has no script path",
            ))),
        };

        match result {
            Ok(code) => {
                info!(job_id, code, "job completed");
                self.logs.append(
                    job_id,
                    LogLevel::Success,
                    format!("Script completed successfully with exit code {code}"),
                );
                ledger.transition(job_id, JobStatus::Completed);
                RunOutcome::Completed
            }
            Err(e) => {
                warn!(job_id, error = %e, "job failed");
                self.logs.append(job_id, LogLevel::Error, e.to_string());
                ledger.transition(job_id, JobStatus::Failed);
                RunOutcome::Failed
            }
        }
    }

    async fn execute<L: JobLedger + ?Sized>(
        &self,
        ledger: &L,
        job_id: &str,
        script: &Path,
    ) -> Result<i32, JobError> {
        let mut cmd = match &self.interpreter {
            Some(interp) => {
                let mut c = Command::new(interp);
                c.arg(script);
                c
            }
            None => Command::new(script),
        };
        cmd.arg("--job-id").arg(job_id);
        if let Some(log_file) = self.logs.path_for(job_id) {
            cmd.arg("--log-file").arg(log_file);
        }
        if self.debug {
            cmd.arg("--debug");
        }
        // the worker outlives a cancel; only future fires are stopped
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        let mut child = cmd.spawn().map_err(JobError::SpawnFailure)?;
        debug!(job_id, pid = ?child.id(), script = %script.display(), "worker spawned");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let out_pump = pump_lines(stdout, |line| {
            self.logs.append(job_id, LogLevel::Info, line);
        });

        let mut wrote_stderr = false;
        let err_pump = pump_lines(stderr, |line| {
            self.logs.append(job_id, LogLevel::Error, line);
            if !wrote_stderr {
                wrote_stderr = true;
                ledger.transition(job_id, JobStatus::Failed);
            }
        });

        let (_, _, status) = tokio::join!(out_pump, err_pump, child.wait());
        let status = status.map_err(|e| {
            warn!(job_id, error = %e, "waiting on worker failed");
            JobError::WorkerExit { code: None }
        })?;

        match status.code() {
            Some(0) if wrote_stderr => Err(JobError::WorkerStderr),
            Some(0) => Ok(0),
            code => Err(JobError::WorkerExit { code }),
        }
    }
}

async fn pump_lines<R: AsyncRead + Unpin>(reader: Option<R>, mut on_line: impl FnMut(&str)) {
    let Some(reader) = reader else { return };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim();
                if !line.is_empty() {
                    on_line(line);
                }
            }
            Err(e) => {
                warn!(error = %e, "worker pipe read failed");
                break;
            }
        }
    }
}
