use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use jobs_core::job::{JobRecord, JobStatus, JobView, LogEntry, LogLevel};
use jobs_core::schedule::{self, CronSpec};
use jobs_core::script::ScriptDir;
use jobs_core::store::JobStore;
use jobs_core::Result;

use crate::runner::{JobLedger, RunOutcome, Supervisor};

/// Live cron timer for one job. Dropping it stops future fires.
struct ActiveTimer {
    spec: CronSpec,
    task: JoinHandle<()>,
}

impl ActiveTimer {
    fn next_run(&self) -> Option<DateTime<Utc>> {
        self.spec.next_after(Utc::now())
    }
}

impl Drop for ActiveTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Inner {
    store: JobStore,
    supervisor: Supervisor,
    scripts: ScriptDir,
    timers: Mutex<HashMap<String, ActiveTimer>>,
}

/// Owns the cron timers and drives jobs through their lifecycle.
///
/// The job table is the source of truth; the timer map is a cache that
/// [`crate::bootstrap::reconcile`] rebuilds after a restart. Clones share state.
#[derive(Clone)]
pub struct SchedulerEngine {
    inner: Arc<Inner>,
}

impl SchedulerEngine {
    pub fn new(store: JobStore, supervisor: Supervisor, scripts: ScriptDir) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                supervisor,
                scripts,
                timers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    /// Create a job and start its timer. Must run inside a tokio runtime.
    pub fn schedule(&self, cron_expression: &str, script_name: Option<&str>) -> Result<JobView> {
        let parsed = schedule::parse(cron_expression)?;
        let (name, path) = self.inner.scripts.resolve(script_name)?;
        let mut record = JobRecord::new(cron_expression.trim(), name, path);

        self.inner.supervisor.logs().append(
            &record.id,
            LogLevel::Info,
            format!(
                "Job scheduled with cron expression: {} and script: {}",
                record.cron_expression,
                record.script_name.as_deref().unwrap_or_default()
            ),
        );

        record.next_run = parsed.next_after(Utc::now());
        self.inner.store.upsert(&record)?;
        self.register(&record.id, parsed);
        info!(job_id = %record.id, cron = %record.cron_expression, "job scheduled");
        Ok(self.view(record))
    }

    /// Re-arm the timer of an existing record, keeping its id and creation time.
    pub(crate) fn restore(&self, mut record: JobRecord) -> Result<JobRecord> {
        let parsed = schedule::parse(&record.cron_expression)?;
        record.next_run = parsed.next_after(Utc::now());
        if let Err(e) = self.inner.store.upsert(&record) {
            self.inner.timers().remove(&record.id);
            return Err(e);
        }
        self.register(&record.id, parsed);
        Ok(record)
    }

    /// Stop a job's timer and tombstone its record. `false` if unknown.
    ///
    /// A fire already in flight re-reads the record and aborts itself;
    /// a worker already spawned runs to completion, but its final status
    /// write is refused by the store.
    pub fn cancel(&self, id: &str) -> Result<bool> {
        let found = self.inner.store.mark_canceled(id)?;
        let had_timer = self.inner.timers().remove(id).is_some();
        if found {
            self.inner.supervisor.logs().append(id, LogLevel::Info, "Job canceled");
            info!(job_id = id, had_timer, "job canceled");
        }
        Ok(found)
    }

    pub fn get(&self, id: &str) -> Option<JobView> {
        self.inner.store.get(id).map(|r| self.view(r))
    }

    pub fn list_active(&self) -> Vec<JobView> {
        self.inner
            .store
            .list_active()
            .into_iter()
            .map(|r| self.view(r))
            .collect()
    }

    pub fn logs(&self, id: &str) -> Vec<LogEntry> {
        self.inner.supervisor.logs().read(id)
    }

    /// Run one fire of `id` now, exactly as its timer would.
    ///
    /// Backs `POST /jobs/run`; the job's timer is left as it is.
    pub async fn trigger(&self, id: &str) -> RunOutcome {
        fire(&self.inner, id).await
    }

    pub fn active_timers(&self) -> usize {
        self.inner.timers().len()
    }

    #[cfg(test)]
    pub fn has_timer(&self, id: &str) -> bool {
        self.inner.timers().contains_key(id)
    }

    /// Stop every timer. Running workers are left alone.
    pub fn shutdown(&self) {
        let drained: Vec<_> = self.inner.timers().drain().collect();
        info!(timers = drained.len(), "scheduler stopping");
    }

    fn view(&self, record: JobRecord) -> JobView {
        let has_logs = self.inner.supervisor.logs().exists(&record.id);
        JobView { record, has_logs }
    }

    fn register(&self, id: &str, spec: CronSpec) {
        let task = tokio::spawn(run_timer(
            Arc::downgrade(&self.inner),
            id.to_string(),
            spec.clone(),
        ));
        let timer = ActiveTimer { spec, task };
        // replacing an old timer drops it, which aborts its task
        if self.inner.timers().insert(id.to_string(), timer).is_some() {
            warn!(job_id = id, "replaced an existing timer");
        }
    }
}

impl Inner {
    fn timers(&self) -> MutexGuard<'_, HashMap<String, ActiveTimer>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_run(&self, id: &str) -> Option<DateTime<Utc>> {
        self.timers().get(id).and_then(ActiveTimer::next_run)
    }

    /// Status write with `nextRun` refreshed from the live timer, if any.
    fn update_status(&self, id: &str, status: JobStatus) -> Result<Option<JobRecord>> {
        let next = match status {
            JobStatus::Running => None,
            _ => self.next_run(id),
        };
        self.store.update_status(id, status, next)
    }
}

impl JobLedger for Inner {
    fn current(&self, job_id: &str) -> Option<JobRecord> {
        self.store.get(job_id)
    }

    fn transition(&self, job_id: &str, status: JobStatus) -> Option<JobRecord> {
        match self.update_status(job_id, status) {
            Ok(r) => r,
            Err(e) => {
                error!(job_id, %status, error = %e, "status update failed");
                None
            }
        }
    }
}

async fn fire(inner: &Inner, id: &str) -> RunOutcome {
    inner.supervisor.run(inner, id).await
}

async fn run_timer(engine: Weak<Inner>, id: String, spec: CronSpec) {
    let mut cursor = Utc::now();
    loop {
        let Some(next) = spec.next_after(cursor) else {
            debug!(job_id = %id, "cron schedule exhausted");
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        // never replay fires missed while the host was suspended
        cursor = next.max(Utc::now());

        let Some(inner) = engine.upgrade() else { return };
        let id = id.clone();
        tokio::spawn(async move {
            let outcome = fire(&inner, &id).await;
            debug!(job_id = %id, ?outcome, "fire finished");
        });
    }
}
