use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{JobError, Result};
use crate::job::{JobRecord, JobStatus};

/// Durable job table: one JSON document `{"jobs": [...]}`, rewritten in
/// full on every mutation.
///
/// Reads degrade to "nothing found" on I/O or decode errors; writes report
/// them. All read-modify-write cycles are serialized by one lock.
#[derive(Debug)]
pub struct JobStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

#[derive(Serialize, Deserialize, Default)]
struct Table {
    #[serde(default)]
    jobs: Vec<JobRecord>,
}

impl JobStore {
    /// Open the table at `path`, creating its directory and an empty table if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| JobError::storage(parent, e))?;
        }
        let store = Self { path, write_lock: Mutex::new(()) };
        if !store.path.exists() {
            store.save(&[])?;
        }
        Ok(store)
    }

    /// Location of the table on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert `record`, or replace the record with the same id.
    pub fn upsert(&self, record: &JobRecord) -> Result<()> {
        let _guard = self.lock();
        let mut jobs = self.load()?;
        match jobs.iter_mut().find(|j| j.id == record.id) {
            Some(slot) => *slot = record.clone(),
            None => jobs.push(record.clone()),
        }
        self.save(&jobs)
    }

    /// Record by id, canceled ones included.
    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.load_or_log().into_iter().find(|j| j.id == id)
    }

    /// Every record not marked canceled.
    pub fn list_active(&self) -> Vec<JobRecord> {
        self.load_or_log().into_iter().filter(|j| !j.canceled).collect()
    }

    /// Every record, tombstones included.
    pub fn list_all(&self) -> Vec<JobRecord> {
        self.load_or_log()
    }

    /// Set `status` on a live record.
    ///
    /// Returns `Ok(None)` if the id is unknown or the record is canceled.
    /// Entering `running` stamps `last_run`; any other status takes
    /// `next_run` when the caller has a live timer for the job.
    pub fn update_status(
        &self,
        id: &str,
        status: JobStatus,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<Option<JobRecord>> {
        let _guard = self.lock();
        let mut jobs = self.load()?;
        let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
            return Ok(None);
        };
        if job.canceled {
            info!(job_id = id, %status, "job is canceled, status update skipped");
            return Ok(None);
        }
        job.status = status;
        if status == JobStatus::Running {
            job.last_run = Some(Utc::now());
        } else if let Some(next) = next_run {
            job.next_run = Some(next);
        }
        let updated = job.clone();
        self.save(&jobs)?;
        Ok(Some(updated))
    }

    /// Tombstone a record. Returns `false` if the id is unknown.
    pub fn mark_canceled(&self, id: &str) -> Result<bool> {
        let _guard = self.lock();
        let mut jobs = self.load()?;
        let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
            return Ok(false);
        };
        job.canceled = true;
        job.status = JobStatus::Canceled;
        job.next_run = None;
        self.save(&jobs)?;
        info!(job_id = id, "job marked as canceled");
        Ok(true)
    }

    /// Physically drop every tombstoned record. Returns how many were removed.
    pub fn purge_canceled(&self) -> Result<usize> {
        let _guard = self.lock();
        let jobs = self.load()?;
        let before = jobs.len();
        let kept: Vec<JobRecord> = jobs.into_iter().filter(|j| !j.canceled).collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.save(&kept)?;
            info!(removed, "cleaned up canceled jobs");
        }
        Ok(removed)
    }

    /* --------------------- file io --------------------- */

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self) -> Result<Vec<JobRecord>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(JobError::storage(&self.path, e)),
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let table: Table = serde_json::from_str(&text)
            .map_err(|source| JobError::Corrupt { path: self.path.clone(), source })?;
        Ok(table.jobs)
    }

    fn load_or_log(&self) -> Vec<JobRecord> {
        self.load().unwrap_or_else(|e| {
            error!(error = %e, "error reading jobs file");
            Vec::new()
        })
    }

    fn save(&self, jobs: &[JobRecord]) -> Result<()> {
        #[derive(Serialize)]
        struct TableRef<'a> {
            jobs: &'a [JobRecord],
        }
        let buf = serde_json::to_vec_pretty(&TableRef { jobs })
            .map_err(|e| JobError::storage(&self.path, e.into()))?;

        // write temp then rename, so readers never see a torn table
        let tmp = self.path.with_extension("json.tmp");
        let write = || -> std::io::Result<()> {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&buf)?;
            f.sync_all()?;
            fs::rename(&tmp, &self.path)
        };
        write().map_err(|e| {
            warn!(error = %e, path = %self.path.display(), "error writing jobs file");
            JobError::storage(&self.path, e)
        })
    }
}
