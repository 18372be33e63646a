use jobs_core::job::JobStatus;
use tracing::{error, info, warn};

use crate::scheduler::SchedulerEngine;

/// What a reconciliation pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    pub purged: usize,
    pub restored: usize,
    pub skipped: usize,
}

/// Rebuild in-memory timers from the job table after a restart.
///
/// Tombstoned records are purged first. Every remaining `scheduled` record
/// gets its timer back under the same id; records that cannot be restored
/// are logged and left untouched so the rest of the table still comes up.
pub fn reconcile(engine: &SchedulerEngine) -> Reconciled {
    let mut report = Reconciled::default();

    match engine.store().purge_canceled() {
        Ok(n) => report.purged = n,
        Err(e) => error!(error = %e, "purging canceled jobs failed"),
    }

    for record in engine.store().list_active() {
        if record.status != JobStatus::Scheduled {
            continue;
        }
        let id = record.id.clone();
        if record.cron_expression.trim().is_empty() || record.script_path.is_none() {
            warn!(job_id = %id, "skipping job with missing cron expression or script path");
            report.skipped += 1;
            continue;
        }
        match engine.restore(record) {
            Ok(r) => {
                info!(job_id = %id, next_run = ?r.next_run, "job restored");
                report.restored += 1;
            }
            Err(e) => {
                warn!(job_id = %id, error = %e, "skipping job that could not be restored");
                report.skipped += 1;
            }
        }
    }

    info!(
        purged = report.purged,
        restored = report.restored,
        skipped = report.skipped,
        "reconciliation finished"
    );
    report
}
