// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job status store: the read model for progress reporting.
//
// Holds every job record ever admitted (no expiry) together with the queue
// depth and printer occupancy last published by the scheduler.  All state
// sits behind one mutex so a snapshot can never pair the depth from one
// moment with the printing flag from another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use webprint_core::types::{JobId, JobStatus, PrintJob, QueueSnapshot};

use crate::lock;

#[derive(Debug, Default)]
struct Ledger {
    jobs: HashMap<JobId, PrintJob>,
    queue: QueueSnapshot,
}

/// Shared, cheaply cloneable job status store.
#[derive(Debug, Clone, Default)]
pub struct StatusStore {
    ledger: Arc<Mutex<Ledger>>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly admitted job, replacing any earlier record with its id.
    pub fn insert(&self, job: PrintJob) {
        debug!(job_id = %job.id, status = %job.status, "job recorded");
        lock(&self.ledger).jobs.insert(job.id, job);
    }

    /// Update the status of a recorded job.
    ///
    /// Jobs enter the store through [`insert`](Self::insert) at enqueue, and
    /// only the pipeline moves them on from there.  An id that was never
    /// inserted has no record to update: the call is refused, `false` is
    /// returned and the id keeps reading as `Unknown`.
    pub(crate) fn set(&self, id: JobId, status: JobStatus) -> bool {
        let mut ledger = lock(&self.ledger);
        match ledger.jobs.get_mut(&id) {
            Some(job) => {
                job.status = status;
                debug!(job_id = %id, %status, "job status updated");
                true
            }
            None => {
                warn!(job_id = %id, %status, "status update for unrecorded job refused");
                false
            }
        }
    }

    /// Current status, `Unknown` for ids never seen.
    pub fn get(&self, id: JobId) -> JobStatus {
        lock(&self.ledger)
            .jobs
            .get(&id)
            .map_or(JobStatus::Unknown, |job| job.status)
    }

    /// Full record for a job.
    pub fn job(&self, id: JobId) -> Option<PrintJob> {
        lock(&self.ledger).jobs.get(&id).cloned()
    }

    /// All job records, oldest first.
    pub fn jobs(&self) -> Vec<PrintJob> {
        let mut jobs: Vec<PrintJob> = lock(&self.ledger).jobs.values().cloned().collect();
        jobs.sort_by_key(|job| job.enqueued_at);
        jobs
    }

    pub fn queue_depth(&self) -> usize {
        lock(&self.ledger).queue.queue_depth
    }

    pub fn is_printing(&self) -> bool {
        lock(&self.ledger).queue.is_printing
    }

    /// Queue depth and printing flag, read under the same lock.
    pub fn snapshot(&self) -> QueueSnapshot {
        lock(&self.ledger).queue
    }

    /// Called by the scheduler from inside its own critical section.
    pub(crate) fn publish_queue(&self, queue: QueueSnapshot) {
        lock(&self.ledger).queue = queue;
    }

    /// Number of jobs currently in the given status.
    pub fn count(&self, status: JobStatus) -> usize {
        lock(&self.ledger)
            .jobs
            .values()
            .filter(|job| job.status == status)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use webprint_core::types::DocumentType;

    fn job() -> PrintJob {
        PrintJob::new(
            JobId::new(),
            "test.pdf".into(),
            PathBuf::from("uploads/test.pdf"),
            DocumentType::Pdf,
            4,
            "abcd".into(),
        )
    }

    #[test]
    fn unseen_id_is_unknown() {
        let store = StatusStore::new();
        assert_eq!(store.get(JobId::new()), JobStatus::Unknown);
        assert!(store.job(JobId::new()).is_none());
    }

    #[test]
    fn set_updates_recorded_job() {
        let store = StatusStore::new();
        let job = job();
        let id = job.id;
        store.insert(job);
        assert_eq!(store.get(id), JobStatus::Queued);

        store.set(id, JobStatus::Printing);
        assert_eq!(store.get(id), JobStatus::Printing);
        assert_eq!(store.count(JobStatus::Printing), 1);
    }

    #[test]
    fn set_requires_a_recorded_job() {
        let store = StatusStore::new();
        let id = JobId::new();
        assert!(!store.set(id, JobStatus::Completed));
        assert_eq!(store.get(id), JobStatus::Unknown);
        assert!(store.job(id).is_none());

        let job = job();
        let recorded = job.id;
        store.insert(job);
        assert!(store.set(recorded, JobStatus::Completed));
        assert_eq!(store.get(recorded), JobStatus::Completed);
    }

    #[test]
    fn snapshot_reflects_last_publication() {
        let store = StatusStore::new();
        assert_eq!(store.snapshot(), QueueSnapshot::default());

        store.publish_queue(QueueSnapshot {
            queue_depth: 3,
            is_printing: true,
        });
        assert_eq!(store.queue_depth(), 3);
        assert!(store.is_printing());
    }

    #[test]
    fn clones_share_state() {
        let store = StatusStore::new();
        let other = store.clone();
        let job = job();
        let id = job.id;
        store.insert(job);
        assert_eq!(other.get(id), JobStatus::Queued);
        assert_eq!(other.jobs().len(), 1);
    }
}
