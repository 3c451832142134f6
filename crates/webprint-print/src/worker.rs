// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print worker: runs exactly one job against the printer.
//
// Each dispatched job gets its own worker on its own Tokio task.  The worker
// owns the job's `PrintSlot`; dropping the slot is what hands the printer to
// the next job, so capacity comes back on every exit path, panics included.

use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use webprint_core::types::{JobStatus, PrintJob};

use crate::printer::Printer;
use crate::scheduler::PrintSlot;
use crate::status::StatusStore;

pub(crate) struct PrintWorker {
    status: StatusStore,
    printer: Arc<dyn Printer>,
}

impl PrintWorker {
    pub(crate) fn new(status: StatusStore, printer: Arc<dyn Printer>) -> Self {
        Self { status, printer }
    }

    /// Print `job`, record the outcome and give the slot back.
    pub(crate) async fn run(self, job: PrintJob, slot: PrintSlot) {
        if !job.path.is_file() {
            error!(job_id = %job.id, path = %job.path.display(), "document vanished before printing");
            self.settle(&job, false, slot);
            return;
        }

        info!(job_id = %job.id, name = %job.name, printer = self.printer.name(), "printing");
        self.status.set(job.id, JobStatus::Printing);

        let success = match self.printer.submit(&job.path) {
            Ok(completion) => completion.wait().await,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "printer refused job");
                false
            }
        };
        self.settle(&job, success, slot);
    }

    /// Completion handling: remove the document, publish the terminal
    /// status, release the slot.
    ///
    /// A terminal status is only ever published for a job whose file is
    /// already gone.
    fn settle(&self, job: &PrintJob, success: bool, mut slot: PrintSlot) {
        remove_document(&job.path);

        let status = if success {
            JobStatus::Completed
        } else {
            JobStatus::Error
        };
        self.status.set(job.id, status);
        slot.settle();

        if success {
            info!(job_id = %job.id, name = %job.name, "job completed");
        } else {
            warn!(job_id = %job.id, name = %job.name, "job failed");
        }
        // `slot` drops here and dispatches the next job.
    }
}

/// Delete a consumed document.  Failure is logged, never escalated.
pub(crate) fn remove_document(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "document removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "document already gone");
        }
        Err(e) => error!(path = %path.display(), error = %e, "failed to remove document"),
    }
}
