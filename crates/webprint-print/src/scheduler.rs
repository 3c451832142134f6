// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Single-printer job scheduler.
//
// Jobs wait in a FIFO queue; at most one holds the printer at a time.  The
// queue and the "currently printing" slot share one mutex, which is held
// only while they are mutated and never across a print.  The job popped in
// a dispatch is handed to a `PrintWorker` on a fresh Tokio task after the
// lock is released.
//
// Lifecycle: queued -> printing -> completed | error.  Failed jobs stay
// failed; nothing is retried or re-queued here.
//
// Lock order is scheduler state -> status store.  The status store never
// calls back into the scheduler.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tracing::{debug, error, info};

use webprint_core::error::{Result, WebPrintError};
use webprint_core::types::{JobId, JobStatus, PrintJob, QueueSnapshot};

use crate::lock;
use crate::printer::Printer;
use crate::status::StatusStore;
use crate::worker::{PrintWorker, remove_document};

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<PrintJob>,
    /// The job holding the printer, if any.
    printing: Option<JobId>,
    /// Some thread is inside `dispatch`.  Nested and concurrent calls
    /// return at once; the active dispatcher re-reads the state after every
    /// spawn and picks up whatever they would have started.
    dispatching: bool,
}

impl QueueState {
    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            queue_depth: self.queue.len(),
            is_printing: self.printing.is_some(),
        }
    }
}

struct Shared {
    state: Mutex<QueueState>,
    status: StatusStore,
    printer: Arc<dyn Printer>,
    runtime: Handle,
}

/// FIFO print scheduler.  Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct PrintScheduler {
    shared: Arc<Shared>,
}

impl PrintScheduler {
    /// Create a scheduler that spawns its workers on the current Tokio
    /// runtime.
    pub fn new(status: StatusStore, printer: Arc<dyn Printer>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| WebPrintError::Runtime(e.to_string()))?;
        Ok(Self::with_runtime(status, printer, runtime))
    }

    /// Create a scheduler that spawns its workers on `runtime`.
    pub fn with_runtime(status: StatusStore, printer: Arc<dyn Printer>, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                status,
                printer,
                runtime,
            }),
        }
    }

    /// Append a job to the queue and start it if the printer is free.
    pub fn enqueue(&self, mut job: PrintJob) {
        job.status = JobStatus::Queued;
        let id = job.id;
        let name = job.name.clone();
        let hash = job.document_hash.clone();
        {
            let mut state = lock(&self.shared.state);
            self.shared.status.insert(job.clone());
            state.queue.push_back(job);
            self.shared.publish(&state);
        }
        info!(job_id = %id, name = %name, hash = %hash, "job queued");

        self.shared.dispatch();
    }

    pub fn status(&self) -> &StatusStore {
        &self.shared.status
    }

    /// Queue depth and printer occupancy as seen by the scheduler itself.
    pub fn snapshot(&self) -> QueueSnapshot {
        lock(&self.shared.state).snapshot()
    }

    /// Ids waiting in the queue, head first.
    pub fn queued(&self) -> Vec<JobId> {
        lock(&self.shared.state).queue.iter().map(|job| job.id).collect()
    }

    /// The job currently holding the printer.
    pub fn current(&self) -> Option<JobId> {
        lock(&self.shared.state).printing
    }
}

impl Shared {
    /// Start the head of the queue if the printer is free; otherwise no-op.
    ///
    /// Runs as a loop rather than recursing.  On a runtime that has shut
    /// down, `spawn` drops the worker future on the spot, its slot releases
    /// the printer and re-enters here; that call returns immediately and the
    /// loop below moves on to the next job.
    fn dispatch(self: &Arc<Self>) {
        {
            let mut state = lock(&self.state);
            if state.dispatching {
                return;
            }
            state.dispatching = true;
        }

        loop {
            let job = {
                let mut state = lock(&self.state);
                let next = if state.printing.is_none() {
                    state.queue.pop_front()
                } else {
                    None
                };
                let Some(job) = next else {
                    state.dispatching = false;
                    return;
                };
                state.printing = Some(job.id);
                self.publish(&state);
                job
            };
            debug!(job_id = %job.id, "dispatching job");

            let slot = PrintSlot {
                shared: Arc::clone(self),
                job_id: job.id,
                path: job.path.clone(),
                settled: false,
            };
            let worker = PrintWorker::new(self.status.clone(), Arc::clone(&self.printer));
            self.runtime.spawn(worker.run(job, slot));
        }
    }

    /// Free the printer held by `id` and start the next job.
    fn release(self: &Arc<Self>, id: JobId) {
        {
            let mut state = lock(&self.state);
            if state.printing == Some(id) {
                state.printing = None;
            }
            self.publish(&state);
        }
        debug!(job_id = %id, "printer released");
        self.dispatch();
    }

    fn publish(&self, state: &QueueState) {
        self.status.publish_queue(state.snapshot());
    }
}

/// Ownership of the printer for one job.
///
/// Dropping the slot releases the printer and dispatches the next job.  A
/// slot dropped before the worker settled it (a panic, or a runtime shutting
/// down) marks its job as failed and removes the document on the way out.
pub(crate) struct PrintSlot {
    shared: Arc<Shared>,
    job_id: JobId,
    path: std::path::PathBuf,
    settled: bool,
}

impl PrintSlot {
    /// Mark the job's outcome as recorded.
    pub(crate) fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for PrintSlot {
    fn drop(&mut self) {
        if !self.settled {
            error!(job_id = %self.job_id, "print worker ended without an outcome");
            remove_document(&self.path);
            self.shared.status.set(self.job_id, JobStatus::Error);
        }
        self.shared.release(self.job_id);
    }
}
