// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Webprint Print: chunked upload reassembly, the single-printer FIFO
// scheduler, printer backends and the `PrintService` facade that the outer
// surfaces talk to.  Domain types live in `webprint-core`.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod chunks;
pub mod printer;
pub mod scheduler;
pub mod service;
pub mod status;
mod worker;

pub use chunks::{AssembledUpload, ChunkAssembler, ChunkLimits, ChunkReceipt};
pub use printer::{Completion, CompletionSender, Printer, SimulatedPrinter, SystemPrinter};
pub use scheduler::PrintScheduler;
pub use service::PrintService;
pub use status::StatusStore;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
