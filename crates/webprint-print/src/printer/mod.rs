// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer capability: the one seam between the job pipeline and whatever
// actually puts ink on paper.
//
// A printer accepts a file path and either rejects it up front or promises
// a single asynchronous outcome.  The promise is a one-shot channel: the
// sending half is consumed by `complete`, so an implementation cannot
// report twice, and the pipeline never assumes the outcome arrives before
// `submit` returns.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{info, warn};

use webprint_core::config::PrinterBackend;
use webprint_core::error::Result;

pub mod simulated;
pub mod system;

#[cfg(test)]
pub(crate) mod scripted;

pub use simulated::SimulatedPrinter;
pub use system::SystemPrinter;

/// Something that can print a document file.
///
/// # Contract
///
/// `submit` must not block on the print itself.  When it returns `Ok`, the
/// returned [`Completion`] resolves exactly once.  A printer that never
/// resolves it stalls every job queued behind the current one; there is no
/// timeout.
pub trait Printer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Start printing `path`.  `Err` means the submission was refused and
    /// nothing will be reported later.
    fn submit(&self, path: &Path) -> Result<Completion>;
}

/// Receiving half of a print outcome.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<bool>,
}

/// Sending half of a print outcome, held by the printer implementation.
#[derive(Debug)]
pub struct CompletionSender {
    tx: oneshot::Sender<bool>,
}

impl Completion {
    /// Create a linked sender/receiver pair.
    pub fn channel() -> (CompletionSender, Completion) {
        let (tx, rx) = oneshot::channel();
        (CompletionSender { tx }, Completion { rx })
    }

    /// Wait for the outcome.  A sender dropped without reporting counts as a
    /// failed print.
    pub async fn wait(self) -> bool {
        match self.rx.await {
            Ok(success) => success,
            Err(_) => {
                warn!("printer dropped its completion without reporting");
                false
            }
        }
    }
}

impl CompletionSender {
    /// Report the outcome.  Consumes the sender.
    pub fn complete(self, success: bool) {
        // The receiver is gone only if the worker itself was torn down.
        let _ = self.tx.send(success);
    }
}

/// Build the printer selected in configuration.
pub fn from_config(backend: &PrinterBackend) -> Arc<dyn Printer> {
    let printer: Arc<dyn Printer> = match backend {
        PrinterBackend::Simulated {
            min_duration_ms,
            max_duration_ms,
            bytes_per_second,
            failure_rate,
        } => Arc::new(SimulatedPrinter::new(
            std::time::Duration::from_millis(*min_duration_ms),
            std::time::Duration::from_millis(*max_duration_ms),
            *bytes_per_second,
            *failure_rate,
        )),
        PrinterBackend::System {
            command,
            convert_docx,
        } => Arc::new(SystemPrinter::new(command.clone(), *convert_docx)),
    };
    info!(printer = printer.name(), "printer backend selected");
    printer
}
