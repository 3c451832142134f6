// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Test printer whose outcomes are driven by the test.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use webprint_core::error::{Result, WebPrintError};

use super::{Completion, CompletionSender, Printer};
use crate::lock;

/// How the scripted printer resolves submissions.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Script {
    /// Hold every completion until the test calls `finish_next`.
    Manual,
    /// Resolve each print after a short delay with the given outcome.
    Auto { success: bool },
}

pub(crate) struct ScriptedPrinter {
    script: Script,
    reject: AtomicBool,
    submitted: Mutex<Vec<PathBuf>>,
    held: Mutex<Vec<CompletionSender>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl ScriptedPrinter {
    pub(crate) fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            reject: AtomicBool::new(false),
            submitted: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub(crate) fn reject_submissions(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub(crate) fn submitted(&self) -> Vec<PathBuf> {
        lock(&self.submitted).clone()
    }

    /// Completions currently withheld (manual script only).
    pub(crate) fn held(&self) -> usize {
        lock(&self.held).len()
    }

    /// Resolve the oldest withheld completion.  Returns false if none.
    pub(crate) fn finish_next(&self, success: bool) -> bool {
        let next = {
            let mut held = lock(&self.held);
            if held.is_empty() {
                None
            } else {
                Some(held.remove(0))
            }
        };
        match next {
            Some(tx) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                tx.complete(success);
                true
            }
            None => false,
        }
    }

    /// Highest number of prints ever running at once.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Printer for ScriptedPrinter {
    fn name(&self) -> &str {
        "scripted"
    }

    fn submit(&self, path: &Path) -> Result<Completion> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(WebPrintError::PrinterRejected("scripted rejection".into()));
        }
        lock(&self.submitted).push(path.to_path_buf());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let (tx, completion) = Completion::channel();
        match self.script {
            Script::Manual => lock(&self.held).push(tx),
            Script::Auto { success } => {
                let in_flight = Arc::clone(&self.in_flight);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    tx.complete(success);
                });
            }
        }
        Ok(completion)
    }
}
