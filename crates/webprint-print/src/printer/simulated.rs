// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Simulated printer for development and demos.
//
// Takes time proportional to the document size, logs progress in tenths,
// and fails a configurable fraction of jobs.

use std::path::Path;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use webprint_core::error::{Result, WebPrintError};

use super::{Completion, Printer};

/// Number of progress steps logged per print.
const PROGRESS_STEPS: u32 = 10;

pub struct SimulatedPrinter {
    min_duration: Duration,
    max_duration: Duration,
    bytes_per_second: u64,
    failure_rate: f64,
}

impl SimulatedPrinter {
    pub fn new(
        min_duration: Duration,
        max_duration: Duration,
        bytes_per_second: u64,
        failure_rate: f64,
    ) -> Self {
        Self {
            min_duration,
            max_duration: max_duration.max(min_duration),
            bytes_per_second: bytes_per_second.max(1),
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }

    /// Print time for a document of `size` bytes.
    fn duration_for(&self, size: u64) -> Duration {
        let secs = size as f64 / self.bytes_per_second as f64;
        Duration::from_secs_f64(secs).clamp(self.min_duration, self.max_duration)
    }
}

impl Printer for SimulatedPrinter {
    fn name(&self) -> &str {
        "simulated"
    }

    fn submit(&self, path: &Path) -> Result<Completion> {
        let size = std::fs::metadata(path)
            .map_err(|e| WebPrintError::PrinterRejected(format!("{}: {e}", path.display())))?
            .len();

        let duration = self.duration_for(size);
        let fails = rand::thread_rng().gen_bool(self.failure_rate);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        info!(file = %name, size, duration_ms = duration.as_millis() as u64, "simulated print started");

        let (tx, completion) = Completion::channel();
        tokio::spawn(async move {
            let step = duration / PROGRESS_STEPS;
            for i in 1..=PROGRESS_STEPS {
                tokio::time::sleep(step).await;
                debug!(file = %name, progress = i * 100 / PROGRESS_STEPS, "simulated print progress");
            }
            if fails {
                warn!(file = %name, "simulated print failed");
            } else {
                info!(file = %name, "simulated print finished");
            }
            tx.complete(!fails);
        });
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn instant(failure_rate: f64) -> SimulatedPrinter {
        SimulatedPrinter::new(
            Duration::from_millis(1),
            Duration::from_millis(10),
            1024,
            failure_rate,
        )
    }

    #[test]
    fn duration_scales_with_size_within_bounds() {
        let printer = SimulatedPrinter::new(
            Duration::from_secs(2),
            Duration::from_secs(10),
            100 * 1024,
            0.0,
        );
        assert_eq!(printer.duration_for(0), Duration::from_secs(2));
        assert_eq!(printer.duration_for(500 * 1024), Duration::from_secs(5));
        assert_eq!(printer.duration_for(50 * 1024 * 1024), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn reliable_printer_reports_success() {
        let file = NamedTempFile::new().expect("temp file");
        std::fs::write(file.path(), b"%PDF-1.7").expect("write");

        let completion = instant(0.0).submit(file.path()).expect("submit");
        assert!(completion.wait().await);
    }

    #[tokio::test]
    async fn always_failing_printer_reports_failure() {
        let file = NamedTempFile::new().expect("temp file");
        std::fs::write(file.path(), b"%PDF-1.7").expect("write");

        let completion = instant(1.0).submit(file.path()).expect("submit");
        assert!(!completion.wait().await);
    }

    #[tokio::test]
    async fn missing_file_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = instant(0.0).submit(&dir.path().join("gone.pdf"));
        assert!(matches!(result, Err(WebPrintError::PrinterRejected(_))));
    }
}
