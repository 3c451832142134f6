// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WebPrintError};

/// Largest accepted document (100 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Largest accepted chunk count for one upload.
pub const DEFAULT_MAX_CHUNKS: u32 = 1000;

/// Which printer implementation backs the print worker.
///
/// Resolved once at startup; the pipeline only ever sees the capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrinterBackend {
    /// Pretends to print: sleeps in proportion to file size, occasionally fails.
    Simulated {
        min_duration_ms: u64,
        max_duration_ms: u64,
        /// Simulated throughput used to derive the print time.
        bytes_per_second: u64,
        /// Probability in `[0, 1]` that a print reports failure.
        failure_rate: f64,
    },
    /// Hands the file to the system spooler.
    System {
        /// Spooler command, invoked as `<command> <path>`.
        command: String,
        /// Convert `.docx` to PDF with LibreOffice before spooling.
        convert_docx: bool,
    },
}

impl Default for PrinterBackend {
    fn default() -> Self {
        Self::Simulated {
            min_duration_ms: 2_000,
            max_duration_ms: 10_000,
            bytes_per_second: 100 * 1024,
            failure_rate: 0.05,
        }
    }
}

/// Persistent application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding directly uploaded and assembled documents.
    pub upload_dir: PathBuf,
    /// Directory holding per-session chunk directories.
    pub chunk_dir: PathBuf,
    /// Upper bound on `total_chunks` for a chunked upload.
    pub max_chunks: u32,
    /// Upper bound on document size in bytes.
    pub max_file_size: u64,
    /// Reject reassembled documents whose length differs from the declared size.
    /// When false the mismatch is only logged.
    pub strict_size_check: bool,
    /// Chunk sessions older than this are evicted by the reaper.
    pub session_ttl_secs: u64,
    /// How often the reaper runs; `None` disables it.
    pub reap_interval_secs: Option<u64>,
    pub printer: PrinterBackend,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            chunk_dir: PathBuf::from("uploads").join("chunks"),
            max_chunks: DEFAULT_MAX_CHUNKS,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            strict_size_check: false,
            session_ttl_secs: 3600,
            reap_interval_secs: Some(300),
            printer: PrinterBackend::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file, falling back to defaults when the
    /// file does not exist. A file that exists but does not parse is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Persist the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject settings that would make every upload fail.
    pub fn validate(&self) -> Result<()> {
        if self.max_chunks == 0 {
            return Err(WebPrintError::Config("max_chunks must be positive".into()));
        }
        if self.max_file_size == 0 {
            return Err(WebPrintError::Config("max_file_size must be positive".into()));
        }
        if self.reap_interval_secs == Some(0) {
            return Err(WebPrintError::Config("reap_interval_secs must be positive".into()));
        }
        match &self.printer {
            PrinterBackend::Simulated {
                min_duration_ms,
                max_duration_ms,
                bytes_per_second,
                failure_rate,
            } => {
                if !(0.0..=1.0).contains(failure_rate) {
                    return Err(WebPrintError::Config(format!(
                        "failure_rate {failure_rate} outside [0, 1]"
                    )));
                }
                if min_duration_ms > max_duration_ms {
                    return Err(WebPrintError::Config(
                        "min_duration_ms exceeds max_duration_ms".into(),
                    ));
                }
                if *bytes_per_second == 0 {
                    return Err(WebPrintError::Config("bytes_per_second must be positive".into()));
                }
            }
            PrinterBackend::System { command, .. } => {
                if command.trim().is_empty() {
                    return Err(WebPrintError::Config("printer command is empty".into()));
                }
            }
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn reap_interval(&self) -> Option<Duration> {
        self.reap_interval_secs.map(Duration::from_secs)
    }
}
