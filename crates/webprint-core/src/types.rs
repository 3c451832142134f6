// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Webprint print station.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a print job.
///
/// Chunked uploads are keyed by the same identifier: the session id handed
/// out at upload start becomes the job id once the document is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle states of a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in the queue for the printer.
    Queued,
    /// Handed to the printer, outcome not yet known.
    Printing,
    /// Printed successfully.
    Completed,
    /// Failed: file missing, submission rejected or printer reported failure.
    Error,
    /// Never seen by this process.
    Unknown,
}

impl JobStatus {
    /// Whether no further transition can happen from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Printing => "printing",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepted input document types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentType {
    Pdf,
    Jpeg,
    Png,
    /// Word document, converted to PDF before it reaches a system printer.
    Docx,
}

impl DocumentType {
    /// MIME type string.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }

    /// Infer document type from file extension. `None` means not allowed.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    /// Infer document type from a file name's last extension.
    pub fn from_filename(name: &str) -> Option<Self> {
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        Self::from_extension(ext)
    }
}

/// A document admitted to the print pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: JobId,
    /// Display filename (already sanitized).
    pub name: String,
    /// Location of the fully assembled document.
    pub path: PathBuf,
    pub document_type: DocumentType,
    pub size_bytes: u64,
    /// SHA-256 hash of the document bytes.
    pub document_hash: String,
    pub enqueued_at: DateTime<Utc>,
    pub status: JobStatus,
}

impl PrintJob {
    pub fn new(
        id: JobId,
        name: String,
        path: PathBuf,
        document_type: DocumentType,
        size_bytes: u64,
        document_hash: String,
    ) -> Self {
        Self {
            id,
            name,
            path,
            document_type,
            size_bytes,
            document_hash,
            enqueued_at: Utc::now(),
            status: JobStatus::Queued,
        }
    }
}

/// Queue depth and printer occupancy, read together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub queue_depth: usize,
    pub is_printing: bool,
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Keeps ASCII alphanumerics, `.`, `-` and `_`; whitespace becomes `_`;
/// anything else (including path separators) is dropped. Leading dots and
/// underscores are stripped so the result can never be hidden or relative.
pub fn sanitize_filename(name: &str) -> String {
    // Only the final path component is meaningful.
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let mut cleaned = String::with_capacity(base.len());
    for c in base.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
            cleaned.push(c);
        } else if c.is_whitespace() {
            cleaned.push('_');
        }
    }

    let trimmed = cleaned.trim_start_matches(['.', '_']).trim_end_matches('_');
    if trimmed.is_empty() {
        "document".to_owned()
    } else {
        trimmed.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Printing).expect("serialize");
        assert_eq!(json, "\"printing\"");
        assert_eq!(JobStatus::Unknown.to_string(), "unknown");
    }

    #[test]
    fn only_completed_and_error_are_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Printing.is_terminal());
        assert!(!JobStatus::Unknown.is_terminal());
    }

    #[test]
    fn allow_list_is_case_insensitive() {
        assert_eq!(DocumentType::from_filename("Report.PDF"), Some(DocumentType::Pdf));
        assert_eq!(DocumentType::from_filename("scan.jpeg"), Some(DocumentType::Jpeg));
        assert_eq!(DocumentType::from_filename("letter.docx"), Some(DocumentType::Docx));
        assert_eq!(DocumentType::from_filename("notes.txt"), None);
        assert_eq!(DocumentType::from_filename("pdf"), None);
        assert_eq!(DocumentType::from_filename(".pdf"), None);
    }

    #[test]
    fn sanitize_strips_paths_and_odd_characters() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\My File.pdf"), "My_File.pdf");
        assert_eq!(sanitize_filename("...hidden.png"), "hidden.png");
        assert_eq!(sanitize_filename("résumé.pdf"), "rsum.pdf");
        assert_eq!(sanitize_filename("///"), "document");
    }

    #[test]
    fn job_id_round_trips_through_display() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().expect("parse");
        assert_eq!(parsed, id);
    }
}
