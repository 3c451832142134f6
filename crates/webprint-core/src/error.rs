// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Webprint.

use thiserror::Error;

use crate::types::JobId;

/// Top-level error type for all Webprint operations.
#[derive(Debug, Error)]
pub enum WebPrintError {
    // -- Validation --
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("chunk index {index} out of range (session has {total} chunks)")]
    IndexOutOfRange { index: u32, total: u32 },

    #[error("empty chunk")]
    EmptyChunk,

    #[error("unsupported document type: {0}")]
    UnsupportedDocument(String),

    // -- Upload sessions --
    #[error("unknown upload session {0}")]
    UnknownSession(JobId),

    #[error("upload incomplete, missing chunks {0:?}")]
    MissingChunks(Vec<u32>),

    #[error("assembled size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    // -- Jobs --
    #[error("unknown job {0}")]
    UnknownJob(JobId),

    #[error("document for job {0} is no longer available")]
    FileGone(JobId),

    #[error("printer rejected submission: {0}")]
    PrinterRejected(String),

    // -- Infrastructure --
    #[error("async runtime unavailable: {0}")]
    Runtime(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, WebPrintError>;
