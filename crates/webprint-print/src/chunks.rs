// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Chunked upload reassembly.
//
// Large documents arrive as numbered fragments, in any order and possibly
// more than once.  Each fragment is written to `<chunk_dir>/<id>/chunk_<n>`
// before the upload call returns; session bookkeeping (which indices have
// arrived) lives in memory.  Completion concatenates the fragments strictly
// by index into `<upload_dir>/<id>_<filename>` and hands that file over to
// the print pipeline.
//
// Session metadata is held behind two levels of locking: a map lock taken
// only to look a session up, and a per-session lock held across that
// session's disk I/O.  The map lock is never held while waiting for a
// session lock, so uploads to different sessions never contend.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use webprint_core::error::{Result, WebPrintError};
use webprint_core::integrity::HashingWriter;
use webprint_core::types::{JobId, sanitize_filename};
use webprint_core::AppConfig;

use crate::lock;

/// Bounds enforced on every upload, independent of any boundary checks.
#[derive(Debug, Clone, Copy)]
pub struct ChunkLimits {
    pub max_chunks: u32,
    pub max_file_size: u64,
    /// Fail completion when the assembled length differs from the declared size.
    pub strict_size_check: bool,
}

impl From<&AppConfig> for ChunkLimits {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_chunks: config.max_chunks,
            max_file_size: config.max_file_size,
            strict_size_check: config.strict_size_check,
        }
    }
}

/// Bookkeeping for one in-progress chunked upload.
#[derive(Debug)]
pub struct ChunkSession {
    pub id: JobId,
    pub filename: String,
    pub total_chunks: u32,
    pub expected_size: u64,
    pub created_at: DateTime<Utc>,
    /// Length of each stored chunk, by index.
    received: BTreeMap<u32, u64>,
    /// Sum of `received` lengths.
    received_bytes: u64,
    dir: PathBuf,
    /// Set once the session has been assembled or evicted.  Callers that
    /// raced the removal and still hold the session see it as unknown.
    closed: bool,
}

impl ChunkSession {
    fn chunk_path(&self, index: u32) -> PathBuf {
        self.dir.join(format!("chunk_{index}"))
    }

    fn is_complete(&self) -> bool {
        self.received.len() == self.total_chunks as usize
    }

    /// Every index in `[0, total_chunks)` not yet received, ascending.
    fn missing(&self) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|i| !self.received.contains_key(i))
            .collect()
    }
}

/// Result of accepting one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkReceipt {
    pub index: u32,
    /// Distinct indices received so far.
    pub received: usize,
    pub all_received: bool,
}

/// A document written to the upload directory, ready to become a job.
#[derive(Debug, Clone)]
pub struct AssembledUpload {
    pub id: JobId,
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub document_hash: String,
}

/// Map entry for a session.  The creation time is kept outside the session
/// mutex so eviction can judge age without waiting on in-flight I/O.
struct SessionEntry {
    created_at: DateTime<Utc>,
    session: Arc<Mutex<ChunkSession>>,
}

/// Tracks chunked uploads and reassembles them.
pub struct ChunkAssembler {
    sessions: Mutex<HashMap<JobId, SessionEntry>>,
    upload_dir: PathBuf,
    chunk_dir: PathBuf,
    limits: ChunkLimits,
}

impl ChunkAssembler {
    /// Create an assembler writing into the given directories, creating them
    /// if needed.
    pub fn new(
        upload_dir: impl Into<PathBuf>,
        chunk_dir: impl Into<PathBuf>,
        limits: ChunkLimits,
    ) -> Result<Self> {
        let upload_dir = upload_dir.into();
        let chunk_dir = chunk_dir.into();
        fs::create_dir_all(&upload_dir)?;
        fs::create_dir_all(&chunk_dir)?;

        Ok(Self {
            sessions: Mutex::new(HashMap::new()),
            upload_dir,
            chunk_dir,
            limits,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(&config.upload_dir, &config.chunk_dir, ChunkLimits::from(config))
    }

    pub fn limits(&self) -> ChunkLimits {
        self.limits
    }

    /// Start a chunked upload and return its id.
    #[instrument(skip(self))]
    pub fn init_session(
        &self,
        filename: &str,
        total_chunks: u32,
        expected_size: u64,
    ) -> Result<JobId> {
        if total_chunks == 0 || total_chunks > self.limits.max_chunks {
            warn!(total_chunks, "rejecting chunk count");
            return Err(WebPrintError::InvalidParameter(format!(
                "total_chunks must be in 1..={}, got {total_chunks}",
                self.limits.max_chunks
            )));
        }
        if expected_size == 0 || expected_size > self.limits.max_file_size {
            warn!(expected_size, "rejecting file size");
            return Err(WebPrintError::InvalidParameter(format!(
                "file size must be in 1..={}, got {expected_size}",
                self.limits.max_file_size
            )));
        }

        let id = JobId::new();
        let dir = self.chunk_dir.join(id.to_string());
        fs::create_dir_all(&dir)?;

        let session = ChunkSession {
            id,
            filename: sanitize_filename(filename),
            total_chunks,
            expected_size,
            created_at: Utc::now(),
            received: BTreeMap::new(),
            received_bytes: 0,
            dir,
            closed: false,
        };
        info!(
            session_id = %id,
            filename = %session.filename,
            total_chunks,
            expected_size,
            "chunked upload started"
        );

        let entry = SessionEntry {
            created_at: session.created_at,
            session: Arc::new(Mutex::new(session)),
        };
        lock(&self.sessions).insert(id, entry);
        Ok(id)
    }

    /// Store one chunk, overwriting any earlier chunk with the same index.
    ///
    /// The bytes are on disk (synced) before this returns.  A chunk longer
    /// than the declared document, or one that would take the session past
    /// `max_file_size`, is refused.  Validation failures leave the session
    /// untouched.
    #[instrument(skip(self, bytes), fields(session_id = %id, len = bytes.len()))]
    pub fn accept_chunk(&self, id: JobId, index: u32, bytes: &[u8]) -> Result<ChunkReceipt> {
        let handle = self.session(id)?;
        let mut session = lock(&handle);
        if session.closed {
            return Err(WebPrintError::UnknownSession(id));
        }
        if index >= session.total_chunks {
            warn!(index, total = session.total_chunks, "chunk index out of range");
            return Err(WebPrintError::IndexOutOfRange {
                index,
                total: session.total_chunks,
            });
        }
        if bytes.is_empty() {
            return Err(WebPrintError::EmptyChunk);
        }

        let len = bytes.len() as u64;
        if len > session.expected_size {
            warn!(index, len, expected = session.expected_size, "chunk larger than document");
            return Err(WebPrintError::InvalidParameter(format!(
                "chunk {index} is {len} bytes, document is {} bytes",
                session.expected_size
            )));
        }
        let replaced = session.received.get(&index).copied().unwrap_or(0);
        let total = session.received_bytes - replaced + len;
        if total > self.limits.max_file_size {
            warn!(index, total, "upload exceeds size limit");
            return Err(WebPrintError::InvalidParameter(format!(
                "upload would reach {total} bytes, limit is {}",
                self.limits.max_file_size
            )));
        }

        write_synced(&session.chunk_path(index), bytes)?;
        if session.received.insert(index, len).is_some() {
            debug!(index, "chunk overwritten");
        }
        session.received_bytes = total;

        let receipt = ChunkReceipt {
            index,
            received: session.received.len(),
            all_received: session.is_complete(),
        };
        debug!(
            index,
            received = receipt.received,
            total = session.total_chunks,
            "chunk stored"
        );
        Ok(receipt)
    }

    /// Indices received so far for a session, ascending.
    pub fn received(&self, id: JobId) -> Result<Vec<u32>> {
        let handle = self.session(id)?;
        let session = lock(&handle);
        if session.closed {
            return Err(WebPrintError::UnknownSession(id));
        }
        Ok(session.received.keys().copied().collect())
    }

    /// Concatenate all chunks in index order into the upload directory and
    /// retire the session.
    ///
    /// An incomplete session is rejected with the exact missing indices and
    /// left as it was.  If writing the output fails, the session also
    /// survives so the caller can try again.
    #[instrument(skip(self), fields(session_id = %id))]
    pub fn complete(&self, id: JobId) -> Result<AssembledUpload> {
        let handle = self.session(id)?;
        let mut session = lock(&handle);
        if session.closed {
            return Err(WebPrintError::UnknownSession(id));
        }

        let missing = session.missing();
        if !missing.is_empty() {
            warn!(?missing, "upload incomplete");
            return Err(WebPrintError::MissingChunks(missing));
        }

        let output = self.document_path(id, &session.filename);
        let (document_hash, size_bytes) = match concatenate(&session, &output) {
            Ok(written) => written,
            Err(e) => {
                remove_file_quietly(&output);
                return Err(e.into());
            }
        };

        if size_bytes != session.expected_size {
            if self.limits.strict_size_check {
                remove_file_quietly(&output);
                return Err(WebPrintError::SizeMismatch {
                    expected: session.expected_size,
                    actual: size_bytes,
                });
            }
            warn!(
                expected = session.expected_size,
                actual = size_bytes,
                "assembled size does not match declared size"
            );
        }

        session.closed = true;
        let filename = session.filename.clone();
        let dir = session.dir.clone();
        drop(session);

        lock(&self.sessions).remove(&id);
        if let Err(e) = fs::remove_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "failed to remove chunk directory");
        }

        info!(
            filename = %filename,
            size_bytes,
            hash = %document_hash,
            "chunked upload assembled"
        );
        Ok(AssembledUpload {
            id,
            filename,
            path: output,
            size_bytes,
            document_hash,
        })
    }

    /// Write a document received in one piece under a fresh id.
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub fn store_whole(&self, filename: &str, bytes: &[u8]) -> Result<AssembledUpload> {
        let len = bytes.len() as u64;
        if len == 0 || len > self.limits.max_file_size {
            return Err(WebPrintError::InvalidParameter(format!(
                "file size must be in 1..={}, got {len}",
                self.limits.max_file_size
            )));
        }

        let id = JobId::new();
        let filename = sanitize_filename(filename);
        let path = self.document_path(id, &filename);

        let write = || -> io::Result<(String, u64)> {
            let mut writer = HashingWriter::new(BufWriter::new(File::create(&path)?));
            writer.write_all(bytes)?;
            let (buffered, hash, written) = writer.finish()?;
            buffered.into_inner().map_err(|e| e.into_error())?.sync_all()?;
            Ok((hash, written))
        };
        let (document_hash, size_bytes) = match write() {
            Ok(written) => written,
            Err(e) => {
                remove_file_quietly(&path);
                return Err(e.into());
            }
        };

        info!(job_id = %id, filename = %filename, size_bytes, "document stored");
        Ok(AssembledUpload {
            id,
            filename,
            path,
            size_bytes,
            document_hash,
        })
    }

    /// Drop sessions older than `ttl` together with their chunk files.
    ///
    /// Returns how many sessions were evicted.
    pub fn evict_stale(&self, ttl: Duration) -> usize {
        let now = Utc::now();
        let is_stale = |created_at: DateTime<Utc>| {
            now.signed_duration_since(created_at)
                .to_std()
                .is_ok_and(|age| age > ttl)
        };

        let stale: Vec<SessionEntry> = {
            let mut sessions = lock(&self.sessions);
            let ids: Vec<JobId> = sessions
                .iter()
                .filter(|(_, entry)| is_stale(entry.created_at))
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        // Session locks are taken only after the map lock is released.
        let mut evicted = 0;
        for entry in &stale {
            let mut session = lock(&entry.session);
            if session.closed {
                // Assembled while we waited; `complete` already cleaned up.
                continue;
            }
            session.closed = true;
            if let Err(e) = fs::remove_dir_all(&session.dir) {
                warn!(session_id = %session.id, error = %e, "failed to remove stale chunk directory");
            }
            info!(session_id = %session.id, received = session.received.len(), "stale upload evicted");
            evicted += 1;
        }
        evicted
    }

    /// Number of sessions still awaiting completion.
    pub fn active_sessions(&self) -> usize {
        lock(&self.sessions).len()
    }

    fn session(&self, id: JobId) -> Result<Arc<Mutex<ChunkSession>>> {
        lock(&self.sessions)
            .get(&id)
            .map(|entry| Arc::clone(&entry.session))
            .ok_or(WebPrintError::UnknownSession(id))
    }

    fn document_path(&self, id: JobId, filename: &str) -> PathBuf {
        self.upload_dir.join(format!("{id}_{filename}"))
    }
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

/// Write `bytes` to `path` via a sibling temp file so a reader never sees a
/// half-written chunk, syncing before the rename.
fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let partial = path.with_extension("part");
    let mut file = File::create(&partial)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&partial, path)
}

/// Stream every chunk, in index order, into `output`.  Returns the SHA-256
/// and length of what was written.
fn concatenate(session: &ChunkSession, output: &Path) -> io::Result<(String, u64)> {
    let mut writer = HashingWriter::new(BufWriter::new(File::create(output)?));
    for index in 0..session.total_chunks {
        let mut chunk = File::open(session.chunk_path(index))?;
        io::copy(&mut chunk, &mut writer)?;
    }
    let (buffered, hash, written) = writer.finish()?;
    buffered.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok((hash, written))
}

fn remove_file_quietly(path: &Path) {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            warn!(path = %path.display(), error = %e, "failed to remove partial document");
        }
        _ => {}
    }
}
