// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print service: the boundary facade.
//
// Wires the chunk assembler, status store and scheduler together and gives
// outer surfaces (CLI, HTTP adapters) one object to call.  This is also where
// the document allow-list is enforced; size and chunk-count limits are
// checked again by the assembler on its own.
//
// Upload operations do blocking file I/O and are plain functions; only the
// file download is async.

use std::io;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use webprint_core::error::{Result, WebPrintError};
use webprint_core::types::{
    DocumentType, JobId, JobStatus, PrintJob, QueueSnapshot, sanitize_filename,
};
use webprint_core::AppConfig;

use crate::chunks::{AssembledUpload, ChunkAssembler};
use crate::printer::{self, Printer};
use crate::scheduler::PrintScheduler;
use crate::status::StatusStore;

/// Shared print pipeline.  Cheap to clone; clones drive the same queue.
#[derive(Clone)]
pub struct PrintService {
    config: Arc<AppConfig>,
    assembler: Arc<ChunkAssembler>,
    scheduler: PrintScheduler,
}

impl PrintService {
    /// Build the pipeline with the printer selected in `config`.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn new(config: AppConfig) -> Result<Self> {
        let printer = printer::from_config(&config.printer);
        Self::with_printer(config, printer)
    }

    /// Build the pipeline around an explicit printer.
    pub fn with_printer(config: AppConfig, printer: Arc<dyn Printer>) -> Result<Self> {
        config.validate()?;
        let assembler = ChunkAssembler::from_config(&config)?;
        let scheduler = PrintScheduler::new(StatusStore::new(), printer)?;

        info!(
            upload_dir = %config.upload_dir.display(),
            chunk_dir = %config.chunk_dir.display(),
            "print service initialised"
        );
        Ok(Self {
            config: Arc::new(config),
            assembler: Arc::new(assembler),
            scheduler,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn assembler(&self) -> &ChunkAssembler {
        &self.assembler
    }

    /// Store a whole document and queue it for printing.
    pub fn submit_direct(&self, bytes: &[u8], filename: &str) -> Result<JobId> {
        let document_type = allowed_type(filename)?;
        let upload = self.assembler.store_whole(filename, bytes)?;
        Ok(self.enqueue(upload, document_type))
    }

    /// Open a chunked upload.  The returned id names both the upload session
    /// and, once finalized, the print job.
    pub fn init_chunked_upload(
        &self,
        filename: &str,
        total_chunks: u32,
        file_size: u64,
    ) -> Result<JobId> {
        allowed_type(filename)?;
        self.assembler.init_session(filename, total_chunks, file_size)
    }

    /// Store one chunk.  Returns whether every chunk has now arrived.
    pub fn upload_chunk(&self, id: JobId, index: u32, bytes: &[u8]) -> Result<bool> {
        let receipt = self.assembler.accept_chunk(id, index, bytes)?;
        Ok(receipt.all_received)
    }

    /// Reassemble a finished upload and queue it for printing.
    pub fn finalize_chunked_upload(&self, id: JobId) -> Result<JobId> {
        let upload = self.assembler.complete(id)?;
        let document_type = match allowed_type(&upload.filename) {
            Ok(document_type) => document_type,
            Err(e) => {
                crate::worker::remove_document(&upload.path);
                return Err(e);
            }
        };
        Ok(self.enqueue(upload, document_type))
    }

    /// Status of a job; `Unknown` for ids never admitted.
    pub fn status(&self, id: JobId) -> JobStatus {
        self.scheduler.status().get(id)
    }

    pub fn queue_snapshot(&self) -> QueueSnapshot {
        self.scheduler.status().snapshot()
    }

    /// Every admitted job, oldest first.
    pub fn jobs(&self) -> Vec<PrintJob> {
        self.scheduler.status().jobs()
    }

    /// Open the stored document of a job that has not finished printing.
    ///
    /// Fails with `UnknownJob` for ids never admitted and `FileGone` once the
    /// document has been consumed.
    pub async fn fetch_assembled_file(&self, id: JobId) -> Result<tokio::fs::File> {
        let job = self
            .scheduler
            .status()
            .job(id)
            .ok_or(WebPrintError::UnknownJob(id))?;
        if job.status.is_terminal() {
            return Err(WebPrintError::FileGone(id));
        }
        match tokio::fs::File::open(&job.path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(WebPrintError::FileGone(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Periodically evict abandoned chunk sessions.
    ///
    /// Returns `None` when the reaper is disabled in configuration.
    pub fn spawn_session_reaper(&self) -> Option<JoinHandle<()>> {
        let period = self.config.reap_interval()?;
        let ttl = self.config.session_ttl();
        let assembler = Arc::clone(&self.assembler);
        info!(period_secs = period.as_secs(), ttl_secs = ttl.as_secs(), "session reaper started");

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let assembler = Arc::clone(&assembler);
                match tokio::task::spawn_blocking(move || assembler.evict_stale(ttl)).await {
                    Ok(0) => debug!("no stale upload sessions"),
                    Ok(evicted) => info!(evicted, "stale upload sessions evicted"),
                    Err(e) => warn!(error = %e, "session reaper pass failed"),
                }
            }
        }))
    }

    fn enqueue(&self, upload: AssembledUpload, document_type: DocumentType) -> JobId {
        let job = PrintJob::new(
            upload.id,
            upload.filename,
            upload.path,
            document_type,
            upload.size_bytes,
            upload.document_hash,
        );
        let id = job.id;
        self.scheduler.enqueue(job);
        id
    }
}

/// Document type of an allow-listed filename.
fn allowed_type(filename: &str) -> Result<DocumentType> {
    let name = sanitize_filename(filename);
    DocumentType::from_filename(&name).ok_or_else(|| {
        warn!(filename, "rejecting unsupported document");
        WebPrintError::UnsupportedDocument(name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    use crate::printer::scripted::{Script, ScriptedPrinter};

    fn config(dir: &TempDir) -> AppConfig {
        AppConfig {
            upload_dir: dir.path().join("uploads"),
            chunk_dir: dir.path().join("uploads").join("chunks"),
            max_file_size: 1024,
            ..AppConfig::default()
        }
    }

    fn service(dir: &TempDir, script: Script) -> (PrintService, Arc<ScriptedPrinter>) {
        let printer = ScriptedPrinter::new(script);
        let service = PrintService::with_printer(config(dir), printer.clone()).expect("service");
        (service, printer)
    }

    async fn wait_for_status(service: &PrintService, id: JobId, status: JobStatus) {
        for _ in 0..1000 {
            if service.status(id) == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} never reached {status}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn out_of_order_chunks_print_in_index_order() {
        let dir = TempDir::new().expect("tempdir");
        let (service, printer) = service(&dir, Script::Manual);

        let id = service
            .init_chunked_upload("letter.pdf", 3, 9)
            .expect("init");
        assert!(!service.upload_chunk(id, 2, b"ghi").expect("chunk 2"));
        assert!(!service.upload_chunk(id, 0, b"abc").expect("chunk 0"));
        assert!(service.upload_chunk(id, 1, b"def").expect("chunk 1"));

        assert_eq!(service.finalize_chunked_upload(id).expect("finalize"), id);
        assert_ne!(service.status(id), JobStatus::Unknown);

        let mut contents = String::new();
        service
            .fetch_assembled_file(id)
            .await
            .expect("assembled file")
            .read_to_string(&mut contents)
            .await
            .expect("read");
        assert_eq!(contents, "abcdefghi");

        let job = service.jobs().into_iter().find(|job| job.id == id).expect("job");
        assert_eq!(job.size_bytes, 9);
        assert_eq!(job.document_type, DocumentType::Pdf);
        assert_eq!(job.document_hash, webprint_core::integrity::hash_bytes(b"abcdefghi"));

        wait_for_status(&service, id, JobStatus::Printing).await;
        assert!(printer.finish_next(true));
        wait_for_status(&service, id, JobStatus::Completed).await;

        assert!(!job.path.exists());
        assert!(matches!(
            service.fetch_assembled_file(id).await,
            Err(WebPrintError::FileGone(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn direct_submission_prints_and_cleans_up() {
        let dir = TempDir::new().expect("tempdir");
        let (service, printer) = service(&dir, Script::Auto { success: true });

        let id = service.submit_direct(b"%PDF-1.7", "scan.png").expect("submit");
        wait_for_status(&service, id, JobStatus::Completed).await;

        assert_eq!(printer.submitted().len(), 1);
        assert!(!printer.submitted()[0].exists());
        for _ in 0..200 {
            if !service.queue_snapshot().is_printing {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(service.queue_snapshot(), QueueSnapshot::default());
    }

    #[tokio::test]
    async fn disallowed_documents_are_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let (service, printer) = service(&dir, Script::Manual);

        assert!(matches!(
            service.submit_direct(b"MZ", "setup.exe"),
            Err(WebPrintError::UnsupportedDocument(_))
        ));
        assert!(matches!(
            service.init_chunked_upload("notes", 2, 10),
            Err(WebPrintError::UnsupportedDocument(_))
        ));
        assert!(matches!(
            service.submit_direct(b"", "empty.pdf"),
            Err(WebPrintError::InvalidParameter(_))
        ));
        assert!(matches!(
            service.submit_direct(&[0u8; 2048], "huge.pdf"),
            Err(WebPrintError::InvalidParameter(_))
        ));
        assert!(printer.submitted().is_empty());
        assert!(service.jobs().is_empty());
    }

    #[tokio::test]
    async fn incomplete_upload_cannot_be_finalized() {
        let dir = TempDir::new().expect("tempdir");
        let (service, _printer) = service(&dir, Script::Manual);

        let id = service.init_chunked_upload("photo.jpg", 3, 9).expect("init");
        service.upload_chunk(id, 1, b"def").expect("chunk");

        match service.finalize_chunked_upload(id) {
            Err(WebPrintError::MissingChunks(missing)) => assert_eq!(missing, vec![0, 2]),
            other => panic!("expected missing chunks, got {other:?}"),
        }
        assert_eq!(service.status(id), JobStatus::Unknown);
        assert_eq!(service.assembler().received(id).expect("session"), vec![1]);
    }

    #[tokio::test]
    async fn unknown_ids() {
        let dir = TempDir::new().expect("tempdir");
        let (service, _printer) = service(&dir, Script::Manual);
        let id = JobId::new();

        assert_eq!(service.status(id), JobStatus::Unknown);
        assert!(matches!(
            service.fetch_assembled_file(id).await,
            Err(WebPrintError::UnknownJob(_))
        ));
        assert!(matches!(
            service.upload_chunk(id, 0, b"x"),
            Err(WebPrintError::UnknownSession(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reaper_evicts_abandoned_sessions() {
        let dir = TempDir::new().expect("tempdir");
        let config = AppConfig {
            session_ttl_secs: 0,
            reap_interval_secs: Some(1),
            ..config(&dir)
        };
        let service =
            PrintService::with_printer(config, ScriptedPrinter::new(Script::Manual)).expect("service");

        let id = service.init_chunked_upload("old.pdf", 2, 4).expect("init");
        service.upload_chunk(id, 0, b"ab").expect("chunk");
        let reaper = service.spawn_session_reaper().expect("reaper enabled");

        for _ in 0..400 {
            if service.assembler().active_sessions() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        reaper.abort();

        assert_eq!(service.assembler().active_sessions(), 0);
        assert!(matches!(
            service.upload_chunk(id, 1, b"cd"),
            Err(WebPrintError::UnknownSession(_))
        ));
    }

    #[tokio::test]
    async fn reaper_can_be_disabled() {
        let dir = TempDir::new().expect("tempdir");
        let config = AppConfig {
            reap_interval_secs: None,
            ..config(&dir)
        };
        let service =
            PrintService::with_printer(config, ScriptedPrinter::new(Script::Manual)).expect("service");
        assert!(service.spawn_session_reaper().is_none());
    }
}
