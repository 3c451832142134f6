// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Webprint: shared print station.
//
// Entry point. Initialises logging, loads configuration, builds the print
// service and runs the requested command.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use webprint_core::error::{Result, WebPrintError};
use webprint_core::types::{JobId, JobStatus};
use webprint_core::AppConfig;
use webprint_print::PrintService;

/// How often `print` polls job status while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "webprint")]
#[command(about = "Upload documents to the print station and print them one at a time")]
struct Cli {
    /// Configuration file (JSON). Defaults are used when it does not exist
    #[arg(long, default_value = "webprint.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print documents and wait until each has finished
    Print {
        /// Documents to print (pdf, jpg, jpeg, png, docx)
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Upload in chunks of this many bytes instead of in one piece
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        chunk_size: Option<u32>,
    },
    /// Show the effective configuration
    Config {
        /// Also write it to the configuration file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                config.save(&cli.config)?;
                info!(path = %cli.config.display(), "configuration saved");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Print { files, chunk_size } => {
            info!("webprint starting");
            let service = PrintService::new(config)?;
            let reaper = service.spawn_session_reaper();

            let mut jobs = Vec::with_capacity(files.len());
            for path in &files {
                match submit(&service, path, chunk_size.map(|n| n as usize)).await {
                    Ok(id) => {
                        println!("{}: queued as job {id}", path.display());
                        jobs.push((id, path.clone()));
                    }
                    Err(e) => eprintln!("{}: {e}", path.display()),
                }
            }

            let failed = wait_for_jobs(&service, &jobs).await + (files.len() - jobs.len());
            if let Some(reaper) = reaper {
                reaper.abort();
            }

            if failed == 0 {
                Ok(ExitCode::SUCCESS)
            } else {
                warn!(failed, "some documents were not printed");
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

/// Upload one document, in chunks if asked, and queue it.
async fn submit(service: &PrintService, path: &Path, chunk_size: Option<usize>) -> Result<JobId> {
    let bytes = tokio::fs::read(path).await?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let service = service.clone();
    tokio::task::spawn_blocking(move || match chunk_size {
        Some(size) => upload_chunked(&service, &filename, &bytes, size),
        None => service.submit_direct(&bytes, &filename),
    })
    .await
    .map_err(|e| WebPrintError::Runtime(e.to_string()))?
}

/// Chunks go up last-first; the assembler orders them by index.
fn upload_chunked(
    service: &PrintService,
    filename: &str,
    bytes: &[u8],
    chunk_size: usize,
) -> Result<JobId> {
    let chunks: Vec<&[u8]> = bytes.chunks(chunk_size).collect();
    let total = u32::try_from(chunks.len())
        .map_err(|_| WebPrintError::InvalidParameter(format!("{} chunks", chunks.len())))?;

    let id = service.init_chunked_upload(filename, total, bytes.len() as u64)?;
    for (index, chunk) in chunks.iter().enumerate().rev() {
        service.upload_chunk(id, index as u32, chunk)?;
    }
    service.finalize_chunked_upload(id)
}

/// Report status changes until every job is terminal.  Returns the number
/// of jobs that ended in error.
async fn wait_for_jobs(service: &PrintService, jobs: &[(JobId, PathBuf)]) -> usize {
    let mut seen: HashMap<JobId, JobStatus> = HashMap::new();
    loop {
        let mut pending = 0;
        for (id, path) in jobs {
            let status = service.status(*id);
            if seen.insert(*id, status) != Some(status) {
                println!("{}: {status}", path.display());
            }
            if !status.is_terminal() {
                pending += 1;
            }
        }
        if pending == 0 {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    seen.values().filter(|s| **s == JobStatus::Error).count()
}
