// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// System spooler printer.
//
// Runs `<command> <path>` (normally `lpr`) and reports success when the
// command exits zero.  Word documents are converted to PDF with a headless
// LibreOffice first, since spoolers generally cannot render `.docx`; the
// intermediate PDF lives in a temporary directory removed after spooling.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{error, info};

use webprint_core::error::{Result, WebPrintError};
use webprint_core::types::DocumentType;

use super::{Completion, Printer};

/// Office converter used for `.docx` input.
const CONVERTER: &str = "soffice";

pub struct SystemPrinter {
    command: String,
    convert_docx: bool,
}

impl SystemPrinter {
    pub fn new(command: impl Into<String>, convert_docx: bool) -> Self {
        Self {
            command: command.into(),
            convert_docx,
        }
    }
}

impl Printer for SystemPrinter {
    fn name(&self) -> &str {
        &self.command
    }

    fn submit(&self, path: &Path) -> Result<Completion> {
        if !path.is_file() {
            return Err(WebPrintError::PrinterRejected(format!(
                "{} is not a file",
                path.display()
            )));
        }

        let command = self.command.clone();
        let convert = self.convert_docx && is_docx(path);
        let path = path.to_path_buf();

        let (tx, completion) = Completion::channel();
        tokio::spawn(async move {
            let success = if convert {
                print_converted(&command, &path).await
            } else {
                spool(&command, &path).await
            };
            tx.complete(success);
        });
        Ok(completion)
    }
}

fn is_docx(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(DocumentType::from_extension)
        == Some(DocumentType::Docx)
}

/// Run the spooler on `path`.
async fn spool(command: &str, path: &Path) -> bool {
    match Command::new(command).arg(path).status().await {
        Ok(status) if status.success() => {
            info!(command, path = %path.display(), "document spooled");
            true
        }
        Ok(status) => {
            error!(command, path = %path.display(), %status, "spooler exited with failure");
            false
        }
        Err(e) => {
            error!(command, error = %e, "failed to run spooler");
            false
        }
    }
}

/// Convert a Word document to PDF, then spool the PDF.
async fn print_converted(command: &str, path: &Path) -> bool {
    let outdir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            error!(error = %e, "cannot create conversion directory");
            return false;
        }
    };

    info!(path = %path.display(), "converting document to PDF");
    let converted = Command::new(CONVERTER)
        .args(["--headless", "--convert-to", "pdf"])
        .arg(path)
        .arg("--outdir")
        .arg(outdir.path())
        .status()
        .await;

    match converted {
        Ok(status) if status.success() => {}
        Ok(status) => {
            error!(%status, "document conversion failed");
            return false;
        }
        Err(e) => {
            error!(error = %e, "failed to run {CONVERTER}");
            return false;
        }
    }

    let pdf = converted_path(outdir.path(), path);
    if !pdf.is_file() {
        error!(expected = %pdf.display(), "converter produced no PDF");
        return false;
    }
    spool(command, &pdf).await
}

fn converted_path(outdir: &Path, source: &Path) -> PathBuf {
    // The converter keeps every dot in the stem and appends `.pdf`.
    let mut name = source.file_stem().unwrap_or(source.as_os_str()).to_os_string();
    name.push(".pdf");
    outdir.join(name)
}
