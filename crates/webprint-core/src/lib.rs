// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Webprint core types, errors and configuration shared across all crates.

pub mod config;
pub mod error;
pub mod integrity;
pub mod types;

pub use config::{AppConfig, PrinterBackend};
pub use error::WebPrintError;
pub use types::*;
