// ABOUTME: Public library API for verified Granola transcript export
// ABOUTME: Re-exports core modules for external use

pub mod api;
pub mod auth;
pub mod backoff;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod model;
pub mod ports;
pub mod progress;
pub mod storage;
pub mod util;
pub mod verify;

pub use error::{Error, Result};
pub use export::Exporter;
pub use model::{BatchOverall, BatchResult, ExportEvent, ExportOutcome, ExportStatus, Item};
