//! Result files and latency statistics

mod ingest;
mod stats;

pub use ingest::{Ingestion, Metadata, ResultIngestor, DATA_HEADER};
pub use stats::Stats;

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for result ingestion
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Result file {} does not exist", .0.display())]
    FileMissing(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Line 0 means the file as a whole
    #[error("Parse error at line {line}: {detail}")]
    Parse { line: usize, detail: String },
}

impl IngestError {
    pub(crate) fn parse(line: usize, detail: impl Into<String>) -> Self {
        Self::Parse {
            line,
            detail: detail.into(),
        }
    }
}
