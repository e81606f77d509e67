//! Result-file parsing
//!
//! The measurement tool writes a `;`-separated file: `#key:;value` metadata
//! comments, a blank line, the `counter;latency;delayTime` header and one
//! row per measured press with the latency in microseconds.

use super::stats::Stats;
use super::IngestError;
use crate::config::ResultsConfig;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

pub const DATA_HEADER: &str = "counter;latency;delayTime";
const DELIMITER: char = ';';
const COMMENT_MARKER: char = '#';

/// Metadata comment lines in file order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

impl Metadata {
    /// Value of the first entry named `key`; empty values count as absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn device(&self) -> Option<&str> {
        self.get("Device")
    }

    pub fn button(&self) -> Option<u16> {
        self.get("Button")?.parse().ok()
    }

    pub fn iterations(&self) -> Option<u32> {
        self.get("iterations")?.parse().ok()
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything read from one result file
#[derive(Debug, Clone, PartialEq)]
pub struct Ingestion {
    pub metadata: Metadata,
    /// Latencies in milliseconds, in file order
    pub samples: Vec<f64>,
    pub stats: Stats,
    /// Samples above the display ceiling (still part of `stats`)
    pub over_ceiling: usize,
}

/// Reads result files and computes their statistics
#[derive(Debug, Clone)]
pub struct ResultIngestor {
    display_ceiling_ms: f64,
}

impl ResultIngestor {
    pub fn new(config: &ResultsConfig) -> Self {
        Self {
            display_ceiling_ms: config.display_ceiling_ms,
        }
    }

    pub fn ingest(&self, path: &Path) -> Result<Ingestion, IngestError> {
        let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => IngestError::FileMissing(path.to_path_buf()),
            _ => IngestError::Io(e),
        })?;

        let ingestion = self.parse(&contents)?;
        info!(
            "Ingested {} samples from {}",
            ingestion.samples.len(),
            path.display()
        );
        Ok(ingestion)
    }

    /// Parse result-file contents
    pub fn parse(&self, contents: &str) -> Result<Ingestion, IngestError> {
        let mut metadata = Metadata::default();
        let mut samples = Vec::new();
        let mut in_data = false;

        for (index, raw) in contents.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim_end_matches('\r');

            // Everything after the header is a data row
            if in_data {
                if line.trim().is_empty() {
                    continue;
                }
                samples.push(parse_row(line, line_no)?);
            } else if line.starts_with(COMMENT_MARKER) {
                metadata.entries.push(parse_comment(line, line_no)?);
            } else if line == DATA_HEADER {
                in_data = true;
            } else if !line.trim().is_empty() {
                debug!("Skipping line {} before the data header: {:?}", line_no, line);
            }
        }

        if !in_data {
            return Err(IngestError::parse(0, format!("missing {DATA_HEADER:?} header")));
        }
        let stats = Stats::from_samples(&samples)
            .ok_or_else(|| IngestError::parse(0, "data section has no rows"))?;

        let over_ceiling = samples
            .iter()
            .filter(|&&ms| ms > self.display_ceiling_ms)
            .count();
        if over_ceiling > 0 {
            warn!(
                "{} of {} samples exceed the display ceiling of {} ms",
                over_ceiling,
                samples.len(),
                self.display_ceiling_ms
            );
        }

        Ok(Ingestion {
            metadata,
            samples,
            stats,
            over_ceiling,
        })
    }
}

/// `#Device:;Cherry G80` -> (`Device`, `Cherry G80`)
fn parse_comment(line: &str, line_no: usize) -> Result<(String, String), IngestError> {
    let body = &line[COMMENT_MARKER.len_utf8()..];
    let (key, value) = body
        .split_once(DELIMITER)
        .ok_or_else(|| IngestError::parse(line_no, "metadata line has no ';' separator"))?;
    let key = key.trim().trim_end_matches(':');
    Ok((key.to_string(), value.trim().to_string()))
}

/// Latency of a `counter;latency;delayTime` row, in milliseconds
fn parse_row(line: &str, line_no: usize) -> Result<f64, IngestError> {
    let mut fields = line.split(DELIMITER);
    let latency = fields
        .nth(1)
        .ok_or_else(|| IngestError::parse(line_no, "data row has no latency field"))?
        .trim();
    let micros: f64 = latency
        .parse()
        .map_err(|_| IngestError::parse(line_no, format!("latency {latency:?} is not a number")))?;
    if !micros.is_finite() {
        return Err(IngestError::parse(line_no, format!("latency {latency:?} is not finite")));
    }
    Ok(micros / 1000.0)
}
