//! Measurement report and export functionality

use crate::results::{Ingestion, Stats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Complete measurement report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Report metadata
    pub metadata: ReportMetadata,
    /// `key`/`value` pairs from the result file header
    pub measurement: Vec<MetadataEntry>,
    /// Summary statistics
    pub summary: LatencySummary,
    /// Every sample in milliseconds, in measurement order
    pub latencies_ms: Vec<f64>,
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Report generation timestamp
    pub generated_at: String,
    /// Application version
    pub version: String,
    /// Result file the report was built from
    pub source_file: String,
}

/// Single metadata entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

/// Latency summary statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySummary {
    /// Number of samples
    pub samples: usize,
    /// Statistics rounded for presentation
    pub stats: Stats,
    /// Rating of the mean latency
    pub rating: String,
    /// Samples above the display ceiling
    pub over_ceiling: usize,
}

impl SessionReport {
    /// Create a report from an ingested result file
    pub fn new(source_file: &Path, ingestion: &Ingestion, decimal_places: u32) -> Self {
        let now: DateTime<Utc> = Utc::now();

        Self {
            metadata: ReportMetadata {
                generated_at: now.to_rfc3339(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                source_file: source_file.display().to_string(),
            },
            measurement: ingestion
                .metadata
                .entries()
                .iter()
                .map(|(key, value)| MetadataEntry {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
            summary: LatencySummary {
                samples: ingestion.samples.len(),
                stats: ingestion.stats.rounded(decimal_places),
                rating: ingestion.stats.rating().to_string(),
                over_ceiling: ingestion.over_ceiling,
            },
            latencies_ms: ingestion.samples.clone(),
        }
    }

    /// Export report to JSON file
    pub fn export_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Export report to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
