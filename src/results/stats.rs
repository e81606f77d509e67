//! Descriptive statistics over latency samples

use crate::utils::{round_to, MinMaxExt};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Summary of one sample set, in milliseconds.
///
/// Values are kept at full precision; use [`Stats::rounded`] for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

impl Stats {
    /// Compute statistics, or `None` for an empty sample set
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let count = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / count;
        let variance = samples
            .iter()
            .map(|&x| {
                let diff = x - mean;
                diff * diff
            })
            .sum::<f64>()
            / count;

        let mut min: Option<f64> = None;
        let mut max: Option<f64> = None;
        for &value in samples {
            min.update_min(value);
            max.update_max(value);
        }

        Some(Self {
            mean,
            median: median(samples),
            min: min.unwrap_or(mean),
            max: max.unwrap_or(mean),
            std_dev: variance.sqrt(),
        })
    }

    /// Copy with every value rounded to `places` decimals
    pub fn rounded(&self, places: u32) -> Self {
        Self {
            mean: round_to(self.mean, places),
            median: round_to(self.median, places),
            min: round_to(self.min, places),
            max: round_to(self.max, places),
            std_dev: round_to(self.std_dev, places),
        }
    }

    /// Rating of the mean latency
    pub fn rating(&self) -> &'static str {
        match self.mean {
            ms if ms < 5.0 => "Excellent (<5ms)",
            ms if ms < 10.0 => "Great (<10ms)",
            ms if ms < 20.0 => "Good (<20ms)",
            ms if ms < 50.0 => "Acceptable (<50ms)",
            _ => "Poor (>50ms)",
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let places = f.precision().unwrap_or(3);
        write!(
            f,
            "Mean: {:.p$} ms  Median: {:.p$} ms  Min: {:.p$} ms  Max: {:.p$} ms  Std Dev: {:.p$} ms",
            self.mean,
            self.median,
            self.min,
            self.max,
            self.std_dev,
            p = places
        )
    }
}

fn median(samples: &[f64]) -> f64 {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
