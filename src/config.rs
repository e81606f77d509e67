//! Configuration for LagBox
//!
//! Settings are read from a TOML file in the platform config directory.
//! Every section falls back to its defaults, so a partial file is fine.
//!
//! ## Config File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/lagbox/config.toml` |
//! | macOS | `~/Library/Application Support/lagbox/config.toml` |
//!
//! ## Example
//!
//! ```no_run
//! use lagbox::Config;
//!
//! let config = Config::load().unwrap_or_default();
//! println!("Measurement tool: {}", config.tool.program.display());
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to determine config directory
    #[error("Could not determine config directory")]
    NoConfigDir,
    /// IO error reading the config file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Failed to parse config file
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Failed to render the configuration
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Returns the path to the config file.
///
/// # Platform-specific paths
///
/// - Linux: `~/.config/lagbox/config.toml`
/// - macOS: `~/Library/Application Support/lagbox/config.toml`
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(config_dir.join("lagbox").join("config.toml"))
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// External measurement tool settings
    pub tool: ToolConfig,
    /// Device listing and sysfs locations
    pub devices: DeviceConfig,
    /// Button detection settings
    pub detection: DetectionConfig,
    /// Defaults for new measurement sessions
    pub measurement: MeasurementDefaults,
    /// Result ingestion settings
    pub results: ResultsConfig,
}

/// External measurement tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Program to launch (the tool itself, or a wrapper such as `sudo`)
    pub program: PathBuf,
    /// Arguments placed before the measurement flags (e.g. the tool path when `program` is a wrapper)
    pub leading_args: Vec<String>,
    /// Working directory for the tool; relative result paths resolve against it
    pub working_dir: Option<PathBuf>,
    /// Fragment that identifies a result-file path in the tool output
    pub result_dir_marker: String,
    /// How long to wait for the tool to exit on its own after a terminal marker
    pub exit_grace_ms: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("./inputLatencyMeasureTool"),
            leading_args: Vec::new(),
            working_dir: None,
            result_dir_marker: "/log/".to_string(),
            exit_grace_ms: 2000,
        }
    }
}

impl ToolConfig {
    pub fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_grace_ms)
    }
}

/// Device discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Command (program followed by arguments) that prints the device listing
    pub listing_command: Vec<String>,
    /// Root of the sysfs tree used for speed lookups
    pub sysfs_root: PathBuf,
    /// Directory holding the raw event nodes
    pub dev_input_dir: PathBuf,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            listing_command: vec!["cat".to_string(), "/proc/bus/input/devices".to_string()],
            sysfs_root: PathBuf::from("/sys"),
            dev_input_dir: PathBuf::from("/dev/input"),
        }
    }
}

/// Button detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Wait between two empty reads of the event device (in milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
        }
    }
}

impl DetectionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Defaults applied when building a measurement from a device selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementDefaults {
    /// Tool mode (3 = auto mode)
    pub mode: u32,
    /// Minimum random delay between presses
    pub min_delay_ms: u32,
    /// Maximum random delay between presses
    pub max_delay_ms: u32,
    /// Number of measured presses
    pub iterations: u32,
}

impl Default for MeasurementDefaults {
    fn default() -> Self {
        Self {
            mode: 3,
            min_delay_ms: 10,
            max_delay_ms: 1000,
            iterations: 100,
        }
    }
}

/// Result ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsConfig {
    /// Samples above this value get a warning (a plot would clip them)
    pub display_ceiling_ms: f64,
    /// Decimal places used when presenting statistics
    pub decimal_places: u32,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            display_ceiling_ms: 100.0,
            decimal_places: 3,
        }
    }
}

impl Config {
    /// Load configuration from the default config file.
    ///
    /// Returns the default configuration if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Render the effective configuration as TOML (same layout as the file).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
