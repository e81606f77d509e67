//! Parser for the kernel's input device listing (`/proc/bus/input/devices`)
//!
//! The listing is a sequence of blank-line separated blocks, one per device:
//!
//! ```text
//! I: Bus=0003 Vendor=046d Product=c52b Version=0111
//! N: Name="Logitech USB Receiver"
//! P: Phys=usb-0000:00:14.0-2/input0
//! S: Sysfs=/devices/pci0000:00/0000:00:14.0/usb1/1-2/1-2:1.0/0003:046D:C52B.0001/input/input5
//! U: Uniq=
//! H: Handlers=sysrq kbd leds event5
//! B: PROP=0
//! ```

use super::{Device, DeviceType};
use crate::config::DeviceConfig;
use log::{debug, info};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::mpsc;
use std::thread;
use thiserror::Error;

/// More consecutive blank lines than this mark the end of the listing
const MAX_BLANK_RUN: usize = 3;

/// Error type for device enumeration
#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("device listing command is empty")]
    NoCommand,
    #[error("failed to run `{command}`: {source}")]
    CommandFailed {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` exited with {status}")]
    CommandStatus { command: String, status: ExitStatus },
}

/// Builds [`Device`] records from the OS device listing
#[derive(Debug, Clone)]
pub struct DeviceCatalog {
    listing_command: Vec<String>,
    sysfs_root: PathBuf,
}

impl DeviceCatalog {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            listing_command: config.listing_command.clone(),
            sysfs_root: config.sysfs_root.clone(),
        }
    }

    /// Run the listing command and parse its output.
    ///
    /// Blocks on the child process; hosts with an event loop should use
    /// [`DeviceCatalog::spawn_enumeration`] instead.
    pub fn enumerate(&self) -> Result<Vec<Device>, EnumerationError> {
        let (program, args) = self
            .listing_command
            .split_first()
            .ok_or(EnumerationError::NoCommand)?;
        let command = self.listing_command.join(" ");

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| EnumerationError::CommandFailed {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(EnumerationError::CommandStatus {
                command,
                status: output.status,
            });
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        let devices = self.parse_listing(&listing);
        info!("Found {} USB input device(s)", devices.len());
        Ok(devices)
    }

    /// Enumerate on a worker thread; the result arrives on the returned channel.
    pub fn spawn_enumeration(&self) -> mpsc::Receiver<Result<Vec<Device>, EnumerationError>> {
        let (tx, rx) = mpsc::channel();
        let catalog = self.clone();
        thread::spawn(move || {
            let _ = tx.send(catalog.enumerate());
        });
        rx
    }

    /// Parse a raw listing into USB devices, deduplicated by name.
    ///
    /// Malformed and non-USB blocks are skipped.
    pub fn parse_listing(&self, listing: &str) -> Vec<Device> {
        let mut seen = HashSet::new();
        let mut devices = Vec::new();

        for block in split_blocks(listing) {
            match self.parse_block(&block) {
                Some(device) => {
                    if seen.insert(device.name.clone()) {
                        devices.push(device);
                    } else {
                        debug!("Skipping duplicate device {:?}", device.name);
                    }
                }
                None => debug!("Skipping device block: {:?}", block.first()),
            }
        }

        devices
    }

    fn parse_block(&self, block: &[&str]) -> Option<Device> {
        let phys = tagged(block, "P:")?;
        if !phys.contains("usb") {
            return None;
        }

        let id_line = tagged(block, "I:")?;
        let vendor_id = token_value(id_line, "Vendor=")?;
        let product_id = token_value(id_line, "Product=")?;

        let name = tagged(block, "N:")?
            .trim_start_matches("N:")
            .trim()
            .trim_start_matches("Name=")
            .replace('"', "");
        if name.is_empty() {
            return None;
        }

        let handlers = tagged(block, "H:")?;
        let event_node = handlers
            .split_whitespace()
            .find(|part| part.contains("event"))?
            .trim_start_matches("Handlers=")
            .to_string();

        let speed = tagged(block, "S:").and_then(|sysfs| self.read_speed(sysfs));

        Some(Device {
            vendor_id: vendor_id.to_string(),
            product_id: product_id.to_string(),
            name,
            event_node,
            auto_detected_type: DeviceType::from_handlers(handlers),
            speed,
        })
    }

    fn read_speed(&self, sysfs_line: &str) -> Option<String> {
        let path = speed_path(&self.sysfs_root, sysfs_line)?;
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let speed = contents.lines().next().unwrap_or("").trim();
                (!speed.is_empty()).then(|| speed.to_string())
            }
            Err(e) => {
                debug!("No speed attribute at {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Split the listing into blocks of non-blank lines.
///
/// Stops at the first run of more than [`MAX_BLANK_RUN`] blank lines.
fn split_blocks(listing: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();
    let mut blank_run = 0;

    for line in listing.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            if blank_run > MAX_BLANK_RUN {
                break;
            }
        } else {
            blank_run = 0;
            current.push(line);
        }
    }

    if !current.is_empty() {
        blocks.push(current);
    }

    blocks
}

fn tagged<'a>(block: &[&'a str], tag: &str) -> Option<&'a str> {
    block.iter().copied().find(|line| line.starts_with(tag))
}

fn token_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.split_whitespace()
        .find_map(|token| token.strip_prefix(key))
        .filter(|value| !value.is_empty())
}

/// Build `<root>/<segments up to the USB port>/speed` from an `S: Sysfs=` line.
///
/// `/devices/pci0000:00/0000:00:14.0/usb1/1-2/1-2:1.0/...` yields
/// `<root>/devices/pci0000:00/0000:00:14.0/usb1/1-2/speed`.
fn speed_path(root: &Path, sysfs_line: &str) -> Option<PathBuf> {
    let sysfs = sysfs_line.trim_start_matches("S:").trim().strip_prefix("Sysfs=")?;
    let segments: Vec<&str> = sysfs.split('/').filter(|s| !s.is_empty()).collect();
    let bus = segments.iter().position(|segment| {
        segment
            .strip_prefix("usb")
            .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
    })?;
    let port = segments.get(bus + 1)?;
    if port.contains(':') {
        return None;
    }

    let mut path = root.to_path_buf();
    for segment in &segments[..=bus + 1] {
        path.push(segment);
    }
    path.push("speed");
    Some(path)
}
