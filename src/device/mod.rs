//! Input device discovery

mod catalog;

pub use catalog::{DeviceCatalog, EnumerationError};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Device class, either auto-detected from the kernel handlers or chosen by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    Gamepad,
    Mouse,
    Keyboard,
}

impl DeviceType {
    pub fn all() -> &'static [DeviceType] {
        &[Self::Gamepad, Self::Mouse, Self::Keyboard]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Gamepad => "Gamepad",
            Self::Mouse => "Mouse",
            Self::Keyboard => "Keyboard",
        }
    }

    /// Identifier passed to the measurement tool's `-d` flag (1-based)
    pub fn tool_id(&self) -> u32 {
        match self {
            Self::Gamepad => 1,
            Self::Mouse => 2,
            Self::Keyboard => 3,
        }
    }

    pub fn from_tool_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(Self::Gamepad),
            2 => Some(Self::Mouse),
            3 => Some(Self::Keyboard),
            _ => None,
        }
    }

    /// Classify a device from its `H: Handlers=` line
    pub fn from_handlers(handlers: &str) -> Option<Self> {
        if handlers.contains("kbd") {
            Some(Self::Keyboard)
        } else if handlers.contains("mouse") {
            Some(Self::Mouse)
        } else if handlers.contains("js") {
            Some(Self::Gamepad)
        } else {
            None
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A USB input device as reported by the OS listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub vendor_id: String,
    pub product_id: String,
    /// Display name, unique within a catalog
    pub name: String,
    /// Event node such as `event5`
    pub event_node: String,
    pub auto_detected_type: Option<DeviceType>,
    /// USB speed from sysfs (e.g. `12` for full speed)
    pub speed: Option<String>,
}
