//! Raw input handling and button detection

mod codes;
mod detector;
mod event;
#[cfg(target_os = "linux")]
mod evdev;

pub use codes::ButtonCode;
pub use detector::{detect, ButtonDetector, Detection, DetectionResult};
#[cfg(target_os = "linux")]
pub use evdev::EvdevDevice;
pub use event::{EventSource, InputEvent, ScriptedSource, EV_KEY, INPUT_EVENT_SIZE};

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for event device access
#[derive(Debug, Error)]
pub enum DetectError {
    /// Permission denied opening the device; retryable after fixing access
    #[error("Permission denied accessing {}. Try running with sudo or add user to 'input' group.", .path.display())]
    PermissionDenied { path: PathBuf },
    #[error("Event device {} does not exist", .path.display())]
    DeviceMissing { path: PathBuf },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
