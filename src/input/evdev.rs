//! Raw evdev reader for a single event node
//!
//! Opens `/dev/input/eventN` in non-blocking mode and decodes the kernel's
//! `struct input_event` records.

use super::event::{EventSource, InputEvent, INPUT_EVENT_SIZE};
use super::DetectError;
use nix::libc;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// An open event node
pub struct EvdevDevice {
    file: File,
    path: PathBuf,
    buffer: Vec<u8>,
    pending: VecDeque<InputEvent>,
}

impl EvdevDevice {
    /// Open an event node for non-blocking reads
    pub fn open(path: &Path) -> Result<Self, DetectError> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::PermissionDenied => DetectError::PermissionDenied {
                    path: path.to_path_buf(),
                },
                io::ErrorKind::NotFound => DetectError::DeviceMissing {
                    path: path.to_path_buf(),
                },
                _ => DetectError::Io(e),
            })?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            buffer: vec![0u8; INPUT_EVENT_SIZE * 64], // Buffer for multiple events
            pending: VecDeque::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSource for EvdevDevice {
    fn next_event(&mut self) -> io::Result<Option<InputEvent>> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }

        match self.file.read(&mut self.buffer) {
            Ok(bytes_read) => {
                // The kernel only hands out whole events
                for chunk in self.buffer[..bytes_read].chunks_exact(INPUT_EVENT_SIZE) {
                    let mut raw = [0u8; INPUT_EVENT_SIZE];
                    raw.copy_from_slice(chunk);
                    self.pending.push_back(InputEvent::from_bytes(&raw));
                }
                Ok(self.pending.pop_front())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(e),
        }
    }
}
