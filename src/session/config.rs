//! Parameters of one measurement run and the tool command line built from them

use super::SessionError;
use crate::config::MeasurementDefaults;
use crate::device::{Device, DeviceType};
use crate::input::ButtonCode;
use serde::{Deserialize, Serialize};

/// Everything the measurement tool needs for one session.
///
/// Built once from the user's selection and the detected button, then owned
/// by the session for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementConfig {
    pub mode: u32,
    pub button_code: u16,
    pub device_type: DeviceType,
    /// Event node such as `event5`
    pub event_node: String,
    pub iterations: u32,
    pub device_name: String,
    pub min_delay_ms: u32,
    pub max_delay_ms: u32,
}

impl MeasurementConfig {
    /// Combine a selected device, its type and detected button with the defaults
    pub fn for_device(
        device: &Device,
        device_type: DeviceType,
        button: ButtonCode,
        defaults: &MeasurementDefaults,
    ) -> Self {
        Self {
            mode: defaults.mode,
            button_code: button.as_u16(),
            device_type,
            event_node: device.event_node.clone(),
            iterations: defaults.iterations,
            device_name: device.name.clone(),
            min_delay_ms: defaults.min_delay_ms,
            max_delay_ms: defaults.max_delay_ms,
        }
    }

    /// Number from the event node (`event5` -> 5)
    pub fn event_number(&self) -> Option<u32> {
        self.event_node.strip_prefix("event")?.parse().ok()
    }

    /// Reject parameters the tool would refuse or misinterpret
    pub fn validate(&self) -> Result<(), SessionError> {
        let invalid = |reason: &str| Err(SessionError::InvalidConfig(reason.to_string()));

        if self.iterations == 0 {
            return invalid("iteration count must be at least 1");
        }
        if self.min_delay_ms == 0 || self.max_delay_ms == 0 {
            return invalid("delays must be greater than zero");
        }
        if self.min_delay_ms > self.max_delay_ms {
            return invalid("minimum delay exceeds maximum delay");
        }
        if self.device_name.trim().is_empty() {
            return invalid("device name is empty");
        }
        if self.event_number().is_none() {
            return Err(SessionError::InvalidConfig(format!(
                "{:?} is not a numbered event node",
                self.event_node
            )));
        }
        Ok(())
    }

    /// Tool arguments:
    /// `-m <mode> -tmin <ms> -tmax <ms> -b <code> -d <type> -event <n> -n <count> -name <name>`
    pub fn tool_args(&self) -> Result<Vec<String>, SessionError> {
        self.validate()?;
        let event = self.event_number().unwrap_or_default();

        Ok(vec![
            "-m".to_string(),
            self.mode.to_string(),
            "-tmin".to_string(),
            self.min_delay_ms.to_string(),
            "-tmax".to_string(),
            self.max_delay_ms.to_string(),
            "-b".to_string(),
            self.button_code.to_string(),
            "-d".to_string(),
            self.device_type.tool_id().to_string(),
            "-event".to_string(),
            event.to_string(),
            "-n".to_string(),
            self.iterations.to_string(),
            "-name".to_string(),
            self.device_name.clone(),
        ])
    }
}
