//! Raw input events and the sources that produce them

use std::collections::VecDeque;
use std::io;

/// Event type tag for key and button events
pub const EV_KEY: u16 = 0x01;

/// Size of one `struct input_event` on 64-bit Linux
pub const INPUT_EVENT_SIZE: usize = 24;

/// A raw input event from the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub tv_sec: i64,
    pub tv_usec: i64,
    pub event_type: u16,
    pub code: u16,
    /// 1 = press, 2 = repeat, 0 = release for key events
    pub value: i32,
}

impl InputEvent {
    pub fn new(event_type: u16, code: u16, value: i32) -> Self {
        Self {
            tv_sec: 0,
            tv_usec: 0,
            event_type,
            code,
            value,
        }
    }

    /// Key-down event with the given code
    pub fn key_press(code: u16) -> Self {
        Self::new(EV_KEY, code, 1)
    }

    pub fn key_release(code: u16) -> Self {
        Self::new(EV_KEY, code, 0)
    }

    /// Decode one event from its native-endian wire layout
    pub fn from_bytes(bytes: &[u8; INPUT_EVENT_SIZE]) -> Self {
        let i64_at = |at: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[at..at + 8]);
            i64::from_ne_bytes(raw)
        };
        Self {
            tv_sec: i64_at(0),
            tv_usec: i64_at(8),
            event_type: u16::from_ne_bytes([bytes[16], bytes[17]]),
            code: u16::from_ne_bytes([bytes[18], bytes[19]]),
            value: i32::from_ne_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]),
        }
    }

    /// A key event with an asserted (pressed or auto-repeated) state
    pub fn is_key_down(&self) -> bool {
        self.event_type == EV_KEY && self.value != 0
    }
}

/// Non-blocking supplier of raw events
pub trait EventSource {
    /// Return the next queued event, or `None` when nothing is available yet.
    fn next_event(&mut self) -> io::Result<Option<InputEvent>>;
}

/// In-memory event source, used for replaying recorded or synthetic streams
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    events: VecDeque<InputEvent>,
}

impl ScriptedSource {
    pub fn new(events: impl IntoIterator<Item = InputEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }

    /// Events not consumed yet
    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl EventSource for ScriptedSource {
    fn next_event(&mut self) -> io::Result<Option<InputEvent>> {
        Ok(self.events.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wire_layout() {
        let mut bytes = [0u8; INPUT_EVENT_SIZE];
        bytes[0..8].copy_from_slice(&1_700_000_000i64.to_ne_bytes());
        bytes[8..16].copy_from_slice(&250_000i64.to_ne_bytes());
        bytes[16..18].copy_from_slice(&EV_KEY.to_ne_bytes());
        bytes[18..20].copy_from_slice(&30u16.to_ne_bytes());
        bytes[20..24].copy_from_slice(&1i32.to_ne_bytes());

        let event = InputEvent::from_bytes(&bytes);
        assert_eq!(event.tv_sec, 1_700_000_000);
        assert_eq!(event.tv_usec, 250_000);
        assert_eq!(event.event_type, EV_KEY);
        assert_eq!(event.code, 30);
        assert_eq!(event.value, 1);
    }

    #[test]
    fn key_down_states() {
        assert!(InputEvent::key_press(30).is_key_down());
        assert!(InputEvent::new(EV_KEY, 30, 2).is_key_down());
        assert!(!InputEvent::key_release(30).is_key_down());
        // EV_REL movement is never a key-down
        assert!(!InputEvent::new(0x02, 0, 1).is_key_down());
    }

    #[test]
    fn scripted_source_drains_in_order() {
        let mut source = ScriptedSource::new([InputEvent::key_press(1), InputEvent::key_press(2)]);
        assert_eq!(source.next_event().unwrap().map(|e| e.code), Some(1));
        assert_eq!(source.next_event().unwrap().map(|e| e.code), Some(2));
        assert_eq!(source.next_event().unwrap(), None);
    }
}
