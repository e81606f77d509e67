//! Names for evdev key and button codes

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// A key or button code as reported by the event node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ButtonCode(pub u16);

impl ButtonCode {
    pub fn new(code: u16) -> Self {
        Self(code)
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Human readable name, `"Unknown"` for unmapped codes
    pub fn name(&self) -> &'static str {
        BUTTON_NAMES.get(&self.0).copied().unwrap_or("Unknown")
    }
}

impl From<u16> for ButtonCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl fmt::Display for ButtonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

static BUTTON_NAMES: LazyLock<HashMap<u16, &'static str>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    // Keyboard: letters and common keys
    map.insert(1, "Escape");
    map.insert(2, "1");
    map.insert(3, "2");
    map.insert(4, "3");
    map.insert(5, "4");
    map.insert(6, "5");
    map.insert(7, "6");
    map.insert(8, "7");
    map.insert(9, "8");
    map.insert(10, "9");
    map.insert(11, "0");
    map.insert(14, "Backspace");
    map.insert(15, "Tab");
    map.insert(16, "Q");
    map.insert(17, "W");
    map.insert(18, "E");
    map.insert(19, "R");
    map.insert(20, "T");
    map.insert(21, "Y");
    map.insert(22, "U");
    map.insert(23, "I");
    map.insert(24, "O");
    map.insert(25, "P");
    map.insert(28, "Enter");
    map.insert(29, "LeftCtrl");
    map.insert(30, "A");
    map.insert(31, "S");
    map.insert(32, "D");
    map.insert(33, "F");
    map.insert(34, "G");
    map.insert(35, "H");
    map.insert(36, "J");
    map.insert(37, "K");
    map.insert(38, "L");
    map.insert(42, "LeftShift");
    map.insert(44, "Z");
    map.insert(45, "X");
    map.insert(46, "C");
    map.insert(47, "V");
    map.insert(48, "B");
    map.insert(49, "N");
    map.insert(50, "M");
    map.insert(54, "RightShift");
    map.insert(56, "LeftAlt");
    map.insert(57, "Space");
    map.insert(58, "CapsLock");
    map.insert(97, "RightCtrl");
    map.insert(100, "RightAlt");
    map.insert(103, "Up");
    map.insert(105, "Left");
    map.insert(106, "Right");
    map.insert(108, "Down");

    // Mouse buttons
    map.insert(0x110, "MouseLeft");
    map.insert(0x111, "MouseRight");
    map.insert(0x112, "MouseMiddle");
    map.insert(0x113, "MouseSide");
    map.insert(0x114, "MouseExtra");

    // Joystick and gamepad buttons
    map.insert(0x120, "Trigger");
    map.insert(0x121, "Thumb");
    map.insert(0x130, "South");
    map.insert(0x131, "East");
    map.insert(0x133, "North");
    map.insert(0x134, "West");
    map.insert(0x136, "TL");
    map.insert(0x137, "TR");
    map.insert(0x13a, "Select");
    map.insert(0x13b, "Start");
    map.insert(0x13c, "Mode");
    map.insert(0x13d, "ThumbL");
    map.insert(0x13e, "ThumbR");

    map
});
