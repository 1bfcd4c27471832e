// Keyweave Key Action
// Press / release / repeat as reported by the kernel

use strum_macros::{Display, EnumString};

/// The edge carried by a key event.
///
/// Discriminants are the kernel's `value` field for `EV_KEY` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[repr(i32)]
pub enum Action {
    Release = 0,
    Press = 1,
    Repeat = 2,
}

impl Action {
    /// Press or repeat: the key is down
    pub fn is_pressed(self) -> bool {
        matches!(self, Action::Press | Action::Repeat)
    }

    /// Only the initial press edge
    pub fn just_pressed(self) -> bool {
        matches!(self, Action::Press)
    }

    pub fn is_released(self) -> bool {
        matches!(self, Action::Release)
    }

    pub fn is_repeat(self) -> bool {
        matches!(self, Action::Repeat)
    }

    /// Decode an evdev event value
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(Action::Release),
            1 => Some(Action::Press),
            2 => Some(Action::Repeat),
            _ => None,
        }
    }

    /// The evdev event value
    pub fn value(self) -> i32 {
        self as i32
    }
}
