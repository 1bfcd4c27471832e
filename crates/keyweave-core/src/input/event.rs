// Keyweave Input Events
// Decoded device events and the reserved control keys

use std::time::Instant;

use crate::output::RawEvent;
use crate::{Action, Key};

/// A key edge from an input device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub action: Action,
    pub time: Instant,
}

impl KeyEvent {
    pub fn new(key: Key, action: Action, time: Instant) -> Self {
        Self { key, action, time }
    }
}

/// What the engine consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Key(KeyEvent),
    /// Anything else (relative motion, MSC_SCAN, SYN), forwarded as is
    Other(RawEvent),
}

impl InputEvent {
    /// Decode a kernel event. `EV_KEY` events with an unknown value are
    /// treated as raw.
    pub fn decode(kind: u16, code: u16, value: i32, time: Instant) -> Self {
        if kind == RawEvent::EV_KEY {
            if let Some(action) = Action::from_value(value) {
                return InputEvent::Key(KeyEvent::new(Key::from(code), action, time));
            }
        }
        InputEvent::Other(RawEvent::new(kind, code, value))
    }

    pub fn as_key(&self) -> Option<&KeyEvent> {
        match self {
            InputEvent::Key(ev) => Some(ev),
            InputEvent::Other(_) => None,
        }
    }
}

/// Reserved keys handled before the engine sees them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Log engine and output state
    Diagnostics,
    /// Release everything and exit
    Eject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlKeys {
    pub diagnostics: Key,
    pub eject: Key,
}

impl Default for ControlKeys {
    fn default() -> Self {
        Self {
            diagnostics: Key::F15,
            eject: Key::F16,
        }
    }
}

impl ControlKeys {
    /// The control action for a press of `key`; releases and repeats of
    /// control keys are swallowed by the caller
    pub fn check(&self, key: Key, action: Action) -> Option<Control> {
        if !action.just_pressed() {
            return None;
        }
        if key == self.eject {
            Some(Control::Eject)
        } else if key == self.diagnostics {
            Some(Control::Diagnostics)
        } else {
            None
        }
    }

    pub fn is_control(&self, key: Key) -> bool {
        key == self.eject || key == self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_key_event() {
        let now = Instant::now();
        let ev = InputEvent::decode(RawEvent::EV_KEY, 30, 1, now);
        assert_eq!(ev, InputEvent::Key(KeyEvent::new(Key::A, Action::Press, now)));
        assert_eq!(ev.as_key().map(|k| k.key), Some(Key::A));
    }

    #[test]
    fn test_decode_other_events() {
        let now = Instant::now();
        let rel = InputEvent::decode(RawEvent::EV_REL, 0, -3, now);
        assert_eq!(rel, InputEvent::Other(RawEvent::new(RawEvent::EV_REL, 0, -3)));
        assert!(rel.as_key().is_none());

        // Out-of-range key value
        let odd = InputEvent::decode(RawEvent::EV_KEY, 30, 7, now);
        assert!(matches!(odd, InputEvent::Other(_)));
    }

    #[test]
    fn test_control_keys_trigger_on_press() {
        let keys = ControlKeys::default();
        assert_eq!(keys.check(Key::F16, Action::Press), Some(Control::Eject));
        assert_eq!(keys.check(Key::F15, Action::Press), Some(Control::Diagnostics));
        assert_eq!(keys.check(Key::F15, Action::Release), None);
        assert_eq!(keys.check(Key::A, Action::Press), None);
        assert!(keys.is_control(Key::F16));
    }
}
