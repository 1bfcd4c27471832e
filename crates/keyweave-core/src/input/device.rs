// Keyweave Input Layer - Device Detection
// Telling keyboards apart from mice, pads and our own output device

use std::collections::HashSet;

use crate::Key;

/// Key capabilities of an input device
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Whether the device supports EV_KEY events
    pub has_ev_key: bool,
    pub supported_keys: HashSet<Key>,
}

impl DeviceCapabilities {
    pub fn new(has_ev_key: bool, supported_keys: impl IntoIterator<Item = Key>) -> Self {
        Self {
            has_ev_key,
            supported_keys: supported_keys.into_iter().collect(),
        }
    }

    pub fn supports_key(&self, key: Key) -> bool {
        self.supported_keys.contains(&key)
    }
}

const QWERTY: [Key; 6] = [Key::Q, Key::W, Key::E, Key::R, Key::T, Key::Y];

const A_Z_SPACE: [Key; 3] = [Key::SPACE, Key::A, Key::Z];

/// A device is a keyboard when it reports EV_KEY with the whole QWERTY row
/// plus A, Z and SPACE
pub fn is_keyboard(capabilities: &DeviceCapabilities) -> bool {
    capabilities.has_ev_key
        && QWERTY.iter().all(|k| capabilities.supports_key(*k))
        && A_Z_SPACE.iter().all(|k| capabilities.supports_key(*k))
}

/// Whether `name` belongs to a device we created ourselves; grabbing it
/// would feed our own output back in
pub fn is_virtual_device(name: &str, prefix: &str) -> bool {
    name.contains(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyboard_caps() -> DeviceCapabilities {
        let mut keys: Vec<Key> = QWERTY.into_iter().chain(A_Z_SPACE).collect();
        keys.extend([Key::ENTER, Key::LEFT_SHIFT, Key::LEFT_CTRL, Key::F1]);
        DeviceCapabilities::new(true, keys)
    }

    #[test]
    fn test_full_keyboard_is_detected() {
        assert!(is_keyboard(&keyboard_caps()));
    }

    #[test]
    fn test_partial_layouts_are_rejected() {
        let no_qwerty = DeviceCapabilities::new(true, A_Z_SPACE);
        assert!(!is_keyboard(&no_qwerty));

        let no_space = DeviceCapabilities::new(true, QWERTY.into_iter().chain([Key::A, Key::Z]));
        assert!(!is_keyboard(&no_space));
    }

    #[test]
    fn test_mouse_is_not_a_keyboard() {
        let mouse = DeviceCapabilities::new(true, [Key::from(272), Key::from(273), Key::from(274)]);
        assert!(!is_keyboard(&mouse));
        assert!(!is_keyboard(&DeviceCapabilities::default()));
    }

    #[test]
    fn test_virtual_device_prefix() {
        assert!(is_virtual_device("Keyweave (virtual) Keyboard", "Keyweave (virtual)"));
        assert!(!is_virtual_device("Logitech USB Keyboard", "Keyweave (virtual)"));
    }
}
