// Keyweave Input Layer - Device Filtering
// Which devices to grab: an explicit list, or every physical keyboard

/// Devices named on the command line or in `[devices]`.
///
/// An empty filter means autodetect: every keyboard that is not one of our
/// own virtual devices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    only: Vec<String>,
}

impl DeviceFilter {
    pub fn new(only: impl IntoIterator<Item = String>) -> Self {
        Self {
            only: only.into_iter().collect(),
        }
    }

    pub fn is_autodetect(&self) -> bool {
        self.only.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.only
    }

    /// Explicit entries match the device path or exact name, even for
    /// non-keyboards
    pub fn matches(&self, name: &str, path: &str, is_keyboard: bool, is_virtual: bool) -> bool {
        if !self.only.is_empty() {
            return self.only.iter().any(|wanted| wanted == path || wanted == name);
        }
        is_keyboard && !is_virtual
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_match_by_path_or_name() {
        let filter = DeviceFilter::new(["/dev/input/event0".to_string(), "Logitech Keyboard".to_string()]);
        assert!(filter.matches("Other", "/dev/input/event0", true, false));
        assert!(filter.matches("Logitech Keyboard", "/dev/input/event5", false, false));
        assert!(!filter.matches("Other Device", "/dev/input/event1", true, false));
    }

    #[test]
    fn test_autodetect_takes_physical_keyboards() {
        let filter = DeviceFilter::default();
        assert!(filter.is_autodetect());
        assert!(filter.matches("Generic Keyboard", "/dev/input/event0", true, false));
        assert!(!filter.matches("Generic Mouse", "/dev/input/event1", false, false));
        assert!(!filter.matches("Keyweave (virtual) Keyboard", "/dev/input/event2", true, true));
    }

    #[test]
    fn test_explicit_match_includes_virtual() {
        let filter = DeviceFilter::new(["Keyweave (virtual) Keyboard".to_string()]);
        assert!(filter.matches("Keyweave (virtual) Keyboard", "/dev/input/event2", true, true));
    }
}
