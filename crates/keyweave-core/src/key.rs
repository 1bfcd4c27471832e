// Keyweave Key Type
// Represents a single key code from Linux input-event-codes.h

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

include!(concat!(env!("OUT_DIR"), "/key_codes.rs"));

/// Raised when a key name does not match any known key
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown key: {0}")]
pub struct UnknownKey(pub String);

/// Alternative spellings accepted in configuration files
const KEY_ALIASES: &[(&str, Key)] = &[
    ("ESCAPE", Key::ESC),
    ("KEY_FN", Key::FN),
    ("PRINT", Key::SYSRQ),
    ("PRTSCR", Key::SYSRQ),
    ("RETURN", Key::ENTER),
    ("PAGEUP", Key::PAGE_UP),
    ("PAGEDOWN", Key::PAGE_DOWN),
    ("CAPS_LOCK", Key::CAPSLOCK),
    ("LCTRL", Key::LEFT_CTRL),
    ("RCTRL", Key::RIGHT_CTRL),
    ("LALT", Key::LEFT_ALT),
    ("RALT", Key::RIGHT_ALT),
    ("LSHIFT", Key::LEFT_SHIFT),
    ("RSHIFT", Key::RIGHT_SHIFT),
    ("LMETA", Key::LEFT_META),
    ("RMETA", Key::RIGHT_META),
];

impl Key {
    /// Get the raw numeric code value
    pub fn code(self) -> u16 {
        self.0
    }

    /// Get the name of this key
    pub fn name(self) -> &'static str {
        canonical_name(self.0).unwrap_or("UNKNOWN")
    }

    /// Whether this code has a canonical name
    pub fn is_known(self) -> bool {
        canonical_name(self.0).is_some()
    }

    /// Look up a key by name, case-insensitively.
    ///
    /// Accepts canonical names (`LEFT_CTRL`), the `KEY_` prefix used by the
    /// kernel headers (`KEY_A`), bare digits (`1`) and a few aliases.
    pub fn from_name(name: &str) -> Option<Key> {
        let upper = name.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return None;
        }
        if let Some(key) = canonical_key(&upper) {
            return Some(key);
        }
        if let Some(stripped) = upper.strip_prefix("KEY_") {
            if let Some(key) = canonical_key(stripped) {
                return Some(key);
            }
        }
        if upper.len() == 1 && upper.as_bytes()[0].is_ascii_digit() {
            return canonical_key(&format!("KEY_{upper}"));
        }
        KEY_ALIASES
            .iter()
            .find(|(alias, _)| *alias == upper)
            .map(|(_, key)| *key)
    }
}

impl From<u16> for Key {
    fn from(code: u16) -> Self {
        Key(code)
    }
}

impl From<Key> for u16 {
    fn from(key: Key) -> Self {
        key.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match canonical_name(self.0) {
            Some(name) => f.write_str(name),
            None => write!(f, "KEY_{:#x}", self.0),
        }
    }
}

impl FromStr for Key {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Key::from_name(s).ok_or_else(|| UnknownKey(s.to_string()))
    }
}
