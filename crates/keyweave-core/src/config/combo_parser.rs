// Keyweave Config - Combo String Parser
// Parses combo strings like "C-Alt-j" into modifiers and a key

use thiserror::Error;

use crate::{Key, Modifier};

/// Result of parsing a combo string
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCombo {
    /// Modifiers in the order written, without duplicates
    pub modifiers: Vec<Modifier>,
    /// The final hyphen-separated component
    pub key: Key,
}

/// Errors that can occur during combo parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComboParseError {
    #[error("combo string cannot be empty")]
    EmptyInput,

    #[error("unknown key name: '{0}'")]
    UnknownKey(String),

    #[error("unknown modifier: '{0}'")]
    UnknownModifier(String),

    #[error("combo string cannot end with hyphen")]
    TrailingHyphen,
}

/// Parse a combo string like `"Ctrl-Shift-A"` into modifiers and key.
///
/// Modifier aliases are case-sensitive (`Cmd`, not `cmd`); key names are
/// not.
///
/// ```
/// use keyweave_core::config::parse_combo_string;
/// use keyweave_core::Key;
/// let parsed = parse_combo_string("C-Alt-j").unwrap();
/// assert_eq!(parsed.modifiers.len(), 2);
/// assert_eq!(parsed.key, Key::J);
/// ```
pub fn parse_combo_string(exp: &str) -> Result<ParsedCombo, ComboParseError> {
    let trimmed = exp.trim();
    if trimmed.is_empty() {
        return Err(ComboParseError::EmptyInput);
    }
    if trimmed.ends_with('-') {
        return Err(ComboParseError::TrailingHyphen);
    }

    let mut parts: Vec<&str> = trimmed.split('-').collect();
    let key_str = parts.pop().ok_or(ComboParseError::EmptyInput)?;
    let key = Key::from_name(key_str).ok_or_else(|| ComboParseError::UnknownKey(key_str.to_string()))?;

    let mut modifiers: Vec<Modifier> = Vec::with_capacity(parts.len());
    for alias in parts {
        let modifier = Modifier::from_alias(alias.trim())
            .ok_or_else(|| ComboParseError::UnknownModifier(alias.to_string()))?;
        if !modifiers.contains(&modifier) {
            modifiers.push(modifier);
        }
    }

    Ok(ParsedCombo { modifiers, key })
}
