// Keyweave Commands
// What a keymap entry does when its combo matches

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use strum_macros::{Display, EnumString};
use thiserror::Error;

use crate::context::KeyContext;
use crate::mapping::Keymap;
use crate::{Combo, Key, Modifier};

/// Longest string `to_keystrokes` accepts
pub const MAX_TYPED_CHARS: usize = 100;

/// Highest code point reachable through unicode entry
pub const MAX_CODE_POINT: u32 = 0x10FFFF;

/// Errors raised while building keystroke helpers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeystrokeError {
    #[error("to_keystrokes only supports strings of {MAX_TYPED_CHARS} characters or less")]
    TooLong,

    #[error("the character {0:?} cannot be typed")]
    UnsupportedChar(char),

    #[error("{0:#x} is too large for unicode keyboard entry")]
    CodePointTooLarge(u32),
}

/// Keymap values written as bare words in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Hint {
    /// Keep the next combo's output modifier held while the input one is
    Bind,
    /// Swallow the key
    Ignore,
    /// Send the next key through without matching
    #[strum(serialize = "escape_next_key", serialize = "escape_next")]
    EscapeNextKey,
}

/// State a callback may read or change.
pub struct CallContext<'a> {
    /// Context of the key press that triggered the keymap entry
    pub context: &'a KeyContext,
    /// Editor-style selection mark used by the mark helpers
    pub mark: &'a mut bool,
}

type CallFn = dyn Fn(&mut CallContext<'_>) -> Vec<Command> + Send + Sync;

/// A named function run when a keymap entry fires.
///
/// It may return further commands, which are executed in its place.
#[derive(Clone)]
pub struct Callback {
    name: Arc<str>,
    func: Arc<CallFn>,
}

impl Callback {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> Vec<Command> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, cx: &mut CallContext<'_>) -> Vec<Command> {
        (self.func)(cx)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({})", self.name)
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

/// One step of a keymap entry's output
#[derive(Debug, Clone)]
pub enum Command {
    /// Emit a combo with minimal modifier changes
    Combo(Combo),
    /// Emit a bare key, lifting any held modifiers around it
    Key(Key),
    /// Run a callback and execute what it returns
    Call(Callback),
    /// Pass the next key through untouched
    Escape,
    /// Swallow the input
    Ignore,
    /// Apply sticky binding to the next combo in this entry
    Bind,
    /// Enter a nested keymap for the next key
    Nested(Arc<Keymap>),
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Command::Combo(a), Command::Combo(b)) => a == b,
            (Command::Key(a), Command::Key(b)) => a == b,
            (Command::Call(a), Command::Call(b)) => a == b,
            (Command::Escape, Command::Escape)
            | (Command::Ignore, Command::Ignore)
            | (Command::Bind, Command::Bind) => true,
            (Command::Nested(a), Command::Nested(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Combo> for Command {
    fn from(combo: Combo) -> Self {
        Command::Combo(combo)
    }
}

impl From<Key> for Command {
    fn from(key: Key) -> Self {
        Command::Key(key)
    }
}

impl From<Hint> for Command {
    fn from(hint: Hint) -> Self {
        match hint {
            Hint::Bind => Command::Bind,
            Hint::Ignore => Command::Ignore,
            Hint::EscapeNextKey => Command::Escape,
        }
    }
}

impl From<Keymap> for Command {
    fn from(keymap: Keymap) -> Self {
        Command::Nested(Arc::new(keymap))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Combo(combo) => write!(f, "{}", combo),
            Command::Key(key) => write!(f, "{}", key),
            Command::Call(cb) => write!(f, "{}()", cb.name()),
            Command::Escape => write!(f, "{}", Hint::EscapeNextKey),
            Command::Ignore => write!(f, "{}", Hint::Ignore),
            Command::Bind => write!(f, "{}", Hint::Bind),
            Command::Nested(km) => write!(f, "keymap {}", km.name()),
        }
    }
}

fn shift() -> Vec<Modifier> {
    Modifier::from_name("SHIFT").into_iter().collect()
}

/// Key and shift state for a printable US-layout ASCII character
fn ascii_keystroke(c: char) -> Option<(Key, bool)> {
    let plain = |key| Some((key, false));
    let shifted = |key| Some((key, true));
    match c {
        'a'..='z' | '0'..='9' => Key::from_name(&c.to_string()).map(|k| (k, false)),
        'A'..='Z' => Key::from_name(&c.to_string()).map(|k| (k, true)),
        ' ' => plain(Key::SPACE),
        '\n' => plain(Key::ENTER),
        '\t' => plain(Key::TAB),
        ';' => plain(Key::SEMICOLON),
        '\'' => plain(Key::APOSTROPHE),
        '=' => plain(Key::EQUAL),
        '-' => plain(Key::MINUS),
        '`' => plain(Key::GRAVE),
        '[' => plain(Key::LEFT_BRACE),
        ']' => plain(Key::RIGHT_BRACE),
        ',' => plain(Key::COMMA),
        '.' => plain(Key::DOT),
        '/' => plain(Key::SLASH),
        '\\' => plain(Key::BACKSLASH),
        '~' => shifted(Key::GRAVE),
        '!' => shifted(Key::KEY_1),
        '@' => shifted(Key::KEY_2),
        '#' => shifted(Key::KEY_3),
        '$' => shifted(Key::KEY_4),
        '%' => shifted(Key::KEY_5),
        '^' => shifted(Key::KEY_6),
        '&' => shifted(Key::KEY_7),
        '*' => shifted(Key::KEY_8),
        '(' => shifted(Key::KEY_9),
        ')' => shifted(Key::KEY_0),
        '_' => shifted(Key::MINUS),
        '+' => shifted(Key::EQUAL),
        '{' => shifted(Key::LEFT_BRACE),
        '}' => shifted(Key::RIGHT_BRACE),
        '|' => shifted(Key::BACKSLASH),
        ':' => shifted(Key::SEMICOLON),
        '"' => shifted(Key::APOSTROPHE),
        '<' => shifted(Key::COMMA),
        '>' => shifted(Key::DOT),
        '?' => shifted(Key::SLASH),
        _ => None,
    }
}

/// Type `text` as keystrokes on a US layout.
///
/// Letters account for Caps Lock at the time the entry fires; characters
/// outside ASCII go through unicode entry.
pub fn to_keystrokes(text: &str) -> Result<Command, KeystrokeError> {
    if text.chars().count() > MAX_TYPED_CHARS {
        return Err(KeystrokeError::TooLong);
    }
    if let Some(bad) = text
        .chars()
        .find(|c| c.is_ascii() && ascii_keystroke(*c).is_none())
    {
        return Err(KeystrokeError::UnsupportedChar(bad));
    }

    let text = text.to_string();
    Ok(Command::Call(Callback::new("to_keystrokes", move |cx| {
        let capslock = cx.context.capslock_on;
        let mut out = Vec::with_capacity(text.len());
        for c in text.chars() {
            match ascii_keystroke(c) {
                Some((key, shifted)) => {
                    // Caps Lock inverts shift for letters only
                    let shifted = if c.is_ascii_alphabetic() { shifted != capslock } else { shifted };
                    if shifted {
                        out.push(Command::Combo(Combo::new(shift(), key)));
                    } else {
                        out.push(Command::Key(key));
                    }
                }
                None => out.extend(unicode_sequence(c as u32, capslock)),
            }
        }
        out
    })))
}

fn hex_digit_key(digit: u32) -> Option<Key> {
    let c = char::from_digit(digit, 16)?;
    Key::from_name(&c.to_string())
}

fn unicode_sequence(code_point: u32, capslock: bool) -> Vec<Command> {
    let mut out = Vec::new();
    if capslock {
        out.push(Command::Key(Key::CAPSLOCK));
    }
    if let (Some(shift), Some(ctrl)) = (Modifier::from_name("SHIFT"), Modifier::from_name("CONTROL")) {
        out.push(Command::Combo(Combo::new(vec![shift, ctrl], Key::U)));
    }
    let hex = format!("{:X}", code_point);
    out.extend(
        hex.chars()
            .filter_map(|c| c.to_digit(16))
            .filter_map(hex_digit_key)
            .map(Command::Key),
    );
    out.push(Command::Key(Key::ENTER));
    if capslock {
        out.push(Command::Key(Key::CAPSLOCK));
    }
    out
}

/// Enter a code point with the IBus/Fcitx `Shift-Ctrl-u` sequence
pub fn unicode_keystrokes(code_point: u32) -> Result<Command, KeystrokeError> {
    if code_point > MAX_CODE_POINT {
        return Err(KeystrokeError::CodePointTooLarge(code_point));
    }
    Ok(Command::Call(Callback::new("unicode_keystrokes", move |cx| {
        unicode_sequence(code_point, cx.context.capslock_on)
    })))
}

/// Block output for `ms` milliseconds
pub fn sleep_ms(ms: u64) -> Command {
    Command::Call(Callback::new("sleep", move |_| {
        std::thread::sleep(Duration::from_millis(ms));
        Vec::new()
    }))
}

/// `combo`, with Shift added while the mark is set
pub fn with_mark(combo: Combo) -> Command {
    Command::Call(Callback::new("with_mark", move |cx| {
        let out = if *cx.mark {
            shift().into_iter().fold(combo.clone(), |c, m| c.with_modifier(m))
        } else {
            combo.clone()
        };
        vec![Command::Combo(out)]
    }))
}

pub fn set_mark(mark: bool) -> Command {
    Command::Call(Callback::new("set_mark", move |cx| {
        *cx.mark = mark;
        Vec::new()
    }))
}

/// Set the mark and emit `combo` with Shift
pub fn with_or_set_mark(combo: Combo) -> Command {
    Command::Call(Callback::new("with_or_set_mark", move |cx| {
        *cx.mark = true;
        let out = shift().into_iter().fold(combo.clone(), |c, m| c.with_modifier(m));
        vec![Command::Combo(out)]
    }))
}
