// Keyweave Keystate
// Per-physical-key bookkeeping for the lifetime of one press

use std::fmt;
use std::time::Instant;

use crate::{Action, Key, Modifier};

/// State of one physical key between its press and its release.
///
/// `key` is what the key currently means after modmap resolution. For a
/// multipurpose key it starts as the tap key and `multikey` holds the hold
/// key until the ambiguity is resolved.
#[derive(Debug, Clone)]
pub struct Keystate {
    /// The physical key reported by the input device
    pub inkey: Key,
    pub action: Action,
    /// Snapshot of this state before the latest event
    pub prior: Option<Box<Keystate>>,
    /// When the latest event for this key arrived
    pub time: Instant,
    /// Resolved key after modmap / multi-modmap
    pub key: Key,
    /// Hold-resolution key of an unresolved multipurpose key
    pub multikey: Option<Key>,
    /// Tap/hold not yet decided
    pub is_multi: bool,
    /// Output withheld while the engine waits for more input
    pub suspended: bool,
    /// The resolved key's press has been sent to the output
    pub exerted_on_output: bool,
    /// Consumed by a matched combo; its own press/release stays silent
    pub spent: bool,
}

impl Keystate {
    pub fn new(inkey: Key, action: Action, time: Instant) -> Self {
        Self {
            inkey,
            action,
            prior: None,
            time,
            key: inkey,
            multikey: None,
            is_multi: false,
            suspended: false,
            exerted_on_output: false,
            spent: false,
        }
    }

    /// Record a follow-up event (repeat or release) for this key
    pub fn advance(&mut self, action: Action, time: Instant) {
        let mut snapshot = self.clone();
        snapshot.prior = None;
        self.prior = Some(Box::new(snapshot));
        self.action = action;
        self.time = time;
    }

    pub fn is_pressed(&self) -> bool {
        self.action.is_pressed()
    }

    /// Whether the resolved key is a modifier
    pub fn is_modifier(&self) -> bool {
        Modifier::is_key_modifier(self.key)
    }

    /// Keys whose output the engine may hold back: modifiers and
    /// unresolved multipurpose keys
    pub fn is_arbitrated(&self) -> bool {
        self.is_multi || self.is_modifier()
    }

    /// Settle a multipurpose key as its tap key
    pub fn resolve_as_momentary(&mut self) {
        self.is_multi = false;
        self.multikey = None;
    }

    /// Settle a multipurpose key as its hold key
    pub fn resolve_as_modifier(&mut self) {
        if let Some(hold) = self.multikey.take() {
            self.key = hold;
        }
        self.is_multi = false;
    }
}

impl fmt::Display for Keystate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{} {}", self.inkey, self.key, self.action)?;
        if let Some(hold) = self.multikey {
            write!(f, " (hold {})", hold)?;
        }
        let flags = [
            (self.suspended, "suspended"),
            (self.exerted_on_output, "exerted"),
            (self.spent, "spent"),
        ];
        for (set, name) in flags {
            if set {
                write!(f, " {}", name)?;
            }
        }
        Ok(())
    }
}
