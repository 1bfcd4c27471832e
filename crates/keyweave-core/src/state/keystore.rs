// Keyweave Keystore
// Live table of tracked keys, keyed by physical key in press order

use indexmap::IndexMap;

use crate::state::Keystate;
use crate::{Key, Modifier};

/// Tracked keys, one entry per physical key currently down.
///
/// Iteration follows press order, which makes "first held modifier" and the
/// order of resumed presses deterministic.
#[derive(Debug, Default)]
pub struct Keystore {
    states: IndexMap<Key, Keystate>,
}

impl Keystore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn contains(&self, inkey: Key) -> bool {
        self.states.contains_key(&inkey)
    }

    pub fn get(&self, inkey: Key) -> Option<&Keystate> {
        self.states.get(&inkey)
    }

    pub fn get_mut(&mut self, inkey: Key) -> Option<&mut Keystate> {
        self.states.get_mut(&inkey)
    }

    /// Track a newly pressed key, replacing any stale entry
    pub fn insert(&mut self, state: Keystate) {
        self.states.shift_remove(&state.inkey);
        self.states.insert(state.inkey, state);
    }

    pub fn remove(&mut self, inkey: Key) -> Option<Keystate> {
        self.states.shift_remove(&inkey)
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keystate> {
        self.states.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Keystate> {
        self.states.values_mut()
    }

    /// Held keys the engine arbitrates (modifiers and unresolved
    /// multipurpose keys)
    pub fn arbitrated(&self) -> impl Iterator<Item = &Keystate> {
        self.states.values().filter(|ks| ks.is_pressed() && ks.is_arbitrated())
    }

    pub fn arbitrated_mut(&mut self) -> impl Iterator<Item = &mut Keystate> {
        self.states
            .values_mut()
            .filter(|ks| ks.is_pressed() && ks.is_arbitrated())
    }

    /// Specific modifiers for every held modifier key, in press order
    pub fn pressed_modifiers(&self) -> Vec<Modifier> {
        self.states
            .values()
            .filter(|ks| ks.is_pressed())
            .filter_map(|ks| Modifier::from_key(ks.key))
            .collect()
    }

    /// Physical keys of all suspended states, in press order
    pub fn suspended_keys(&self) -> Vec<Key> {
        self.states
            .values()
            .filter(|ks| ks.suspended)
            .map(|ks| ks.inkey)
            .collect()
    }

    /// The tracked state whose resolved key is `key`
    pub fn find_resolved_mut(&mut self, key: Key) -> Option<&mut Keystate> {
        self.states.values_mut().find(|ks| ks.key == key)
    }
}
