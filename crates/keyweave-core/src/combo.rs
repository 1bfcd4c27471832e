// Keyweave Combo Type
// A key together with the set of modifiers held while it is pressed

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use smallvec::SmallVec;

use crate::config::combo_parser::{parse_combo_string, ComboParseError};
use crate::modifier::Modifier;
use crate::Key;

/// Modifier list of a combo; almost never longer than four
pub type ModifierList = SmallVec<[Modifier; 4]>;

/// A key plus a set of modifiers.
///
/// Equality and hashing ignore modifier order, but the order is kept because
/// output and sticky binding use the *first* modifier.
#[derive(Debug, Clone)]
pub struct Combo {
    modifiers: ModifierList,
    key: Key,
}

impl Combo {
    /// Duplicate modifiers are dropped, keeping the first occurrence.
    pub fn new(modifiers: impl IntoIterator<Item = Modifier>, key: Key) -> Self {
        let mut list = ModifierList::new();
        for modifier in modifiers {
            if !list.contains(&modifier) {
                list.push(modifier);
            }
        }
        Self { modifiers: list, key }
    }

    /// A bare key with no modifiers
    pub fn key_only(key: Key) -> Self {
        Self {
            modifiers: ModifierList::new(),
            key,
        }
    }

    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    pub fn key(&self) -> Key {
        self.key
    }

    /// A copy of this combo with `modifier` added
    pub fn with_modifier(&self, modifier: Modifier) -> Self {
        let mut combo = self.clone();
        if !combo.modifiers.contains(&modifier) {
            combo.modifiers.push(modifier);
        }
        combo
    }

    /// Whether every modifier is specific (bound to a single key)
    pub fn is_specific(&self) -> bool {
        self.modifiers.iter().all(Modifier::is_specific)
    }

    /// Expand generic modifiers into every left/right combination.
    ///
    /// `Ctrl-Shift-A` yields four combos, one per pairing of
    /// `L_CONTROL`/`R_CONTROL` with `L_SHIFT`/`R_SHIFT`. Specific combos
    /// expand to themselves.
    pub fn expand_specific(&self) -> Vec<Combo> {
        let mut variants: Vec<ModifierList> = vec![ModifierList::new()];
        for modifier in &self.modifiers {
            let choices = modifier.specific_variants();
            variants = variants
                .iter()
                .flat_map(|prefix| {
                    choices.iter().map(move |choice| {
                        let mut next = prefix.clone();
                        if !next.contains(choice) {
                            next.push(choice.clone());
                        }
                        next
                    })
                })
                .collect();
        }
        variants
            .into_iter()
            .map(|modifiers| Combo {
                modifiers,
                key: self.key,
            })
            .collect()
    }

    fn sorted_ids(&self) -> SmallVec<[u32; 4]> {
        let mut ids: SmallVec<[u32; 4]> = self.modifiers.iter().map(Modifier::id).collect();
        ids.sort_unstable();
        ids
    }
}

impl PartialEq for Combo {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.modifiers.len() == other.modifiers.len()
            && self.sorted_ids() == other.sorted_ids()
    }
}

impl Eq for Combo {}

impl Hash for Combo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sorted_ids().hash(state);
        self.key.hash(state);
    }
}

impl fmt::Display for Combo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in &self.modifiers {
            write!(f, "{}-", modifier)?;
        }
        write!(f, "{}", self.key)
    }
}

impl FromStr for Combo {
    type Err = ComboParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = parse_combo_string(s)?;
        Ok(Combo::new(parsed.modifiers, parsed.key))
    }
}
