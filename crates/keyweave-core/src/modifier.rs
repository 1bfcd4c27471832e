// Keyweave Modifier Registry
// Named combo modifiers (Shift, Ctrl, Alt, Meta, Fn) and their physical keys

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use thiserror::Error;

use crate::Key;

/// Process-wide modifier registry, seeded with the default modifiers
static MODIFIER_REGISTRY: LazyLock<RwLock<ModifierRegistry>> =
    LazyLock::new(|| RwLock::new(ModifierRegistry::with_defaults()));

static NEXT_MODIFIER_ID: AtomicU32 = AtomicU32::new(0);

/// Errors that can occur when registering modifiers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModifierError {
    #[error("modifier '{0}' already exists")]
    NameExists(String),

    #[error("key {0} already assigned to modifier '{1}'")]
    KeyAlreadyAssigned(Key, String),

    #[error("alias '{0}' already names modifier '{1}'")]
    AliasExists(String, String),

    #[error("modifier '{0}' needs at least one key")]
    NoKeys(String),
}

#[derive(Debug)]
struct ModifierDef {
    id: u32,
    name: String,
    aliases: Vec<String>,
    keys: Vec<Key>,
}

/// A keyboard combo modifier, such as Shift or Cmd.
///
/// Modifiers bound to a single key are *specific* (`L_CONTROL`); those bound
/// to several keys are *generic* (`CONTROL`) and match any of them. Clones are
/// cheap handles onto the registry entry.
#[derive(Clone)]
pub struct Modifier(Arc<ModifierDef>);

struct ModifierRegistry {
    by_name: HashMap<String, Modifier>,
    by_alias: HashMap<String, Modifier>,
    // Only specific modifiers are reachable from a key
    by_key: HashMap<Key, Modifier>,
    // Keys already claimed by a generic modifier
    generic_by_key: HashMap<Key, Modifier>,
}

impl ModifierRegistry {
    fn with_defaults() -> Self {
        let mut registry = Self {
            by_name: HashMap::new(),
            by_alias: HashMap::new(),
            by_key: HashMap::new(),
            generic_by_key: HashMap::new(),
        };
        let defaults: &[(&str, &[&str], &[Key])] = &[
            ("R_CONTROL", &["RCtrl", "RC"], &[Key::RIGHT_CTRL]),
            ("L_CONTROL", &["LCtrl", "LC"], &[Key::LEFT_CTRL]),
            ("CONTROL", &["Ctrl", "C"], &[Key::LEFT_CTRL, Key::RIGHT_CTRL]),
            ("R_ALT", &["RAlt", "RA", "ROpt", "ROption"], &[Key::RIGHT_ALT]),
            ("L_ALT", &["LAlt", "LA", "LOpt", "LOption"], &[Key::LEFT_ALT]),
            ("ALT", &["Alt", "A", "Opt", "Option"], &[Key::LEFT_ALT, Key::RIGHT_ALT]),
            ("R_SHIFT", &["RShift"], &[Key::RIGHT_SHIFT]),
            ("L_SHIFT", &["LShift"], &[Key::LEFT_SHIFT]),
            ("SHIFT", &["Shift"], &[Key::LEFT_SHIFT, Key::RIGHT_SHIFT]),
            (
                "R_META",
                &["RSuper", "RWin", "RCommand", "RCmd", "RMeta"],
                &[Key::RIGHT_META],
            ),
            (
                "L_META",
                &["LSuper", "LWin", "LCommand", "LCmd", "LMeta"],
                &[Key::LEFT_META],
            ),
            (
                "META",
                &["Super", "Win", "Command", "Cmd", "Meta"],
                &[Key::LEFT_META, Key::RIGHT_META],
            ),
            ("FN", &["Fn"], &[Key::FN]),
        ];
        for (name, aliases, keys) in defaults {
            let aliases = aliases.iter().map(|a| a.to_string()).collect();
            if let Err(e) = registry.insert(name, aliases, keys.to_vec()) {
                log::error!("default modifier table is inconsistent: {}", e);
            }
        }
        registry
    }

    fn insert(
        &mut self,
        name: &str,
        aliases: Vec<String>,
        keys: Vec<Key>,
    ) -> Result<Modifier, ModifierError> {
        if keys.is_empty() {
            return Err(ModifierError::NoKeys(name.to_string()));
        }
        if self.by_name.contains_key(name) || self.by_alias.contains_key(name) {
            return Err(ModifierError::NameExists(name.to_string()));
        }
        for (i, alias) in aliases.iter().enumerate() {
            if let Some(owner) = self.by_alias.get(alias).or_else(|| self.by_name.get(alias)) {
                return Err(ModifierError::AliasExists(alias.clone(), owner.name().to_string()));
            }
            if alias == name || aliases[..i].contains(alias) {
                return Err(ModifierError::AliasExists(alias.clone(), name.to_string()));
            }
        }

        // A generic modifier needs a specific one per key; missing ones are
        // registered as NAME_KEY
        let mut variants = Vec::new();
        if keys.len() > 1 {
            for (i, key) in keys.iter().enumerate() {
                if keys[..i].contains(key) {
                    return Err(ModifierError::KeyAlreadyAssigned(*key, name.to_string()));
                }
                if let Some(owner) = self.generic_by_key.get(key) {
                    return Err(ModifierError::KeyAlreadyAssigned(*key, owner.name().to_string()));
                }
                if !self.by_key.contains_key(key) {
                    let variant = format!("{}_{}", name, key);
                    if self.by_name.contains_key(&variant) || self.by_alias.contains_key(&variant) {
                        return Err(ModifierError::NameExists(variant));
                    }
                    variants.push((variant, *key));
                }
            }
        } else if let Some(existing) = self.by_key.get(&keys[0]) {
            return Err(ModifierError::KeyAlreadyAssigned(keys[0], existing.name().to_string()));
        }

        for (variant, key) in variants {
            let specific = Modifier::new_def(&variant, Vec::new(), vec![key]);
            self.by_key.insert(key, specific.clone());
            self.by_name.insert(variant, specific);
        }

        let modifier = Modifier::new_def(name, aliases, keys);
        if let [key] = modifier.keys() {
            self.by_key.insert(*key, modifier.clone());
        } else {
            for key in modifier.keys() {
                self.generic_by_key.insert(*key, modifier.clone());
            }
        }
        for alias in &modifier.0.aliases {
            self.by_alias.insert(alias.clone(), modifier.clone());
        }
        self.by_name.insert(name.to_string(), modifier.clone());
        Ok(modifier)
    }
}

impl Modifier {
    fn new_def(name: &str, aliases: Vec<String>, keys: Vec<Key>) -> Modifier {
        Modifier(Arc::new(ModifierDef {
            id: NEXT_MODIFIER_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            aliases,
            keys,
        }))
    }

    /// Register a new modifier.
    ///
    /// Names and aliases must be unused. A single-key modifier claims its
    /// key outright; a multi-key one must not share keys with another
    /// generic modifier, and gets a specific `NAME_KEY` modifier for each
    /// key that has none yet. Nothing is registered on error.
    pub fn add(name: &str, aliases: Vec<String>, keys: Vec<Key>) -> Result<Modifier, ModifierError> {
        let modifier = MODIFIER_REGISTRY.write().insert(name, aliases, keys)?;
        log::debug!("registered modifier {} on {:?}", modifier.name(), modifier.keys());
        Ok(modifier)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.0.aliases
    }

    /// Registration order, used to print combos consistently
    pub(crate) fn id(&self) -> u32 {
        self.0.id
    }

    /// First alias, falling back to the name
    pub fn primary_alias(&self) -> &str {
        self.0.aliases.first().map(String::as_str).unwrap_or(&self.0.name)
    }

    /// A specific modifier is bound to exactly one key
    pub fn is_specific(&self) -> bool {
        self.0.keys.len() == 1
    }

    pub fn keys(&self) -> &[Key] {
        &self.0.keys
    }

    /// The key pressed when this modifier is emitted.
    ///
    /// For a generic modifier this is its first key, so `CONTROL` emits
    /// `LEFT_CTRL`.
    pub fn key(&self) -> Key {
        self.0.keys[0]
    }

    /// Left variant of a generic modifier (`CONTROL` -> `L_CONTROL`)
    pub fn to_left(&self) -> Option<Modifier> {
        if self.0.name.starts_with("L_") {
            return Some(self.clone());
        }
        Self::from_name(&format!("L_{}", self.0.name))
    }

    /// Right variant of a generic modifier (`CONTROL` -> `R_CONTROL`)
    pub fn to_right(&self) -> Option<Modifier> {
        if self.0.name.starts_with("R_") {
            return Some(self.clone());
        }
        Self::from_name(&format!("R_{}", self.0.name))
    }

    /// The specific modifiers a generic one stands for.
    ///
    /// Each of the modifier's keys is mapped back to its specific modifier;
    /// a generic modifier whose keys are not all individually registered is
    /// returned as-is.
    pub fn specific_variants(&self) -> Vec<Modifier> {
        if self.is_specific() {
            return vec![self.clone()];
        }
        let registry = MODIFIER_REGISTRY.read();
        let variants: Option<Vec<Modifier>> = self
            .0
            .keys
            .iter()
            .map(|key| registry.by_key.get(key).cloned())
            .collect();
        variants.unwrap_or_else(|| vec![self.clone()])
    }

    /// Whether this modifier is held when `key` is down
    pub fn matches_key(&self, key: Key) -> bool {
        self.0.keys.contains(&key)
    }

    /// The specific modifier bound to `key`
    pub fn from_key(key: Key) -> Option<Modifier> {
        MODIFIER_REGISTRY.read().by_key.get(&key).cloned()
    }

    pub fn is_key_modifier(key: Key) -> bool {
        MODIFIER_REGISTRY.read().by_key.contains_key(&key)
    }

    pub fn from_name(name: &str) -> Option<Modifier> {
        MODIFIER_REGISTRY.read().by_name.get(name).cloned()
    }

    /// Look up by alias (`Ctrl`, `Super`) or by name (`CONTROL`)
    pub fn from_alias(alias: &str) -> Option<Modifier> {
        let registry = MODIFIER_REGISTRY.read();
        registry
            .by_alias
            .get(alias)
            .or_else(|| registry.by_name.get(alias))
            .cloned()
    }

    pub fn all_aliases() -> Vec<String> {
        let registry = MODIFIER_REGISTRY.read();
        let mut aliases: Vec<String> = registry.by_alias.keys().cloned().collect();
        aliases.sort();
        aliases
    }
}

impl PartialEq for Modifier {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Modifier {}

impl std::hash::Hash for Modifier {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.primary_alias())
    }
}

impl fmt::Debug for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.primary_alias(), self.key())
    }
}
