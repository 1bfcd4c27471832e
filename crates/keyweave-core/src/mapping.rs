// Keyweave Mapping Structures
// Modmap, MultiModmap, Keymap and the rule tables the engine consumes

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::command::Command;
use crate::context::{Condition, KeyContext};
use crate::{Combo, Key};

/// Default window for both suspend and multipurpose arbitration
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("only one unconditional modmap is allowed (found {first:?} and {second:?})")]
    DuplicateDefaultModmap { first: String, second: String },

    #[error("only one unconditional multipurpose modmap is allowed (found {first:?} and {second:?})")]
    DuplicateDefaultMultiModmap { first: String, second: String },
}

/// Key-for-key substitution
#[derive(Debug, Clone, Default)]
pub struct Modmap {
    name: String,
    mappings: HashMap<Key, Key>,
    condition: Option<Condition>,
}

impl Modmap {
    pub fn new(name: impl Into<String>, mappings: HashMap<Key, Key>) -> Self {
        Self {
            name: name.into(),
            mappings,
            condition: None,
        }
    }

    pub fn with_condition(name: impl Into<String>, mappings: HashMap<Key, Key>, condition: Condition) -> Self {
        Self {
            name: name.into(),
            mappings,
            condition: Some(condition),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn contains(&self, key: Key) -> bool {
        self.mappings.contains_key(&key)
    }

    pub fn get(&self, key: Key) -> Option<Key> {
        self.mappings.get(&key).copied()
    }
}

/// Tap/hold table: physical key to `(tap, hold)`
#[derive(Debug, Clone, Default)]
pub struct MultiModmap {
    name: String,
    mappings: HashMap<Key, (Key, Key)>,
    condition: Option<Condition>,
}

impl MultiModmap {
    pub fn new(name: impl Into<String>, mappings: HashMap<Key, (Key, Key)>) -> Self {
        Self {
            name: name.into(),
            mappings,
            condition: None,
        }
    }

    pub fn with_condition(
        name: impl Into<String>,
        mappings: HashMap<Key, (Key, Key)>,
        condition: Condition,
    ) -> Self {
        Self {
            name: name.into(),
            mappings,
            condition: Some(condition),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn contains(&self, key: Key) -> bool {
        self.mappings.contains_key(&key)
    }

    /// The `(tap, hold)` pair for `key`
    pub fn get(&self, key: Key) -> Option<(Key, Key)> {
        self.mappings.get(&key).copied()
    }
}

/// Combo to command list, optionally gated by a condition.
///
/// Combos with generic modifiers are stored once per specific variant so a
/// lookup with the specific modifiers actually held is a single hash probe.
#[derive(Debug, Clone, Default)]
pub struct Keymap {
    name: String,
    mappings: HashMap<Combo, Vec<Command>>,
    /// Entries written with specific modifiers; generic expansion never
    /// overwrites these
    explicit: HashSet<Combo>,
    condition: Option<Condition>,
}

impl Keymap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_condition(name: impl Into<String>, condition: Condition) -> Self {
        Self {
            name: name.into(),
            condition: Some(condition),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// Number of specific combos stored
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn insert(&mut self, combo: Combo, commands: Vec<Command>) {
        if combo.is_specific() {
            self.explicit.insert(combo.clone());
            self.mappings.insert(combo, commands);
            return;
        }
        for specific in combo.expand_specific() {
            if !self.explicit.contains(&specific) {
                self.mappings.insert(specific, commands.clone());
            }
        }
    }

    /// Builder form of [`Keymap::insert`]
    pub fn bind(mut self, combo: Combo, commands: impl IntoIterator<Item = Command>) -> Self {
        self.insert(combo, commands.into_iter().collect());
        self
    }

    pub fn get(&self, combo: &Combo) -> Option<&[Command]> {
        self.mappings.get(combo).map(Vec::as_slice)
    }

    pub fn contains(&self, combo: &Combo) -> bool {
        self.mappings.contains_key(combo)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Combo, &[Command])> {
        self.mappings.iter().map(|(c, cmds)| (c, cmds.as_slice()))
    }
}

/// Arbitration windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// How long a multipurpose key waits before it becomes its hold key
    pub multipurpose: Duration,
    /// How long a lone modifier press is withheld
    pub suspend: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            multipurpose: DEFAULT_TIMEOUT,
            suspend: DEFAULT_TIMEOUT,
        }
    }
}

/// Everything the engine reads from configuration, fixed for the session.
///
/// The unconditional modmap (if any) becomes the default; conditional ones
/// keep their declared order.
#[derive(Debug, Clone, Default)]
pub struct RuleTables {
    modmap: Modmap,
    conditional_modmaps: Vec<Modmap>,
    multi_modmap: MultiModmap,
    conditional_multi_modmaps: Vec<MultiModmap>,
    keymaps: Vec<Arc<Keymap>>,
    timeouts: Timeouts,
}

impl RuleTables {
    pub fn new(
        modmaps: Vec<Modmap>,
        multi_modmaps: Vec<MultiModmap>,
        keymaps: Vec<Keymap>,
        timeouts: Timeouts,
    ) -> Result<Self, RuleError> {
        let (modmap, conditional_modmaps) = split_default(modmaps, Modmap::condition, |first, second| {
            RuleError::DuplicateDefaultModmap {
                first: first.name().to_string(),
                second: second.name().to_string(),
            }
        })?;
        let (multi_modmap, conditional_multi_modmaps) =
            split_default(multi_modmaps, MultiModmap::condition, |first, second| {
                RuleError::DuplicateDefaultMultiModmap {
                    first: first.name().to_string(),
                    second: second.name().to_string(),
                }
            })?;

        Ok(Self {
            modmap,
            conditional_modmaps,
            multi_modmap,
            conditional_multi_modmaps,
            keymaps: keymaps.into_iter().map(Arc::new).collect(),
            timeouts,
        })
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn default_modmap(&self) -> &Modmap {
        &self.modmap
    }

    pub fn default_multi_modmap(&self) -> &MultiModmap {
        &self.multi_modmap
    }

    pub fn keymaps(&self) -> &[Arc<Keymap>] {
        &self.keymaps
    }

    /// The modmap in force for `ctx`: the first conditional modmap whose
    /// condition holds replaces the default outright
    pub fn active_modmap(&self, ctx: &KeyContext) -> &Modmap {
        self.conditional_modmaps
            .iter()
            .find(|mm| mm.condition().map_or(true, |c| c.matches(ctx)))
            .unwrap_or(&self.modmap)
    }

    pub fn active_multi_modmap(&self, ctx: &KeyContext) -> &MultiModmap {
        self.conditional_multi_modmaps
            .iter()
            .find(|mm| mm.condition().map_or(true, |c| c.matches(ctx)))
            .unwrap_or(&self.multi_modmap)
    }

    pub fn modmap_key(&self, key: Key, ctx: &KeyContext) -> Key {
        self.active_modmap(ctx).get(key).unwrap_or(key)
    }

    /// `(tap, hold)` for `key` under the active multipurpose modmap
    pub fn multipurpose(&self, key: Key, ctx: &KeyContext) -> Option<(Key, Key)> {
        self.active_multi_modmap(ctx).get(key)
    }

    /// Keymaps whose condition holds for `ctx`, in declared order
    pub fn active_keymaps(&self, ctx: &KeyContext) -> Vec<Arc<Keymap>> {
        self.keymaps
            .iter()
            .filter(|km| km.condition().map_or(true, |c| c.matches(ctx)))
            .cloned()
            .collect()
    }

    /// Counts for the startup summary
    pub fn summary(&self) -> String {
        format!(
            "{} modmap(s), {} multipurpose modmap(s), {} keymap(s)",
            1 + self.conditional_modmaps.len(),
            1 + self.conditional_multi_modmaps.len(),
            self.keymaps.len()
        )
    }
}

fn split_default<T: Default>(
    tables: Vec<T>,
    condition: fn(&T) -> Option<&Condition>,
    duplicate: impl Fn(&T, &T) -> RuleError,
) -> Result<(T, Vec<T>), RuleError> {
    let mut default: Option<T> = None;
    let mut conditional = Vec::new();
    for table in tables {
        if condition(&table).is_some() {
            conditional.push(table);
            continue;
        }
        if let Some(first) = &default {
            return Err(duplicate(first, &table));
        }
        default = Some(table);
    }
    Ok((default.unwrap_or_default(), conditional))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Modifier;

    fn ctx(wm_class: &str) -> KeyContext {
        KeyContext {
            wm_class: wm_class.to_string(),
            ..KeyContext::default()
        }
    }

    fn ctrl() -> Modifier {
        Modifier::from_name("CONTROL").unwrap()
    }

    #[test]
    fn test_keymap_expands_generic_modifiers() {
        let km = Keymap::new("test").bind(Combo::new([ctrl()], Key::J), [Command::Key(Key::K)]);
        assert_eq!(km.len(), 2);
        let lctrl = Modifier::from_name("L_CONTROL").unwrap();
        let rctrl = Modifier::from_name("R_CONTROL").unwrap();
        assert!(km.contains(&Combo::new([lctrl], Key::J)));
        assert!(km.contains(&Combo::new([rctrl], Key::J)));
        assert!(!km.contains(&Combo::key_only(Key::J)));
    }

    #[test]
    fn test_specific_entry_beats_generic_expansion() {
        let lctrl = Modifier::from_name("L_CONTROL").unwrap();
        let km = Keymap::new("test")
            .bind(Combo::new([lctrl.clone()], Key::J), [Command::Key(Key::A)])
            .bind(Combo::new([ctrl()], Key::J), [Command::Key(Key::B)]);
        assert_eq!(km.get(&Combo::new([lctrl], Key::J)), Some(&[Command::Key(Key::A)][..]));
        let rctrl = Modifier::from_name("R_CONTROL").unwrap();
        assert_eq!(km.get(&Combo::new([rctrl], Key::J)), Some(&[Command::Key(Key::B)][..]));
    }

    #[test]
    fn test_second_default_modmap_is_rejected() {
        let err = RuleTables::new(
            vec![Modmap::new("one", HashMap::new()), Modmap::new("two", HashMap::new())],
            vec![],
            vec![],
            Timeouts::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            RuleError::DuplicateDefaultModmap {
                first: "one".into(),
                second: "two".into()
            }
        );

        let err = RuleTables::new(
            vec![],
            vec![MultiModmap::new("a", HashMap::new()), MultiModmap::new("b", HashMap::new())],
            vec![],
            Timeouts::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::DuplicateDefaultMultiModmap { .. }));
    }

    #[test]
    fn test_conditional_modmap_overrides_default() {
        let default = Modmap::new("default", HashMap::from([(Key::CAPSLOCK, Key::LEFT_CTRL)]));
        let term = Modmap::with_condition(
            "term",
            HashMap::from([(Key::CAPSLOCK, Key::ESC)]),
            Condition::parse("wm_class =~ 'term'").unwrap(),
        );
        let rules = RuleTables::new(vec![term, default], vec![], vec![], Timeouts::default()).unwrap();

        assert_eq!(rules.modmap_key(Key::CAPSLOCK, &ctx("Firefox")), Key::LEFT_CTRL);
        assert_eq!(rules.modmap_key(Key::CAPSLOCK, &ctx("kitty-terminal")), Key::ESC);
        assert_eq!(rules.modmap_key(Key::A, &ctx("kitty-terminal")), Key::A);
    }

    #[test]
    fn test_active_conditional_modmap_hides_default_entries() {
        let default = Modmap::new("default", HashMap::from([(Key::RIGHT_CTRL, Key::LEFT_META)]));
        let emacs = Modmap::with_condition(
            "emacs",
            HashMap::from([(Key::CAPSLOCK, Key::ESC)]),
            Condition::parse("wm_class == 'Emacs'").unwrap(),
        );
        let rules = RuleTables::new(vec![default, emacs], vec![], vec![], Timeouts::default()).unwrap();

        assert_eq!(rules.active_modmap(&ctx("Emacs")).name(), "emacs");
        assert_eq!(rules.modmap_key(Key::RIGHT_CTRL, &ctx("Emacs")), Key::RIGHT_CTRL);
        assert_eq!(rules.modmap_key(Key::RIGHT_CTRL, &ctx("Chrome")), Key::LEFT_META);
    }

    #[test]
    fn test_multipurpose_lookup() {
        let multi = MultiModmap::new("multi", HashMap::from([(Key::ENTER, (Key::ENTER, Key::RIGHT_CTRL))]));
        let rules = RuleTables::new(vec![], vec![multi], vec![], Timeouts::default()).unwrap();
        assert_eq!(rules.multipurpose(Key::ENTER, &ctx("")), Some((Key::ENTER, Key::RIGHT_CTRL)));
        assert_eq!(rules.multipurpose(Key::A, &ctx("")), None);
    }

    #[test]
    fn test_active_keymaps_keep_declared_order() {
        let rules = RuleTables::new(
            vec![],
            vec![],
            vec![
                Keymap::with_condition("firefox", Condition::parse("wm_class == 'firefox'").unwrap()),
                Keymap::new("general"),
            ],
            Timeouts::default(),
        )
        .unwrap();
        let names: Vec<String> = rules
            .active_keymaps(&ctx("Firefox"))
            .iter()
            .map(|km| km.name().to_string())
            .collect();
        assert_eq!(names, vec!["firefox", "general"]);
        assert_eq!(rules.active_keymaps(&ctx("kitty")).len(), 1);
    }
}
