// Keyweave Combo Sending Calculation
// Modifier arithmetic for what to lift and press around a combo

use crate::{Combo, Key};

/// Keys to touch when emitting one combo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComboPlan {
    /// Held modifier keys the combo does not want, in press order
    pub lift: Vec<Key>,
    /// Keys to press for modifiers not already satisfied
    pub press: Vec<Key>,
    /// Terminal key, tapped once
    pub key: Key,
}

impl ComboPlan {
    pub fn needs_modifier_changes(&self) -> bool {
        !self.lift.is_empty() || !self.press.is_empty()
    }
}

/// Work out the modifier diff between what is held and what `combo` needs.
///
/// A held key satisfies a combo modifier when it is one of that modifier's
/// keys, so a held `RIGHT_CTRL` covers a generic `Ctrl`. Unsatisfied
/// modifiers are pressed with their first key.
pub fn plan_combo(combo: &Combo, pressed_modifier_keys: &[Key]) -> ComboPlan {
    let mut lift: Vec<Key> = Vec::new();
    let mut missing: Vec<_> = combo.modifiers().to_vec();

    for &held in pressed_modifier_keys {
        match missing.iter().position(|m| m.matches_key(held)) {
            Some(pos) => {
                missing.remove(pos);
            }
            None if combo.modifiers().iter().any(|m| m.matches_key(held)) => {}
            None => lift.push(held),
        }
    }

    ComboPlan {
        lift,
        press: missing.iter().map(|m| m.key()).collect(),
        key: combo.key(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Modifier;

    fn m(name: &str) -> Modifier {
        Modifier::from_name(name).unwrap()
    }

    #[test]
    fn test_plan_bare_key() {
        let plan = plan_combo(&Combo::key_only(Key::A), &[]);
        assert!(!plan.needs_modifier_changes());
        assert_eq!(plan.key, Key::A);
    }

    #[test]
    fn test_plan_keeps_satisfied_modifier() {
        let combo = Combo::new([m("CONTROL")], Key::A);
        let plan = plan_combo(&combo, &[Key::RIGHT_CTRL]);
        assert!(plan.lift.is_empty());
        assert!(plan.press.is_empty());
    }

    #[test]
    fn test_plan_lifts_extras_and_presses_missing() {
        let combo = Combo::new([m("CONTROL"), m("SHIFT")], Key::TAB);
        let plan = plan_combo(&combo, &[Key::LEFT_ALT, Key::LEFT_CTRL, Key::LEFT_META]);
        assert_eq!(plan.lift, vec![Key::LEFT_ALT, Key::LEFT_META]);
        assert_eq!(plan.press, vec![Key::LEFT_SHIFT]);
        assert_eq!(plan.key, Key::TAB);
    }

    #[test]
    fn test_plan_both_sides_of_one_modifier_held() {
        // Both shifts held for a Shift combo: neither is lifted
        let combo = Combo::new([m("SHIFT")], Key::A);
        let plan = plan_combo(&combo, &[Key::LEFT_SHIFT, Key::RIGHT_SHIFT]);
        assert!(plan.lift.is_empty());
        assert!(plan.press.is_empty());
    }

    #[test]
    fn test_plan_specific_modifier_mismatch() {
        let combo = Combo::new([m("R_CONTROL")], Key::A);
        let plan = plan_combo(&combo, &[Key::LEFT_CTRL]);
        assert_eq!(plan.lift, vec![Key::LEFT_CTRL]);
        assert_eq!(plan.press, vec![Key::RIGHT_CTRL]);
    }
}
