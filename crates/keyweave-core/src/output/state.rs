// Keyweave Output State
// Tracks what is asserted on the sink and emits minimal combo diffs

use indexmap::IndexSet;

use super::combo::plan_combo;
use super::sink::{OutputError, OutputSink, RawEvent};
use crate::{Action, Combo, Key, Modifier};

/// Output side of the engine.
///
/// Every key write goes through here so the pressed sets always mirror the
/// sink. Sets keep press order, which fixes the order of lifts and of the
/// shutdown release sweep.
#[derive(Debug)]
pub struct Output<S: OutputSink> {
    sink: S,
    /// Every key currently pressed on the sink, modifiers included
    pressed_keys: IndexSet<Key>,
    pressed_modifiers: IndexSet<Key>,
    /// Modifiers lifted inside a lift scope, re-pressed when it closes
    lifted: Vec<Key>,
    lift_depth: usize,
}

impl<S: OutputSink> Output<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            pressed_keys: IndexSet::new(),
            pressed_modifiers: IndexSet::new(),
            lifted: Vec::new(),
            lift_depth: 0,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn is_mod_pressed(&self, key: Key) -> bool {
        self.pressed_modifiers.contains(&key)
    }

    pub fn is_pressed(&self, key: Key) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn pressed_keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.pressed_keys.iter().copied()
    }

    pub fn pressed_modifier_keys(&self) -> Vec<Key> {
        self.pressed_modifiers.iter().copied().collect()
    }

    pub fn lift_depth(&self) -> usize {
        self.lift_depth
    }

    /// Forward a non-key event
    pub fn send_event(&mut self, event: &RawEvent) -> Result<(), OutputError> {
        self.sink.write_raw(event)
    }

    /// Write one key action and sync
    pub fn send_key_action(&mut self, key: Key, action: Action) -> Result<(), OutputError> {
        log::trace!("out {} ({})", key, action);
        self.sink.write_key(key, action)?;
        self.sink.sync()?;

        let is_mod = Modifier::is_key_modifier(key);
        match action {
            Action::Press => {
                self.pressed_keys.insert(key);
                if is_mod {
                    self.pressed_modifiers.insert(key);
                }
            }
            Action::Release => {
                self.pressed_keys.shift_remove(&key);
                self.pressed_modifiers.shift_remove(&key);
            }
            Action::Repeat => {}
        }
        Ok(())
    }

    /// Emit `combo` touching as few modifiers as possible.
    ///
    /// Held modifiers the combo does not use are lifted first; inside a
    /// lift scope they stay lifted until the scope ends, otherwise they are
    /// restored right after the combo.
    pub fn send_combo(&mut self, combo: &Combo) -> Result<(), OutputError> {
        let plan = plan_combo(combo, &self.pressed_modifier_keys());

        for &key in &plan.lift {
            self.send_key_action(key, Action::Release)?;
        }
        for &key in &plan.press {
            self.send_key_action(key, Action::Press)?;
        }

        self.send_key_action(plan.key, Action::Press)?;
        self.send_key_action(plan.key, Action::Release)?;

        for &key in plan.press.iter().rev() {
            self.send_key_action(key, Action::Release)?;
        }

        if self.lift_depth > 0 {
            self.lifted.extend(plan.lift);
        } else {
            for &key in plan.lift.iter().rev() {
                self.send_key_action(key, Action::Press)?;
            }
        }
        Ok(())
    }

    /// A bare key is a combo with no modifiers, so held modifiers are lifted
    pub fn send_key(&mut self, key: Key) -> Result<(), OutputError> {
        self.send_combo(&Combo::key_only(key))
    }

    /// Enter a lift scope; scopes nest
    pub fn begin_lift_scope(&mut self) {
        self.lift_depth += 1;
    }

    /// Leave a lift scope, re-pressing lifted modifiers when the outermost
    /// scope closes
    pub fn end_lift_scope(&mut self) -> Result<(), OutputError> {
        self.lift_depth = self.lift_depth.saturating_sub(1);
        if self.lift_depth > 0 {
            return Ok(());
        }
        let lifted = std::mem::take(&mut self.lifted);
        let mut restored: Vec<Key> = Vec::with_capacity(lifted.len());
        for &key in lifted.iter().rev() {
            if !self.is_pressed(key) && !restored.contains(&key) {
                self.send_key_action(key, Action::Press)?;
                restored.push(key);
            }
        }
        Ok(())
    }

    /// Release everything still pressed, then close the sink.
    ///
    /// Keeps going past write errors so as many keys as possible are
    /// released; the first error is returned.
    pub fn shutdown(&mut self) -> Result<(), OutputError> {
        let mut first_err = None;
        let (mods, keys): (Vec<Key>, Vec<Key>) = self
            .pressed_keys
            .iter()
            .copied()
            .partition(|k| self.pressed_modifiers.contains(k));

        for key in keys.into_iter().rev().chain(mods.into_iter().rev()) {
            if let Err(e) = self.send_key_action(key, Action::Release) {
                log::error!("Failed to release {} on shutdown: {}", key, e);
                // Forget it anyway so a retry does not loop on the same key
                self.pressed_keys.shift_remove(&key);
                self.pressed_modifiers.shift_remove(&key);
                first_err.get_or_insert(e);
            }
        }
        self.lifted.clear();
        self.lift_depth = 0;

        if let Err(e) = self.sink.close() {
            first_err.get_or_insert(e);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// One-line summary for diagnostics
    pub fn diagnostics(&self) -> String {
        format!(
            "pressed=[{}] modifiers=[{}] lifted=[{}] lift_depth={}",
            join_keys(self.pressed_keys.iter()),
            join_keys(self.pressed_modifiers.iter()),
            join_keys(self.lifted.iter()),
            self.lift_depth
        )
    }
}

fn join_keys<'a>(keys: impl Iterator<Item = &'a Key>) -> String {
    keys.map(Key::to_string).collect::<Vec<_>>().join(", ")
}
