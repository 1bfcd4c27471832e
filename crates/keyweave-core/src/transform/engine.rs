// Keyweave Transform Engine
// Key dispatch, suspend/resume arbitration, combo matching and command execution

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::command::{CallContext, Command};
use crate::context::{ContextProvider, EventSource, KeyContext};
use crate::input::InputEvent;
use crate::mapping::{Keymap, RuleTables};
use crate::output::{Output, OutputError, OutputSink, RawEvent};
use crate::state::{Keystate, Keystore};
use crate::transform::SuspendTimer;
use crate::{Action, Combo, Key};

/// Where the next combo is looked up
#[derive(Debug, Clone, Default)]
pub enum MatchMode {
    /// Keymaps active for the current context
    #[default]
    TopLevel,
    /// Inside a multi-key sequence
    Nested(Vec<Arc<Keymap>>),
    /// Next key bypasses matching
    EscapeNext,
}

impl MatchMode {
    pub fn is_top_level(&self) -> bool {
        matches!(self, MatchMode::TopLevel)
    }
}

/// A live sticky binding: releasing `input` releases `output` instead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StickyBind {
    pub input: Key,
    pub output: Key,
}

/// Mutable engine state, owned by the dispatch loop.
///
/// A fresh value is a clean slate; nothing here outlives the engine.
#[derive(Debug)]
pub struct EngineState {
    keystore: Keystore,
    timer: SuspendTimer,
    mode: MatchMode,
    sticky: Option<StickyBind>,
    last_key: Option<Key>,
    mark: bool,
    /// Context of the latest press
    context: KeyContext,
    /// The context provider is failing; rules are bypassed
    passthrough: bool,
    /// Keys pressed while bypassing, released raw as well
    raw_keys: HashSet<Key>,
    now: Instant,
}

impl EngineState {
    fn new(now: Instant) -> Self {
        Self {
            keystore: Keystore::new(),
            timer: SuspendTimer::new(),
            mode: MatchMode::TopLevel,
            sticky: None,
            last_key: None,
            mark: false,
            context: KeyContext::default(),
            passthrough: false,
            raw_keys: HashSet::new(),
            now,
        }
    }
}

/// The keyboard transform engine.
///
/// Feed it input with [`TransformEngine::on_event`] and call
/// [`TransformEngine::tick`] whenever [`TransformEngine::next_deadline`]
/// passes. All output goes to the owned [`Output`].
pub struct TransformEngine<S: OutputSink> {
    rules: RuleTables,
    output: Output<S>,
    context_provider: Box<dyn ContextProvider>,
    state: EngineState,
}

impl<S: OutputSink> TransformEngine<S> {
    pub fn new(rules: RuleTables, output: Output<S>, context_provider: Box<dyn ContextProvider>) -> Self {
        log::info!(
            "Transform engine ready: {} (context: {})",
            rules.summary(),
            context_provider.name()
        );
        Self {
            rules,
            output,
            context_provider,
            state: EngineState::new(Instant::now()),
        }
    }

    pub fn rules(&self) -> &RuleTables {
        &self.rules
    }

    pub fn output(&self) -> &Output<S> {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut Output<S> {
        &mut self.output
    }

    pub fn keystore(&self) -> &Keystore {
        &self.state.keystore
    }

    pub fn mode(&self) -> &MatchMode {
        &self.state.mode
    }

    pub fn sticky(&self) -> Option<StickyBind> {
        self.state.sticky
    }

    pub fn mark(&self) -> bool {
        self.state.mark
    }

    pub fn is_passthrough(&self) -> bool {
        self.state.passthrough
    }

    pub fn is_suspended(&self) -> bool {
        self.state.timer.is_armed()
    }

    /// When [`TransformEngine::tick`] must next run, if a window is open
    pub fn next_deadline(&self) -> Option<Instant> {
        self.state.timer.deadline()
    }

    /// Time until the next deadline, for sizing a poll timeout
    pub fn time_to_deadline(&self, now: Instant) -> Option<Duration> {
        self.state.timer.remaining(now)
    }

    /// Drop all tracked state, as if freshly constructed
    pub fn reset(&mut self) {
        self.state = EngineState::new(self.state.now);
    }

    /// Close the suspend window if its deadline has passed
    pub fn tick(&mut self, now: Instant) -> Result<(), OutputError> {
        if self.state.timer.is_due(now) {
            self.state.now = now;
            log::debug!("Suspend window elapsed");
            self.resume_keys()?;
        }
        Ok(())
    }

    pub fn on_event(&mut self, event: &InputEvent, source: &EventSource) -> Result<(), OutputError> {
        match event {
            InputEvent::Key(ev) => self.on_key(ev.key, ev.action, ev.time, source),
            InputEvent::Other(raw) => self.on_raw(raw),
        }
    }

    /// Non-key events go straight through
    pub fn on_raw(&mut self, event: &RawEvent) -> Result<(), OutputError> {
        self.output.send_event(event)
    }

    pub fn on_key(
        &mut self,
        inkey: Key,
        action: Action,
        time: Instant,
        source: &EventSource,
    ) -> Result<(), OutputError> {
        self.tick(time)?;
        self.state.now = time;
        log::debug!("in {} ({})", inkey, action);

        if self.state.raw_keys.contains(&inkey) {
            if action.is_released() {
                self.state.raw_keys.remove(&inkey);
            }
            return self.output.send_key_action(inkey, action);
        }

        // A modifier is only withheld when it is the first key down
        let none_pressed = self.state.keystore.is_empty();

        if let Some(ks) = self.state.keystore.get_mut(inkey) {
            ks.advance(action, time);
            self.state.context.update_source(source);
        } else {
            if !action.just_pressed() {
                log::debug!("{} ({}) for untracked key, ignoring", inkey, action);
                return Ok(());
            }
            if !self.refresh_context(source)? {
                self.state.raw_keys.insert(inkey);
                return self.output.send_key_action(inkey, action);
            }
            let ks = self.resolve_new(inkey, action, time);
            self.state.keystore.insert(ks);
        }

        let Some(ks) = self.state.keystore.get(inkey) else {
            return Ok(());
        };
        let (key, is_multi) = (ks.key, ks.is_multi);

        if ks.is_modifier() {
            self.on_modifier(inkey, action, none_pressed)?;
        } else if is_multi && action.just_pressed() {
            if let Some(ks) = self.state.keystore.get_mut(inkey) {
                ks.suspended = true;
            }
            self.suspend_or_resuspend(self.rules.timeouts().multipurpose);
        } else if is_multi && action.is_repeat() {
            // Undecided tap/hold keys do not repeat
        } else if action.is_released() {
            self.on_release(inkey)?;
        } else {
            self.transform_key(key, action)?;
        }

        if action.just_pressed() {
            self.state.last_key = Some(inkey);
        }
        if action.is_released() {
            self.state.keystore.remove(inkey);
        }
        Ok(())
    }

    /// Query the focused window for a new press. Returns false when the
    /// provider fails and the key must bypass the rules.
    fn refresh_context(&mut self, source: &EventSource) -> Result<bool, OutputError> {
        match self.context_provider.active_window() {
            Ok(window) => {
                if self.state.passthrough {
                    log::info!("Window context is back, applying rules again");
                    self.state.passthrough = false;
                }
                self.state.context = KeyContext::new(window, source);
                Ok(true)
            }
            Err(e) => {
                if !self.state.passthrough {
                    log::warn!("Window context unavailable ({}), passing keys through", e);
                    self.state.passthrough = true;
                    self.resume_keys()?;
                    self.state.mode = MatchMode::TopLevel;
                }
                Ok(false)
            }
        }
    }

    /// Pin modmap and multipurpose resolution for the whole press
    fn resolve_new(&self, inkey: Key, action: Action, time: Instant) -> Keystate {
        let ctx = &self.state.context;
        let mut ks = Keystate::new(inkey, action, time);

        let modmap = self.rules.active_modmap(ctx);
        if let Some(mapped) = modmap.get(inkey) {
            log::debug!("modmap: {} => {} [{}]", inkey, mapped, modmap.name());
            ks.key = mapped;
        }

        let multi = self.rules.active_multi_modmap(ctx);
        if let Some((tap, hold)) = multi.get(ks.key) {
            log::debug!("multipurpose: {} => tap {} / hold {} [{}]", ks.key, tap, hold, multi.name());
            ks.key = tap;
            ks.multikey = Some(hold);
            ks.is_multi = true;
        }
        ks
    }

    fn on_modifier(&mut self, inkey: Key, action: Action, none_pressed: bool) -> Result<(), OutputError> {
        let Some(ks) = self.state.keystore.get(inkey) else {
            return Ok(());
        };
        let (key, exerted, spent) = (ks.key, ks.exerted_on_output, ks.spent);
        let mut hold_output = false;
        let mut should_suspend = false;

        if action.is_pressed() {
            should_suspend = none_pressed;
        } else if let Some(bind) = self.state.sticky.filter(|b| b.input == key) {
            log::debug!("lift of BIND {} => {}", bind.input, bind.output);
            self.output.send_key_action(bind.output, Action::Release)?;
            self.state.sticky = None;
            hold_output = !exerted;
        } else if spent {
            log::debug!("silent lift of spent mod {}", key);
            hold_output = !exerted;
        } else {
            log::debug!("resume because of mod release");
            self.resume_keys()?;
        }

        if should_suspend || self.state.timer.is_armed() {
            let exerted_release = action.is_released() && exerted;
            if !exerted_release {
                if let Some(ks) = self.state.keystore.get_mut(inkey) {
                    ks.suspended = true;
                }
                hold_output = true;
            }
            if action.just_pressed() {
                self.suspend_or_resuspend(self.rules.timeouts().suspend);
            }
        }

        if hold_output {
            return Ok(());
        }
        if action.is_repeat() && !self.output.is_pressed(key) {
            return Ok(());
        }
        self.output.send_key_action(key, action)?;
        if let Some(ks) = self.state.keystore.get_mut(inkey) {
            match action {
                Action::Press => ks.exerted_on_output = true,
                Action::Release => ks.exerted_on_output = false,
                Action::Repeat => {}
            }
        }
        Ok(())
    }

    fn on_release(&mut self, inkey: Key) -> Result<(), OutputError> {
        let Some(ks) = self.state.keystore.get(inkey) else {
            return Ok(());
        };
        let (key, is_multi, spent) = (ks.key, ks.is_multi, ks.spent);

        if self.output.is_pressed(key) {
            self.output.send_key_action(key, Action::Release)?;
        }
        if !is_multi {
            return Ok(());
        }

        if self.state.last_key == Some(inkey) {
            log::debug!("multi released early as tap: {}", key);
            if let Some(ks) = self.state.keystore.get_mut(inkey) {
                ks.resolve_as_momentary();
                ks.suspended = false;
            }
            self.resume_keys()?;
            self.transform_key(key, Action::Press)?;
            if self.output.is_pressed(key) {
                self.output.send_key_action(key, Action::Release)?;
            }
            return Ok(());
        }

        let hold = {
            let Some(ks) = self.state.keystore.get_mut(inkey) else {
                return Ok(());
            };
            ks.resolve_as_modifier();
            ks.suspended = false;
            ks.key
        };
        self.resume_keys()?;
        if spent {
            log::debug!("silent release of spent multi {}", hold);
            return Ok(());
        }
        log::debug!("multi released early as hold: {}", hold);
        if !self.output.is_pressed(hold) {
            self.output.send_key_action(hold, Action::Press)?;
        }
        self.output.send_key_action(hold, Action::Release)
    }

    fn transform_key(&mut self, key: Key, action: Action) -> Result<(), OutputError> {
        let combo = Combo::new(self.state.keystore.pressed_modifiers(), key);

        if action.is_repeat() && !self.state.mode.is_top_level() {
            // Holding the key that opened a sequence must not end it
            return Ok(());
        }
        if matches!(self.state.mode, MatchMode::EscapeNext) {
            log::debug!("Escape key: {} => {}", combo, key);
            self.state.mode = MatchMode::TopLevel;
            self.resume_keys()?;
            return self.output.send_key_action(key, action);
        }

        let keymaps = match &self.state.mode {
            MatchMode::Nested(maps) => maps.clone(),
            _ => self.rules.active_keymaps(&self.state.context),
        };
        let top_level = self.state.mode.is_top_level();

        for keymap in &keymaps {
            let Some(commands) = keymap.get(&combo) else {
                continue;
            };
            if log::log_enabled!(log::Level::Debug) {
                let names: Vec<&str> = keymaps.iter().map(|km| km.name()).collect();
                log::debug!(
                    "WM_CLASS '{}' | DEVICE '{}' | KEYMAPS [{}]",
                    self.state.context.wm_class,
                    self.state.context.device_name,
                    names.join(", ")
                );
                log::debug!("  COMBO: {} => {} [{}]", combo, describe(commands), keymap.name());
            }
            self.mark_spent();
            if self.run_commands(commands, &combo)? {
                self.state.mode = MatchMode::TopLevel;
            }
            return Ok(());
        }

        if top_level {
            self.resume_keys()?;
            self.output.send_key_action(key, action)?;
        } else {
            log::debug!("No match for {} in nested keymap, dropping it", combo);
        }
        self.state.mode = MatchMode::TopLevel;
        Ok(())
    }

    /// Held modifiers and tap/hold keys the output does not already assert
    /// are consumed by the combo
    fn mark_spent(&mut self) {
        let output = &self.output;
        let mut spent = Vec::new();
        for ks in self.state.keystore.arbitrated_mut() {
            if !output.is_mod_pressed(ks.key) {
                ks.spent = true;
                spent.push(ks.key);
            }
        }
        if !spent.is_empty() {
            log::debug!("spent modifiers {:?}", spent);
        }
    }

    fn run_commands(&mut self, commands: &[Command], input_combo: &Combo) -> Result<bool, OutputError> {
        if self.state.timer.is_armed() {
            log::debug!("resuspending keys");
            self.suspend_or_resuspend(self.rules.timeouts().suspend);
        }
        self.output.begin_lift_scope();
        let result = self.execute(commands, input_combo);
        let closed = self.output.end_lift_scope();
        let reset = result?;
        closed?;
        Ok(reset)
    }

    /// Returns whether matching should go back to the top level
    fn execute(&mut self, commands: &[Command], input_combo: &Combo) -> Result<bool, OutputError> {
        let mut bind_next = false;
        for command in commands {
            match command {
                Command::Call(callback) => {
                    let produced = {
                        let mut cx = CallContext {
                            context: &self.state.context,
                            mark: &mut self.state.mark,
                        };
                        callback.invoke(&mut cx)
                    };
                    if !self.execute(&produced, input_combo)? {
                        return Ok(false);
                    }
                }
                Command::Combo(combo) => {
                    if bind_next {
                        self.auto_sticky(combo, input_combo)?;
                    }
                    self.output.send_combo(combo)?;
                }
                Command::Key(key) => self.output.send_key(*key)?,
                Command::Escape => {
                    self.state.mode = MatchMode::EscapeNext;
                    return Ok(false);
                }
                Command::Bind => {
                    bind_next = true;
                    continue;
                }
                Command::Ignore => return Ok(true),
                Command::Nested(keymap) => {
                    log::debug!("entering nested keymap {}", keymap.name());
                    self.state.mode = MatchMode::Nested(vec![Arc::clone(keymap)]);
                    return Ok(false);
                }
            }
            bind_next = false;
        }
        Ok(true)
    }

    fn auto_sticky(&mut self, output_combo: &Combo, input_combo: &Combo) -> Result<(), OutputError> {
        if self.state.sticky.is_some() {
            log::debug!("refusing to engage second sticky bind over existing sticky bind");
            return Ok(());
        }
        let (Some(in_mod), Some(out_mod)) = (input_combo.modifiers().first(), output_combo.modifiers().first())
        else {
            return Ok(());
        };
        let bind = StickyBind {
            input: in_mod.key(),
            output: out_mod.key(),
        };

        let in_output = output_combo.modifiers().iter().any(|m| m.matches_key(bind.input));
        let exerted = self
            .state
            .keystore
            .find_resolved_mut(bind.input)
            .map_or(false, |ks| ks.exerted_on_output);
        if exerted && !in_output {
            self.output.send_key_action(bind.input, Action::Release)?;
            if let Some(ks) = self.state.keystore.find_resolved_mut(bind.input) {
                ks.exerted_on_output = false;
            }
        }

        log::debug!("BIND: {} => {}", bind.input, bind.output);
        self.state.sticky = Some(bind);
        if !self.output.is_mod_pressed(bind.output) {
            self.output.send_key_action(bind.output, Action::Press)?;
        }
        Ok(())
    }

    fn suspend_or_resuspend(&mut self, timeout: Duration) {
        let now = self.state.now;
        if self.state.timer.is_armed() {
            self.state.timer.rearm(now, timeout);
        } else {
            self.state.timer.arm(now, timeout);
        }
        for ks in self.state.keystore.arbitrated_mut() {
            ks.suspended = true;
        }
    }

    /// End the suspend window and assert everything it withheld
    fn resume_keys(&mut self) -> Result<(), OutputError> {
        if !self.state.timer.is_armed() {
            return Ok(());
        }
        self.state.timer.cancel();

        let suspended = self.state.keystore.suspended_keys();
        if !suspended.is_empty() {
            log::debug!("resuming keys: {:?}", suspended);
        }
        let sticky_input = self.state.sticky.map(|b| b.input);
        for inkey in suspended {
            let Some(ks) = self.state.keystore.get_mut(inkey) else {
                continue;
            };
            ks.spent = false;
            ks.suspended = false;
            if Some(ks.key) == sticky_input {
                continue;
            }
            if ks.is_multi {
                ks.resolve_as_modifier();
            }
            if !ks.exerted_on_output {
                ks.exerted_on_output = true;
                let key = ks.key;
                self.output.send_key_action(key, Action::Press)?;
            }
        }
        Ok(())
    }

    /// Release everything asserted on the output and close it
    pub fn shutdown(&mut self) -> Result<(), OutputError> {
        log::info!("Shutting down transform engine");
        self.state.timer.cancel();
        self.state.sticky = None;
        self.state.keystore.clear();
        self.state.raw_keys.clear();
        self.output.shutdown()
    }

    /// Log the engine's internal state
    pub fn dump_diagnostics(&self) {
        let state = &self.state;
        log::info!("*** TRANSFORM ***");
        log::info!(
            "suspended: {} (deadline in {:?})",
            state.timer.is_armed(),
            state.timer.remaining(Instant::now())
        );
        log::info!("mode: {:?}", mode_name(&state.mode));
        log::info!("last key: {:?}", state.last_key);
        log::info!("passthrough: {}", state.passthrough);
        log::info!("mark: {}", state.mark);
        for ks in state.keystore.iter() {
            log::info!("  state: {}", ks);
        }
        match state.sticky {
            Some(bind) => log::info!("sticky: {} => {}", bind.input, bind.output),
            None => log::info!("sticky: none"),
        }
        log::info!("output: {}", self.output.diagnostics());
    }
}

fn mode_name(mode: &MatchMode) -> String {
    match mode {
        MatchMode::TopLevel => "top level".to_string(),
        MatchMode::EscapeNext => "escape next key".to_string(),
        MatchMode::Nested(maps) => {
            let names: Vec<&str> = maps.iter().map(|km| km.name()).collect();
            format!("nested [{}]", names.join(", "))
        }
    }
}

fn describe(commands: &[Command]) -> String {
    let parts: Vec<String> = commands.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}
