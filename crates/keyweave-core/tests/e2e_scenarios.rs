// Keyweave End-to-End Test Scenarios
//
// Real-world key sequences driven through the engine into an in-memory
// sink, without hardware.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use keyweave_core::context::{Condition, ContextError, SharedContext, WindowInfo};
use keyweave_core::mapping::{Keymap, Modmap, MultiModmap, RuleTables, Timeouts};
use keyweave_core::output::{MemorySink, Output, RawEvent};
use keyweave_core::{command, Action, Combo, Command, EventSource, InputEvent, Key, TransformEngine};

// =========================================================================
// Test Helpers
// =========================================================================

struct Harness {
    engine: TransformEngine<MemorySink>,
    window: SharedContext,
    source: EventSource,
    now: Instant,
}

impl Harness {
    fn new(rules: RuleTables) -> Self {
        let window = SharedContext::new(WindowInfo::new("kitty", "~"));
        let engine = TransformEngine::new(rules, Output::new(MemorySink::new()), Box::new(window.clone()));
        Self {
            engine,
            window,
            source: EventSource::named("AT Translated Set 2 keyboard"),
            now: Instant::now(),
        }
    }

    fn with_keymaps(keymaps: Vec<Keymap>) -> Self {
        Self::new(RuleTables::new(vec![], vec![], keymaps, Timeouts::default()).unwrap())
    }

    fn send(&mut self, key: Key, action: Action) {
        self.now += Duration::from_millis(5);
        self.engine.on_key(key, action, self.now, &self.source).unwrap();
    }

    fn press(&mut self, key: Key) {
        self.send(key, Action::Press);
    }

    fn release(&mut self, key: Key) {
        self.send(key, Action::Release);
    }

    fn tap(&mut self, key: Key) {
        self.press(key);
        self.release(key);
    }

    /// Jump past the pending deadline and let it fire
    fn wait_for_timeout(&mut self) {
        let deadline = self.engine.next_deadline().expect("a deadline is pending");
        self.now = deadline;
        self.engine.tick(self.now).unwrap();
    }

    fn out(&self) -> Vec<(Action, Key)> {
        self.engine.output().sink().keys()
    }

    fn clear(&mut self) {
        self.engine.output_mut().sink_mut().clear();
    }
}

fn p(key: Key) -> (Action, Key) {
    (Action::Press, key)
}

fn r(key: Key) -> (Action, Key) {
    (Action::Release, key)
}

fn combo(s: &str) -> Combo {
    s.parse().unwrap()
}

fn enter_to_rctrl() -> RuleTables {
    let multi = MultiModmap::new("Enter2Ctrl", HashMap::from([(Key::ENTER, (Key::ENTER, Key::RIGHT_CTRL))]));
    RuleTables::new(vec![], vec![multi], vec![], Timeouts::default()).unwrap()
}

// =========================================================================
// Modmaps
// =========================================================================

#[test]
fn test_caps_to_esc_modmap() {
    let modmap = Modmap::new("caps2esc", HashMap::from([(Key::CAPSLOCK, Key::ESC)]));
    let mut h = Harness::new(RuleTables::new(vec![modmap], vec![], vec![], Timeouts::default()).unwrap());
    h.tap(Key::CAPSLOCK);
    h.tap(Key::A);
    assert_eq!(h.out(), vec![p(Key::ESC), r(Key::ESC), p(Key::A), r(Key::A)]);
}

#[test]
fn test_unmapped_keys_pass_through_unchanged() {
    let mut h = Harness::new(RuleTables::default());
    h.press(Key::LEFT_SHIFT);
    h.tap(Key::A);
    h.release(Key::LEFT_SHIFT);
    assert_eq!(
        h.out(),
        vec![p(Key::LEFT_SHIFT), p(Key::A), r(Key::A), r(Key::LEFT_SHIFT)]
    );
}

// =========================================================================
// Combos
// =========================================================================

#[test]
fn test_silent_combo_alt_j_to_ctrl_tab() {
    let keymap = Keymap::new("General").bind(combo("C-Alt-j"), [Command::Combo(combo("C-TAB"))]);
    let mut h = Harness::with_keymaps(vec![keymap]);

    h.press(Key::LEFT_CTRL);
    h.press(Key::LEFT_ALT);
    h.tap(Key::J);
    h.release(Key::LEFT_ALT);
    h.release(Key::LEFT_CTRL);

    // The input modifiers never reach the output
    assert_eq!(
        h.out(),
        vec![p(Key::LEFT_CTRL), p(Key::TAB), r(Key::TAB), r(Key::LEFT_CTRL)]
    );
}

#[test]
fn test_combo_lifts_exerted_modifier_for_its_duration() {
    let keymap = Keymap::new("General").bind(combo("Shift-a"), [Command::Combo(combo("C-b"))]);
    let mut h = Harness::with_keymaps(vec![keymap]);

    h.press(Key::LEFT_SHIFT);
    h.wait_for_timeout();
    h.tap(Key::A);
    h.release(Key::LEFT_SHIFT);

    assert_eq!(
        h.out(),
        vec![
            p(Key::LEFT_SHIFT),
            r(Key::LEFT_SHIFT),
            p(Key::LEFT_CTRL),
            p(Key::B),
            r(Key::B),
            r(Key::LEFT_CTRL),
            p(Key::LEFT_SHIFT),
            r(Key::LEFT_SHIFT),
        ]
    );
}

#[test]
fn test_repeated_combo_while_modifier_held() {
    let keymap = Keymap::new("General").bind(combo("C-h"), [Command::Key(Key::BACKSPACE)]);
    let mut h = Harness::with_keymaps(vec![keymap]);

    h.press(Key::LEFT_CTRL);
    h.tap(Key::H);
    h.tap(Key::H);
    h.release(Key::LEFT_CTRL);

    assert_eq!(
        h.out(),
        vec![p(Key::BACKSPACE), r(Key::BACKSPACE), p(Key::BACKSPACE), r(Key::BACKSPACE)]
    );
}

#[test]
fn test_typed_text_output() {
    let keymap = Keymap::new("General").bind(combo("C-semicolon"), [command::to_keystrokes("Hi").unwrap()]);
    let mut h = Harness::with_keymaps(vec![keymap]);

    h.press(Key::LEFT_CTRL);
    h.tap(Key::SEMICOLON);
    h.release(Key::LEFT_CTRL);

    assert_eq!(
        h.out(),
        vec![
            p(Key::LEFT_SHIFT),
            p(Key::H),
            r(Key::H),
            r(Key::LEFT_SHIFT),
            p(Key::I),
            r(Key::I),
        ]
    );
}

#[test]
fn test_command_sequence_does_not_flicker_shared_modifiers() {
    let keymap = Keymap::new("General").bind(
        combo("C-Alt-j"),
        [
            Command::Combo(combo("C-Alt-x")),
            Command::Combo(combo("C-y")),
            Command::Key(Key::Z),
            Command::Key(Key::A),
        ],
    );
    let mut h = Harness::with_keymaps(vec![keymap]);

    h.press(Key::LEFT_CTRL);
    h.press(Key::LEFT_ALT);
    h.wait_for_timeout();
    assert_eq!(h.out(), vec![p(Key::LEFT_CTRL), p(Key::LEFT_ALT)]);
    h.clear();

    h.tap(Key::J);
    // Each modifier goes up once, where it stops being needed, and both
    // come back only after the last combo
    assert_eq!(
        h.out(),
        vec![
            p(Key::X),
            r(Key::X),
            r(Key::LEFT_ALT),
            p(Key::Y),
            r(Key::Y),
            r(Key::LEFT_CTRL),
            p(Key::Z),
            r(Key::Z),
            p(Key::A),
            r(Key::A),
            p(Key::LEFT_CTRL),
            p(Key::LEFT_ALT),
        ]
    );
    assert_eq!(h.engine.output().lift_depth(), 0);

    h.clear();
    h.release(Key::LEFT_ALT);
    h.release(Key::LEFT_CTRL);
    assert_eq!(h.out(), vec![r(Key::LEFT_ALT), r(Key::LEFT_CTRL)]);
}

// =========================================================================
// Sticky bind
// =========================================================================

#[test]
fn test_sticky_super_tab_to_alt_tab() {
    let keymap = Keymap::new("Switcher").bind(
        combo("Super-TAB"),
        [Command::Bind, Command::Combo(combo("Alt-TAB"))],
    );
    let mut h = Harness::with_keymaps(vec![keymap]);

    h.press(Key::LEFT_META);
    h.tap(Key::TAB);
    assert!(h.engine.sticky().is_some());
    h.tap(Key::TAB);
    h.release(Key::LEFT_META);

    // Alt stays down across both tabs and goes up with Super
    assert_eq!(
        h.out(),
        vec![
            p(Key::LEFT_ALT),
            p(Key::TAB),
            r(Key::TAB),
            p(Key::TAB),
            r(Key::TAB),
            r(Key::LEFT_ALT),
        ]
    );
    assert!(h.engine.sticky().is_none());
}

#[test]
fn test_second_bind_is_refused_while_one_is_active() {
    let keymap = Keymap::new("Switcher")
        .bind(combo("Super-TAB"), [Command::Bind, Command::Combo(combo("Alt-TAB"))])
        .bind(combo("Super-GRAVE"), [Command::Bind, Command::Combo(combo("C-TAB"))]);
    let mut h = Harness::with_keymaps(vec![keymap]);

    h.press(Key::LEFT_META);
    h.tap(Key::TAB);
    h.tap(Key::GRAVE);

    // The first binding survives; C-TAB is sent unbound around the held Alt
    let bind = h.engine.sticky().unwrap();
    assert_eq!((bind.input, bind.output), (Key::LEFT_META, Key::LEFT_ALT));

    h.release(Key::LEFT_META);
    assert_eq!(
        h.out(),
        vec![
            p(Key::LEFT_ALT),
            p(Key::TAB),
            r(Key::TAB),
            r(Key::LEFT_ALT),
            p(Key::LEFT_CTRL),
            p(Key::TAB),
            r(Key::TAB),
            r(Key::LEFT_CTRL),
            p(Key::LEFT_ALT),
            r(Key::LEFT_ALT),
        ]
    );
    assert!(h.engine.sticky().is_none());
}

// =========================================================================
// Multipurpose keys
// =========================================================================

#[test]
fn test_multipurpose_tap() {
    let mut h = Harness::new(enter_to_rctrl());
    h.tap(Key::ENTER);
    assert_eq!(h.out(), vec![p(Key::ENTER), r(Key::ENTER)]);
    assert!(h.engine.next_deadline().is_none());
}

#[test]
fn test_multipurpose_hold_after_timeout() {
    let mut h = Harness::new(enter_to_rctrl());
    h.press(Key::ENTER);
    assert!(h.out().is_empty());

    h.wait_for_timeout();
    assert_eq!(h.out(), vec![p(Key::RIGHT_CTRL)]);

    h.release(Key::ENTER);
    assert_eq!(h.out(), vec![p(Key::RIGHT_CTRL), r(Key::RIGHT_CTRL)]);
}

#[test]
fn test_multipurpose_chord_resolves_as_hold() {
    let mut h = Harness::new(enter_to_rctrl());
    h.press(Key::ENTER);
    h.tap(Key::A);
    h.release(Key::ENTER);
    assert_eq!(
        h.out(),
        vec![p(Key::RIGHT_CTRL), p(Key::A), r(Key::A), r(Key::RIGHT_CTRL)]
    );
}

#[test]
fn test_modifier_press_does_not_shorten_multipurpose_window() {
    let multi = MultiModmap::new("Enter2Ctrl", HashMap::from([(Key::ENTER, (Key::ENTER, Key::RIGHT_CTRL))]));
    let timeouts = Timeouts {
        multipurpose: Duration::from_millis(1000),
        suspend: Duration::from_millis(200),
    };
    let mut h = Harness::new(RuleTables::new(vec![], vec![multi], vec![], timeouts).unwrap());

    h.press(Key::ENTER);
    h.press(Key::LEFT_SHIFT);
    let deadline = h.engine.next_deadline().unwrap();
    assert_eq!(deadline, h.now + Duration::from_millis(1000));

    // Past the plain modifier timeout, both keys are still withheld
    h.engine.tick(h.now + Duration::from_millis(500)).unwrap();
    assert!(h.engine.is_suspended());
    assert!(h.out().is_empty());

    h.wait_for_timeout();
    assert_eq!(h.out(), vec![p(Key::RIGHT_CTRL), p(Key::LEFT_SHIFT)]);
}

#[test]
fn test_multipurpose_long_tap_after_timeout_is_hold() {
    let mut h = Harness::new(enter_to_rctrl());
    h.press(Key::ENTER);
    h.wait_for_timeout();
    h.release(Key::ENTER);
    // No ENTER: the key was held past the decision window
    assert!(!h.out().contains(&p(Key::ENTER)));
}

// =========================================================================
// Suspend timing
// =========================================================================

#[test]
fn test_modifier_tap_is_delayed_until_release() {
    let mut h = Harness::new(RuleTables::default());
    h.press(Key::LEFT_ALT);
    assert!(h.out().is_empty());
    assert!(h.engine.is_suspended());
    h.release(Key::LEFT_ALT);
    assert_eq!(h.out(), vec![p(Key::LEFT_ALT), r(Key::LEFT_ALT)]);
}

#[test]
fn test_modifier_repeat_only_after_exerted() {
    let mut h = Harness::new(RuleTables::default());
    h.press(Key::LEFT_SHIFT);
    h.send(Key::LEFT_SHIFT, Action::Repeat);
    assert!(h.out().is_empty());

    h.wait_for_timeout();
    h.send(Key::LEFT_SHIFT, Action::Repeat);
    h.release(Key::LEFT_SHIFT);
    assert_eq!(
        h.out(),
        vec![p(Key::LEFT_SHIFT), (Action::Repeat, Key::LEFT_SHIFT), r(Key::LEFT_SHIFT)]
    );
}

// =========================================================================
// Nested keymaps and escape
// =========================================================================

fn emacs_keymap() -> Keymap {
    let ctrl_x = Keymap::new("C-x").bind(combo("C-s"), [Command::Key(Key::F2)]);
    Keymap::new("Emacs").bind(combo("C-x"), [Command::Nested(Arc::new(ctrl_x))])
}

#[test]
fn test_nested_keymap_sequence() {
    let mut h = Harness::with_keymaps(vec![emacs_keymap()]);

    h.press(Key::LEFT_CTRL);
    h.press(Key::X);
    h.send(Key::X, Action::Repeat);
    h.release(Key::X);
    assert!(!h.engine.mode().is_top_level());
    h.tap(Key::S);
    h.release(Key::LEFT_CTRL);
    assert!(h.engine.mode().is_top_level());

    h.tap(Key::K);
    assert_eq!(h.out(), vec![p(Key::F2), r(Key::F2), p(Key::K), r(Key::K)]);
}

#[test]
fn test_nested_keymap_swallows_unmatched_key() {
    let mut h = Harness::with_keymaps(vec![emacs_keymap()]);

    h.press(Key::LEFT_CTRL);
    h.tap(Key::X);
    h.release(Key::LEFT_CTRL);
    h.tap(Key::Q);
    assert!(h.out().is_empty());
    assert!(h.engine.mode().is_top_level());

    h.tap(Key::Q);
    assert_eq!(h.out(), vec![p(Key::Q), r(Key::Q)]);
}

#[test]
fn test_escape_next_key() {
    let keymap = Keymap::new("General")
        .bind(combo("C-q"), [Command::Escape])
        .bind(combo("C-a"), [Command::Key(Key::HOME)]);
    let mut h = Harness::with_keymaps(vec![keymap]);

    h.press(Key::LEFT_CTRL);
    h.tap(Key::Q);
    h.tap(Key::A);
    h.release(Key::LEFT_CTRL);

    // C-a went out as itself instead of HOME
    assert!(h.out().contains(&p(Key::A)));
    assert!(!h.out().contains(&p(Key::HOME)));
}

// =========================================================================
// Window context
// =========================================================================

#[test]
fn test_conditional_keymap_follows_focus() {
    let browser = Keymap::with_condition("Browser", Condition::parse("wm_class =~ 'firefox'").unwrap())
        .bind(combo("F1"), [Command::Key(Key::F5)]);
    let mut h = Harness::with_keymaps(vec![browser]);

    h.tap(Key::F1);
    h.window.set_window(WindowInfo::new("firefox", "Mozilla Firefox"));
    h.tap(Key::F1);
    assert_eq!(h.out(), vec![p(Key::F1), r(Key::F1), p(Key::F5), r(Key::F5)]);
}

#[test]
fn test_context_failure_passes_keys_through() {
    let modmap = Modmap::new("swap", HashMap::from([(Key::A, Key::B)]));
    let mut h = Harness::new(RuleTables::new(vec![modmap], vec![], vec![], Timeouts::default()).unwrap());

    h.window.set_error(ContextError::QueryFailed("compositor went away".into()));
    h.tap(Key::A);
    assert!(h.engine.is_passthrough());
    // Pressed during the outage, released after recovery: stays raw
    h.press(Key::A);
    h.window.set_window(WindowInfo::new("kitty", ""));
    h.release(Key::A);
    assert_eq!(h.out(), vec![p(Key::A), r(Key::A), p(Key::A), r(Key::A)]);

    h.clear();
    h.tap(Key::A);
    assert!(!h.engine.is_passthrough());
    assert_eq!(h.out(), vec![p(Key::B), r(Key::B)]);
}

#[test]
fn test_context_failure_flushes_suspended_modifier() {
    let mut h = Harness::new(RuleTables::default());
    h.press(Key::LEFT_CTRL);
    h.window.set_error(ContextError::NotConnected);
    h.tap(Key::C);
    h.release(Key::LEFT_CTRL);
    assert_eq!(
        h.out(),
        vec![p(Key::LEFT_CTRL), p(Key::C), r(Key::C), r(Key::LEFT_CTRL)]
    );
}

// =========================================================================
// Pass-through and shutdown
// =========================================================================

#[test]
fn test_raw_events_are_forwarded() {
    let mut h = Harness::new(RuleTables::default());
    let wheel = RawEvent::new(RawEvent::EV_REL, 8, -1);
    h.engine.on_event(&InputEvent::Other(wheel), &h.source.clone()).unwrap();
    assert_eq!(h.engine.output().sink().raw_events(), vec![wheel]);
}

#[test]
fn test_shutdown_releases_everything() {
    let mut h = Harness::new(RuleTables::default());
    h.press(Key::LEFT_SHIFT);
    h.wait_for_timeout();
    h.press(Key::A);

    h.engine.shutdown().unwrap();
    assert_eq!(
        h.out(),
        vec![p(Key::LEFT_SHIFT), p(Key::A), r(Key::A), r(Key::LEFT_SHIFT)]
    );
    assert!(h.engine.output().sink().is_closed());
    assert!(h.engine.keystore().is_empty());
}

#[test]
fn test_shutdown_releases_sticky_output() {
    let keymap = Keymap::new("Switcher").bind(
        combo("Super-TAB"),
        [Command::Bind, Command::Combo(combo("Alt-TAB"))],
    );
    let mut h = Harness::with_keymaps(vec![keymap]);
    h.press(Key::LEFT_META);
    h.tap(Key::TAB);

    h.engine.shutdown().unwrap();
    assert_eq!(h.out().last(), Some(&r(Key::LEFT_ALT)));
    assert!(h.engine.output().pressed_keys().next().is_none());
}

#[test]
fn test_every_press_gets_a_release() {
    let keymap = Keymap::new("General")
        .bind(combo("C-Alt-j"), [Command::Combo(combo("C-TAB"))])
        .bind(combo("Super-TAB"), [Command::Bind, Command::Combo(combo("Alt-TAB"))]);
    let multi = MultiModmap::new("Enter2Ctrl", HashMap::from([(Key::ENTER, (Key::ENTER, Key::RIGHT_CTRL))]));
    let rules = RuleTables::new(vec![], vec![multi], vec![keymap], Timeouts::default()).unwrap();
    let mut h = Harness::new(rules);

    h.press(Key::LEFT_CTRL);
    h.press(Key::LEFT_ALT);
    h.tap(Key::J);
    h.press(Key::ENTER);
    h.tap(Key::K);
    h.press(Key::LEFT_META);
    h.tap(Key::TAB);
    h.release(Key::LEFT_ALT);
    h.release(Key::ENTER);
    h.press(Key::LEFT_SHIFT);
    h.engine.shutdown().unwrap();

    let mut held: HashMap<Key, i32> = HashMap::new();
    for (action, key) in h.out() {
        match action {
            Action::Press => *held.entry(key).or_default() += 1,
            Action::Release => *held.entry(key).or_default() -= 1,
            Action::Repeat => {}
        }
    }
    assert!(held.values().all(|n| *n == 0), "unbalanced output: {:?}", held);
}
