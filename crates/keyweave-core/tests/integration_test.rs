// Keyweave Integration Tests
//
// A TOML configuration loaded and run through the engine.

use std::time::{Duration, Instant};

use keyweave_core::context::{NoWindowContext, SharedContext, WindowInfo};
use keyweave_core::output::{MemorySink, Output};
use keyweave_core::{Action, Config, ConfigError, EventSource, Key, ModifierError, RuleError, TransformEngine};

const CONFIG: &str = r#"
[timeouts]
multipurpose = 200
suspend = 300

[[modmap]]
name = "Global"
mappings = { CAPSLOCK = "LEFT_CTRL" }

[[modmap]]
name = "Terminals"
condition = "wm_class =~ '^(kitty|alacritty)$'"
mappings = { CAPSLOCK = "ESC" }

[[multipurpose]]
name = "Enter2Ctrl"
mappings = { ENTER = ["ENTER", "RIGHT_CTRL"] }

[[keymap]]
name = "Browsers"
condition = "wm_class =~ 'firefox'"
[keymap.mappings]
"C-j" = "F6"

[[keymap]]
name = "General"
[keymap.mappings]
"C-Alt-j" = "C-TAB"
"C-q" = "escape_next_key"
"C-x" = { nested = { "C-c" = "Alt-F4" } }
"#;

struct Run {
    engine: TransformEngine<MemorySink>,
    now: Instant,
    source: EventSource,
}

impl Run {
    fn new(config: Config, window: SharedContext) -> Self {
        Self {
            engine: TransformEngine::new(config.rules, Output::new(MemorySink::new()), Box::new(window)),
            now: Instant::now(),
            source: EventSource::named("test keyboard"),
        }
    }

    fn keys(&mut self, events: &[(Key, Action)]) -> Vec<(Action, Key)> {
        for &(key, action) in events {
            self.now += Duration::from_millis(10);
            self.engine.on_key(key, action, self.now, &self.source).unwrap();
        }
        self.engine.output().sink().keys()
    }
}

use Action::{Press as P, Release as R};

#[test]
fn test_config_drives_silent_combo() {
    let config = Config::from_toml(CONFIG).unwrap();
    let mut run = Run::new(config, SharedContext::new(WindowInfo::new("gedit", "")));

    let out = run.keys(&[
        (Key::CAPSLOCK, P),
        (Key::LEFT_ALT, P),
        (Key::J, P),
        (Key::J, R),
        (Key::LEFT_ALT, R),
        (Key::CAPSLOCK, R),
    ]);
    assert_eq!(
        out,
        vec![(P, Key::LEFT_CTRL), (P, Key::TAB), (R, Key::TAB), (R, Key::LEFT_CTRL)]
    );
}

#[test]
fn test_config_conditional_modmap_replaces_default() {
    let config = Config::from_toml(CONFIG).unwrap();
    let mut run = Run::new(config, SharedContext::new(WindowInfo::new("kitty", "")));
    let out = run.keys(&[(Key::CAPSLOCK, P), (Key::CAPSLOCK, R)]);
    assert_eq!(out, vec![(P, Key::ESC), (R, Key::ESC)]);
}

#[test]
fn test_config_conditional_keymap_takes_precedence() {
    let config = Config::from_toml(CONFIG).unwrap();
    let mut run = Run::new(config, SharedContext::new(WindowInfo::new("firefox", "")));
    let out = run.keys(&[
        (Key::LEFT_CTRL, P),
        (Key::J, P),
        (Key::J, R),
        (Key::LEFT_CTRL, R),
    ]);
    assert_eq!(out, vec![(P, Key::F6), (R, Key::F6)]);
}

#[test]
fn test_config_nested_keymap() {
    let config = Config::from_toml(CONFIG).unwrap();
    let mut run = Run::new(config, SharedContext::default());
    let out = run.keys(&[
        (Key::LEFT_CTRL, P),
        (Key::X, P),
        (Key::X, R),
        (Key::C, P),
        (Key::C, R),
        (Key::LEFT_CTRL, R),
    ]);
    assert_eq!(
        out,
        vec![(P, Key::LEFT_ALT), (P, Key::F4), (R, Key::F4), (R, Key::LEFT_ALT)]
    );
}

#[test]
fn test_config_multipurpose_timeout() {
    let config = Config::from_toml(CONFIG).unwrap();
    assert_eq!(config.rules.timeouts().multipurpose, Duration::from_millis(200));

    let mut run = Run::new(config, SharedContext::default());
    run.keys(&[(Key::ENTER, P)]);
    let deadline = run.engine.next_deadline().unwrap();
    assert_eq!(deadline, run.now + Duration::from_millis(200));

    // The next event after the deadline sees the key already resolved
    run.now = deadline;
    let out = run.keys(&[(Key::ENTER, R)]);
    assert_eq!(out, vec![(P, Key::RIGHT_CTRL), (R, Key::RIGHT_CTRL)]);
}

#[test]
fn test_config_without_window_context() {
    let config = Config::from_toml(CONFIG).unwrap();
    let mut engine = TransformEngine::new(config.rules, Output::new(MemorySink::new()), Box::new(NoWindowContext));
    let now = Instant::now();
    let source = EventSource::default();
    engine.on_key(Key::CAPSLOCK, P, now, &source).unwrap();
    engine.on_key(Key::A, P, now, &source).unwrap();
    engine.shutdown().unwrap();
    assert_eq!(
        engine.output().sink().keys(),
        vec![(P, Key::LEFT_CTRL), (P, Key::A), (R, Key::A), (R, Key::LEFT_CTRL)]
    );
}

#[test]
fn test_config_errors_are_fatal() {
    let err = Config::from_toml(
        r#"
[[multipurpose]]
name = "one"
mappings = { ENTER = ["ENTER", "RIGHT_CTRL"] }

[[multipurpose]]
name = "two"
mappings = { TAB = ["TAB", "LEFT_ALT"] }
"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Rules(RuleError::DuplicateDefaultMultiModmap { .. })
    ));
    assert!(Config::from_toml("[[keymap]]\nname = 3\n").is_err());
}

#[test]
fn test_config_multi_key_modifier_drives_keymaps() {
    let config = Config::from_toml(
        r#"
[[modifier]]
name = "DUAL_HYPER"
aliases = ["DualHyper"]
keys = ["F23", "F24"]

[[keymap]]
name = "hyper"
[keymap.mappings]
"DualHyper-j" = "k"
"#,
    )
    .unwrap();
    let mut run = Run::new(config, SharedContext::default());

    let out = run.keys(&[
        (Key::F23, P),
        (Key::J, P),
        (Key::J, R),
        (Key::F23, R),
        (Key::F24, P),
        (Key::J, P),
        (Key::J, R),
        (Key::F24, R),
    ]);
    assert_eq!(out, vec![(P, Key::K), (R, Key::K), (P, Key::K), (R, Key::K)]);
}

#[test]
fn test_config_modifier_cannot_take_existing_alias() {
    let err = Config::from_toml(
        r#"
[[modifier]]
name = "ALIAS_TAKER"
aliases = ["Ctrl"]
keys = ["F22"]
"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Modifier(ModifierError::AliasExists(ref alias, ref owner))
            if alias == "Ctrl" && owner == "CONTROL"
    ));

    // Ctrl still means Control for later configs
    let config = Config::from_toml(
        r#"
[[keymap]]
name = "after"
[keymap.mappings]
"Ctrl-j" = "k"
"#,
    )
    .unwrap();
    let mut run = Run::new(config, SharedContext::default());
    let out = run.keys(&[
        (Key::LEFT_CTRL, P),
        (Key::J, P),
        (Key::J, R),
        (Key::LEFT_CTRL, R),
    ]);
    assert_eq!(out, vec![(P, Key::K), (R, Key::K)]);
}
