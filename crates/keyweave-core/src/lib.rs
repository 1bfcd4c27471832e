// Keyweave Core Library
// Keyboard transform engine: modmaps, tap/hold keys, combos and keymaps

pub mod action;
pub mod combo;
pub mod command;
pub mod config;
pub mod context;
pub mod input;
pub mod key;
pub mod mapping;
pub mod modifier;
pub mod output;
pub mod state;
pub mod transform;

#[cfg(feature = "pure-rust")]
pub mod event;

pub use action::Action;
pub use combo::Combo;
pub use command::{CallContext, Callback, Command, Hint};
pub use config::{Config, ConfigError};
pub use context::{ContextProvider, EventSource, KeyContext, WindowInfo};
pub use input::{Control, ControlKeys, InputEvent, KeyEvent};
pub use key::Key;
pub use mapping::{Keymap, Modmap, MultiModmap, RuleError, RuleTables, Timeouts};
pub use modifier::{Modifier, ModifierError};
pub use output::{MemorySink, Output, OutputError, OutputSink};
pub use state::{Keystate, Keystore};
pub use transform::TransformEngine;

#[cfg(feature = "pure-rust")]
pub use event::{EventLoop, EventLoopError, EventLoopResult};
