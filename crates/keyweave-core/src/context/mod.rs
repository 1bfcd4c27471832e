// Keyweave Context
// What the engine knows about the focused window and the event source

mod condition;
mod wayland;
#[cfg(feature = "x11-backend")]
mod x11;

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

pub use condition::{Condition, ConditionError};
pub use wayland::WaylandContextProvider;
#[cfg(feature = "x11-backend")]
pub use x11::X11ContextProvider;

/// Error type for window context queries
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("not connected to the window system")]
    NotConnected,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Identity of the focused window.
///
/// Empty strings mean the window system reported no value, which is not an
/// error (for example, nothing has focus).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowInfo {
    pub wm_class: String,
    pub wm_name: String,
}

impl WindowInfo {
    pub fn new(wm_class: impl Into<String>, wm_name: impl Into<String>) -> Self {
        Self {
            wm_class: wm_class.into(),
            wm_name: wm_name.into(),
        }
    }
}

/// Everything a condition can look at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyContext {
    pub wm_class: String,
    pub wm_name: String,
    pub device_name: String,
    pub capslock_on: bool,
    pub numlock_on: bool,
}

impl KeyContext {
    pub fn new(window: WindowInfo, source: &EventSource) -> Self {
        Self {
            wm_class: window.wm_class,
            wm_name: window.wm_name,
            device_name: source.device_name.clone(),
            capslock_on: source.capslock_on,
            numlock_on: source.numlock_on,
        }
    }

    /// Refresh the per-event fields, keeping the window identity
    pub fn update_source(&mut self, source: &EventSource) {
        if self.device_name != source.device_name {
            self.device_name.clone_from(&source.device_name);
        }
        self.capslock_on = source.capslock_on;
        self.numlock_on = source.numlock_on;
    }
}

/// Device-level facts delivered alongside each input event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSource {
    pub device_name: String,
    pub capslock_on: bool,
    pub numlock_on: bool,
}

impl EventSource {
    pub fn named(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            ..Self::default()
        }
    }
}

/// Source of the focused window's identity.
///
/// Queried on every new key press. A failed query puts the engine into
/// pass-through until a later query succeeds.
pub trait ContextProvider: Send {
    /// Short name for logs
    fn name(&self) -> &'static str;

    fn active_window(&mut self) -> Result<WindowInfo, ContextError>;
}

/// Provider for hosts without a window system.
///
/// Always succeeds with an empty window, so only unconditional rules and
/// device/lock conditions can match.
#[derive(Debug, Default)]
pub struct NoWindowContext;

impl ContextProvider for NoWindowContext {
    fn name(&self) -> &'static str {
        "none"
    }

    fn active_window(&mut self) -> Result<WindowInfo, ContextError> {
        Ok(WindowInfo::default())
    }
}

/// Provider whose answer is set from elsewhere.
///
/// Clones share the same slot, so a caller can keep one handle and give the
/// other to the engine.
#[derive(Debug, Clone)]
pub struct SharedContext {
    slot: Arc<Mutex<Result<WindowInfo, ContextError>>>,
}

impl SharedContext {
    pub fn new(window: WindowInfo) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Ok(window))),
        }
    }

    pub fn set_window(&self, window: WindowInfo) {
        *self.slot.lock() = Ok(window);
    }

    /// Make subsequent queries fail with `error`
    pub fn set_error(&self, error: ContextError) {
        *self.slot.lock() = Err(error);
    }
}

impl Default for SharedContext {
    fn default() -> Self {
        Self::new(WindowInfo::default())
    }
}

impl ContextProvider for SharedContext {
    fn name(&self) -> &'static str {
        "shared"
    }

    fn active_window(&mut self) -> Result<WindowInfo, ContextError> {
        self.slot.lock().clone()
    }
}
