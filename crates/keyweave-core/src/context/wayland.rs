// Keyweave Wayland Context
// Focused window tracking via wlr-foreign-toplevel-management-unstable-v1

use std::collections::HashMap;
use std::fs;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use wayland_backend::rs::client::ObjectId;
use wayland_client::{
    event_created_child,
    globals::{registry_queue_init, GlobalListContents},
    protocol::wl_registry,
    Connection, Dispatch, Proxy, QueueHandle,
};
use wayland_protocols_wlr::foreign_toplevel::v1::client::{
    zwlr_foreign_toplevel_handle_v1, zwlr_foreign_toplevel_manager_v1,
};

use super::{ContextError, ContextProvider, WindowInfo};

/// Minimum spacing between reconnection attempts
const RECONNECT_INTERVAL: Duration = Duration::from_secs(2);

/// `activated` entry in the toplevel state array
const STATE_ACTIVATED: u8 = 2;

#[derive(Debug, Clone, Default)]
struct Toplevel {
    app_id: String,
    title: String,
}

struct ToplevelTracker {
    windows: HashMap<ObjectId, Toplevel>,
    active_handle: Option<ObjectId>,
    focused: Arc<Mutex<WindowInfo>>,
}

impl ToplevelTracker {
    fn publish(&self) {
        let info = self
            .active_handle
            .as_ref()
            .and_then(|id| self.windows.get(id))
            .map(|t| WindowInfo::new(t.app_id.clone(), t.title.clone()))
            .unwrap_or_default();
        *self.focused.lock() = info;
    }
}

impl Dispatch<wl_registry::WlRegistry, GlobalListContents> for ToplevelTracker {
    fn event(
        _state: &mut Self,
        _registry: &wl_registry::WlRegistry,
        _event: wl_registry::Event,
        _globals: &GlobalListContents,
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<zwlr_foreign_toplevel_manager_v1::ZwlrForeignToplevelManagerV1, ()> for ToplevelTracker {
    fn event(
        state: &mut Self,
        _manager: &zwlr_foreign_toplevel_manager_v1::ZwlrForeignToplevelManagerV1,
        event: zwlr_foreign_toplevel_manager_v1::Event,
        _: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        if let zwlr_foreign_toplevel_manager_v1::Event::Toplevel { toplevel } = event {
            state.windows.insert(toplevel.id(), Toplevel::default());
        }
    }

    event_created_child!(ToplevelTracker, zwlr_foreign_toplevel_manager_v1::ZwlrForeignToplevelManagerV1, [
        0 => (zwlr_foreign_toplevel_handle_v1::ZwlrForeignToplevelHandleV1, ())
    ]);
}

impl Dispatch<zwlr_foreign_toplevel_handle_v1::ZwlrForeignToplevelHandleV1, ()> for ToplevelTracker {
    fn event(
        state: &mut Self,
        handle: &zwlr_foreign_toplevel_handle_v1::ZwlrForeignToplevelHandleV1,
        event: zwlr_foreign_toplevel_handle_v1::Event,
        _: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        let id = handle.id();
        let is_active = state.active_handle.as_ref() == Some(&id);
        match event {
            zwlr_foreign_toplevel_handle_v1::Event::Title { title } => {
                if let Some(window) = state.windows.get_mut(&id) {
                    window.title = title;
                }
                if is_active {
                    state.publish();
                }
            }
            zwlr_foreign_toplevel_handle_v1::Event::AppId { app_id } => {
                if let Some(window) = state.windows.get_mut(&id) {
                    window.app_id = app_id;
                }
                if is_active {
                    state.publish();
                }
            }
            zwlr_foreign_toplevel_handle_v1::Event::State { state: flags } => {
                if flags.contains(&STATE_ACTIVATED) {
                    state.active_handle = Some(id);
                    state.publish();
                } else if is_active {
                    state.active_handle = None;
                    state.publish();
                }
            }
            zwlr_foreign_toplevel_handle_v1::Event::Closed => {
                state.windows.remove(&id);
                if is_active {
                    state.active_handle = None;
                    state.publish();
                }
                handle.destroy();
            }
            _ => {}
        }
    }
}

/// Context provider for wlroots-based compositors.
///
/// A background thread dispatches toplevel events and keeps the focused
/// window in a shared slot. While the connection is down, queries fail and
/// reconnection is retried at most every couple of seconds.
pub struct WaylandContextProvider {
    focused: Arc<Mutex<WindowInfo>>,
    connected: Arc<AtomicBool>,
    last_attempt: Option<Instant>,
}

impl WaylandContextProvider {
    pub fn new() -> Self {
        Self {
            focused: Arc::new(Mutex::new(WindowInfo::default())),
            connected: Arc::new(AtomicBool::new(false)),
            last_attempt: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Connect to the compositor and start the dispatch thread
    pub fn connect(&mut self) -> Result<(), ContextError> {
        self.last_attempt = Some(Instant::now());

        let connection = open_connection()?;
        let (globals, mut event_queue) = registry_queue_init::<ToplevelTracker>(&connection)
            .map_err(|e| ContextError::ConnectionFailed(e.to_string()))?;
        let qhandle = event_queue.handle();
        globals
            .bind::<zwlr_foreign_toplevel_manager_v1::ZwlrForeignToplevelManagerV1, _, _>(
                &qhandle,
                1..=3,
                (),
            )
            .map_err(|e| {
                ContextError::ConnectionFailed(format!("foreign toplevel manager unavailable: {}", e))
            })?;

        let mut tracker = ToplevelTracker {
            windows: HashMap::new(),
            active_handle: None,
            focused: Arc::clone(&self.focused),
        };
        event_queue
            .roundtrip(&mut tracker)
            .map_err(|e| ContextError::ConnectionFailed(e.to_string()))?;

        self.connected.store(true, Ordering::Release);
        let connected = Arc::clone(&self.connected);
        thread::Builder::new()
            .name("wayland-context".into())
            .spawn(move || {
                while event_queue.blocking_dispatch(&mut tracker).is_ok() {}
                log::warn!("Wayland connection lost; window context unavailable");
                connected.store(false, Ordering::Release);
            })
            .map_err(|e| ContextError::ConnectionFailed(e.to_string()))?;

        log::info!("Connected to Wayland compositor for window context");
        Ok(())
    }

    fn reconnect_due(&self) -> bool {
        self.last_attempt
            .map_or(true, |at| at.elapsed() >= RECONNECT_INTERVAL)
    }

    #[cfg(test)]
    fn set_focused_for_test(&self, info: WindowInfo) {
        *self.focused.lock() = info;
        self.connected.store(true, Ordering::Release);
    }
}

impl Default for WaylandContextProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextProvider for WaylandContextProvider {
    fn name(&self) -> &'static str {
        "wayland"
    }

    fn active_window(&mut self) -> Result<WindowInfo, ContextError> {
        if !self.is_connected() {
            if !self.reconnect_due() {
                return Err(ContextError::NotConnected);
            }
            if let Err(e) = self.connect() {
                log::debug!("Wayland reconnect failed: {}", e);
                return Err(ContextError::NotConnected);
            }
        }
        Ok(self.focused.lock().clone())
    }
}

/// Open the compositor socket, preferring `WAYLAND_DISPLAY`
fn open_connection() -> Result<Connection, ContextError> {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| ContextError::ConnectionFailed("XDG_RUNTIME_DIR is not set".into()))?;

    let mut candidates = Vec::new();
    if let Ok(display) = std::env::var("WAYLAND_DISPLAY") {
        if !display.trim().is_empty() {
            candidates.push(display);
        }
    }
    for display in discover_displays(&runtime_dir) {
        if !candidates.contains(&display) {
            candidates.push(display);
        }
    }
    if candidates.is_empty() {
        return Err(ContextError::ConnectionFailed("no Wayland socket found".into()));
    }

    let mut last_error = String::new();
    for display in candidates {
        let path = if display.starts_with('/') {
            PathBuf::from(&display)
        } else {
            runtime_dir.join(&display)
        };
        match UnixStream::connect(&path).map(Connection::from_socket) {
            Ok(Ok(connection)) => return Ok(connection),
            Ok(Err(e)) => last_error = e.to_string(),
            Err(e) => last_error = e.to_string(),
        }
    }
    Err(ContextError::ConnectionFailed(last_error))
}

fn display_suffix(name: &str) -> Option<u32> {
    let suffix = name.strip_prefix("wayland-")?;
    if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// `wayland-N` sockets in the runtime dir, highest N first
fn discover_displays(runtime_dir: &std::path::Path) -> Vec<String> {
    let mut displays: Vec<(u32, String)> = fs::read_dir(runtime_dir)
        .map(|entries| {
            entries
                .flatten()
                .filter_map(|entry| {
                    let name = entry.file_name().to_str()?.to_string();
                    display_suffix(&name).map(|order| (order, name))
                })
                .collect()
        })
        .unwrap_or_default();
    displays.sort_by(|a, b| b.0.cmp(&a.0));
    displays.into_iter().map(|(_, name)| name).collect()
}
