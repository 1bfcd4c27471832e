// Keyweave X11 Context
// Focused window lookup through the X input focus

use x11rb::protocol::xproto::{Atom, AtomEnum, ConnectionExt as _, Window};
use x11rb::rust_connection::RustConnection;

use super::{ContextError, ContextProvider, WindowInfo};

/// Parent windows followed before giving up on a focus proxy
const MAX_PARENT_HOPS: usize = 8;

struct X11Session {
    conn: RustConnection,
    net_wm_name: Atom,
    utf8_string: Atom,
}

/// Context provider for X11 sessions.
///
/// Connects lazily on the first query and drops the connection on any
/// protocol error so the next query reconnects.
#[derive(Default)]
pub struct X11ContextProvider {
    session: Option<X11Session>,
}

impl X11ContextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&mut self) -> Result<&X11Session, ContextError> {
        if self.session.is_none() {
            let (conn, _screen) =
                x11rb::connect(None).map_err(|e| ContextError::ConnectionFailed(e.to_string()))?;
            let net_wm_name = intern(&conn, b"_NET_WM_NAME")?;
            let utf8_string = intern(&conn, b"UTF8_STRING")?;
            log::info!("Connected to X server for window context");
            self.session = Some(X11Session {
                conn,
                net_wm_name,
                utf8_string,
            });
        }
        self.session.as_ref().ok_or(ContextError::NotConnected)
    }

    fn query(&mut self) -> Result<WindowInfo, ContextError> {
        let session = self.session()?;
        let focus = session
            .conn
            .get_input_focus()
            .map_err(query_failed)?
            .reply()
            .map_err(query_failed)?
            .focus;

        // None (0) and PointerRoot (1) mean no client window has focus
        let mut window: Window = focus;
        if window <= 1 {
            return Ok(WindowInfo::default());
        }

        for _ in 0..MAX_PARENT_HOPS {
            let wm_class = session.wm_class(window)?;
            let wm_name = session.wm_name(window)?;
            let is_proxy = wm_class.as_deref().map_or(false, |c| c.contains("FocusProxy"));
            if (wm_class.is_some() || wm_name.is_some()) && !is_proxy {
                return Ok(WindowInfo::new(
                    wm_class.unwrap_or_default(),
                    wm_name.unwrap_or_default(),
                ));
            }

            let tree = session
                .conn
                .query_tree(window)
                .map_err(query_failed)?
                .reply()
                .map_err(query_failed)?;
            if tree.parent == 0 || tree.parent == tree.root {
                break;
            }
            window = tree.parent;
        }
        Ok(WindowInfo::default())
    }
}

impl X11Session {
    fn property(&self, window: Window, property: Atom, kind: Atom) -> Result<Vec<u8>, ContextError> {
        Ok(self
            .conn
            .get_property(false, window, property, kind, 0, u32::MAX)
            .map_err(query_failed)?
            .reply()
            .map_err(query_failed)?
            .value)
    }

    /// Class half of WM_CLASS (`instance\0class\0`)
    fn wm_class(&self, window: Window) -> Result<Option<String>, ContextError> {
        let raw = self.property(window, AtomEnum::WM_CLASS.into(), AtomEnum::STRING.into())?;
        Ok(raw
            .split(|b| *b == 0)
            .nth(1)
            .filter(|class| !class.is_empty())
            .map(|class| String::from_utf8_lossy(class).into_owned()))
    }

    /// `_NET_WM_NAME`, avoiding COMPOUND_TEXT decoding of WM_NAME
    fn wm_name(&self, window: Window) -> Result<Option<String>, ContextError> {
        let raw = self.property(window, self.net_wm_name, self.utf8_string)?;
        if raw.is_empty() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
    }
}

impl ContextProvider for X11ContextProvider {
    fn name(&self) -> &'static str {
        "x11"
    }

    fn active_window(&mut self) -> Result<WindowInfo, ContextError> {
        let result = self.query();
        if result.is_err() {
            self.session = None;
        }
        result
    }
}

fn intern(conn: &RustConnection, name: &[u8]) -> Result<Atom, ContextError> {
    Ok(conn
        .intern_atom(false, name)
        .map_err(query_failed)?
        .reply()
        .map_err(query_failed)?
        .atom)
}

fn query_failed(e: impl std::fmt::Display) -> ContextError {
    ContextError::QueryFailed(e.to_string())
}
