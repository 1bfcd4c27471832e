// Keyweave Event Loop
// Grabbing input devices and polling them for events

use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

use evdev::{Device, EventType, LedType};

use crate::context::EventSource;
use crate::input::{is_keyboard, is_virtual_device, DeviceCapabilities, DeviceFilter, InputEvent};
use crate::Key;

/// Result type for event loop operations
pub type EventLoopResult<T> = Result<T, EventLoopError>;

#[derive(Debug, thiserror::Error)]
pub enum EventLoopError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One row of `--list-devices`
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub phys: Option<String>,
    pub is_keyboard: bool,
    pub selected: bool,
}

/// An input event with the device it came from
#[derive(Debug, Clone)]
pub struct PolledEvent {
    pub event: InputEvent,
    pub source: EventSource,
}

struct GrabbedDevice {
    device: Device,
    name: String,
}

impl GrabbedDevice {
    /// Current lock LED state; read fresh on every batch that has key events
    fn source(&self) -> EventSource {
        let mut source = EventSource::named(self.name.clone());
        if let Ok(leds) = self.device.get_led_state() {
            source.capslock_on = leds.contains(LedType::LED_CAPSL);
            source.numlock_on = leds.contains(LedType::LED_NUML);
        }
        source
    }
}

/// Grabbed input devices, multiplexed with `poll(2)`.
///
/// Devices are ungrabbed on drop, including during unwinding, so a crash
/// never leaves the keyboard captured.
pub struct EventLoop {
    devices: Vec<GrabbedDevice>,
    poll_fds: Vec<libc::pollfd>,
    grabbed: bool,
}

impl EventLoop {
    /// Our own output devices carry this in their name
    pub const VIRT_DEVICE_PREFIX: &'static str = "Keyweave (virtual)";

    /// Open the devices selected by `filter` and grab them
    pub fn open(filter: &DeviceFilter) -> EventLoopResult<Self> {
        let mut devices = Self::find_devices(filter)?;

        // A previous instance that crashed may still hold a grab
        for dev in &mut devices {
            let _ = dev.device.ungrab();
        }
        for dev in &mut devices {
            dev.device.grab()?;
            log::info!("Grabbed device: {}", dev.name);
        }

        let poll_fds = devices
            .iter()
            .map(|d| libc::pollfd {
                fd: d.device.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();

        Ok(Self {
            devices,
            poll_fds,
            grabbed: true,
        })
    }

    pub fn ungrab_all(&mut self) {
        if self.grabbed {
            for dev in &mut self.devices {
                if let Err(e) = dev.device.ungrab() {
                    log::warn!("Failed to ungrab {}: {}", dev.name, e);
                }
            }
            self.grabbed = false;
        }
    }

    /// Every input device, marked with whether `filter` would select it
    pub fn list_devices(filter: &DeviceFilter) -> Vec<DeviceInfo> {
        let mut infos: Vec<DeviceInfo> = evdev::enumerate()
            .map(|(path, device)| {
                let name = device.name().unwrap_or("Unknown").to_string();
                let path = path.to_string_lossy().into_owned();
                let keyboard = is_keyboard(&capabilities(&device));
                let selected = filter.matches(
                    &name,
                    &path,
                    keyboard,
                    is_virtual_device(&name, Self::VIRT_DEVICE_PREFIX),
                );
                DeviceInfo {
                    phys: device.physical_path().map(str::to_string),
                    path,
                    name,
                    is_keyboard: keyboard,
                    selected,
                }
            })
            .collect();
        infos.sort_by(|a, b| a.path.cmp(&b.path));
        infos
    }

    fn find_devices(filter: &DeviceFilter) -> EventLoopResult<Vec<GrabbedDevice>> {
        let mut found = Vec::new();
        for (path, device) in evdev::enumerate() {
            let name = device.name().unwrap_or("Unknown").to_string();
            let path = path.to_string_lossy();
            let keyboard = is_keyboard(&capabilities(&device));
            let virt = is_virtual_device(&name, Self::VIRT_DEVICE_PREFIX);
            if filter.matches(&name, &path, keyboard, virt) {
                found.push(GrabbedDevice { device, name });
            }
        }

        if found.is_empty() {
            let what = if filter.is_autodetect() {
                "No keyboard devices found".to_string()
            } else {
                format!("None of {:?} found", filter.names())
            };
            return Err(EventLoopError::DeviceNotFound(what));
        }
        Ok(found)
    }

    /// Wait up to `timeout` (forever when `None`) and return what arrived.
    ///
    /// An interrupted wait returns no events so the caller can check its
    /// shutdown flag.
    pub fn poll(&mut self, timeout: Option<Duration>) -> EventLoopResult<Vec<PolledEvent>> {
        let timeout_ms = timeout.map_or(-1, |t| i32::try_from(t.as_millis()).unwrap_or(i32::MAX));

        // SAFETY: poll_fds outlives the call and its length is passed along
        let ready = unsafe {
            libc::poll(
                self.poll_fds.as_mut_ptr(),
                self.poll_fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };

        if ready < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(EventLoopError::Io(err));
        }

        let mut polled = Vec::new();
        if ready == 0 {
            return Ok(polled);
        }

        let now = Instant::now();
        for (i, dev) in self.devices.iter_mut().enumerate() {
            if self.poll_fds[i].revents & libc::POLLIN == 0 {
                continue;
            }
            let events: Vec<InputEvent> = match dev.device.fetch_events() {
                Ok(events) => events
                    .map(|e| InputEvent::decode(e.event_type().0, e.code(), e.value(), now))
                    .collect(),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) => {
                    log::warn!("Failed to read from {}: {}", dev.name, e);
                    continue;
                }
            };
            let source = dev.source();
            polled.extend(events.into_iter().map(|event| PolledEvent {
                event,
                source: source.clone(),
            }));
        }
        Ok(polled)
    }

    pub fn device_names(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.name.clone()).collect()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.ungrab_all();
    }
}

fn capabilities(device: &Device) -> DeviceCapabilities {
    DeviceCapabilities::new(
        device.supported_events().contains(EventType::KEY),
        device
            .supported_keys()
            .map(|keys| keys.iter().map(|k| Key::from(k.code())).collect::<Vec<_>>())
            .unwrap_or_default(),
    )
}
