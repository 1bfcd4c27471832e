// Keyweave Pure Rust uinput Output
// Virtual device creation and event emission

use evdev::uinput::VirtualDeviceBuilder;
use evdev::{AttributeSet, EventType, InputEvent, RelativeAxisType};

use super::sink::{OutputError, OutputSink, RawEvent, ThrottleDelays};
use crate::{Action, Key};

/// Name the virtual keyboard registers with
pub const DEVICE_NAME: &str = "Keyweave (virtual) Keyboard";

/// Highest key/button code advertised (covers FN and mouse buttons)
const MAX_KEY_CODE: u16 = 0x1ff;

/// uinput virtual keyboard.
///
/// Events are buffered and emitted as one report on [`OutputSink::sync`];
/// `emit` appends the SYN_REPORT itself.
pub struct VirtualDevice {
    device: evdev::uinput::VirtualDevice,
    pending: Vec<InputEvent>,
    delays: ThrottleDelays,
    /// A key write is waiting for its post delay
    key_written: bool,
}

impl VirtualDevice {
    pub fn new() -> Result<Self, OutputError> {
        Self::with_delays(ThrottleDelays::default())
    }

    pub fn with_delays(delays: ThrottleDelays) -> Result<Self, OutputError> {
        let mut keys = AttributeSet::<evdev::Key>::new();
        for code in 1..=MAX_KEY_CODE {
            keys.insert(evdev::Key::new(code));
        }

        // Relative axes so a keyboard with a pointing stick keeps working
        // through the pass-through path
        let mut axes = AttributeSet::<RelativeAxisType>::new();
        for axis in [
            RelativeAxisType::REL_X,
            RelativeAxisType::REL_Y,
            RelativeAxisType::REL_WHEEL,
            RelativeAxisType::REL_HWHEEL,
        ] {
            axes.insert(axis);
        }

        let device = VirtualDeviceBuilder::new()
            .and_then(|b| b.name(DEVICE_NAME).with_keys(&keys))
            .and_then(|b| b.with_relative_axes(&axes))
            .and_then(|b| b.build())
            .map_err(|e| OutputError::DeviceCreation(e.to_string()))?;

        log::info!("Created virtual output device '{}'", DEVICE_NAME);
        if !delays.is_zero() {
            log::info!(
                "Output throttle: pre={}ms post={}ms",
                delays.pre.as_millis(),
                delays.post.as_millis()
            );
        }

        Ok(Self {
            device,
            pending: Vec::with_capacity(8),
            delays,
            key_written: false,
        })
    }

    pub fn set_delays(&mut self, delays: ThrottleDelays) {
        self.delays = delays;
    }

    fn flush(&mut self) -> Result<(), OutputError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let events = std::mem::take(&mut self.pending);
        self.device.emit(&events)?;
        Ok(())
    }
}

impl OutputSink for VirtualDevice {
    fn write_key(&mut self, key: Key, action: Action) -> Result<(), OutputError> {
        if !self.delays.pre.is_zero() {
            std::thread::sleep(self.delays.pre);
        }
        self.pending
            .push(InputEvent::new(EventType::KEY, key.code(), action.value()));
        self.key_written = true;
        Ok(())
    }

    fn write_raw(&mut self, event: &RawEvent) -> Result<(), OutputError> {
        // The source device's own SYN_REPORT closes the report; emit adds one
        if event.is_sync() {
            return self.flush();
        }
        self.pending
            .push(InputEvent::new(EventType(event.kind), event.code, event.value));
        Ok(())
    }

    fn sync(&mut self) -> Result<(), OutputError> {
        self.flush()?;
        if std::mem::take(&mut self.key_written) && !self.delays.post.is_zero() {
            std::thread::sleep(self.delays.post);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Needs write access to /dev/uinput; skipped where it is unavailable
    #[test]
    fn test_virtual_device_round_trip() {
        let Ok(mut device) = VirtualDevice::new() else {
            return;
        };
        device.write_key(Key::A, Action::Press).unwrap();
        device.sync().unwrap();
        device.write_key(Key::A, Action::Release).unwrap();
        device.sync().unwrap();
        assert!(device.pending.is_empty());
        device.close().unwrap();
    }
}
