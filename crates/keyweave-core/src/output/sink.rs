// Keyweave Output Sink
// Where synthesized events go: a virtual device or an in-memory recorder

use std::time::Duration;

use thiserror::Error;

use crate::{Action, Key};

/// Upper bound for either throttle delay
pub const MAX_THROTTLE_DELAY_MS: u64 = 150;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to create virtual device: {0}")]
    DeviceCreation(String),

    #[error("Failed to write event: {0}")]
    Write(#[from] std::io::Error),

    #[error("Output device is closed")]
    Closed,
}

/// A non-key input event forwarded untouched (mouse motion, wheel, sync)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    pub const EV_SYN: u16 = 0x00;
    pub const EV_KEY: u16 = 0x01;
    pub const EV_REL: u16 = 0x02;
    pub const EV_MSC: u16 = 0x04;

    pub fn new(kind: u16, code: u16, value: i32) -> Self {
        Self { kind, code, value }
    }

    pub fn is_sync(&self) -> bool {
        self.kind == Self::EV_SYN
    }
}

/// Pauses around each key write, for applications that drop fast input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThrottleDelays {
    pub pre: Duration,
    pub post: Duration,
}

impl ThrottleDelays {
    /// Build from milliseconds, clamping each into `0..=150`
    pub fn from_millis(pre_ms: u64, post_ms: u64) -> Self {
        Self {
            pre: Duration::from_millis(clamp_delay("key_pre_delay_ms", pre_ms)),
            post: Duration::from_millis(clamp_delay("key_post_delay_ms", post_ms)),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.pre.is_zero() && self.post.is_zero()
    }
}

fn clamp_delay(name: &str, ms: u64) -> u64 {
    if ms > MAX_THROTTLE_DELAY_MS {
        log::warn!(
            "{} of {}ms is out of range, using {}ms",
            name,
            ms,
            MAX_THROTTLE_DELAY_MS
        );
        return MAX_THROTTLE_DELAY_MS;
    }
    ms
}

/// Destination for synthesized events.
///
/// Callers write one key action and then call [`OutputSink::sync`] so the
/// consumer sees it before the next one.
pub trait OutputSink {
    fn write_key(&mut self, key: Key, action: Action) -> Result<(), OutputError>;

    fn write_raw(&mut self, event: &RawEvent) -> Result<(), OutputError>;

    fn sync(&mut self) -> Result<(), OutputError>;

    fn close(&mut self) -> Result<(), OutputError> {
        Ok(())
    }
}

/// What a [`MemorySink`] saw, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emitted {
    Key(Action, Key),
    Raw(RawEvent),
    Sync,
}

/// Sink that records everything, for tests and dry runs
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Vec<Emitted>,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Emitted] {
        &self.events
    }

    /// Key actions only, without syncs or raw events
    pub fn keys(&self) -> Vec<(Action, Key)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Emitted::Key(action, key) => Some((*action, *key)),
                _ => None,
            })
            .collect()
    }

    pub fn raw_events(&self) -> Vec<RawEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Emitted::Raw(raw) => Some(*raw),
                _ => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl OutputSink for MemorySink {
    fn write_key(&mut self, key: Key, action: Action) -> Result<(), OutputError> {
        if self.closed {
            return Err(OutputError::Closed);
        }
        self.events.push(Emitted::Key(action, key));
        Ok(())
    }

    fn write_raw(&mut self, event: &RawEvent) -> Result<(), OutputError> {
        if self.closed {
            return Err(OutputError::Closed);
        }
        self.events.push(Emitted::Raw(*event));
        Ok(())
    }

    fn sync(&mut self) -> Result<(), OutputError> {
        self.events.push(Emitted::Sync);
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let mut sink = MemorySink::new();
        sink.write_key(Key::A, Action::Press).unwrap();
        sink.sync().unwrap();
        sink.write_raw(&RawEvent::new(RawEvent::EV_REL, 0, 5)).unwrap();
        sink.write_key(Key::A, Action::Release).unwrap();

        assert_eq!(sink.keys(), vec![(Action::Press, Key::A), (Action::Release, Key::A)]);
        assert_eq!(sink.raw_events(), vec![RawEvent::new(RawEvent::EV_REL, 0, 5)]);
        assert_eq!(sink.events()[1], Emitted::Sync);
    }

    #[test]
    fn test_throttle_delays_are_clamped() {
        let delays = ThrottleDelays::from_millis(20, 400);
        assert_eq!(delays.pre, Duration::from_millis(20));
        assert_eq!(delays.post, Duration::from_millis(150));
        assert!(ThrottleDelays::default().is_zero());
    }

    #[test]
    fn test_closed_sink_rejects_writes() {
        let mut sink = MemorySink::new();
        sink.close().unwrap();
        assert!(sink.is_closed());
        assert!(matches!(sink.write_key(Key::A, Action::Press), Err(OutputError::Closed)));
    }
}
