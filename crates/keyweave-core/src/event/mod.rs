// Keyweave Event Handling
// evdev input devices feeding the transform engine

pub mod r#loop;

pub use r#loop::{DeviceInfo, EventLoop, EventLoopError, EventLoopResult, PolledEvent};
