// Keyweave Output Layer
// Output state, combo calculation and sinks

mod combo;
mod sink;
mod state;

#[cfg(feature = "pure-rust")]
mod uinput;

pub use combo::{plan_combo, ComboPlan};
pub use sink::{
    Emitted, MemorySink, OutputError, OutputSink, RawEvent, ThrottleDelays, MAX_THROTTLE_DELAY_MS,
};
pub use state::Output;

#[cfg(feature = "pure-rust")]
pub use uinput::{VirtualDevice, DEVICE_NAME};
