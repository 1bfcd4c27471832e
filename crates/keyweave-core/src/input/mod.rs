// Keyweave Input Layer
// Device detection, filtering and event decoding

mod device;
mod event;
mod filter;

pub use device::{is_keyboard, is_virtual_device, DeviceCapabilities};
pub use event::{Control, ControlKeys, InputEvent, KeyEvent};
pub use filter::DeviceFilter;
