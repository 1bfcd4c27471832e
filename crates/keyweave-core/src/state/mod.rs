// Keyweave State
// Tracked input keys

mod keystate;
mod keystore;

pub use keystate::Keystate;
pub use keystore::Keystore;
