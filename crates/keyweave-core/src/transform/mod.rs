// Keyweave Transform Module
// Core transformation logic for keyboard event processing

mod arbiter;
mod engine;

pub use arbiter::SuspendTimer;
pub use engine::{EngineState, MatchMode, StickyBind, TransformEngine};
