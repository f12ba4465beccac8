pub mod debounce;
pub mod detector;
pub mod event;

pub use debounce::Debouncer;
pub use detector::{HotplugDetector, DEFAULT_DEBOUNCE};
pub use event::{EdgeSet, EventQueue, HotplugEvent};
