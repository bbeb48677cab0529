pub mod cancel;
pub mod event_bus;
pub mod job;

pub use cancel::*;
pub use event_bus::*;
pub use job::*;
