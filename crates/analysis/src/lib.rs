pub mod control;
pub mod error;
pub mod format;
pub mod kind;
pub mod panel;
pub mod params;
pub mod picker;

pub use control::*;
pub use error::*;
pub use format::*;
pub use kind::*;
pub use panel::*;
pub use params::*;
pub use picker::*;
