pub mod api;
pub mod client;
pub mod error;
pub mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod poller;
pub mod protocol;

pub use api::*;
pub use client::*;
pub use error::*;
pub use http::*;
pub use poller::*;
pub use protocol::*;
