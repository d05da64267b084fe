#![forbid(unsafe_code)]

pub mod backoff;
pub mod endpoint;
pub mod error;
pub mod geometry;
pub mod matching;
pub mod model;
pub mod pacing;
pub mod protocol;
pub mod time;

pub use backoff::BackoffPolicy;
pub use error::Error;
pub use pacing::FramePacer;
pub use protocol::{Message, ProtocolError};
pub use time::Clock;
