mod runtime;
mod session;

pub use runtime::{ControlCommand, DEFAULT_TICK, PracticeHandle, PracticeRuntime};
pub use session::{PracticeSession, PracticeSnapshot};
