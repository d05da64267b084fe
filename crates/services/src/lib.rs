#![forbid(unsafe_code)]

pub mod capture;
pub mod catalog;
pub mod config;
pub mod correlator;
pub mod encoder;
pub mod error;
pub mod match_policy;
pub mod practice;
pub mod progress;
pub mod transport;

pub use gestu_core::Clock;

pub use capture::{CaptureDevice, CaptureLease, CaptureSource, CaptureState, FacingMode};
pub use catalog::LessonCatalog;
pub use config::{ClientConfig, ClientConfigDraft};
pub use correlator::{RecognitionResult, ResultCorrelator};
pub use encoder::{FrameEncoder, FrameSink, TickOutcome};
pub use error::{
    CaptureError, CatalogError, ConfigError, EncodeError, PracticeError, ProgressError,
    SendRejection,
};
pub use match_policy::{MatchOutcome, MatchPolicy};
pub use practice::{ControlCommand, PracticeHandle, PracticeRuntime, PracticeSession, PracticeSnapshot};
pub use progress::{ProgressStore, ProgressWatcher};
pub use transport::{SessionTransport, TransportDiagnostics, TransportStatus};
