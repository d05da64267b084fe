//! Shared error types for the services crate.

use thiserror::Error;

use gestu_core::endpoint::EndpointError;
use gestu_core::protocol::ProtocolError;
use storage::repository::StorageError;

/// Errors emitted by `ProgressStore` writes. Reads never fail.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Capture device failures, surfaced to the user as a status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera found")]
    NotFound,
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("no frame available yet")]
    NotReady,
    #[error("failed to read frame: {0}")]
    Frame(String),
}

impl CaptureError {
    /// Short machine-readable name, e.g. for status lines.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            CaptureError::PermissionDenied => "NotAllowedError",
            CaptureError::NotFound => "NotFoundError",
            CaptureError::Unavailable(_) => "NotReadableError",
            CaptureError::NotReady => "NotReady",
            CaptureError::Frame(_) => "FrameError",
        }
    }
}

/// Errors emitted while turning a frame into a payload.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EncodeError {
    #[error("frame has no pixels")]
    EmptyFrame,
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Reasons the transport refused an outbound message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SendRejection {
    #[error("transport is shut down")]
    Terminated,
    #[error("no open session")]
    NotOpen,
    #[error("outbound backlog of {buffered} bytes exceeds limit")]
    Backlogged { buffered: usize },
    #[error("socket closed")]
    Closed,
    #[error(transparent)]
    Encode(#[from] ProtocolError),
}

/// Errors emitted by `LessonCatalog`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error("catalog request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("catalog returned no usable lessons")]
    Empty,
}

/// Errors emitted while reading configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{name} has invalid value {value:?}")]
    InvalidValue { name: &'static str, value: String },
    #[error("{name} must be within {min}..={max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

/// Errors emitted while preparing a practice session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PracticeError {
    #[error("lesson {0} not found in category")]
    LessonNotFound(String),
    #[error("lesson {0} is locked until the previous lesson is completed")]
    Locked(String),
}
