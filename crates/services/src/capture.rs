//! Camera seam: devices hand out sources, sources yield frames.

use image::DynamicImage;
use tracing::{debug, info};

use crate::error::CaptureError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

/// An acquired video stream.
pub trait CaptureSource: Send {
    /// Whether a frame with known dimensions is available.
    fn is_ready(&self) -> bool;

    fn dimensions(&self) -> Option<(u32, u32)>;

    /// The frame currently showing.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::NotReady` before the first frame, or a device error.
    fn current_frame(&mut self) -> Result<DynamicImage, CaptureError>;

    /// Stop the underlying tracks. Called once when the lease ends.
    fn release(&mut self);
}

/// Something that can open a stream, e.g. a camera.
pub trait CaptureDevice: Send {
    /// Request a stream.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError` when permission is refused or no device exists.
    fn acquire(&mut self, facing: FacingMode) -> Result<Box<dyn CaptureSource>, CaptureError>;
}

/// Owns a source for as long as a practice view lives; releases it on drop.
pub struct CaptureLease {
    source: Option<Box<dyn CaptureSource>>,
}

impl CaptureLease {
    /// Acquire from `device`.
    ///
    /// # Errors
    ///
    /// Propagates the device's `CaptureError`.
    pub fn acquire(
        device: &mut dyn CaptureDevice,
        facing: FacingMode,
    ) -> Result<Self, CaptureError> {
        let source = device.acquire(facing)?;
        info!(?facing, "capture acquired");
        Ok(Self {
            source: Some(source),
        })
    }

    pub fn source_mut(&mut self) -> Option<&mut (dyn CaptureSource + 'static)> {
        self.source.as_deref_mut()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.source.as_ref().is_some_and(|source| source.is_ready())
    }

    /// Release now instead of waiting for drop. Safe to call twice.
    pub fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
            debug!("capture released");
        }
    }
}

impl Drop for CaptureLease {
    fn drop(&mut self) {
        self.release();
    }
}

/// Capture as seen by the practice view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Searching,
    Ready,
    Failed(CaptureError),
    Released,
}

impl CaptureState {
    /// One-line description for status displays.
    #[must_use]
    pub fn status_text(&self) -> String {
        match self {
            CaptureState::Searching => "Waiting for camera…".to_string(),
            CaptureState::Ready => "Camera ready".to_string(),
            CaptureState::Failed(err) => format!("Camera error ({}): {err}", err.name()),
            CaptureState::Released => "Camera off".to_string(),
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::fake::FakeDevice;
    use super::*;

    #[test]
    fn lease_releases_once_on_drop() {
        let mut device = FakeDevice::working(640, 480);
        let released = device.released.clone();
        {
            let mut lease = CaptureLease::acquire(&mut device, FacingMode::User).unwrap();
            assert!(lease.is_ready());
            lease.release();
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn denied_permission_surfaces() {
        let mut device = FakeDevice::failing(CaptureError::PermissionDenied);
        let err = CaptureLease::acquire(&mut device, FacingMode::User)
            .err()
            .unwrap();
        assert_eq!(err, CaptureError::PermissionDenied);
        assert_eq!(err.name(), "NotAllowedError");
    }

    #[test]
    fn failed_state_names_the_error() {
        let text = CaptureState::Failed(CaptureError::PermissionDenied).status_text();
        assert_eq!(text, "Camera error (NotAllowedError): camera permission denied");
        assert_eq!(CaptureState::Ready.status_text(), "Camera ready");
    }
}
